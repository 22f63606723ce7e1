//! Converts one captured buffer into a `Frame.raw` byte vector (§4.2).

use crate::config::PixelFormat;
use crate::error::{CaptureError, CaptureResult};

/// Converts a raw device buffer into exactly `width * height` grey bytes.
///
/// Implementations must not allocate scratch buffers proportional to frame
/// rate on the hot path; `PixelDecoder` owns its own pre-allocated
/// scratch space and reuses it across calls.
pub struct PixelDecoder {
    format: PixelFormat,
    width: usize,
    height: usize,
    /// Pre-allocated scratch for MJPEG decode, reused across frames.
    mjpeg_scratch: Vec<u8>,
}

impl PixelDecoder {
    pub fn new(format: PixelFormat, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            mjpeg_scratch: Vec::with_capacity(width * height),
        }
    }

    /// Decodes `buf` (the device's raw bytes for one frame) into a grey
    /// byte vector of length `width * height`.
    pub fn decode(&mut self, buf: &[u8]) -> CaptureResult<Vec<u8>> {
        match self.format {
            PixelFormat::Grey => self.decode_grey(buf),
            PixelFormat::Yuyv => self.decode_yuyv(buf),
            PixelFormat::Mjpeg => self.decode_mjpeg(buf),
        }
    }

    fn decode_grey(&self, buf: &[u8]) -> CaptureResult<Vec<u8>> {
        let expected = self.width * self.height;
        if buf.len() < expected {
            return Err(CaptureError::DecodeFailed(format!(
                "GREY buffer too short: got {}, need {}",
                buf.len(),
                expected
            )));
        }
        Ok(buf[..expected].to_vec())
    }

    fn decode_yuyv(&self, buf: &[u8]) -> CaptureResult<Vec<u8>> {
        let n_pix = self.width * self.height;
        let expected = n_pix * 2;
        if buf.len() < expected {
            return Err(CaptureError::DecodeFailed(format!(
                "YUYV buffer too short: got {}, need {}",
                buf.len(),
                expected
            )));
        }
        // Luma bytes sit at offsets 0 and 2 of each 4-byte Y0 U Y1 V quad.
        let mut out = Vec::with_capacity(n_pix);
        for quad in buf[..n_pix * 2].chunks_exact(4) {
            out.push(quad[0]);
            out.push(quad[2]);
        }
        Ok(out)
    }

    fn decode_mjpeg(&mut self, buf: &[u8]) -> CaptureResult<Vec<u8>> {
        let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
            .map_err(|e| CaptureError::DecodeFailed(format!("MJPEG decode failed: {e}")))?;

        let expected = self.width * self.height;
        self.mjpeg_scratch.clear();
        self.mjpeg_scratch.reserve(expected);

        match img {
            image::DynamicImage::ImageLuma8(luma) => {
                self.mjpeg_scratch.extend_from_slice(luma.as_raw());
            }
            other => {
                let rgb = other.to_rgb8();
                for px in rgb.pixels() {
                    let avg = (px[0] as u32 + px[1] as u32 + px[2] as u32) / 3;
                    self.mjpeg_scratch.push(avg as u8);
                }
            }
        }

        if self.mjpeg_scratch.len() != expected {
            return Err(CaptureError::DecodeFailed(format!(
                "MJPEG decoded to {} px, expected {}",
                self.mjpeg_scratch.len(),
                expected
            )));
        }

        // Clone out rather than `mem::take`: taking would leave
        // `mjpeg_scratch` at zero capacity, forcing the next frame's
        // `reserve` above to allocate again instead of reusing the
        // pre-allocated scratch space.
        Ok(self.mjpeg_scratch.clone())
    }
}
