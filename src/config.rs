//! Typed configuration for the acquisition pipeline.
//!
//! Recognized options are loaded from an optional TOML file layered with
//! `METEORWATCH_`-prefixed environment variable overrides, using the
//! `config` crate. The frozen result is shared read-only (`Arc<Config>`)
//! across the capture thread, the FrameBus and the analysis sink.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};

/// Device pixel format selector, as negotiated by the enumeration
/// collaborator before the core ever sees a device handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    Grey,
    Yuyv,
    Mjpeg,
}

/// Recognized configuration options (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pre-event ring buffer capacity.
    pub detection_head: usize,
    /// Post-trigger tail-countdown length.
    pub detection_tail: usize,
    /// Per-pixel difference threshold (0-255).
    pub pixel_difference_threshold: u8,
    /// Changed-pixel count threshold required to flag an event.
    pub n_changed_pixels_for_trigger: usize,
    /// When true, `Frame.annotated` is never populated.
    pub headless: bool,
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Device pixel format.
    pub pixel_format: PixelFormat,
    /// Number of kernel-shared capture buffers.
    pub buffer_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection_head: 10,
            detection_tail: 10,
            pixel_difference_threshold: 10,
            n_changed_pixels_for_trigger: 5,
            headless: false,
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Grey,
            buffer_count: 32,
        }
    }
}

impl Config {
    /// Loads configuration from an optional TOML file, then applies
    /// `METEORWATCH_`-prefixed environment overrides on top.
    pub fn load(path: Option<&std::path::Path>) -> CaptureResult<Arc<Config>> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("METEORWATCH").try_parsing(true),
        );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(Arc::new(config))
    }

    fn validate(&self) -> CaptureResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Configuration(
                "width and height must be positive".to_string(),
            ));
        }
        if self.buffer_count == 0 {
            return Err(CaptureError::Configuration(
                "buffer_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
