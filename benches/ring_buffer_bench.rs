use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meteorwatch::ring_buffer::RingBuffer;

fn benchmark_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_push");

    for capacity in [10usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("steady_state_push", capacity),
            capacity,
            |b, &capacity| {
                let mut ring: RingBuffer<i64> = RingBuffer::new(capacity);
                for i in 0..capacity {
                    ring.push(i as i64);
                }
                b.iter(|| ring.push(black_box(1)));
            },
        );
    }

    group.finish();
}

fn benchmark_unroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_unroll");

    for capacity in [10usize, 100, 1000].iter() {
        let mut ring: RingBuffer<i64> = RingBuffer::new(*capacity);
        for i in 0..(*capacity * 2) {
            ring.push(i as i64);
        }
        group.bench_with_input(BenchmarkId::new("full_ring", capacity), &ring, |b, ring| {
            b.iter(|| black_box(ring.unroll()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_push, benchmark_unroll);
criterion_main!(benches);
