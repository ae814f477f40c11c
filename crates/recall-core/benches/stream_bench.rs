//! Criterion benchmarks for audio signal streams and the recall tree.
//!
//! - **Stream**: `tile()` and `realloc_buffer_size()` across buffer sizes
//! - **Tree**: one full tick over a fanned-out instance tree
//!
//! Run with: `cargo bench -p recall-core`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use recall_core::{
    AudioGeometry, AudioSignal, Container, RecallFlags, RecallIdAllocator, RecallTree,
    SampleFormat, SoundScope,
};

const SAMPLERATE: u32 = 48000;
const BUFFER_SIZES: &[usize] = &[64, 256, 1024, 4096];

fn geometry(buffer_size: usize) -> AudioGeometry {
    AudioGeometry::new(SAMPLERATE, buffer_size, 1, SampleFormat::Float32).unwrap()
}

fn sine(frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| (std::f32::consts::TAU * 440.0 * i as f32 / SAMPLERATE as f32).sin())
        .collect()
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

fn bench_tile(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream/tile");
    let template = AudioSignal::from_samples(&geometry(333), &sine(1000));

    for &bs in BUFFER_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(bs), &bs, |b, &bs| {
            let mut out = AudioSignal::new(&geometry(bs));
            b.iter(|| {
                out.tile(black_box(&template), SAMPLERATE as usize);
                black_box(out.length());
            });
        });
    }

    group.finish();
}

fn bench_realloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream/realloc");
    let source = sine(SAMPLERATE as usize);

    for &bs in BUFFER_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(bs), &bs, |b, &bs| {
            let signal = AudioSignal::from_samples(&geometry(512), &source);
            b.iter(|| {
                let mut s = signal.clone();
                s.realloc_buffer_size(black_box(bs)).unwrap();
                black_box(s.last_frame());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree/tick");

    for &fan_out in &[2_usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(fan_out),
            &fan_out,
            |b, &fan_out| {
                let ids = RecallIdAllocator::new();
                let run = ids.allocate(SoundScope::Playback);
                let mut tree = RecallTree::new();
                let root = tree.add_node(Box::new(Container), RecallFlags::PERSISTENT, &run);
                for _ in 0..fan_out {
                    let mid = tree.add_node(Box::new(Container), RecallFlags::NONE, &run);
                    tree.add_child(root, mid).unwrap();
                    for _ in 0..fan_out {
                        let leaf = tree.add_node(Box::new(Container), RecallFlags::NONE, &run);
                        tree.add_child(mid, leaf).unwrap();
                    }
                }
                tree.run_init(root).unwrap();
                b.iter(|| tree.run_cycle(black_box(root)).unwrap());
            },
        );
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_tile, bench_realloc, bench_tick);
criterion_main!(benches);
