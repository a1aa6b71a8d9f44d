//! Benchmarks for planning and rendering
//!
//! Measures per-file planning cost, which bounds how fast a batch over a
//! large library can go before any external tool runs.

use compatplan::matrix::CompatibilityMatrix;
use compatplan::planner::{Mode, PlanOptions, Planner, RateMode};
use compatplan::render::{EncoderTemplate, RenderPaths, Renderer};
use compatplan_av::subtitle::{normalize, Cue, TargetFormat};
use compatplan_av::StreamDescriptor;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn simple_file() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::video(0, "h264")
            .with_resolution(1920, 1080)
            .with_bitrate(4_000_000),
        StreamDescriptor::audio(1, "aac", 2).with_bitrate(192_000),
        StreamDescriptor::subtitle(2, "subrip"),
    ]
}

/// Many tracks that each need a decision: the worst realistic case.
fn busy_file() -> Vec<StreamDescriptor> {
    let mut streams = vec![StreamDescriptor::video(0, "hevc")
        .with_resolution(3840, 2160)
        .with_bit_depth(10)
        .with_bitrate(50_000_000)];
    let audio = ["truehd", "dts", "flac", "aac", "ac3", "opus"];
    for (i, codec) in audio.iter().enumerate() {
        streams.push(StreamDescriptor::audio(1 + i as u32, codec, 6).with_bitrate(1_000_000));
    }
    let subs = ["ass", "subrip", "hdmv_pgs_subtitle", "webvtt", "ass", "subrip"];
    for (i, codec) in subs.iter().enumerate() {
        streams.push(StreamDescriptor::subtitle(7 + i as u32, codec).with_language("eng"));
    }
    for i in 0..8 {
        streams.push(StreamDescriptor::attachment(13 + i, "ttf"));
    }
    streams
}

fn planner(mode: Mode) -> Planner {
    let matrix = Arc::new(CompatibilityMatrix::builtin().unwrap());
    let options = PlanOptions::default()
        .with_mode(mode)
        .with_rate(RateMode::VariableBitrate {
            target: 4_000_000,
            passes: 2,
        });
    Planner::new(matrix, options)
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let files = [("simple", simple_file()), ("busy", busy_file())];

    for mode in Mode::ALL {
        let planner = planner(mode);
        for (name, streams) in &files {
            group.throughput(Throughput::Elements(streams.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), name),
                streams,
                |b, streams| b.iter(|| planner.plan(Path::new("movie.mkv"), black_box(streams))),
            );
        }
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let planner = planner(Mode::Full);
    let renderer = Renderer::new(EncoderTemplate::ffmpeg("ffmpeg"));
    let plan = planner.plan(Path::new("movie.mkv"), &busy_file()).unwrap();
    let paths = RenderPaths {
        input: PathBuf::from("/media/movie.mkv"),
        output: PathBuf::from("/media/movie.full.mkv"),
        scratch_dir: PathBuf::from("/media/movie.full.tmp"),
    };

    c.bench_function("render_busy_full", |b| {
        b.iter(|| renderer.render(black_box(&plan), black_box(&paths)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let target = TargetFormat::for_codec("mov_text");

    for count in [100u64, 1_000, 10_000] {
        // Every cue overlaps the next one
        let cues: Vec<Cue> = (0..count)
            .map(|i| Cue::new(i * 1_000, i * 1_000 + 2_500, [format!("line {}", i)]))
            .collect();
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &cues, |b, cues| {
            b.iter(|| normalize(black_box(cues), &target))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_render, bench_normalize);
criterion_main!(benches);
