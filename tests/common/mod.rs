//! Shared fixtures for integration tests.
//!
//! Stream inventories mirror what ffprobe reports for typical release files,
//! so planner tests need neither real media nor external tools.

#![allow(dead_code)]

use compatplan::matrix::CompatibilityMatrix;
use compatplan::planner::{Mode, PlanOptions, Planner};
use compatplan::render::{EncoderTemplate, RenderPaths, Renderer};
use compatplan_av::StreamDescriptor;
use std::path::Path;
use std::sync::Arc;

/// The built-in matrix behind an `Arc`, as the binary shares it.
pub fn matrix() -> Arc<CompatibilityMatrix> {
    Arc::new(CompatibilityMatrix::builtin().expect("built-in matrix must load"))
}

/// Planner with default options in `mode`.
pub fn planner(mode: Mode) -> Planner {
    Planner::new(matrix(), PlanOptions::default().with_mode(mode))
}

/// Planner that may OCR image subtitles.
pub fn planner_with_ocr(mode: Mode) -> Planner {
    let mut options = PlanOptions::default().with_mode(mode);
    options.ocr_available = true;
    Planner::new(matrix(), options)
}

pub fn renderer() -> Renderer {
    Renderer::new(EncoderTemplate::ffmpeg("ffmpeg"))
        .with_sanitizer("compatplan")
        .with_ocr(&["subtile-ocr", "-l", "{language}", "-o", "{output}", "{input}"], "eng")
}

/// Paths for rendering `input` into `<stem>.<mode>.<container>` beside it.
pub fn paths_for(input: &Path, mode: Mode, container: &str) -> RenderPaths {
    let dir = input.parent().unwrap_or(Path::new("."));
    let stem = input.file_stem().unwrap().to_string_lossy();
    RenderPaths {
        input: input.to_path_buf(),
        output: dir.join(format!("{}.{}.{}", stem, mode, container)),
        scratch_dir: dir.join(format!("{}.{}.tmp", stem, mode)),
    }
}

/// h264 1080p + stereo aac + srt: already playable nearly everywhere.
pub fn web_friendly() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::video(0, "h264")
            .with_resolution(1920, 1080)
            .with_bit_depth(8)
            .with_bitrate(4_000_000),
        StreamDescriptor::audio(1, "aac", 2)
            .with_bitrate(192_000)
            .with_language("eng"),
        StreamDescriptor::subtitle(2, "subrip").with_language("eng"),
    ]
}

/// 10-bit 4K hevc + 5.1 dts remux.
pub fn uhd_remux() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::video(0, "hevc")
            .with_resolution(3840, 2160)
            .with_bit_depth(10)
            .with_bitrate(40_000_000),
        StreamDescriptor::audio(1, "dts", 6)
            .with_bitrate(1_509_000)
            .with_language("eng"),
    ]
}

/// Fansub-style release: styled subtitles, fonts, a PGS track, cover art.
pub fn anime_release() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::video(0, "hevc")
            .with_resolution(1920, 1080)
            .with_bit_depth(10)
            .with_bitrate(6_000_000),
        StreamDescriptor::audio(1, "flac", 2)
            .with_bitrate(900_000)
            .with_language("jpn")
            .with_disposition(true, false),
        StreamDescriptor::audio(2, "truehd", 8)
            .with_bitrate(3_000_000)
            .with_language("eng"),
        StreamDescriptor::subtitle(3, "ass")
            .with_language("eng")
            .with_title("Signs & Songs")
            .with_disposition(true, true),
        StreamDescriptor::subtitle(4, "hdmv_pgs_subtitle").with_language("ger"),
        StreamDescriptor::attachment(5, "ttf"),
        StreamDescriptor::attachment(6, "jpg"),
    ]
}

/// Every fixture, for property-style tests.
pub fn all_fixtures() -> Vec<(&'static str, Vec<StreamDescriptor>)> {
    vec![
        ("web_friendly.mkv", web_friendly()),
        ("uhd_remux.mkv", uhd_remux()),
        ("anime_release.mkv", anime_release()),
    ]
}
