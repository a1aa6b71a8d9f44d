//! Text subtitle handling: parsing, normalization and serialization.
//!
//! This backs the `sanitize-subs` step that rendered plans insert between
//! extracting a text subtitle track and converting it to a codec that
//! cannot render overlapping cues.

mod cue;
mod normalize;
mod srt;
mod webvtt;

pub use cue::{format_timestamp, parse_timestamp, Cue, TargetFormat};
pub use normalize::{normalize, NormalizationReport, Normalized, MERGE_SEPARATOR};
pub use srt::{parse_srt, to_srt};
pub use webvtt::{parse_webvtt, to_webvtt};

use crate::{workspace, Error, Result};
use std::path::Path;

/// Line standing in for an empty line inside a cue payload.
pub const PARAGRAPH_BREAK: &str = "<br/>";

/// Text subtitle file formats compatplan reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    WebVtt,
    Srt,
}

impl SubtitleFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "vtt" | "webvtt" => Ok(Self::WebVtt),
            "srt" => Ok(Self::Srt),
            _ => Err(Error::InvalidInput(format!(
                "Unsupported subtitle file extension: {}",
                path.display()
            ))),
        }
    }

    pub fn parse(self, input: &str) -> Result<Vec<Cue>> {
        match self {
            Self::WebVtt => parse_webvtt(input),
            Self::Srt => parse_srt(input),
        }
    }

    pub fn render(self, cues: &[Cue]) -> String {
        match self {
            Self::WebVtt => to_webvtt(cues),
            Self::Srt => to_srt(cues),
        }
    }
}

/// Read `input`, normalize it for `target` and write the result to `output`.
///
/// Formats are chosen from the file extensions, so this also converts
/// between SRT and WebVTT.
pub fn sanitize_file(input: &Path, output: &Path, target: &TargetFormat) -> Result<NormalizationReport> {
    if !input.is_file() {
        return Err(Error::file_not_found(input));
    }
    let in_format = SubtitleFormat::from_path(input)?;
    let out_format = SubtitleFormat::from_path(output)?;

    let content = std::fs::read_to_string(input)?;
    let cues = in_format.parse(&content)?;
    let normalized = normalize(&cues, target);

    workspace::write_atomic(output, out_format.render(&normalized.cues).as_bytes())?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Sanitized {} -> {}: {}",
        input.display(),
        output.display(),
        normalized.report
    );

    Ok(normalized.report)
}

/// A run of consecutive non-blank lines and the 1-based line it starts on.
pub(crate) struct Block<'a> {
    pub line: usize,
    pub lines: Vec<&'a str>,
}

pub(crate) fn split_blocks(input: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current: Option<Block<'_>> = None;

    for (i, raw) in input.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }
        match current.as_mut() {
            Some(block) => block.lines.push(line),
            None => {
                current = Some(Block {
                    line: i + 1,
                    lines: vec![line],
                })
            }
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_blocks() {
        let blocks = split_blocks("a\nb\n\n\nc\r\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lines, vec!["a", "b"]);
        assert_eq!(blocks[1].line, 5);
        assert_eq!(blocks[1].lines, vec!["c"]);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SubtitleFormat::from_path(Path::new("x.VTT")).unwrap(), SubtitleFormat::WebVtt);
        assert_eq!(SubtitleFormat::from_path(Path::new("x.srt")).unwrap(), SubtitleFormat::Srt);
        assert!(SubtitleFormat::from_path(Path::new("x.ass")).is_err());
    }

    #[test]
    fn test_sanitize_file_vtt_to_vtt() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.vtt");
        let output = dir.path().join("out.vtt");
        std::fs::write(
            &input,
            "WEBVTT\n\n00:00.000 --> 00:04.000\nfirst\n\n00:02.000 --> 00:06.000\nsecond\n",
        )
        .unwrap();

        let report = sanitize_file(&input, &output, &TargetFormat::for_codec("mov_text")).unwrap();
        assert_eq!(report.output_cues, 3);

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nfirst\n"));
        assert!(written.contains("00:00:02.000 --> 00:00:04.000\nsecond\n<br/>\nfirst\n"));
    }

    #[test]
    fn test_sanitize_file_missing_input() {
        let dir = tempdir().unwrap();
        let err = sanitize_file(
            &dir.path().join("nope.vtt"),
            &dir.path().join("out.vtt"),
            &TargetFormat::for_codec("mov_text"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
