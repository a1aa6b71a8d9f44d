//! WebVTT reading and writing.

use super::cue::{format_timestamp, parse_timing_line, Cue};
use super::{split_blocks, PARAGRAPH_BREAK};
use crate::{Error, Result};

const HEADER: &str = "WEBVTT";

/// Parse a WebVTT document into cues, in document order.
///
/// Cue identifiers, cue settings and `NOTE`/`STYLE`/`REGION` blocks are
/// discarded. A text block that follows a cue without a timing line of its
/// own is a paragraph break inside that cue (an empty line in the cue
/// payload); it is kept as a `<br/>` line so the cue survives conversion.
pub fn parse_webvtt(input: &str) -> Result<Vec<Cue>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let blocks = split_blocks(input);

    let header = blocks
        .first()
        .ok_or_else(|| Error::subtitle(1, "empty document"))?;
    if !header.lines[0].starts_with(HEADER) {
        return Err(Error::subtitle(header.line, "missing WEBVTT header"));
    }

    let mut cues: Vec<Cue> = Vec::new();
    for block in &blocks[1..] {
        let first = block.lines[0];
        if first.starts_with("NOTE") || first == "STYLE" || first == "REGION" {
            continue;
        }

        let timing_at = block.lines.iter().take(2).position(|l| l.contains("-->"));
        match timing_at {
            Some(pos) => {
                let (start, end) = parse_timing_line(block.lines[pos]).ok_or_else(|| {
                    Error::subtitle(block.line + pos, format!("bad timing line '{}'", block.lines[pos]))
                })?;
                let text = block.lines[pos + 1..].iter().map(|l| l.trim());
                cues.push(Cue::new(start, end, text));
            }
            None => match cues.last_mut() {
                Some(cue) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "Paragraph break inside cue at {} (line {})",
                        format_timestamp(cue.start),
                        block.line
                    );
                    cue.lines.push(PARAGRAPH_BREAK.to_string());
                    cue.lines.extend(block.lines.iter().map(|l| l.trim().to_string()));
                }
                None => {
                    return Err(Error::subtitle(block.line, "text before the first cue"));
                }
            },
        }
    }

    Ok(cues)
}

/// Serialize cues as WebVTT with `hh:mm:ss.mmm` timestamps.
pub fn to_webvtt(cues: &[Cue]) -> String {
    let mut out = String::from(HEADER);
    out.push_str("\n\n");
    for cue in cues {
        out.push_str(&format_timestamp(cue.start));
        out.push_str(" --> ");
        out.push_str(&format_timestamp(cue.end));
        out.push('\n');
        for line in &cue.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let doc = "WEBVTT\n\n00:01.000 --> 00:04.000\nHello\nthere\n\n1\n00:00:05.000 --> 00:00:06.500 align:end\nSecond\n";
        let cues = parse_webvtt(doc).unwrap();

        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(1_000, 4_000, ["Hello", "there"]));
        assert_eq!(cues[1], Cue::new(5_000, 6_500, ["Second"]));
    }

    #[test]
    fn test_skips_notes_and_styles() {
        let doc = "\u{feff}WEBVTT - title\nKind: captions\n\nNOTE this is ignored\n\nSTYLE\n::cue { color: red }\n\n00:01.000 --> 00:02.000\nText\n";
        let cues = parse_webvtt(doc).unwrap();
        assert_eq!(cues, vec![Cue::new(1_000, 2_000, ["Text"])]);
    }

    #[test]
    fn test_literal_paragraph_break() {
        let doc = "WEBVTT\r\n\r\n00:01.000 --> 00:04.000\r\nFirst paragraph\r\n\r\nSecond paragraph\r\n";
        let cues = parse_webvtt(doc).unwrap();
        assert_eq!(
            cues,
            vec![Cue::new(
                1_000,
                4_000,
                ["First paragraph", "<br/>", "Second paragraph"]
            )]
        );
    }

    #[test]
    fn test_missing_header() {
        let err = parse_webvtt("00:01.000 --> 00:02.000\nText\n").unwrap_err();
        assert!(matches!(err, Error::Subtitle { line: 1, .. }));
    }

    #[test]
    fn test_bad_timing_reports_line() {
        let err = parse_webvtt("WEBVTT\n\n00:01.000 --> nope\nText\n").unwrap_err();
        assert!(matches!(err, Error::Subtitle { line: 3, .. }));

        let huge = "WEBVTT\n\n99999999999999999:00:00.000 --> 99999999999999999:00:01.000\nText\n";
        assert!(matches!(parse_webvtt(huge), Err(Error::Subtitle { line: 3, .. })));
    }

    #[test]
    fn test_to_webvtt() {
        let cues = vec![
            Cue::new(1_000, 4_000, ["Hello"]),
            Cue::new(3_600_000, 3_601_000, ["Late", "two lines"]),
        ];
        assert_eq!(
            to_webvtt(&cues),
            "WEBVTT\n\n00:00:01.000 --> 00:00:04.000\nHello\n\n01:00:00.000 --> 01:00:01.000\nLate\ntwo lines\n\n"
        );
    }

    #[test]
    fn test_written_output_parses_back() {
        let cues = vec![Cue::new(0, 1_500, ["a"]), Cue::new(1_500, 2_000, ["b"])];
        assert_eq!(parse_webvtt(&to_webvtt(&cues)).unwrap(), cues);
    }
}
