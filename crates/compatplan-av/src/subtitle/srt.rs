//! SubRip reading and writing.

use super::cue::{format_srt_timestamp, parse_timing_line, Cue};
use super::{split_blocks, PARAGRAPH_BREAK};
use crate::{Error, Result};

/// Parse an SRT document. The numeric counter line is optional.
pub fn parse_srt(input: &str) -> Result<Vec<Cue>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut cues: Vec<Cue> = Vec::new();

    for block in split_blocks(input) {
        let timing_at = block.lines.iter().take(2).position(|l| l.contains("-->"));
        match timing_at {
            Some(pos) => {
                let (start, end) = parse_timing_line(block.lines[pos]).ok_or_else(|| {
                    Error::subtitle(block.line + pos, format!("bad timing line '{}'", block.lines[pos]))
                })?;
                cues.push(Cue::new(start, end, block.lines[pos + 1..].iter().map(|l| l.trim())));
            }
            None => match cues.last_mut() {
                Some(cue) => {
                    cue.lines.push(PARAGRAPH_BREAK.to_string());
                    cue.lines.extend(block.lines.iter().map(|l| l.trim().to_string()));
                }
                None => return Err(Error::subtitle(block.line, "text before the first cue")),
            },
        }
    }

    Ok(cues)
}

/// Serialize cues as SRT, numbering them from 1.
pub fn to_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n",
            i + 1,
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end)
        ));
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
    fn test_parse_srt() {
        let doc = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\n<i>World</i>\n";
        let cues = parse_srt(doc).unwrap();
        assert_eq!(
            cues,
            vec![
                Cue::new(1_000, 2_500, ["Hello"]),
                Cue::new(3_000, 4_000, ["<i>World</i>"]),
            ]
        );
    }

    #[test]
    fn test_srt_without_counter() {
        let cues = parse_srt("00:00:01,000 --> 00:00:02,000\nNo counter\n").unwrap();
        assert_eq!(cues.len(), 1);
    }

    #[test]
    fn test_to_srt() {
        let cues = vec![Cue::new(1_000, 2_500, ["Hello"])];
        assert_eq!(to_srt(&cues), "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n");
    }

    #[test]
    fn test_orphan_text_is_an_error() {
        assert!(parse_srt("just text\n").is_err());
    }
}
