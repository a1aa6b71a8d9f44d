//! Subtitle cues and timestamps.

use serde::{Deserialize, Serialize};

/// One timed block of subtitle text. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start: u64,
    pub end: u64,
    pub lines: Vec<String>,
}

impl Cue {
    pub fn new<S: Into<String>>(start: u64, end: u64, lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            start,
            end,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// True when the cue carries no visible text.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    /// True when the cue has a positive duration.
    pub fn is_well_timed(&self) -> bool {
        self.start < self.end
    }

    /// Whether this cue is on screen at some instant inside `[start, end)`.
    pub fn is_active_during(&self, start: u64, end: u64) -> bool {
        self.start < end && self.end > start
    }

    pub fn overlaps(&self, other: &Cue) -> bool {
        self.is_active_during(other.start, other.end)
    }

    /// Cue text with lines joined by `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// What the subtitle codec being produced can display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFormat {
    /// Codec name of the final subtitle stream (`mov_text`, `subrip`, ...).
    pub codec: String,
    /// Whether two cues may be on screen at the same time.
    pub concurrent_cues: bool,
}

impl TargetFormat {
    pub fn new(codec: &str, concurrent_cues: bool) -> Self {
        Self {
            codec: codec.to_lowercase(),
            concurrent_cues,
        }
    }

    /// Usual rendering of well-known text subtitle codecs. `mov_text`
    /// silently drops concurrent cues; the others render them. Planned
    /// conversions take the flag from the container instead.
    pub fn for_codec(codec: &str) -> Self {
        let concurrent = !matches!(codec.to_lowercase().as_str(), "mov_text" | "tx3g");
        Self::new(codec, concurrent)
    }
}

/// Format milliseconds as a WebVTT `hh:mm:ss.mmm` timestamp.
pub fn format_timestamp(ms: u64) -> String {
    format_with_separator(ms, '.')
}

/// Format milliseconds as an SRT `hh:mm:ss,mmm` timestamp.
pub fn format_srt_timestamp(ms: u64) -> String {
    format_with_separator(ms, ',')
}

fn format_with_separator(ms: u64, sep: char) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        sep,
        ms % 1000
    )
}

/// Parse `mm:ss.mmm`, `hh:mm:ss.mmm` or the SRT `hh:mm:ss,mmm` form.
pub fn parse_timestamp(s: &str) -> Option<u64> {
    let s = s.trim();
    let (clock, frac) = s.rsplit_once(&['.', ','][..])?;
    if frac.len() != 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: u64 = frac.parse().ok()?;

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: u64 = hours.parse().ok()?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(1000)?
        .checked_add(millis)
}

/// Parse a `start --> end [settings]` timing line.
pub(crate) fn parse_timing_line(line: &str) -> Option<(u64, u64)> {
    let (left, right) = line.split_once("-->")?;
    let end = right.split_whitespace().next()?;
    Some((parse_timestamp(left)?, parse_timestamp(end)?))
}
