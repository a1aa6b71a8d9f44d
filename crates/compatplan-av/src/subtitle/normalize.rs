//! Cue timeline normalization.
//!
//! Some subtitle codecs (`mov_text` in particular) cannot show two cues at
//! once and silently lose one of them. Before converting to such a codec the
//! cue list is flattened: overlapping cues are grouped into clusters, and
//! each cluster is cut at every cue boundary into segments that show the
//! text of every cue active in that segment, most recently started first.
//!
//! A cluster of `k` cues has at most `2k` distinct boundaries, so the output
//! never holds more than twice as many cues as the input.

use super::cue::{Cue, TargetFormat};
use serde::Serialize;
use std::fmt;

/// Line inserted between the texts of cues fused into one segment.
pub const MERGE_SEPARATOR: &str = "<br/>";

/// Result of normalizing one cue list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub cues: Vec<Cue>,
    pub report: NormalizationReport,
}

/// What normalization had to change. A non-empty report is a warning, not a
/// failure: the converted track is still produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub input_cues: usize,
    pub output_cues: usize,
    /// Cues without visible text.
    pub dropped_blank: usize,
    /// Cues whose end is not after their start.
    pub dropped_invalid: usize,
    /// Groups of mutually overlapping cues that were fused.
    pub clusters: usize,
    /// Source cues that ended up inside a fused cluster.
    pub merged_cues: usize,
}

impl NormalizationReport {
    /// Whether any cue was dropped or fused.
    pub fn is_degraded(&self) -> bool {
        self.dropped_blank > 0 || self.dropped_invalid > 0 || self.merged_cues > 0
    }
}

impl fmt::Display for NormalizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cues in, {} out ({} blank dropped, {} mistimed dropped, {} merged into {} clusters)",
            self.input_cues,
            self.output_cues,
            self.dropped_blank,
            self.dropped_invalid,
            self.merged_cues,
            self.clusters
        )
    }
}

/// Prepare a cue list for conversion to `target`.
///
/// Blank and zero-length cues are always removed and the rest is sorted by
/// start time (longest first on ties). If the target cannot display
/// concurrent cues, overlapping cues are fused so the output is pairwise
/// non-overlapping.
pub fn normalize(cues: &[Cue], target: &TargetFormat) -> Normalized {
    let mut report = NormalizationReport {
        input_cues: cues.len(),
        ..Default::default()
    };

    let mut kept: Vec<Cue> = Vec::with_capacity(cues.len());
    for cue in cues {
        if cue.is_blank() {
            report.dropped_blank += 1;
        } else if !cue.is_well_timed() {
            report.dropped_invalid += 1;
        } else {
            kept.push(cue.clone());
        }
    }
    kept.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let cues = if target.concurrent_cues {
        kept
    } else {
        flatten(kept, &mut report)
    };

    report.output_cues = cues.len();

    #[cfg(feature = "tracing")]
    if report.is_degraded() {
        tracing::warn!("Subtitle normalization for {}: {}", target.codec, report);
    }

    Normalized { cues, report }
}

fn flatten(sorted: Vec<Cue>, report: &mut NormalizationReport) -> Vec<Cue> {
    let mut out = Vec::with_capacity(sorted.len());
    let mut cluster: Vec<Cue> = Vec::new();
    let mut cluster_end = 0u64;

    for cue in sorted {
        if !cluster.is_empty() && cue.start >= cluster_end {
            emit_cluster(std::mem::take(&mut cluster), &mut out, report);
        }
        cluster_end = if cluster.is_empty() {
            cue.end
        } else {
            cluster_end.max(cue.end)
        };
        cluster.push(cue);
    }
    if !cluster.is_empty() {
        emit_cluster(cluster, &mut out, report);
    }
    out
}

fn emit_cluster(cluster: Vec<Cue>, out: &mut Vec<Cue>, report: &mut NormalizationReport) {
    if cluster.len() == 1 {
        out.extend(cluster);
        return;
    }

    report.clusters += 1;
    report.merged_cues += cluster.len();

    let mut boundaries: Vec<u64> = cluster.iter().flat_map(|c| [c.start, c.end]).collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    for window in boundaries.windows(2) {
        let (start, end) = (window[0], window[1]);
        let mut lines: Vec<String> = Vec::new();
        for cue in cluster.iter().rev().filter(|c| c.is_active_during(start, end)) {
            if !lines.is_empty() {
                lines.push(MERGE_SEPARATOR.to_string());
            }
            lines.extend(cue.lines.iter().cloned());
        }
        if !lines.is_empty() {
            out.push(Cue { start, end, lines });
        }
    }
}
