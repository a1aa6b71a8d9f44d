//! Constraint-based conversion planner.
//!
//! The planner turns a probed stream list into a [`ConversionPlan`] for the
//! first candidate container that can hold every stream under the selected
//! [`Mode`]. Planning runs as an explicit state machine:
//!
//! ```text
//! Init -> ClassifyAll -> SelectContainer -> ResolveActions -> ValidatePlan -> Accepted
//!                              ^                  |                |
//!                              +------------------+----------------+  (next candidate)
//!                              |
//!                              +-> Rejected (no candidate left)
//! ```
//!
//! The [`CompatibilityMatrix`] and [`PlanOptions`] are shared read-only
//! behind [`Arc`]s. Everything a plan owns is built fresh for each file, and
//! the matrix fingerprint is checked before and after every run.

mod action;
mod classify;
mod validate;

pub use action::{
    ChannelPolicy, ConversionAction, DropReason, RateMode, SubtitleRoute, VideoParams,
    MAX_AUDIO_CHANNELS,
};
pub use classify::{classify, classify_with, Classification, ConversionReason, UnsupportedReason};

use crate::config::{parse_bitrate, Config};
use crate::error::PlanError;
use crate::matrix::{CompatibilityMatrix, ContainerCaps};
use compatplan_av::StreamDescriptor;
use compatplan_common::StreamKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// What the output file is meant to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Replace low-compatibility streams, strict container only, drop what
    /// cannot be converted.
    #[default]
    Lite,
    /// Self-contained replacement of the source; falls back to the
    /// permissive container.
    Standalone,
    /// Originals plus converted streams side by side.
    Full,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Lite, Mode::Standalone, Mode::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Lite => "lite",
            Mode::Standalone => "standalone",
            Mode::Full => "full",
        }
    }

    /// Whether converted streams are added next to a copy of the original.
    pub fn keeps_originals(&self) -> bool {
        matches!(self, Mode::Full)
    }

    /// Whether only the first (strict) candidate container is considered.
    pub fn strict_only(&self) -> bool {
        matches!(self, Mode::Lite)
    }

    /// Whether font attachments are carried over.
    pub fn keeps_fonts(&self) -> bool {
        !matches!(self, Mode::Lite)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lite" => Ok(Mode::Lite),
            "standalone" => Ok(Mode::Standalone),
            "full" => Ok(Mode::Full),
            other => Err(format!(
                "Unknown mode '{}' (expected lite, standalone or full)",
                other
            )),
        }
    }
}

/// Knobs the planner reads. Built once from [`Config`] and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub mode: Mode,
    /// Candidate containers in priority order.
    pub formats: Vec<String>,
    pub bitrate_ceiling: Option<u64>,
    pub max_width: u32,
    pub max_height: u32,
    pub video_codecs: BTreeSet<String>,
    pub audio_codecs: BTreeSet<String>,
    pub video_target: String,
    pub stereo_audio_target: String,
    pub multichannel_audio_target: String,
    pub font_formats: BTreeSet<String>,
    pub text_subtitles: BTreeSet<String>,
    pub burn_in_subtitles: BTreeSet<String>,
    pub image_subtitles: BTreeSet<String>,
    /// An OCR command is configured for image subtitles.
    pub ocr_available: bool,
    pub rate: RateMode,
    pub preset: String,
    pub threads: Option<u32>,
}

impl PlanOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let planner = &config.planner;
        let encoder = &config.encoder;
        let subtitles = &config.subtitles;

        let bitrate_ceiling = planner
            .bitrate_limit
            .as_deref()
            .map(parse_bitrate)
            .transpose()
            .map_err(|e| anyhow::anyhow!("planner.bitrate_limit: {}", e))?;

        let rate = match encoder.target_bitrate.as_deref() {
            Some(target) => RateMode::VariableBitrate {
                target: parse_bitrate(target)
                    .map_err(|e| anyhow::anyhow!("encoder.target_bitrate: {}", e))?,
                passes: encoder.passes,
            },
            None => RateMode::ConstantQuality { crf: encoder.crf },
        };

        let set = |items: &[String]| -> BTreeSet<String> {
            items.iter().map(|s| s.trim().to_lowercase()).collect()
        };

        Ok(Self {
            mode: planner.mode,
            formats: planner.formats.iter().map(|s| s.trim().to_lowercase()).collect(),
            bitrate_ceiling,
            max_width: planner.max_width,
            max_height: planner.max_height,
            video_codecs: set(&planner.video_codecs),
            audio_codecs: set(&planner.audio_codecs),
            video_target: planner.video_target.clone(),
            stereo_audio_target: planner.stereo_audio_target.clone(),
            multichannel_audio_target: planner.multichannel_audio_target.clone(),
            font_formats: set(&planner.font_formats),
            text_subtitles: set(&subtitles.text_codecs),
            burn_in_subtitles: set(&subtitles.burn_in_codecs),
            image_subtitles: set(&subtitles.image_codecs),
            ocr_available: subtitles.ocr.is_some(),
            rate,
            preset: encoder.preset.clone(),
            threads: encoder.threads,
        })
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_formats<S: AsRef<str>>(mut self, formats: &[S]) -> Self {
        self.formats = formats.iter().map(|f| f.as_ref().to_lowercase()).collect();
        self
    }

    pub fn with_bitrate_ceiling(mut self, ceiling: Option<u64>) -> Self {
        self.bitrate_ceiling = ceiling;
        self
    }

    pub fn with_rate(mut self, rate: RateMode) -> Self {
        self.rate = rate;
        self
    }
}

impl Default for PlanOptions {
    fn default() -> Self {
        let set = |items: &[&str]| -> BTreeSet<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            mode: Mode::default(),
            formats: vec!["mp4".to_string(), "mkv".to_string()],
            bitrate_ceiling: Some(7_000_000),
            max_width: 1920,
            max_height: 1080,
            video_codecs: set(&["h264"]),
            audio_codecs: set(&["mp2", "mp3", "aac", "ac3", "eac3"]),
            video_target: "h264".to_string(),
            stereo_audio_target: "aac".to_string(),
            multichannel_audio_target: "ac3".to_string(),
            font_formats: set(&["ttf", "otf"]),
            text_subtitles: set(&["subrip", "webvtt", "mov_text", "ass", "ssa", "text"]),
            burn_in_subtitles: set(&["ass", "ssa"]),
            image_subtitles: set(&["hdmv_pgs_subtitle", "dvd_subtitle", "dvb_subtitle"]),
            ocr_available: false,
            rate: RateMode::ConstantQuality { crf: 22 },
            preset: "slow".to_string(),
            threads: None,
        }
    }
}

/// One output stream of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Index of the source stream in the input container.
    pub source: u32,
    pub kind: StreamKind,
    /// Source codec (or attachment format).
    pub codec: Option<String>,
    pub action: ConversionAction,
}

/// Non-fatal findings recorded while planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum PlanWarning {
    MissingBitrate { stream: u32 },
    AssumedStereo { stream: u32 },
    Dropped { stream: u32, reason: String },
    /// Cues will be merged for a container that cannot show overlapping
    /// subtitles; the sanitizer reports what it combined.
    SubtitleNormalization { stream: u32 },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::MissingBitrate { stream } => {
                write!(f, "stream #{}: bitrate unknown, ceiling not enforced", stream)
            }
            PlanWarning::AssumedStereo { stream } => {
                write!(f, "stream #{}: no channel count, assuming stereo", stream)
            }
            PlanWarning::Dropped { stream, reason } => {
                write!(f, "stream #{} dropped: {}", stream, reason)
            }
            PlanWarning::SubtitleNormalization { stream } => {
                write!(f, "stream #{}: overlapping cues will be merged", stream)
            }
        }
    }
}

/// A candidate container that did not produce a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerAttempt {
    pub container: String,
    pub reasons: Vec<String>,
}

impl fmt::Display for ContainerAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.container, self.reasons.join(", "))
    }
}

/// Accepted plan for one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionPlan {
    pub source: PathBuf,
    pub container: String,
    pub mode: Mode,
    pub bitrate_ceiling: Option<u64>,
    /// The container needs an mkvmerge pass after the remux.
    pub remux_fixup: bool,
    /// Whether the container renders overlapping subtitle cues.
    pub concurrent_subtitles: bool,
    /// Kept subtitle codecs the container stores as another codec.
    pub subtitle_store_as: BTreeMap<String, String>,
    pub entries: Vec<PlanEntry>,
    /// The probed streams the plan was computed from.
    pub streams: Vec<StreamDescriptor>,
    pub warnings: Vec<PlanWarning>,
    /// Higher-priority containers that were tried first.
    pub attempts: Vec<ContainerAttempt>,
}

impl ConversionPlan {
    pub fn stream(&self, index: u32) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.index == index)
    }

    pub fn entries_for(&self, index: u32) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.source == index)
    }

    /// Entries that end up in the output file.
    pub fn kept_entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| !e.action.is_drop())
    }

    pub fn has_transcodes(&self) -> bool {
        self.entries.iter().any(|e| e.action.is_transcode())
    }

    /// True when the source already is what the plan would produce.
    pub fn is_noop(&self) -> bool {
        let same_container = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.container))
            .unwrap_or(false);
        same_container && self.entries.iter().all(|e| e.action.is_copy())
    }

    /// Human-readable plan listing.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} -> {} ({} mode)\n",
            self.source.display(),
            self.container,
            self.mode
        );
        for entry in &self.entries {
            let stored = match (&entry.action, entry.kind, entry.codec.as_deref()) {
                (ConversionAction::Copy, StreamKind::Subtitle, Some(codec)) => self.subtitle_store_as.get(codec),
                _ => None,
            };
            out.push_str(&format!(
                "  #{} {} {}: {}",
                entry.source,
                entry.kind,
                entry.codec.as_deref().unwrap_or("?"),
                entry.action
            ));
            if let Some(stored) = stored {
                out.push_str(&format!(" (stored as {})", stored));
            }
            out.push('\n');
        }
        for warning in &self.warnings {
            out.push_str(&format!("  warning: {}\n", warning));
        }
        out
    }
}

/// Candidate container with its per-stream classification.
struct Candidate<'a> {
    name: &'a str,
    caps: Option<&'a ContainerCaps>,
    classes: Vec<Classification>,
}

enum State {
    Init,
    ClassifyAll,
    SelectContainer { next: usize },
    ResolveActions { candidate: usize },
    ValidatePlan { candidate: usize, resolved: action::Resolved },
    Accepted(ConversionPlan),
    Rejected,
}

/// Plans conversions against a shared matrix. Cheap to clone and safe to
/// use from many threads at once.
#[derive(Debug, Clone)]
pub struct Planner {
    matrix: Arc<CompatibilityMatrix>,
    options: Arc<PlanOptions>,
}

impl Planner {
    pub fn new(matrix: Arc<CompatibilityMatrix>, options: PlanOptions) -> Self {
        Self {
            matrix,
            options: Arc::new(options),
        }
    }

    pub fn matrix(&self) -> &Arc<CompatibilityMatrix> {
        &self.matrix
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Classify one stream for a container using this planner's options.
    pub fn classify(&self, stream: &StreamDescriptor, container: &str) -> Classification {
        classify(stream, &self.matrix, container, &self.options)
    }

    /// Candidate containers for the configured mode, in priority order.
    pub fn candidates(&self) -> &[String] {
        let formats = &self.options.formats;
        if self.options.mode.strict_only() {
            &formats[..formats.len().min(1)]
        } else {
            formats
        }
    }

    /// Plan one file.
    ///
    /// Returns [`PlanError::Rejected`] when no candidate container accepts
    /// the streams, which callers treat as a per-file skip.
    pub fn plan(&self, source: &Path, streams: &[StreamDescriptor]) -> Result<ConversionPlan, PlanError> {
        let matrix = self.matrix.as_ref();
        let options = self.options.as_ref();

        let mut streams: Vec<StreamDescriptor> = streams.to_vec();
        streams.sort_by_key(|s| s.index);

        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        let mut attempts: Vec<ContainerAttempt> = Vec::new();
        let mut base_warnings: Vec<PlanWarning> = Vec::new();
        let mut state = State::Init;

        loop {
            state = match state {
                State::Init => {
                    matrix.verify()?;
                    tracing::debug!(
                        "Planning {} ({} streams, mode {})",
                        source.display(),
                        streams.len(),
                        options.mode
                    );
                    if options.bitrate_ceiling.is_some() {
                        for stream in &streams {
                            let rated = matches!(stream.kind, StreamKind::Video | StreamKind::Audio);
                            if rated && stream.bitrate.is_none() {
                                base_warnings.push(PlanWarning::MissingBitrate { stream: stream.index });
                            }
                        }
                    }
                    State::ClassifyAll
                }

                State::ClassifyAll => {
                    for name in self.candidates() {
                        let caps = matrix.get(name);
                        let classes = match caps {
                            Some(caps) => streams
                                .iter()
                                .map(|s| classify_with(s, caps, options))
                                .collect(),
                            None => Vec::new(),
                        };
                        for (stream, class) in streams.iter().zip(&classes) {
                            tracing::debug!("{} #{} in {}: {}", stream.kind, stream.index, name, class);
                        }
                        candidates.push(Candidate { name, caps, classes });
                    }
                    State::SelectContainer { next: 0 }
                }

                State::SelectContainer { next } => match candidates.get(next) {
                    None => State::Rejected,
                    Some(candidate) => match self.container_blocker(candidate, &streams) {
                        Some(reason) => {
                            tracing::debug!("Skipping {}: {}", candidate.name, reason);
                            attempts.push(ContainerAttempt {
                                container: candidate.name.to_string(),
                                reasons: vec![reason],
                            });
                            State::SelectContainer { next: next + 1 }
                        }
                        None => State::ResolveActions { candidate: next },
                    },
                },

                State::ResolveActions { candidate } => {
                    let current = &candidates[candidate];
                    let caps = match current.caps {
                        Some(caps) => caps,
                        None => return Err(PlanError::SharedStateViolation(format!(
                            "container {} selected without capabilities",
                            current.name
                        ))),
                    };
                    match action::resolve(&streams, &current.classes, caps, options) {
                        Ok(resolved) => State::ValidatePlan { candidate, resolved },
                        Err(reasons) => {
                            attempts.push(ContainerAttempt {
                                container: current.name.to_string(),
                                reasons,
                            });
                            State::SelectContainer { next: candidate + 1 }
                        }
                    }
                }

                State::ValidatePlan { candidate, resolved } => {
                    let current = &candidates[candidate];
                    let checked = match current.caps {
                        Some(caps) => validate::validate(
                            &resolved.entries,
                            &streams,
                            &current.classes,
                            caps,
                            options.mode,
                        )
                        .map(|()| caps),
                        None => Err(vec!["container has no capabilities".to_string()]),
                    };
                    match checked {
                        Ok(caps) => {
                            let mut warnings = base_warnings.clone();
                            warnings.extend(resolved.warnings);
                            State::Accepted(ConversionPlan {
                                source: source.to_path_buf(),
                                container: current.name.to_string(),
                                mode: options.mode,
                                bitrate_ceiling: options.bitrate_ceiling,
                                remux_fixup: caps.remux_fixup,
                                concurrent_subtitles: caps.concurrent_subtitles,
                                subtitle_store_as: caps.store_as.clone(),
                                entries: resolved.entries,
                                streams: streams.clone(),
                                warnings,
                                attempts: attempts.clone(),
                            })
                        }
                        Err(reasons) => {
                            attempts.push(ContainerAttempt {
                                container: current.name.to_string(),
                                reasons,
                            });
                            State::SelectContainer { next: candidate + 1 }
                        }
                    }
                }

                State::Accepted(plan) => {
                    matrix.verify()?;
                    tracing::debug!(
                        "Accepted {} for {} ({} entries)",
                        plan.container,
                        source.display(),
                        plan.entries.len()
                    );
                    return Ok(plan);
                }

                State::Rejected => {
                    matrix.verify()?;
                    return Err(PlanError::Rejected {
                        file: source.display().to_string(),
                        attempts,
                    });
                }
            };
        }
    }

    /// Reason a candidate cannot even be tried: it is missing from the
    /// matrix, or it cannot store a font attachment the mode must keep.
    fn container_blocker(&self, candidate: &Candidate<'_>, streams: &[StreamDescriptor]) -> Option<String> {
        let Some(caps) = candidate.caps else {
            return Some("not in compatibility matrix".to_string());
        };
        if !self.options.mode.keeps_fonts() {
            return None;
        }
        streams
            .iter()
            .filter(|s| s.kind == StreamKind::Attachment)
            .filter_map(|s| s.format_name().map(|f| (s.index, f)))
            .find(|(_, format)| {
                self.options.font_formats.contains(*format)
                    && !caps.supports(StreamKind::Attachment, format)
            })
            .map(|(index, format)| format!("cannot carry font attachment #{} ({})", index, format))
    }
}
