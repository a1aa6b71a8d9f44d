//! Conversion actions and the per-container action resolution step.

use super::classify::{Classification, ConversionReason, UnsupportedReason};
use super::{Mode, PlanEntry, PlanOptions, PlanWarning};
use crate::matrix::ContainerCaps;
use compatplan_av::StreamDescriptor;
use compatplan_common::StreamKind;
use serde::Serialize;
use std::fmt;

/// Channel count above which multichannel audio is downmixed.
pub const MAX_AUDIO_CHANNELS: u32 = 6;

/// Video rate control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateMode {
    ConstantQuality { crf: u8 },
    /// Target bitrate in bits per second; two passes need a statistics file.
    VariableBitrate { target: u64, passes: u8 },
}

impl RateMode {
    pub fn is_two_pass(&self) -> bool {
        matches!(self, RateMode::VariableBitrate { passes: 2, .. })
    }
}

impl fmt::Display for RateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateMode::ConstantQuality { crf } => write!(f, "crf={}", crf),
            RateMode::VariableBitrate { target, passes } => {
                write!(f, "{}bps/{}-pass", target, passes)
            }
        }
    }
}

/// Encoder parameters for a video transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoParams {
    /// Bounding box the output is scaled into, keeping aspect ratio.
    pub scale: Option<(u32, u32)>,
    /// Force 8-bit 4:2:0 output.
    pub to_8bit: bool,
    pub preset: String,
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Mono or stereo, kept as-is.
    Stereo,
    /// More than two channels; `downmix` caps the layout at 5.1.
    Surround { downmix: bool },
}

/// How a subtitle stream reaches its target text codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum SubtitleRoute {
    /// Converted inside the grouped encode.
    Direct,
    /// Extracted to WebVTT first, optionally sanitized, then converted.
    ViaWebVtt { sanitize: bool },
    /// Extracted as an image track, run through OCR, then converted.
    Ocr { sanitize: bool },
}

impl SubtitleRoute {
    pub fn sanitizes(&self) -> bool {
        match self {
            SubtitleRoute::Direct => false,
            SubtitleRoute::ViaWebVtt { sanitize } | SubtitleRoute::Ocr { sanitize } => *sanitize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// `lite` mode never keeps attachments.
    LiteAttachment,
    Unsupported(UnsupportedReason),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::LiteAttachment => write!(f, "attachments are dropped in lite mode"),
            DropReason::Unsupported(reason) => write!(f, "{}", reason),
        }
    }
}

/// What happens to one source stream in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConversionAction {
    Copy,
    TranscodeVideo {
        codec: String,
        rate: RateMode,
        params: VideoParams,
    },
    TranscodeAudio {
        codec: String,
        channels: ChannelPolicy,
    },
    TranscodeSubtitle {
        target: String,
        route: SubtitleRoute,
    },
    Drop {
        reason: DropReason,
    },
}

impl ConversionAction {
    pub fn is_copy(&self) -> bool {
        matches!(self, ConversionAction::Copy)
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, ConversionAction::Drop { .. })
    }

    pub fn is_transcode(&self) -> bool {
        !self.is_copy() && !self.is_drop()
    }

    /// Codec the action produces, for transcodes.
    pub fn target_codec(&self) -> Option<&str> {
        match self {
            ConversionAction::TranscodeVideo { codec, .. }
            | ConversionAction::TranscodeAudio { codec, .. } => Some(codec),
            ConversionAction::TranscodeSubtitle { target, .. } => Some(target),
            ConversionAction::Copy | ConversionAction::Drop { .. } => None,
        }
    }
}

impl fmt::Display for ConversionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionAction::Copy => write!(f, "copy"),
            ConversionAction::TranscodeVideo { codec, rate, params } => {
                write!(f, "transcode video -> {} ({})", codec, rate)?;
                if let Some((w, h)) = params.scale {
                    write!(f, " scale<={}x{}", w, h)?;
                }
                if params.to_8bit {
                    write!(f, " 8-bit")?;
                }
                Ok(())
            }
            ConversionAction::TranscodeAudio { codec, channels } => {
                write!(f, "transcode audio -> {}", codec)?;
                if let ChannelPolicy::Surround { downmix: true } = channels {
                    write!(f, " (downmix to {}ch)", MAX_AUDIO_CHANNELS)?;
                }
                Ok(())
            }
            ConversionAction::TranscodeSubtitle { target, route } => {
                write!(f, "transcode subtitle -> {}", target)?;
                match route {
                    SubtitleRoute::Direct => Ok(()),
                    SubtitleRoute::ViaWebVtt { sanitize } => {
                        write!(f, " via webvtt{}", if *sanitize { " + sanitize" } else { "" })
                    }
                    SubtitleRoute::Ocr { sanitize } => {
                        write!(f, " via OCR{}", if *sanitize { " + sanitize" } else { "" })
                    }
                }
            }
            ConversionAction::Drop { reason } => write!(f, "drop ({})", reason),
        }
    }
}

/// Output of action resolution for one container.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub entries: Vec<PlanEntry>,
    pub warnings: Vec<PlanWarning>,
}

/// Assign actions to every stream for one candidate container.
///
/// Returns the reasons the container was rejected when a stream is
/// unsupported and the mode cannot drop it.
pub(crate) fn resolve(
    streams: &[StreamDescriptor],
    classes: &[Classification],
    caps: &ContainerCaps,
    options: &PlanOptions,
) -> Result<Resolved, Vec<String>> {
    let mode = options.mode;
    let mut resolved = Resolved::default();
    let mut rejections = Vec::new();

    for (stream, class) in streams.iter().zip(classes) {
        if stream.kind == StreamKind::Attachment && mode == Mode::Lite {
            resolved.push(stream, ConversionAction::Drop { reason: DropReason::LiteAttachment });
            continue;
        }

        match class {
            Classification::Compatible => {
                let restored = stream.kind == StreamKind::Subtitle
                    && stream.codec.as_deref().is_some_and(|c| caps.store_as.contains_key(c));
                if restored && !caps.concurrent_subtitles {
                    resolved.warnings.push(PlanWarning::SubtitleNormalization { stream: stream.index });
                }
                resolved.push(stream, ConversionAction::Copy);
            }
            Classification::NeedsConversion(reason) => {
                let action = conversion_for(stream, reason, caps, options, &mut resolved.warnings);
                if matches!(action, ConversionAction::TranscodeSubtitle { route, .. } if route.sanitizes()) {
                    resolved.warnings.push(PlanWarning::SubtitleNormalization { stream: stream.index });
                }
                resolved.push(stream, action);
                if mode.keeps_originals() {
                    resolved.push(stream, ConversionAction::Copy);
                }
            }
            Classification::Unsupported(reason) => {
                if tolerates_drop(mode, stream.kind, reason) {
                    tracing::debug!("Dropping stream #{}: {}", stream.index, reason);
                    resolved.warnings.push(PlanWarning::Dropped {
                        stream: stream.index,
                        reason: reason.to_string(),
                    });
                    resolved.push(stream, ConversionAction::Drop {
                        reason: DropReason::Unsupported(reason.clone()),
                    });
                } else {
                    rejections.push(format!("stream #{}: {}", stream.index, reason));
                }
            }
        }
    }

    if rejections.is_empty() {
        Ok(resolved)
    } else {
        Err(rejections)
    }
}

impl Resolved {
    fn push(&mut self, stream: &StreamDescriptor, action: ConversionAction) {
        self.entries.push(PlanEntry {
            source: stream.index,
            kind: stream.kind,
            codec: stream.format_name().map(str::to_string),
            action,
        });
    }
}

/// Whether `mode` may drop a stream that the container cannot carry.
///
/// Malformed streams are dropped everywhere. `lite` also drops subtitles it
/// cannot convert and `standalone` drops attachments the container cannot
/// hold. `full` drops nothing else: the container is rejected instead.
fn tolerates_drop(mode: Mode, kind: StreamKind, reason: &UnsupportedReason) -> bool {
    if reason.is_malformed() {
        return true;
    }
    match mode {
        Mode::Lite => matches!(kind, StreamKind::Subtitle | StreamKind::Attachment),
        Mode::Standalone => matches!(reason, UnsupportedReason::NotAFont(_)),
        Mode::Full => false,
    }
}

fn conversion_for(
    stream: &StreamDescriptor,
    reason: &ConversionReason,
    caps: &ContainerCaps,
    options: &PlanOptions,
    warnings: &mut Vec<PlanWarning>,
) -> ConversionAction {
    match stream.kind {
        StreamKind::Video => {
            let exceeds = stream.width.unwrap_or(0) > options.max_width
                || stream.height.unwrap_or(0) > options.max_height;
            ConversionAction::TranscodeVideo {
                codec: options.video_target.clone(),
                rate: options.rate.clone(),
                params: VideoParams {
                    scale: exceeds.then_some((options.max_width, options.max_height)),
                    to_8bit: stream.bit_depth.unwrap_or(8) > 8,
                    preset: options.preset.clone(),
                    threads: options.threads,
                },
            }
        }
        StreamKind::Audio => {
            let channels = match stream.channels.filter(|c| *c > 0) {
                Some(c) => c,
                None => {
                    warnings.push(PlanWarning::AssumedStereo { stream: stream.index });
                    2
                }
            };
            if channels <= 2 {
                ConversionAction::TranscodeAudio {
                    codec: options.stereo_audio_target.clone(),
                    channels: ChannelPolicy::Stereo,
                }
            } else {
                ConversionAction::TranscodeAudio {
                    codec: options.multichannel_audio_target.clone(),
                    channels: ChannelPolicy::Surround {
                        downmix: channels > MAX_AUDIO_CHANNELS,
                    },
                }
            }
        }
        StreamKind::Subtitle | StreamKind::Attachment => {
            // Classification only asks for subtitle conversion when the
            // container has a text target.
            let target = caps.text_subtitle.clone().unwrap_or_default();
            let sanitize = !caps.concurrent_subtitles;
            let route = match reason {
                ConversionReason::Ocr(_) => SubtitleRoute::Ocr { sanitize },
                ConversionReason::BurnIn(_) => SubtitleRoute::ViaWebVtt { sanitize },
                _ if sanitize => SubtitleRoute::ViaWebVtt { sanitize },
                _ => SubtitleRoute::Direct,
            };
            ConversionAction::TranscodeSubtitle { target, route }
        }
    }
}
