//! Per-stream compatibility classification.
//!
//! Classification is a pure function of one stream, one container's
//! capabilities and the planning options. Malformed metadata never errors:
//! it classifies as [`UnsupportedReason::Malformed`] and the planner folds
//! it into the plan as a dropped stream.

use super::PlanOptions;
use crate::matrix::{CompatibilityMatrix, ContainerCaps};
use compatplan_av::StreamDescriptor;
use compatplan_common::StreamKind;
use serde::Serialize;
use std::fmt;

/// Compatibility class of one stream for one candidate container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Compatible,
    NeedsConversion(ConversionReason),
    Unsupported(UnsupportedReason),
}

impl Classification {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Classification::Compatible)
    }

    pub fn needs_conversion(&self) -> bool {
        matches!(self, Classification::NeedsConversion(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Classification::Unsupported(_))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Compatible => write!(f, "compatible"),
            Classification::NeedsConversion(reason) => write!(f, "needs conversion ({})", reason),
            Classification::Unsupported(reason) => write!(f, "unsupported ({})", reason),
        }
    }
}

/// Why a stream has to be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionReason {
    BitDepth(u8),
    Resolution { width: u32, height: u32 },
    Bitrate { bps: u64, ceiling: u64 },
    /// Codec is outside the widely-compatible allow-list.
    Codec(String),
    /// Codec is on the allow-list but the container cannot hold it.
    NotInContainer(String),
    /// Styled text subtitle that needs flattening to basic text.
    BurnIn(String),
    /// Text subtitle the container does not store natively.
    TextFormat(String),
    /// Image subtitle that an external OCR command can turn into text.
    Ocr(String),
}

impl fmt::Display for ConversionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionReason::BitDepth(depth) => write!(f, "{}-bit", depth),
            ConversionReason::Resolution { width, height } => {
                write!(f, "{}x{} exceeds resolution ceiling", width, height)
            }
            ConversionReason::Bitrate { bps, ceiling } => {
                write!(f, "bitrate {} > {}", bps, ceiling)
            }
            ConversionReason::Codec(codec) => write!(f, "{} is not widely compatible", codec),
            ConversionReason::NotInContainer(codec) => {
                write!(f, "{} not storable in container", codec)
            }
            ConversionReason::BurnIn(codec) => write!(f, "{} needs burn-in rendering", codec),
            ConversionReason::TextFormat(codec) => write!(f, "{} text needs conversion", codec),
            ConversionReason::Ocr(codec) => write!(f, "{} needs OCR", codec),
        }
    }
}

/// Why a stream cannot be carried in a container at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedReason {
    /// Probe metadata is missing or nonsensical.
    Malformed(String),
    UnknownContainer(String),
    CodecNotInContainer(String),
    /// The container has no text subtitle codec to convert into.
    NoTextTarget(String),
    /// Image subtitle and no OCR command is configured.
    ImageSubtitle(String),
    UnknownSubtitle(String),
    /// Font attachment the container cannot store.
    FontNotStorable(String),
    /// Non-font attachment the container does not list.
    NotAFont(String),
}

impl UnsupportedReason {
    pub fn is_malformed(&self) -> bool {
        matches!(self, UnsupportedReason::Malformed(_))
    }
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedReason::Malformed(detail) => write!(f, "malformed metadata: {}", detail),
            UnsupportedReason::UnknownContainer(name) => write!(f, "unknown container {}", name),
            UnsupportedReason::CodecNotInContainer(codec) => {
                write!(f, "{} not storable in container", codec)
            }
            UnsupportedReason::NoTextTarget(codec) => {
                write!(f, "no text subtitle target for {}", codec)
            }
            UnsupportedReason::ImageSubtitle(codec) => {
                write!(f, "image subtitle {} without OCR", codec)
            }
            UnsupportedReason::UnknownSubtitle(codec) => {
                write!(f, "unknown subtitle codec {}", codec)
            }
            UnsupportedReason::FontNotStorable(format) => {
                write!(f, "font attachment {} not storable in container", format)
            }
            UnsupportedReason::NotAFont(format) => {
                write!(f, "attachment {} not storable in container", format)
            }
        }
    }
}

/// Classify `stream` for the named container of `matrix`.
pub fn classify(
    stream: &StreamDescriptor,
    matrix: &CompatibilityMatrix,
    container: &str,
    options: &PlanOptions,
) -> Classification {
    match matrix.get(container) {
        Some(caps) => classify_with(stream, caps, options),
        None => Classification::Unsupported(UnsupportedReason::UnknownContainer(
            container.to_string(),
        )),
    }
}

/// Classify `stream` against one container's capabilities.
pub fn classify_with(
    stream: &StreamDescriptor,
    caps: &ContainerCaps,
    options: &PlanOptions,
) -> Classification {
    match stream.kind {
        StreamKind::Video => classify_video(stream, caps, options),
        StreamKind::Audio => classify_audio(stream, caps, options),
        StreamKind::Subtitle => classify_subtitle(stream, caps, options),
        StreamKind::Attachment => classify_attachment(stream, caps, options),
    }
}

fn missing_codec() -> Classification {
    Classification::Unsupported(UnsupportedReason::Malformed("missing codec name".into()))
}

fn over_ceiling(stream: &StreamDescriptor, options: &PlanOptions) -> Option<ConversionReason> {
    match (stream.bitrate, options.bitrate_ceiling) {
        (Some(bps), Some(ceiling)) if bps > ceiling => Some(ConversionReason::Bitrate { bps, ceiling }),
        _ => None,
    }
}

fn classify_video(stream: &StreamDescriptor, caps: &ContainerCaps, options: &PlanOptions) -> Classification {
    let Some(codec) = stream.codec.as_deref() else {
        return missing_codec();
    };
    if matches!((stream.width, stream.height), (Some(0), _) | (_, Some(0))) {
        return Classification::Unsupported(UnsupportedReason::Malformed(
            "zero frame dimension".into(),
        ));
    }

    if !caps.supports(StreamKind::Video, codec) {
        return Classification::Unsupported(UnsupportedReason::CodecNotInContainer(
            codec.to_string(),
        ));
    }

    if let Some(depth) = stream.bit_depth.filter(|d| *d > 8) {
        return Classification::NeedsConversion(ConversionReason::BitDepth(depth));
    }

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width > options.max_width || height > options.max_height {
        return Classification::NeedsConversion(ConversionReason::Resolution { width, height });
    }

    if let Some(reason) = over_ceiling(stream, options) {
        return Classification::NeedsConversion(reason);
    }

    if !options.video_codecs.contains(codec) {
        return Classification::NeedsConversion(ConversionReason::Codec(codec.to_string()));
    }

    Classification::Compatible
}

fn classify_audio(stream: &StreamDescriptor, caps: &ContainerCaps, options: &PlanOptions) -> Classification {
    let Some(codec) = stream.codec.as_deref() else {
        return missing_codec();
    };

    if let Some(reason) = over_ceiling(stream, options) {
        return Classification::NeedsConversion(reason);
    }

    if !options.audio_codecs.contains(codec) {
        return Classification::NeedsConversion(ConversionReason::Codec(codec.to_string()));
    }

    if !caps.supports(StreamKind::Audio, codec) {
        return Classification::NeedsConversion(ConversionReason::NotInContainer(
            codec.to_string(),
        ));
    }

    Classification::Compatible
}

fn classify_subtitle(stream: &StreamDescriptor, caps: &ContainerCaps, options: &PlanOptions) -> Classification {
    let Some(codec) = stream.codec.as_deref() else {
        return missing_codec();
    };
    let no_target = || {
        Classification::Unsupported(UnsupportedReason::NoTextTarget(codec.to_string()))
    };

    if options.burn_in_subtitles.contains(codec) {
        return match caps.text_subtitle {
            Some(_) => Classification::NeedsConversion(ConversionReason::BurnIn(codec.to_string())),
            None => no_target(),
        };
    }

    if caps.supports(StreamKind::Subtitle, codec) {
        return Classification::Compatible;
    }

    if options.text_subtitles.contains(codec) {
        return match caps.text_subtitle {
            Some(_) => {
                Classification::NeedsConversion(ConversionReason::TextFormat(codec.to_string()))
            }
            None => no_target(),
        };
    }

    if options.image_subtitles.contains(codec) {
        return match (options.ocr_available, &caps.text_subtitle) {
            (true, Some(_)) => {
                Classification::NeedsConversion(ConversionReason::Ocr(codec.to_string()))
            }
            (true, None) => no_target(),
            (false, _) => {
                Classification::Unsupported(UnsupportedReason::ImageSubtitle(codec.to_string()))
            }
        };
    }

    Classification::Unsupported(UnsupportedReason::UnknownSubtitle(codec.to_string()))
}

fn classify_attachment(stream: &StreamDescriptor, caps: &ContainerCaps, options: &PlanOptions) -> Classification {
    let Some(format) = stream.format_name() else {
        return Classification::Unsupported(UnsupportedReason::Malformed(
            "attachment without a format".into(),
        ));
    };

    if caps.supports(StreamKind::Attachment, format) {
        return Classification::Compatible;
    }
    if options.font_formats.contains(format) {
        Classification::Unsupported(UnsupportedReason::FontNotStorable(format.to_string()))
    } else {
        Classification::Unsupported(UnsupportedReason::NotAFont(format.to_string()))
    }
}
