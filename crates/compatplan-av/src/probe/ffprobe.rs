//! FFprobe-based stream probing.

use super::types::StreamDescriptor;
use crate::{Error, Result};
use compatplan_common::StreamKind;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    bits_per_raw_sample: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
    #[serde(default)]
    forced: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    #[serde(rename = "BPS")]
    bps: Option<String>,
    #[serde(rename = "BPS-eng")]
    bps_eng: Option<String>,
    language: Option<String>,
    title: Option<String>,
    filename: Option<String>,
    mimetype: Option<String>,
}

/// Probe the streams of a media file with ffprobe.
///
/// Data streams and other kinds the planner has no use for are skipped.
pub fn probe_streams(path: &Path, ffprobe: &Path) -> Result<Vec<StreamDescriptor>> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new(ffprobe)
        .args(["-loglevel", "error", "-show_entries", "stream", "-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.trim().to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    parse_ffprobe_output(&json_str)
}

/// Turn ffprobe's JSON stream listing into descriptors.
pub fn parse_ffprobe_output(json: &str) -> Result<Vec<StreamDescriptor>> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    let mut streams: Vec<StreamDescriptor> = output
        .streams
        .into_iter()
        .filter_map(into_descriptor)
        .collect();
    streams.sort_by_key(|s| s.index);
    Ok(streams)
}

fn into_descriptor(stream: FfprobeStream) -> Option<StreamDescriptor> {
    let kind = match stream.codec_type.as_deref()?.parse::<StreamKind>() {
        Ok(kind) => kind,
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Skipping stream {} of type {:?}",
                stream.index,
                stream.codec_type
            );
            return None;
        }
    };

    let bitrate = stream
        .tags
        .bps
        .as_deref()
        .or(stream.tags.bps_eng.as_deref())
        .or(stream.bit_rate.as_deref())
        .and_then(|s| s.trim().parse::<u64>().ok());

    #[cfg(feature = "tracing")]
    if bitrate.is_none() && kind != StreamKind::Attachment {
        tracing::debug!("No bitrate reported for stream {}", stream.index);
    }

    let bit_depth = if kind == StreamKind::Video {
        stream
            .bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.parse::<u8>().ok())
            .or_else(|| stream.pix_fmt.as_deref().map(bit_depth_from_pix_fmt))
    } else {
        None
    };

    let attachment_format = if kind == StreamKind::Attachment {
        stream
            .codec_name
            .as_deref()
            .filter(|c| !c.is_empty() && *c != "none")
            .map(str::to_lowercase)
            .or_else(|| {
                stream
                    .tags
                    .filename
                    .as_deref()
                    .and_then(|f| Path::new(f).extension())
                    .map(|e| e.to_string_lossy().to_lowercase())
            })
            .or_else(|| stream.tags.mimetype.as_deref().and_then(format_from_mimetype))
    } else {
        None
    };

    let mut descriptor = StreamDescriptor::new(stream.index, kind, stream.codec_name.as_deref());
    descriptor.bit_depth = bit_depth;
    descriptor.width = stream.width.filter(|w| *w > 0);
    descriptor.height = stream.height.filter(|h| *h > 0);
    descriptor.channels = stream.channels.filter(|c| *c > 0);
    descriptor.bitrate = bitrate;
    descriptor.attachment_format = attachment_format;
    descriptor.language = stream.tags.language;
    descriptor.title = stream.tags.title;
    descriptor.default = stream.disposition.default == 1;
    descriptor.forced = stream.disposition.forced == 1;
    Some(descriptor)
}

fn bit_depth_from_pix_fmt(pix_fmt: &str) -> u8 {
    let fmt = pix_fmt.trim_end_matches("le").trim_end_matches("be");
    if fmt.ends_with("12") {
        12
    } else if fmt.ends_with("10") {
        10
    } else {
        8
    }
}

fn format_from_mimetype(mimetype: &str) -> Option<String> {
    let format = match mimetype.to_lowercase().as_str() {
        "application/x-truetype-font" | "application/x-font-ttf" | "font/ttf" => "ttf",
        "application/vnd.ms-opentype" | "application/x-font-otf" | "font/otf" => "otf",
        "font/woff" => "woff",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ => return None,
    };
    Some(format.to_string())
}
