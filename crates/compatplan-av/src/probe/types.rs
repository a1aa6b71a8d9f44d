//! Per-stream probe records.

use compatplan_common::StreamKind;
use serde::{Deserialize, Serialize};

/// Immutable facts about one elementary stream of an input file.
///
/// Built once from prober output and never modified afterwards; the planner
/// only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Index of the stream inside its source container.
    pub index: u32,
    /// Stream kind.
    pub kind: StreamKind,
    /// Lowercased codec name as reported by the prober (`h264`, `aac`,
    /// `subrip`, `hdmv_pgs_subtitle`, ...). `None` when the prober could not
    /// identify it.
    pub codec: Option<String>,
    /// Bits per sample for video.
    pub bit_depth: Option<u8>,
    /// Width in pixels (video).
    pub width: Option<u32>,
    /// Height in pixels (video).
    pub height: Option<u32>,
    /// Channel count (audio).
    pub channels: Option<u32>,
    /// Measured bitrate in bits per second.
    pub bitrate: Option<u64>,
    /// Attachment format, e.g. `ttf` (attachments only).
    pub attachment_format: Option<String>,
    /// Language tag.
    pub language: Option<String>,
    /// Title tag.
    pub title: Option<String>,
    /// `default` disposition.
    #[serde(default)]
    pub default: bool,
    /// `forced` disposition.
    #[serde(default)]
    pub forced: bool,
}

impl StreamDescriptor {
    /// Bare descriptor of the given kind; the typed constructors below are
    /// usually more convenient.
    pub fn new(index: u32, kind: StreamKind, codec: Option<&str>) -> Self {
        Self {
            index,
            kind,
            codec: codec.map(|c| c.to_lowercase()),
            bit_depth: None,
            width: None,
            height: None,
            channels: None,
            bitrate: None,
            attachment_format: None,
            language: None,
            title: None,
            default: false,
            forced: false,
        }
    }

    /// Video stream.
    pub fn video(index: u32, codec: &str) -> Self {
        Self::new(index, StreamKind::Video, Some(codec))
    }

    /// Audio stream with a channel count.
    pub fn audio(index: u32, codec: &str, channels: u32) -> Self {
        Self {
            channels: Some(channels),
            ..Self::new(index, StreamKind::Audio, Some(codec))
        }
    }

    /// Subtitle stream.
    pub fn subtitle(index: u32, codec: &str) -> Self {
        Self::new(index, StreamKind::Subtitle, Some(codec))
    }

    /// Attachment of the given format (`ttf`, `otf`, ...).
    pub fn attachment(index: u32, format: &str) -> Self {
        Self {
            attachment_format: Some(format.to_lowercase()),
            ..Self::new(index, StreamKind::Attachment, None)
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_bit_depth(mut self, bits: u8) -> Self {
        self.bit_depth = Some(bits);
        self
    }

    pub fn with_bitrate(mut self, bps: u64) -> Self {
        self.bitrate = Some(bps);
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_disposition(mut self, default: bool, forced: bool) -> Self {
        self.default = default;
        self.forced = forced;
        self
    }

    /// The name the matrix knows this stream by: the codec, or for
    /// attachments the attachment format.
    pub fn format_name(&self) -> Option<&str> {
        match self.kind {
            StreamKind::Attachment => self
                .attachment_format
                .as_deref()
                .or(self.codec.as_deref()),
            _ => self.codec.as_deref(),
        }
    }

    /// Short human readable summary used in logs and `probe` output.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "#{} {} {}",
            self.index,
            self.kind,
            self.format_name().unwrap_or("?")
        )];
        if let (Some(w), Some(h)) = (self.width, self.height) {
            parts.push(format!("{}x{}", w, h));
        }
        if let Some(bits) = self.bit_depth {
            parts.push(format!("{}-bit", bits));
        }
        if let Some(ch) = self.channels {
            parts.push(format!("{}ch", ch));
        }
        if let Some(bps) = self.bitrate {
            parts.push(format!("{} bps", bps));
        }
        if let Some(ref lang) = self.language {
            parts.push(format!("({})", lang));
        }
        if self.default {
            parts.push("[default]".to_string());
        }
        if self.forced {
            parts.push("[forced]".to_string());
        }
        parts.join(" ")
    }
}
