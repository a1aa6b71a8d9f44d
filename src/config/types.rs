use crate::planner::Mode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub subtitles: SubtitleConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub mode: Mode,

    /// Output containers in priority order. The first one is the strict
    /// container `lite` mode always uses.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Streams above this bitrate are converted even when their codec is
    /// compatible. Accepts `k`/`M` suffixes.
    #[serde(default = "default_bitrate_limit")]
    pub bitrate_limit: Option<String>,

    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    /// Video codecs copied as-is when nothing else forces a conversion.
    #[serde(default = "default_video_codecs")]
    pub video_codecs: Vec<String>,

    /// Audio codecs copied as-is when nothing else forces a conversion.
    #[serde(default = "default_audio_codecs")]
    pub audio_codecs: Vec<String>,

    #[serde(default = "default_video_target")]
    pub video_target: String,

    /// Target for mono and stereo audio.
    #[serde(default = "default_stereo_target")]
    pub stereo_audio_target: String,

    /// Target for audio with more than two channels.
    #[serde(default = "default_multichannel_target")]
    pub multichannel_audio_target: String,

    /// Attachment formats treated as fonts worth keeping.
    #[serde(default = "default_font_formats")]
    pub font_formats: Vec<String>,

    /// External compatibility matrix (TOML or JSON) replacing the built-in one.
    #[serde(default)]
    pub matrix: Option<PathBuf>,
}

fn default_formats() -> Vec<String> {
    vec!["mp4".to_string(), "mkv".to_string()]
}
fn default_bitrate_limit() -> Option<String> {
    Some("7M".to_string())
}
fn default_max_width() -> u32 {
    1920
}
fn default_max_height() -> u32 {
    1080
}
fn default_video_codecs() -> Vec<String> {
    vec!["h264".to_string()]
}
fn default_audio_codecs() -> Vec<String> {
    ["mp2", "mp3", "aac", "ac3", "eac3"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_video_target() -> String {
    "h264".to_string()
}
fn default_stereo_target() -> String {
    "aac".to_string()
}
fn default_multichannel_target() -> String {
    "ac3".to_string()
}
fn default_font_formats() -> Vec<String> {
    vec!["ttf".to_string(), "otf".to_string()]
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            formats: default_formats(),
            bitrate_limit: default_bitrate_limit(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            video_codecs: default_video_codecs(),
            audio_codecs: default_audio_codecs(),
            video_target: default_video_target(),
            stereo_audio_target: default_stereo_target(),
            multichannel_audio_target: default_multichannel_target(),
            font_formats: default_font_formats(),
            matrix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// x264 `-preset`.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant quality value used when no target bitrate is set.
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Target video bitrate; setting it switches to bitrate mode.
    #[serde(default)]
    pub target_bitrate: Option<String>,

    /// Passes for bitrate mode (1 or 2).
    #[serde(default = "default_passes")]
    pub passes: u8,

    /// Encoder thread limit.
    #[serde(default)]
    pub threads: Option<u32>,
}

fn default_preset() -> String {
    "slow".to_string()
}
fn default_crf() -> u8 {
    22
}
fn default_passes() -> u8 {
    2
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            crf: default_crf(),
            target_bitrate: None,
            passes: default_passes(),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubtitleConfig {
    /// Text-based subtitle codecs.
    #[serde(default = "default_text_codecs")]
    pub text_codecs: Vec<String>,

    /// Text codecs with styling that players typically burn into the
    /// video; always converted to the container's basic text codec.
    #[serde(default = "default_burn_in_codecs")]
    pub burn_in_codecs: Vec<String>,

    /// Image-based subtitle codecs.
    #[serde(default = "default_image_codecs")]
    pub image_codecs: Vec<String>,

    /// OCR command turning an extracted `.sup` into an `.srt`, as an argument
    /// vector with `{input}`, `{output}` and `{language}` placeholders.
    /// Image subtitles are unsupported when unset.
    #[serde(default)]
    pub ocr: Option<Vec<String>>,

    /// Language passed to the OCR command for untagged streams.
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
}

fn default_text_codecs() -> Vec<String> {
    ["subrip", "webvtt", "mov_text", "ass", "ssa", "text"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_burn_in_codecs() -> Vec<String> {
    vec!["ass".to_string(), "ssa".to_string()]
}
fn default_image_codecs() -> Vec<String> {
    ["hdmv_pgs_subtitle", "dvd_subtitle", "dvb_subtitle"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            text_codecs: default_text_codecs(),
            burn_in_codecs: default_burn_in_codecs(),
            image_codecs: default_image_codecs(),
            ocr: None,
            ocr_language: default_ocr_language(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    #[serde(default)]
    pub mkvmerge_path: Option<PathBuf>,
}

/// A bitrate in bits per second, written with an optional `k`/`M` suffix.
///
/// ```
/// use compatplan::config::Bitrate;
///
/// assert_eq!("12M".parse::<Bitrate>().unwrap().bps(), 12_000_000);
/// assert_eq!("650k".parse::<Bitrate>().unwrap().bps(), 650_000);
/// assert_eq!("1.5m".parse::<Bitrate>().unwrap().bps(), 1_500_000);
/// assert_eq!("4000".parse::<Bitrate>().unwrap().bps(), 4000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitrate(u64);

impl Bitrate {
    pub fn new(bps: u64) -> Self {
        Self(bps)
    }

    pub fn bps(self) -> u64 {
        self.0
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bitrate(s).map(Bitrate)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            b if b >= 1_000_000 && b % 1_000_000 == 0 => write!(f, "{}M", b / 1_000_000),
            b if b >= 1_000 && b % 1_000 == 0 => write!(f, "{}k", b / 1_000),
            b => write!(f, "{}", b),
        }
    }
}

/// Parse a human-readable bitrate: `12M` is 12,000,000 and `650k` is
/// 650,000. Suffixes are case-insensitive; bare integers pass through.
pub fn parse_bitrate(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    let lower = trimmed.to_lowercase();
    let (number, multiplier) = match lower.strip_suffix('m') {
        Some(n) => (n, 1_000_000u64),
        None => match lower.strip_suffix('k') {
            Some(n) => (n, 1_000u64),
            None => (lower.as_str(), 1u64),
        },
    };
    let number = number.trim();
    let invalid = || format!("Invalid bitrate: '{}'", trimmed);

    if number.is_empty() {
        return Err(invalid());
    }

    if number.bytes().all(|b| b.is_ascii_digit()) {
        let value: u64 = number.parse().map_err(|_| invalid())?;
        return value.checked_mul(multiplier).ok_or_else(invalid);
    }

    if multiplier > 1 && number.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        let value: f64 = number.parse().map_err(|_| invalid())?;
        let scaled = (value * multiplier as f64).round();
        if scaled.is_finite() && scaled >= 0.0 && scaled <= u64::MAX as f64 {
            return Ok(scaled as u64);
        }
    }

    Err(invalid())
}
