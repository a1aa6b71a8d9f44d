mod types;

pub use types::*;

use crate::matrix::CompatibilityMatrix;
use crate::planner::Mode;
use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    prepare_config(&mut config, path.parent());
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./compatplan.toml",
        "~/.config/compatplan/config.toml",
        "/etc/compatplan/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    // Return default config if no file found
    let mut config = Config::default();
    prepare_config(&mut config, None);
    Ok(config)
}

/// Load the matrix named by the config, or the built-in one.
pub fn load_matrix(config: &Config) -> Result<CompatibilityMatrix> {
    match config.planner.matrix {
        Some(ref path) => CompatibilityMatrix::load(path)
            .with_context(|| format!("Failed to load compatibility matrix: {:?}", path)),
        None => CompatibilityMatrix::builtin().context("Built-in compatibility matrix is invalid"),
    }
}

/// Lowercase codec lists and resolve a relative matrix path against the
/// directory of the config file.
fn prepare_config(config: &mut Config, base_dir: Option<&Path>) {
    let lists = [
        &mut config.planner.formats,
        &mut config.planner.video_codecs,
        &mut config.planner.audio_codecs,
        &mut config.planner.font_formats,
        &mut config.subtitles.text_codecs,
        &mut config.subtitles.burn_in_codecs,
        &mut config.subtitles.image_codecs,
    ];
    for list in lists {
        for item in list.iter_mut() {
            *item = item.trim().to_lowercase();
        }
    }
    for target in [
        &mut config.planner.video_target,
        &mut config.planner.stereo_audio_target,
        &mut config.planner.multichannel_audio_target,
    ] {
        *target = target.trim().to_lowercase();
    }

    if let Some(ref matrix) = config.planner.matrix {
        let expanded = shellexpand::tilde(&matrix.to_string_lossy()).into_owned();
        let mut resolved = std::path::PathBuf::from(expanded);
        if resolved.is_relative() {
            if let Some(dir) = base_dir {
                resolved = dir.join(resolved);
            }
        }
        config.planner.matrix = Some(resolved);
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let planner = &config.planner;

    if planner.formats.is_empty() {
        anyhow::bail!("planner.formats must list at least one container");
    }

    if let Some(ref limit) = planner.bitrate_limit {
        parse_bitrate(limit).map_err(|e| anyhow::anyhow!("planner.bitrate_limit: {}", e))?;
    }

    if planner.max_width == 0 || planner.max_height == 0 {
        anyhow::bail!("planner.max_width and planner.max_height must be positive");
    }

    for (name, value) in [
        ("planner.video_target", &planner.video_target),
        ("planner.stereo_audio_target", &planner.stereo_audio_target),
        ("planner.multichannel_audio_target", &planner.multichannel_audio_target),
    ] {
        if value.is_empty() {
            anyhow::bail!("{} cannot be empty", name);
        }
    }

    if planner.mode == Mode::Lite && planner.formats.len() > 1 {
        tracing::debug!(
            "lite mode only plans for the first format ({}); {} other(s) ignored",
            planner.formats[0],
            planner.formats.len() - 1
        );
    }

    let encoder = &config.encoder;
    if encoder.crf > 51 {
        anyhow::bail!("encoder.crf must be between 0 and 51, got {}", encoder.crf);
    }
    if !(1..=2).contains(&encoder.passes) {
        anyhow::bail!("encoder.passes must be 1 or 2, got {}", encoder.passes);
    }
    if let Some(ref target) = encoder.target_bitrate {
        let bps = parse_bitrate(target).map_err(|e| anyhow::anyhow!("encoder.target_bitrate: {}", e))?;
        if bps == 0 {
            anyhow::bail!("encoder.target_bitrate must be positive");
        }
    }
    if encoder.threads == Some(0) {
        anyhow::bail!("encoder.threads must be at least 1");
    }
    if encoder.preset.trim().is_empty() {
        anyhow::bail!("encoder.preset cannot be empty");
    }

    if let Some(ref ocr) = config.subtitles.ocr {
        let Some(program) = ocr.first() else {
            anyhow::bail!("subtitles.ocr must name a program");
        };
        if program.trim().is_empty() {
            anyhow::bail!("subtitles.ocr must name a program");
        }
        let uses_input = ocr
            .iter()
            .any(|arg| compatplan_av::template::placeholders(arg).contains(&"input"));
        if !uses_input {
            anyhow::bail!("subtitles.ocr must reference {{input}}");
        }
    }

    if let Some(ref matrix) = planner.matrix {
        if !matrix.exists() {
            tracing::warn!("Compatibility matrix does not exist: {:?}", matrix);
        }
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
        ("mkvmerge", &config.tools.mkvmerge_path),
    ] {
        if let Some(p) = path {
            if !p.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, p);
            }
        }
    }

    Ok(())
}
