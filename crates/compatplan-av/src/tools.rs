//! External tool detection.
//!
//! compatplan never encodes or muxes anything itself; it relies on ffmpeg,
//! ffprobe and (for Matroska fixups) mkvmerge being reachable.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the version banner, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
    /// Whether planning output depends on this tool.
    pub required: bool,
}

/// Check if a tool is available and get its information.
///
/// # Example
///
/// ```no_run
/// use compatplan_av::check_tool;
///
/// let info = check_tool("mkvmerge");
/// if info.available {
///     println!("mkvmerge version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "--version")
}

/// Check if a tool is available using a custom version argument.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => ToolInfo {
            name: name.to_string(),
            available: true,
            version: String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.trim().to_string()),
            path: which::which(name).ok(),
            required: true,
        },
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
            required: true,
        },
    }
}

/// Check the tools a rendered plan may invoke.
///
/// ffmpeg and ffprobe are required; mkvmerge is only needed for containers
/// flagged for a post-remux fixup.
pub fn check_tools() -> Vec<ToolInfo> {
    let mut mkvmerge = check_tool("mkvmerge");
    mkvmerge.required = false;

    vec![
        check_tool_with_arg("ffmpeg", "-version"),
        check_tool_with_arg("ffprobe", "-version"),
        mkvmerge,
    ]
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Configured path for {} does not exist ({}), falling back to PATH",
            name,
            path.display()
        );
    }

    require_tool(name)
}
