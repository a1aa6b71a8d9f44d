//! # compatplan-av
//!
//! External media tool plumbing for compatplan.
//!
//! This crate provides functionality for:
//! - Probing media files into per-stream [`StreamDescriptor`]s (ffprobe)
//! - Discovering ffmpeg, ffprobe and mkvmerge
//! - Filling `{var}` placeholders in external command templates
//! - Scoping two-pass statistics files to the lifetime of one encode
//! - Parsing, normalizing and writing WebVTT/SRT subtitle cues
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let streams = compatplan_av::probe_streams(Path::new("/path/to/video.mkv"), Path::new("ffprobe"))?;
//! for stream in &streams {
//!     println!("{}", stream.summary());
//! }
//! # Ok::<(), compatplan_av::Error>(())
//! ```

mod error;
pub mod probe;
pub mod subtitle;
pub mod template;
pub mod tools;
pub mod workspace;

// Re-exports
pub use error::{Error, Result};
pub use probe::{probe_streams, StreamDescriptor};
pub use template::TemplateContext;
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
pub use workspace::{write_atomic, PassLogScope};
