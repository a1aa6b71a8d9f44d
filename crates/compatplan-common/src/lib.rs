//! Compatplan-Common: Shared types and path utilities.
//!
//! This crate provides the vocabulary shared by the probing layer and the
//! planner:
//!
//! - **Core Types**: [`StreamKind`] for the four elementary stream kinds
//! - **Path Utilities**: video-file detection, collision-free output paths and
//!   filesystem-safe names
//!
//! # Examples
//!
//! ```
//! use compatplan_common::StreamKind;
//! use compatplan_common::paths::is_video_file;
//! use std::path::Path;
//!
//! assert_eq!("subtitle".parse::<StreamKind>(), Ok(StreamKind::Subtitle));
//! assert!(is_video_file(Path::new("movie.mkv")));
//! ```

pub mod paths;
pub mod types;

pub use types::*;
