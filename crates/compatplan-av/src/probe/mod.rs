//! Stream probing.
//!
//! The planner only needs a flat list of [`StreamDescriptor`]s; this module
//! produces it from ffprobe's JSON output.

mod ffprobe;
mod types;

pub use ffprobe::{parse_ffprobe_output, probe_streams};
pub use types::StreamDescriptor;
