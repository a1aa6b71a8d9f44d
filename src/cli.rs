use clap::{Args, Parser, Subcommand};
use compatplan::planner::Mode;
use compatplan::render::ScriptFlavor;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "compatplan")]
#[command(author, version, about = "Plan remux/transcode scripts that make media files widely playable")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Planning settings that override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanOverrides {
    /// Output mode
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Candidate container, highest priority first (repeatable)
    #[arg(short, long = "format", value_name = "CONTAINER")]
    pub formats: Vec<String>,

    /// Per-stream bitrate ceiling, e.g. 7M or 800k
    #[arg(long, value_name = "RATE")]
    pub bitrate_limit: Option<String>,

    /// Constant-quality factor for video transcodes
    #[arg(long, conflicts_with = "target_bitrate")]
    pub crf: Option<u8>,

    /// Target video bitrate; selects bitrate-targeted encoding
    #[arg(long, value_name = "RATE")]
    pub target_bitrate: Option<String>,

    /// Encoder passes for bitrate-targeted encoding (1 or 2)
    #[arg(long)]
    pub passes: Option<u8>,

    /// Encoder preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Encoder threads
    #[arg(long)]
    pub threads: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan conversions and write one script per input file
    Plan {
        /// Files or directories to plan
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        overrides: PlanOverrides,

        /// Number of files planned concurrently
        #[arg(short, long, default_value_t = num_cpus::get() as u64,
              value_parser = clap::value_parser!(u64).range(1..))]
        jobs: u64,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Print plans as JSON instead of writing scripts
        #[arg(long)]
        json: bool,

        /// Show the scripts without writing them
        #[arg(long)]
        dry_run: bool,

        /// Also write one script that runs all per-file scripts
        #[arg(long)]
        single_script: bool,

        /// Script dialect (bash or batch); defaults to the platform's
        #[arg(long)]
        script_flavor: Option<ScriptFlavor>,
    },

    /// Plan a single file and execute the steps directly
    Run {
        /// Input file to convert
        #[arg(required = true)]
        input: PathBuf,

        #[command(flatten)]
        overrides: PlanOverrides,

        /// Show the steps without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a media file and display its streams
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a subtitle file so its cues never overlap
    SanitizeSubs {
        /// Input subtitle file (.vtt or .srt)
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file (.vtt or .srt)
        #[arg(short, long)]
        output: PathBuf,

        /// Subtitle codec the file will be converted to
        #[arg(long, default_value = "mov_text")]
        target: String,

        /// Merge overlapping cues even if the target codec can show them
        #[arg(long)]
        no_concurrent: bool,
    },

    /// Show the compatibility matrix in effect
    Matrix {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
