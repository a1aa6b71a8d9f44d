mod cli;

use compatplan::batch::{self, Batch, BatchOptions, Ffprobe, StreamSource};
use compatplan::config::{self, Config};
use compatplan::planner::{PlanOptions, Planner};
use compatplan::render::{render_script, RenderPaths, Renderer, ScriptFlavor};
use compatplan::{exec, PlanError};
use compatplan_av::subtitle::{self, TargetFormat};
use compatplan_common::paths::{find_available_path, PathKind};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, PlanOverrides};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "compatplan=trace,compatplan_av=trace,compatplan_common=debug".to_string()
        } else {
            "compatplan=info,compatplan_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Plan {
            inputs,
            overrides,
            jobs,
            recursive,
            json,
            dry_run,
            single_script,
            script_flavor,
        } => {
            let config = load_with_overrides(cli.config.as_deref(), &overrides)?;
            let options = BatchOptions {
                jobs: usize::try_from(jobs).unwrap_or(usize::MAX),
                flavor: script_flavor.unwrap_or_else(ScriptFlavor::native),
                single_script,
                dry_run: dry_run || json,
            };
            plan_files(&config, &inputs, recursive, options, json)
        }
        Commands::Run {
            input,
            overrides,
            dry_run,
        } => {
            let config = load_with_overrides(cli.config.as_deref(), &overrides)?;
            run_file(&config, &input, dry_run)
        }
        Commands::Probe { file, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            probe_file(&config, &file, json)
        }
        Commands::SanitizeSubs {
            input,
            output,
            target,
            no_concurrent,
        } => sanitize_subs(&input, &output, &target, no_concurrent),
        Commands::Matrix { json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            show_matrix(&config, json)
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("compatplan {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load config and apply command line overrides on top of it.
fn load_with_overrides(config_path: Option<&Path>, overrides: &PlanOverrides) -> Result<Config> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(mode) = overrides.mode {
        config.planner.mode = mode;
    }
    if !overrides.formats.is_empty() {
        config.planner.formats = overrides
            .formats
            .iter()
            .map(|f| f.trim().to_lowercase())
            .collect();
    }
    if let Some(ref limit) = overrides.bitrate_limit {
        config.planner.bitrate_limit = Some(limit.clone());
    }
    if let Some(crf) = overrides.crf {
        config.encoder.crf = crf;
        config.encoder.target_bitrate = None;
    }
    if let Some(ref target) = overrides.target_bitrate {
        config.encoder.target_bitrate = Some(target.clone());
    }
    if let Some(passes) = overrides.passes {
        config.encoder.passes = passes;
    }
    if let Some(ref preset) = overrides.preset {
        config.encoder.preset = preset.clone();
    }
    if let Some(threads) = overrides.threads {
        config.encoder.threads = Some(threads);
    }

    config::validate_config(&config)?;
    Ok(config)
}

fn build_planner(config: &Config) -> Result<Planner> {
    let matrix = Arc::new(config::load_matrix(config)?);
    let options = PlanOptions::from_config(config)?;
    Ok(Planner::new(matrix, options))
}

fn ffprobe(config: &Config) -> Result<Ffprobe> {
    let path = compatplan_av::get_tool_path("ffprobe", config.tools.ffprobe_path.as_deref())?;
    Ok(Ffprobe::new(path))
}

fn plan_files(
    config: &Config,
    inputs: &[PathBuf],
    recursive: bool,
    options: BatchOptions,
    json: bool,
) -> Result<()> {
    let files = batch::collect_inputs(inputs, recursive);
    if files.is_empty() {
        anyhow::bail!("No video files found in the given inputs");
    }

    let planner = build_planner(config)?;
    let renderer = Renderer::from_config(config);
    let source = ffprobe(config)?;
    let dry_run = options.dry_run;

    let summary = Batch::new(&planner, &renderer, &source, options).run(&files)?;

    if json {
        let plans: Vec<_> = summary.planned.iter().map(|p| &p.plan).collect();
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    for planned in &summary.planned {
        print!("{}", planned.plan.summary());
        if dry_run {
            println!("\n[DRY RUN] {}:\n{}", planned.script.display(), planned.script_body);
        } else {
            println!("  script: {}", planned.script.display());
        }
    }
    for input in &summary.unchanged {
        println!("{}: already compatible, nothing to do", input.display());
    }
    for (input, reason) in summary.rejected.iter().chain(&summary.failed) {
        println!("{}: skipped ({})", input.display(), reason);
    }
    if let Some(ref aggregate) = summary.aggregate {
        println!("\nAggregate script: {}", aggregate.display());
    }

    println!(
        "\n{} planned, {} unchanged, {} rejected, {} failed",
        summary.planned.len(),
        summary.unchanged.len(),
        summary.rejected.len(),
        summary.failed.len()
    );
    Ok(())
}

fn run_file(config: &Config, input: &Path, dry_run: bool) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let planner = build_planner(config)?;
    let streams = ffprobe(config)?.streams(input)?;

    let plan = match planner.plan(input, &streams) {
        Ok(plan) => plan,
        Err(e @ PlanError::Rejected { .. }) => {
            println!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", plan.summary());
    if plan.is_noop() {
        println!("Already compatible, nothing to do.");
        return Ok(());
    }

    let dir = match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let paths = RenderPaths {
        input: input.to_path_buf(),
        output: find_available_path(
            &dir,
            &format!("{}.{}.{}", stem, plan.mode, plan.container),
            PathKind::File,
        ),
        scratch_dir: find_available_path(&dir, &format!("{}.{}.tmp{{suffix}}", stem, plan.mode), PathKind::Dir),
    };

    let steps = Renderer::from_config(config).render(&plan, &paths);

    if dry_run {
        println!("\n[DRY RUN] Would execute {} steps:", steps.len());
        print!("{}", render_script(&steps, ScriptFlavor::native(), ""));
        return Ok(());
    }

    println!("\nExecuting {} steps...", steps.len());
    exec::execute(&steps)?;
    println!("\nProcessing complete!");
    println!("Output: {}", paths.output.display());
    Ok(())
}

fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let streams = ffprobe(config)?.streams(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&streams)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Streams: {}", streams.len());
    for stream in &streams {
        println!("  {}", stream.summary());
    }
    Ok(())
}

/// Without `--no-concurrent` the target codec's usual rendering decides
/// whether overlapping cues are merged.
fn sanitize_subs(input: &Path, output: &Path, target: &str, no_concurrent: bool) -> Result<()> {
    let codec = target.trim().to_lowercase();
    let target = if no_concurrent {
        TargetFormat::new(&codec, false)
    } else {
        TargetFormat::for_codec(&codec)
    };
    let report = subtitle::sanitize_file(input, output, &target)
        .with_context(|| format!("Failed to sanitize {}", input.display()))?;

    if report.is_degraded() {
        tracing::warn!("{}: {}", input.display(), report);
    }
    println!("{}", report);
    Ok(())
}

fn show_matrix(config: &Config, json: bool) -> Result<()> {
    let matrix = config::load_matrix(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(matrix.containers())?);
        return Ok(());
    }

    for (name, caps) in matrix.containers() {
        let list = |set: &std::collections::BTreeSet<String>| {
            set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
        };
        println!("[{}]", name);
        println!("  video:      {}", list(&caps.video));
        println!("  audio:      {}", list(&caps.audio));
        println!("  subtitle:   {}", list(&caps.subtitle));
        println!("  attachment: {}", list(&caps.attachment));
        if let Some(ref text) = caps.text_subtitle {
            println!("  text subtitle target: {}", text);
        }
        for (from, to) in &caps.store_as {
            println!("  {} stored as {}", from, to);
        }
        println!("  overlapping cues: {}", caps.concurrent_subtitles);
        if caps.remux_fixup {
            println!("  mkvmerge fixup after remux");
        }
    }
    println!("\nfingerprint: {:016x}", matrix.fingerprint());
    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = compatplan_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else if tool.required {
            all_ok = false;
            "✗"
        } else {
            "-"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        if !tool.available && !tool.required {
            print!(" (optional)");
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to run generated scripts.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let matrix = config::load_matrix(&config)?;
    println!("  Mode: {}", config.planner.mode);
    println!("  Formats: {}", config.planner.formats.join(", "));
    println!(
        "  Bitrate limit: {}",
        config.planner.bitrate_limit.as_deref().unwrap_or("none")
    );
    match config.encoder.target_bitrate {
        Some(ref target) => println!("  Video rate: {} ({} pass)", target, config.encoder.passes),
        None => println!("  Video rate: crf {}", config.encoder.crf),
    }
    println!(
        "  Matrix containers: {}",
        matrix.container_names().collect::<Vec<_>>().join(", ")
    );
    for format in &config.planner.formats {
        if matrix.get(format).is_none() {
            println!("  warning: format {} is not in the matrix", format);
        }
    }

    Ok(())
}
