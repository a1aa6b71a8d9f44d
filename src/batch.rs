//! Batch planning: collect inputs, plan them in parallel, then write scripts.
//!
//! Probing and planning are pure with respect to each other and run on a
//! bounded rayon pool. Choosing output locations and writing files happens
//! afterwards on the calling thread, in input order, so collision-free names
//! are stable between runs.

use crate::planner::{ConversionPlan, Mode, Planner};
use crate::PlanError;
use crate::render::{render_aggregate, render_script, RenderPaths, Renderer, ScriptFlavor};
use anyhow::{Context, Result};
use compatplan_av::StreamDescriptor;
use compatplan_common::paths::{find_available_path_with, is_planner_output, is_video_file, PathKind};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the aggregate script written by `--single-script`.
pub const AGGREGATE_SCRIPT_STEM: &str = "compatplan.optimizer";

/// Where stream inventories come from.
pub trait StreamSource: Sync {
    fn streams(&self, path: &Path) -> Result<Vec<StreamDescriptor>>;
}

/// Stream source backed by an ffprobe executable.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    path: PathBuf,
}

impl Ffprobe {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl StreamSource for Ffprobe {
    fn streams(&self, path: &Path) -> Result<Vec<StreamDescriptor>> {
        compatplan_av::probe_streams(path, &self.path)
            .with_context(|| format!("Failed to probe {}", path.display()))
    }
}

/// Expand `paths` into the list of video files to plan.
///
/// Directories are read one level deep, or fully with `recursive`. Files
/// named like earlier planner output are skipped.
pub fn collect_inputs(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let modes: Vec<&str> = Mode::ALL.iter().map(|m| m.as_str()).collect();
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            warn!("Input does not exist: {}", path.display());
            continue;
        }

        let walker = WalkDir::new(path)
            .follow_links(true)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();
        let mut found: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_video_file(p))
            .filter(|p| {
                let prior = is_planner_output(p, &modes);
                if prior {
                    debug!("Skipping earlier output: {}", p.display());
                }
                !prior
            })
            .collect();
        files.append(&mut found);
    }

    files
}

/// Batch settings taken from the command line.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub jobs: usize,
    pub flavor: ScriptFlavor,
    /// Also write one script that runs every per-file script.
    pub single_script: bool,
    /// Plan and render without writing any file.
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: num_cpus::get(),
            flavor: ScriptFlavor::native(),
            single_script: false,
            dry_run: false,
        }
    }
}

/// A file whose plan was rendered.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    pub plan: ConversionPlan,
    pub output: PathBuf,
    pub script: PathBuf,
    pub script_body: String,
}

/// What happened to each input of a batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub planned: Vec<PlannedFile>,
    /// Inputs that already match their plan.
    pub unchanged: Vec<PathBuf>,
    /// Inputs no container accepted, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
    /// Inputs that could not be probed.
    pub failed: Vec<(PathBuf, String)>,
    pub aggregate: Option<PathBuf>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.planned.len() + self.unchanged.len() + self.rejected.len() + self.failed.len()
    }
}

/// Drives planning and script output for many files.
pub struct Batch<'a, S: StreamSource> {
    planner: &'a Planner,
    renderer: &'a Renderer,
    source: &'a S,
    options: BatchOptions,
}

impl<'a, S: StreamSource> Batch<'a, S> {
    pub fn new(planner: &'a Planner, renderer: &'a Renderer, source: &'a S, options: BatchOptions) -> Self {
        Self {
            planner,
            renderer,
            source,
            options,
        }
    }

    /// Plan every input and write the scripts.
    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()
            .context("Failed to start worker pool")?;

        info!("Planning {} file(s) with {} job(s)", inputs.len(), self.options.jobs.max(1));
        let results: Vec<(PathBuf, Result<ConversionPlan>)> = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| (input.clone(), self.plan_file(input)))
                .collect()
        });

        let mut summary = BatchSummary::default();
        let mut reserved: HashSet<PathBuf> = HashSet::new();

        for (input, result) in results {
            let plan = match result {
                Ok(plan) => plan,
                Err(e) => {
                    match e.downcast_ref::<PlanError>() {
                        Some(PlanError::Rejected { .. }) => {
                            warn!("Skipping {}: {}", input.display(), e);
                            summary.rejected.push((input, e.to_string()));
                        }
                        Some(PlanError::SharedStateViolation(_)) => return Err(e),
                        _ => {
                            warn!("Skipping {}: {:#}", input.display(), e);
                            summary.failed.push((input, format!("{:#}", e)));
                        }
                    }
                    continue;
                }
            };

            for warning in &plan.warnings {
                warn!("{}: {}", input.display(), warning);
            }

            if plan.is_noop() {
                info!("Already compatible: {}", input.display());
                summary.unchanged.push(input);
                continue;
            }

            let planned = self.emit(plan, &mut reserved)?;
            summary.planned.push(planned);
        }

        if self.options.single_script && !summary.planned.is_empty() {
            summary.aggregate = Some(self.emit_aggregate(&summary.planned, inputs, &reserved)?);
        }

        Ok(summary)
    }

    fn plan_file(&self, input: &Path) -> Result<ConversionPlan> {
        let streams = self.source.streams(input)?;
        debug!("{}: {} stream(s)", input.display(), streams.len());
        let plan = self.planner.plan(input, &streams)?;
        Ok(plan)
    }

    fn emit(&self, plan: ConversionPlan, reserved: &mut HashSet<PathBuf>) -> Result<PlannedFile> {
        let input = plan.source.clone();
        let dir = parent_dir(&input);
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let mode = plan.mode.as_str();

        let mut pick = |name: String, kind: PathKind| {
            let path = find_available_path_with(&dir, &name, kind, |p| reserved.contains(p));
            reserved.insert(path.clone());
            path
        };
        let scratch_dir = pick(format!("{}.{}.tmp{{suffix}}", stem, mode), PathKind::Dir);
        let output = pick(format!("{}.{}.{}", stem, mode, plan.container), PathKind::File);
        let script = pick(
            format!("{}.optimizer.{}.{}", stem, mode, self.options.flavor.extension()),
            PathKind::File,
        );

        let paths = RenderPaths {
            input: input.clone(),
            output: output.clone(),
            scratch_dir,
        };
        let steps = self.renderer.render(&plan, &paths);
        let description = format!(
            "{} -> {} ({} mode)",
            file_name(&input),
            file_name(&output),
            plan.mode
        );
        let script_body = render_script(&steps, self.options.flavor, &description);

        if !self.options.dry_run {
            write_script(&script, &script_body)?;
            info!("Wrote {}", script.display());
        }

        Ok(PlannedFile {
            plan,
            output,
            script,
            script_body,
        })
    }

    fn emit_aggregate(
        &self,
        planned: &[PlannedFile],
        inputs: &[PathBuf],
        reserved: &HashSet<PathBuf>,
    ) -> Result<PathBuf> {
        let dir = inputs
            .first()
            .map(|p| parent_dir(p))
            .unwrap_or_else(|| PathBuf::from("."));
        let name = format!("{}.{}", AGGREGATE_SCRIPT_STEM, self.options.flavor.extension());
        let path = find_available_path_with(&dir, &name, PathKind::File, |p| reserved.contains(p));

        let scripts: Vec<PathBuf> = planned.iter().map(|p| p.script.clone()).collect();
        let body = render_aggregate(&scripts, self.options.flavor);
        if !self.options.dry_run {
            write_script(&path, &body)?;
            info!("Wrote {}", path.display());
        }
        Ok(path)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_script(path: &Path, body: &str) -> Result<()> {
    compatplan_av::write_atomic(path, body.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to mark {} executable", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CompatibilityMatrix;
    use crate::planner::PlanOptions;
    use crate::render::EncoderTemplate;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct FakeSource(HashMap<PathBuf, Vec<StreamDescriptor>>);

    impl StreamSource for FakeSource {
        fn streams(&self, path: &Path) -> Result<Vec<StreamDescriptor>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file"))
        }
    }

    fn planner(mode: Mode) -> Planner {
        let matrix = Arc::new(CompatibilityMatrix::builtin().unwrap());
        Planner::new(matrix, PlanOptions::default().with_mode(mode))
    }

    fn options(single_script: bool) -> BatchOptions {
        BatchOptions {
            jobs: 2,
            flavor: ScriptFlavor::Bash,
            single_script,
            dry_run: false,
        }
    }

    #[test]
    fn test_collect_inputs_filters() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("season 1");
        std::fs::create_dir(&nested).unwrap();
        for name in ["a.mkv", "a.lite.mp4", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::write(nested.join("b.mp4"), "").unwrap();

        let flat = collect_inputs(&[dir.path().to_path_buf()], false);
        assert_eq!(flat, vec![dir.path().join("a.mkv")]);

        let deep = collect_inputs(&[dir.path().to_path_buf()], true);
        assert_eq!(deep.len(), 2);
        assert!(deep.contains(&nested.join("b.mp4")));
    }

    #[test]
    fn test_batch_writes_scripts_and_skips_rejected() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("movie.mkv");
        let bad = dir.path().join("broken.mkv");
        let unknown = dir.path().join("missing.mkv");

        let mut streams = HashMap::new();
        streams.insert(
            good.clone(),
            vec![
                StreamDescriptor::video(0, "h264").with_resolution(1920, 1080).with_bitrate(4_000_000),
                StreamDescriptor::audio(1, "aac", 2).with_bitrate(192_000),
            ],
        );
        // Two video streams exceed the mp4 stream cap and lite mode has no fallback
        streams.insert(
            bad.clone(),
            vec![
                StreamDescriptor::video(0, "h264").with_resolution(1280, 720).with_bitrate(1_000_000),
                StreamDescriptor::video(1, "h264").with_resolution(1280, 720).with_bitrate(1_000_000),
            ],
        );
        let source = FakeSource(streams);
        let planner = planner(Mode::Lite);
        let renderer = Renderer::new(EncoderTemplate::ffmpeg("ffmpeg"));

        let batch = Batch::new(&planner, &renderer, &source, options(true));
        let summary = batch.run(&[good.clone(), bad.clone(), unknown.clone()]).unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.planned.len(), 1);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].0, bad);
        assert_eq!(summary.failed[0].0, unknown);

        let planned = &summary.planned[0];
        assert_eq!(planned.output, dir.path().join("movie.lite.mp4"));
        assert_eq!(planned.script, dir.path().join("movie.optimizer.lite.sh"));
        let written = std::fs::read_to_string(&planned.script).unwrap();
        assert_eq!(written, planned.script_body);

        let aggregate = summary.aggregate.unwrap();
        assert!(std::fs::read_to_string(aggregate).unwrap().contains("movie.optimizer.lite.sh"));
    }

    #[test]
    fn test_existing_script_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("show.mkv");
        let taken = dir.path().join("show.optimizer.full.sh");
        std::fs::write(&taken, "keep").unwrap();

        let mut streams = HashMap::new();
        streams.insert(
            input.clone(),
            vec![StreamDescriptor::audio(0, "dts", 6).with_bitrate(1_500_000)],
        );
        let source = FakeSource(streams);
        let planner = planner(Mode::Full);
        let renderer = Renderer::new(EncoderTemplate::ffmpeg("ffmpeg"));

        let summary = Batch::new(&planner, &renderer, &source, options(false))
            .run(&[input])
            .unwrap();

        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "keep");
        assert_eq!(summary.planned[0].script, dir.path().join("show.optimizer.full (1).sh"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mkv");
        let mut streams = HashMap::new();
        streams.insert(input.clone(), vec![StreamDescriptor::audio(0, "flac", 2).with_bitrate(900_000)]);
        let source = FakeSource(streams);
        let planner = planner(Mode::Lite);
        let renderer = Renderer::new(EncoderTemplate::ffmpeg("ffmpeg"));

        let mut opts = options(true);
        opts.dry_run = true;
        let summary = Batch::new(&planner, &renderer, &source, opts).run(&[input]).unwrap();

        assert_eq!(summary.planned.len(), 1);
        assert!(!summary.planned[0].script.exists());
        assert!(!summary.aggregate.unwrap().exists());
    }
}
