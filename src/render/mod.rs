//! Turns an accepted [`ConversionPlan`] into an ordered list of [`Step`]s.
//!
//! Rendering performs no I/O. The base encoder call lives in an immutable
//! [`EncoderTemplate`] and every invocation starts from a fresh copy of it,
//! so rendering one file can never leak arguments into the next.

mod script;

pub use script::{render_aggregate, render_script, ScriptFlavor};

use crate::config::Config;
use crate::planner::{
    ChannelPolicy, ConversionAction, ConversionPlan, PlanEntry, RateMode, SubtitleRoute,
    VideoParams,
};
use compatplan_av::{StreamDescriptor, TemplateContext};
use compatplan_common::paths::make_fs_safe;
use compatplan_common::StreamKind;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments every ffmpeg call starts with.
pub const FFMPEG_BASE_ARGS: [&str; 7] = [
    "-loglevel",
    "warning",
    "-stats",
    "-probesize",
    "100G",
    "-analyzeduration",
    "100G",
];

/// Title prefix for streams produced by a conversion.
pub const COMPAT_TITLE: &str = "[COMPAT]";

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    fn push<S: Into<String>>(&mut self, arg: S) {
        self.args.push(arg.into());
    }

    fn push_path(&mut self, path: &Path) {
        self.args.push(path.to_string_lossy().into_owned());
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Immutable base encoder call. Cloning shares the argument storage;
/// [`EncoderTemplate::invocation`] hands out an owned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderTemplate {
    program: Arc<Path>,
    args: Arc<[String]>,
}

impl EncoderTemplate {
    pub fn new<P: AsRef<Path>, S: AsRef<str>>(program: P, args: &[S]) -> Self {
        Self {
            program: Arc::from(program.as_ref()),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    /// ffmpeg with [`FFMPEG_BASE_ARGS`].
    pub fn ffmpeg<P: AsRef<Path>>(program: P) -> Self {
        Self::new(program, &FFMPEG_BASE_ARGS)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// A fresh invocation seeded with the template.
    pub fn invocation(&self) -> Invocation {
        Invocation {
            program: self.program.to_path_buf(),
            args: self.args.to_vec(),
        }
    }
}

/// A single action of a rendered plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    MakeDir { path: PathBuf },
    Run { invocation: Invocation },
    /// Two-pass encode. Statistics files named `<passlog>-*.log*` exist from
    /// the first pass until the second one ends and are removed either way.
    TwoPass {
        passlog: PathBuf,
        first: Invocation,
        second: Invocation,
    },
    AssertExists { path: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    Remove { path: PathBuf },
    RemoveDir { path: PathBuf },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::MakeDir { path } => write!(f, "[MKDIR] {}", path.display()),
            Step::Run { invocation } => write!(f, "{}", invocation),
            Step::TwoPass { passlog, first, second } => {
                write!(f, "[PASS 1] {}\n[PASS 2] {}\n[CLEAN] {}-*.log*", first, second, passlog.display())
            }
            Step::AssertExists { path } => write!(f, "[ASSERT_EXIST] {}", path.display()),
            Step::Rename { from, to } => write!(f, "[REN] {} -> {}", from.display(), to.display()),
            Step::Remove { path } => write!(f, "[DEL] {}", path.display()),
            Step::RemoveDir { path } => write!(f, "[RMDIR] {}", path.display()),
        }
    }
}

/// Where a rendered plan reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Per-file directory for intermediates; created first, removed last.
    pub scratch_dir: PathBuf,
}

/// Renders plans into steps using fixed tool locations.
#[derive(Debug, Clone)]
pub struct Renderer {
    encoder: EncoderTemplate,
    mkvmerge: PathBuf,
    sanitizer: PathBuf,
    ocr: Option<Arc<[String]>>,
    ocr_language: String,
}

impl Renderer {
    pub fn new(encoder: EncoderTemplate) -> Self {
        Self {
            encoder,
            mkvmerge: PathBuf::from("mkvmerge"),
            sanitizer: PathBuf::from("compatplan"),
            ocr: None,
            ocr_language: "eng".to_string(),
        }
    }

    /// Tool locations from config; the sanitizer is this executable.
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;
        let ffmpeg = tools.ffmpeg_path.clone().unwrap_or_else(|| PathBuf::from("ffmpeg"));
        let sanitizer = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("compatplan"));

        let mut renderer = Self::new(EncoderTemplate::ffmpeg(ffmpeg)).with_sanitizer(sanitizer);
        if let Some(ref mkvmerge) = tools.mkvmerge_path {
            renderer = renderer.with_mkvmerge(mkvmerge.clone());
        }
        if let Some(ref ocr) = config.subtitles.ocr {
            renderer = renderer.with_ocr(ocr.as_slice(), &config.subtitles.ocr_language);
        }
        renderer
    }

    pub fn with_mkvmerge<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.mkvmerge = path.into();
        self
    }

    pub fn with_sanitizer<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sanitizer = path.into();
        self
    }

    /// OCR argument vector with `{input}`, `{output}` and `{language}`.
    pub fn with_ocr<S: AsRef<str>>(mut self, template: &[S], default_language: &str) -> Self {
        self.ocr = Some(template.iter().map(|a| a.as_ref().to_string()).collect());
        self.ocr_language = default_language.to_string();
        self
    }

    pub fn encoder(&self) -> &EncoderTemplate {
        &self.encoder
    }

    /// Render `plan` into the steps that produce `paths.output`.
    pub fn render(&self, plan: &ConversionPlan, paths: &RenderPaths) -> Vec<Step> {
        let mut build = Build::new(self, plan, paths);

        build.steps.push(Step::MakeDir {
            path: paths.scratch_dir.clone(),
        });
        build.direct_encode();
        build.two_pass_encodes();
        build.subtitle_chains();
        build.assert_intermediates();
        build.remux();
        build.fixup();
        build.steps.push(Step::RemoveDir {
            path: paths.scratch_dir.clone(),
        });

        build.steps
    }
}

/// Where the output of one plan entry can be found for the remux.
#[derive(Debug, Clone, Copy)]
struct Source {
    /// Input number on the remux command line (0 is the original file).
    file: usize,
    stream: u32,
}

/// Working state for rendering one plan.
struct Build<'a> {
    renderer: &'a Renderer,
    plan: &'a ConversionPlan,
    paths: &'a RenderPaths,
    stem: String,
    steps: Vec<Step>,
    /// Intermediate files in remux input order.
    intermediates: Vec<PathBuf>,
    /// Location of each plan entry's output, by entry position.
    sources: Vec<Option<Source>>,
    /// Codec the remux writes instead of a plain stream copy.
    remux_codecs: Vec<Option<String>>,
}

impl<'a> Build<'a> {
    fn new(renderer: &'a Renderer, plan: &'a ConversionPlan, paths: &'a RenderPaths) -> Self {
        let stem = paths
            .input
            .file_stem()
            .map(|s| make_fs_safe(&s.to_string_lossy()))
            .unwrap_or_else(|| "input".to_string());

        let sources = plan
            .entries
            .iter()
            .map(|entry| match entry.action {
                ConversionAction::Copy => Some(Source {
                    file: 0,
                    stream: entry.source,
                }),
                _ => None,
            })
            .collect();

        Self {
            renderer,
            plan,
            paths,
            stem,
            steps: Vec::new(),
            intermediates: Vec::new(),
            sources,
            remux_codecs: vec![None; plan.entries.len()],
        }
    }

    fn scratch(&self, name: String) -> PathBuf {
        self.paths.scratch_dir.join(name)
    }

    fn stream(&self, index: u32) -> Option<&'a StreamDescriptor> {
        self.plan.stream(index)
    }

    /// Register an intermediate file and return its remux input number.
    fn add_intermediate(&mut self, path: PathBuf) -> usize {
        match self.intermediates.iter().position(|p| *p == path) {
            Some(pos) => pos + 1,
            None => {
                self.intermediates.push(path);
                self.intermediates.len()
            }
        }
    }

    fn input_invocation(&self, input: &Path) -> Invocation {
        let mut inv = self.renderer.encoder.invocation();
        inv.push("-i");
        inv.push_path(input);
        inv
    }

    /// Constant-quality video, audio and direct subtitle conversions share
    /// one encode into an intermediate Matroska file.
    fn direct_encode(&mut self) {
        let plan = self.plan;
        let direct: Vec<(usize, &PlanEntry)> = plan
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| is_direct(&e.action))
            .collect();
        if direct.is_empty() {
            return;
        }

        let output = self.scratch("direct.mkv".to_string());
        let mut inv = self.input_invocation(&self.paths.input);
        let mut placed = Vec::with_capacity(direct.len());

        for (out, (position, entry)) in direct.into_iter().enumerate() {
            let out = out as u32;
            inv.push("-map");
            inv.push(format!("0:{}", entry.source));
            match &entry.action {
                ConversionAction::TranscodeVideo { codec, rate, params } => {
                    video_options(&mut inv, out, codec, rate, params);
                }
                ConversionAction::TranscodeAudio { codec, channels } => {
                    audio_options(&mut inv, out, codec, *channels);
                }
                ConversionAction::TranscodeSubtitle { target, .. } => {
                    inv.push(format!("-c:{}", out));
                    inv.push(target.clone());
                }
                ConversionAction::Copy | ConversionAction::Drop { .. } => {}
            }
            placed.push((position, out));
        }
        inv.push_path(&output);

        tracing::debug!("Grouped encode of {} streams into {}", placed.len(), output.display());
        self.steps.push(Step::Run { invocation: inv });
        let file = self.add_intermediate(output);
        for (position, stream) in placed {
            self.sources[position] = Some(Source { file, stream });
        }
    }

    fn two_pass_encodes(&mut self) {
        let plan = self.plan;
        for (position, entry) in plan.entries.iter().enumerate() {
            let ConversionAction::TranscodeVideo { codec, rate, params } = &entry.action else {
                continue;
            };
            if !rate.is_two_pass() {
                continue;
            }

            let base = format!("{}_{}", self.stem, entry.source);
            let passlog = self.scratch(format!("{}.passlog", base));
            let output = self.scratch(format!("{}.{}.mkv", base, codec));

            let mut first = self.renderer.encoder.invocation();
            first.push("-y");
            first.push("-i");
            first.push_path(&self.paths.input);
            first.push("-map");
            first.push(format!("0:{}", entry.source));
            video_options(&mut first, 0, codec, rate, params);
            first.push("-pass");
            first.push("1");
            first.push("-passlogfile");
            first.push_path(&passlog);
            first.push("-f");
            first.push("null");
            first.push("-");

            let mut second = self.input_invocation(&self.paths.input);
            second.push("-map");
            second.push(format!("0:{}", entry.source));
            video_options(&mut second, 0, codec, rate, params);
            second.push("-pass");
            second.push("2");
            second.push("-passlogfile");
            second.push_path(&passlog);
            second.push_path(&output);

            self.steps.push(Step::TwoPass { passlog, first, second });
            let file = self.add_intermediate(output);
            self.sources[position] = Some(Source { file, stream: 0 });
        }
    }

    /// Subtitle conversions, plus kept subtitles the container stores as
    /// another codec. Those are re-encoded in the remux, or run through the
    /// sanitizer first when the container cannot show overlapping cues.
    fn subtitle_chains(&mut self) {
        let plan = self.plan;
        for (position, entry) in plan.entries.iter().enumerate() {
            match &entry.action {
                ConversionAction::TranscodeSubtitle { target, route } => {
                    self.subtitle_chain(position, entry.source, target, route);
                }
                ConversionAction::Copy if entry.kind == StreamKind::Subtitle => {
                    let Some(stored) = entry
                        .codec
                        .as_deref()
                        .and_then(|codec| plan.subtitle_store_as.get(codec))
                    else {
                        continue;
                    };
                    if plan.concurrent_subtitles {
                        self.remux_codecs[position] = Some(stored.clone());
                    } else {
                        let route = SubtitleRoute::ViaWebVtt { sanitize: true };
                        self.subtitle_chain(position, entry.source, stored, &route);
                    }
                }
                _ => {}
            }
        }
    }

    fn subtitle_chain(&mut self, position: usize, source: u32, target: &str, route: &SubtitleRoute) {
        let base = format!("{}_{}", self.stem, source);

        let text = match route {
            SubtitleRoute::Direct => return,
            SubtitleRoute::ViaWebVtt { sanitize } => {
                let vtt = self.scratch(format!("{}.vtt", base));
                self.extract(source, "webvtt", &vtt);
                if *sanitize {
                    self.sanitize(&vtt, &self.scratch(format!("{}.sanitized.vtt", base)), target)
                } else {
                    vtt
                }
            }
            SubtitleRoute::Ocr { sanitize } => {
                let sup = self.scratch(format!("{}.sup", base));
                self.extract(source, "copy", &sup);
                let srt = self.ocr(source, &sup);
                if *sanitize {
                    self.sanitize(&srt, &self.scratch(format!("{}.sanitized.vtt", base)), target)
                } else {
                    srt
                }
            }
        };

        let output = self.scratch(format!("{}.{}.{}", base, target, self.plan.container));
        let mut convert = self.input_invocation(&text);
        convert.push("-map");
        convert.push("0:0");
        convert.push("-c:0");
        convert.push(target);
        convert.push_path(&output);
        self.steps.push(Step::Run { invocation: convert });

        let file = self.add_intermediate(output);
        self.sources[position] = Some(Source { file, stream: 0 });
    }

    fn extract(&mut self, source: u32, codec: &str, output: &Path) {
        let mut inv = self.input_invocation(&self.paths.input);
        inv.push("-map");
        inv.push(format!("0:{}", source));
        inv.push("-c:0");
        inv.push(codec);
        inv.push_path(output);
        self.steps.push(Step::Run { invocation: inv });
    }

    fn sanitize(&mut self, input: &Path, output: &Path, target: &str) -> PathBuf {
        let mut inv = Invocation::new(self.renderer.sanitizer.clone())
            .arg("sanitize-subs")
            .arg("-i")
            .path_arg(input)
            .arg("-o")
            .path_arg(output)
            .arg("--target")
            .arg(target.to_lowercase());
        if !self.plan.concurrent_subtitles {
            inv.push("--no-concurrent");
        }
        self.steps.push(Step::Run { invocation: inv });
        output.to_path_buf()
    }

    /// Run the OCR command on an extracted image track. The command writes
    /// `<input stem>.srt`, which is also what `{output}` expands to.
    fn ocr(&mut self, source: u32, sup: &Path) -> PathBuf {
        let srt = sup.with_extension("srt");
        let Some(template) = self.renderer.ocr.clone() else {
            // Classification only routes through OCR when a command exists.
            return srt;
        };
        let language = self
            .stream(source)
            .and_then(|s| s.language.clone())
            .unwrap_or_else(|| self.renderer.ocr_language.clone());

        let ctx = TemplateContext::new()
            .with_files(sup, &srt)
            .with_var("language", &language);
        let expanded = ctx.substitute_all(&template);
        if let Some((program, args)) = expanded.split_first() {
            self.steps.push(Step::Run {
                invocation: Invocation::new(program.as_str()).args(args.iter().cloned()),
            });
            self.steps.push(Step::AssertExists { path: srt.clone() });
        }
        srt
    }

    fn assert_intermediates(&mut self) {
        for path in &self.intermediates {
            self.steps.push(Step::AssertExists { path: path.clone() });
        }
    }

    fn remux(&mut self) {
        let mut inv = self.input_invocation(&self.paths.input);
        for path in &self.intermediates {
            inv.push("-i");
            inv.push_path(path);
        }

        let mut out = 0u32;
        for (position, entry) in self.plan.entries.iter().enumerate() {
            if entry.action.is_drop() {
                continue;
            }
            let Some(source) = self.sources[position] else {
                tracing::warn!(
                    "No rendered output for stream #{} ({}), leaving it out",
                    entry.source,
                    entry.action
                );
                continue;
            };

            inv.push("-map");
            inv.push(format!("{}:{}", source.file, source.stream));
            inv.push(format!("-c:{}", out));
            inv.push(self.remux_codecs[position].as_deref().unwrap_or("copy"));

            if entry.kind != StreamKind::Attachment {
                let stream = self.stream(entry.source);
                stream_metadata(&mut inv, out, stream, entry.action.is_transcode());
            }
            out += 1;
        }
        inv.push_path(&self.paths.output);

        self.steps.push(Step::Run { invocation: inv });
    }

    /// Containers flagged `remux_fixup` are rewritten by mkvmerge so track
    /// metadata comes out right.
    fn fixup(&mut self) {
        if !self.plan.remux_fixup {
            return;
        }
        let tmp = self.scratch(format!("fixup.{}", self.plan.container));
        self.steps.push(Step::Rename {
            from: self.paths.output.clone(),
            to: tmp.clone(),
        });
        self.steps.push(Step::Run {
            invocation: Invocation::new(self.renderer.mkvmerge.clone())
                .arg("-o")
                .path_arg(&self.paths.output)
                .path_arg(&tmp),
        });
        self.steps.push(Step::Remove { path: tmp });
    }
}

fn is_direct(action: &ConversionAction) -> bool {
    match action {
        ConversionAction::TranscodeVideo { rate, .. } => !rate.is_two_pass(),
        ConversionAction::TranscodeAudio { .. } => true,
        ConversionAction::TranscodeSubtitle { route, .. } => *route == SubtitleRoute::Direct,
        ConversionAction::Copy | ConversionAction::Drop { .. } => false,
    }
}

/// ffmpeg encoder name for a codec name.
pub fn encoder_for(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "hevc" => "libx265",
        "av1" => "libaom-av1",
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        "vp8" => "libvpx",
        "vp9" => "libvpx-vp9",
        "mp3" => "libmp3lame",
        other => other,
    }
}

fn video_options(inv: &mut Invocation, out: u32, codec: &str, rate: &RateMode, params: &VideoParams) {
    inv.push(format!("-c:{}", out));
    inv.push(encoder_for(codec));
    inv.push(format!("-preset:{}", out));
    inv.push(params.preset.clone());
    match rate {
        RateMode::ConstantQuality { crf } => {
            inv.push(format!("-crf:{}", out));
            inv.push(crf.to_string());
        }
        RateMode::VariableBitrate { target, .. } => {
            inv.push(format!("-b:{}", out));
            inv.push(target.to_string());
        }
    }
    if let Some((width, height)) = params.scale {
        inv.push(format!("-filter:{}", out));
        inv.push(format!(
            "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
            width, height
        ));
    }
    if params.to_8bit {
        inv.push(format!("-pix_fmt:{}", out));
        inv.push("yuv420p");
    }
    if let Some(threads) = params.threads {
        inv.push(format!("-threads:{}", out));
        inv.push(threads.to_string());
    }
}

fn audio_options(inv: &mut Invocation, out: u32, codec: &str, channels: ChannelPolicy) {
    inv.push(format!("-c:{}", out));
    inv.push(encoder_for(codec));
    let bitrate = match codec {
        "aac" => Some("256k"),
        "ac3" | "eac3" => Some("640k"),
        _ => None,
    };
    if let Some(bitrate) = bitrate {
        inv.push(format!("-b:{}", out));
        inv.push(bitrate);
    }
    if let ChannelPolicy::Surround { downmix: true } = channels {
        inv.push(format!("-ac:{}", out));
        inv.push(crate::planner::MAX_AUDIO_CHANNELS.to_string());
    }
}

fn stream_metadata(inv: &mut Invocation, out: u32, stream: Option<&StreamDescriptor>, converted: bool) {
    let language = stream.and_then(|s| s.language.as_deref());
    let title = stream.and_then(|s| s.title.as_deref()).filter(|t| !t.is_empty());

    if let Some(language) = language {
        inv.push(format!("-metadata:s:{}", out));
        inv.push(format!("language={}", language));
    }

    let title = match (converted, title) {
        (true, Some(title)) => Some(format!("{} {}", COMPAT_TITLE, title)),
        (true, None) => Some(COMPAT_TITLE.to_string()),
        (false, title) => title.map(str::to_string),
    };
    if let Some(title) = title {
        inv.push(format!("-metadata:s:{}", out));
        inv.push(format!("title={}", title));
    }

    let disposition = match stream.map(|s| (s.default, s.forced)) {
        Some((true, true)) => "default+forced",
        Some((true, false)) => "default",
        Some((false, true)) => "forced",
        _ => "0",
    };
    inv.push(format!("-disposition:{}", out));
    inv.push(disposition);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CompatibilityMatrix;
    use crate::planner::{Mode, PlanOptions, Planner};

    fn paths() -> RenderPaths {
        RenderPaths {
            input: PathBuf::from("/media/Movie.mkv"),
            output: PathBuf::from("/media/Movie.lite.mp4"),
            scratch_dir: PathBuf::from("/media/Movie"),
        }
    }

    fn plan(options: PlanOptions, streams: &[StreamDescriptor]) -> ConversionPlan {
        let planner = Planner::new(Arc::new(CompatibilityMatrix::builtin().unwrap()), options);
        planner.plan(Path::new("/media/Movie.mkv"), streams).unwrap()
    }

    fn renderer() -> Renderer {
        Renderer::new(EncoderTemplate::ffmpeg("ffmpeg")).with_sanitizer("compatplan")
    }

    fn runs(steps: &[Step]) -> Vec<&Invocation> {
        steps
            .iter()
            .filter_map(|s| match s {
                Step::Run { invocation } => Some(invocation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_copy_only_plan_is_a_single_remux() {
        let streams = [
            StreamDescriptor::video(0, "h264").with_resolution(1920, 1080).with_bitrate(4_000_000),
            StreamDescriptor::audio(1, "aac", 2).with_bitrate(192_000).with_language("eng"),
        ];
        let steps = renderer().render(&plan(PlanOptions::default(), &streams), &paths());

        assert_eq!(steps.first(), Some(&Step::MakeDir { path: PathBuf::from("/media/Movie") }));
        assert_eq!(steps.last(), Some(&Step::RemoveDir { path: PathBuf::from("/media/Movie") }));

        let runs = runs(&steps);
        assert_eq!(runs.len(), 1);
        let args = &runs[0].args;
        assert_eq!(&args[..7], &FFMPEG_BASE_ARGS);
        assert!(args.windows(2).any(|w| w == ["-map", "0:1"]));
        assert!(args.windows(2).any(|w| w == ["-metadata:s:1", "language=eng"]));
        assert_eq!(args.last().map(String::as_str), Some("/media/Movie.lite.mp4"));
    }

    #[test]
    fn test_direct_encode_groups_streams() {
        let streams = [
            StreamDescriptor::video(0, "hevc").with_resolution(3840, 2160).with_bit_depth(10),
            StreamDescriptor::audio(1, "dts", 8).with_title("Surround"),
        ];
        let steps = renderer().render(
            &plan(PlanOptions::default().with_mode(Mode::Standalone), &streams),
            &paths(),
        );
        let runs = runs(&steps);
        assert_eq!(runs.len(), 2);

        let encode = runs[0].args.join(" ");
        assert!(encode.contains("-c:0 libx264 -preset:0 slow -crf:0 22"));
        assert!(encode.contains("scale=w=1920:h=1080:force_original_aspect_ratio=decrease"));
        assert!(encode.contains("-pix_fmt:0 yuv420p"));
        assert!(encode.contains("-c:1 ac3 -b:1 640k -ac:1 6"));
        assert!(encode.ends_with("/media/Movie/direct.mkv"));

        let remux = runs[1].args.join(" ");
        assert!(remux.contains("-i /media/Movie/direct.mkv"));
        assert!(remux.contains("-map 1:0"));
        assert!(remux.contains("-map 1:1"));
        assert!(remux.contains("title=[COMPAT] Surround"));
        assert!(steps.contains(&Step::AssertExists { path: PathBuf::from("/media/Movie/direct.mkv") }));
    }

    #[test]
    fn test_two_pass_video() {
        let streams = [StreamDescriptor::video(0, "mpeg4").with_resolution(720, 480)];
        let options = PlanOptions::default()
            .with_mode(Mode::Standalone)
            .with_rate(RateMode::VariableBitrate { target: 2_000_000, passes: 2 });
        let steps = renderer().render(&plan(options, &streams), &paths());

        let (passlog, first, second) = steps
            .iter()
            .find_map(|s| match s {
                Step::TwoPass { passlog, first, second } => Some((passlog, first, second)),
                _ => None,
            })
            .unwrap();
        assert_eq!(passlog, Path::new("/media/Movie/Movie_0.passlog"));
        assert!(first.args.join(" ").contains("-pass 1 -passlogfile /media/Movie/Movie_0.passlog -f null -"));
        assert!(second.args.join(" ").contains("-b:0 2000000 -pass 2"));
        assert_eq!(second.args.last().map(String::as_str), Some("/media/Movie/Movie_0.h264.mkv"));
        assert!(!steps.iter().any(|s| matches!(s, Step::Run { invocation } if invocation.args.iter().any(|a| a.ends_with("direct.mkv")))));
    }

    #[test]
    fn test_subtitle_chain_with_sanitizer() {
        let streams = [StreamDescriptor::subtitle(2, "ass").with_language("jpn")];
        let steps = renderer().render(&plan(PlanOptions::default(), &streams), &paths());
        let runs = runs(&steps);

        assert_eq!(runs.len(), 4);
        assert!(runs[0].args.join(" ").ends_with("-map 0:2 -c:0 webvtt /media/Movie/Movie_2.vtt"));
        assert_eq!(runs[1].program, PathBuf::from("compatplan"));
        assert_eq!(
            runs[1].args,
            vec![
                "sanitize-subs",
                "-i",
                "/media/Movie/Movie_2.vtt",
                "-o",
                "/media/Movie/Movie_2.sanitized.vtt",
                "--target",
                "mov_text",
                "--no-concurrent"
            ]
        );
        assert!(runs[2].args.join(" ").ends_with("-c:0 mov_text /media/Movie/Movie_2.mov_text.mp4"));
        assert!(runs[3].args.join(" ").contains("-disposition:0 0"));
    }

    #[test]
    fn test_sanitize_step_follows_matrix_concurrency() {
        let matrix = CompatibilityMatrix::from_toml_str(
            r#"
            [webm]
            video = ["vp9"]
            audio = ["opus"]
            subtitle = ["webvtt"]
            text_subtitle = "webvtt"
            concurrent_subtitles = false
            "#,
        )
        .unwrap();
        let mut options = PlanOptions::default();
        options.formats = vec!["webm".to_string()];
        let planner = Planner::new(Arc::new(matrix), options);
        let streams = [StreamDescriptor::subtitle(2, "subrip")];
        let plan = planner.plan(Path::new("/media/Movie.mkv"), &streams).unwrap();

        assert!(!plan.concurrent_subtitles);
        let steps = renderer().render(&plan, &paths());
        let sanitize = runs(&steps)
            .into_iter()
            .find(|inv| inv.args.first().map(String::as_str) == Some("sanitize-subs"))
            .unwrap();
        assert!(sanitize.args.ends_with(&["--target".to_string(), "webvtt".to_string(), "--no-concurrent".to_string()]));
    }

    #[test]
    fn test_stored_subtitle_copy_is_reencoded_and_sanitized() {
        let streams = [
            StreamDescriptor::video(0, "h264").with_resolution(1920, 1080).with_bitrate(4_000_000),
            StreamDescriptor::audio(1, "aac", 2).with_bitrate(192_000),
            StreamDescriptor::subtitle(2, "subrip").with_language("eng"),
        ];
        let plan = plan(PlanOptions::default(), &streams);
        assert_eq!(plan.container, "mp4");
        assert!(plan.entries.iter().all(|e| e.action.is_copy()));

        let steps = renderer().render(&plan, &paths());
        let runs = runs(&steps);
        assert_eq!(runs.len(), 4);
        assert!(runs[0].args.join(" ").ends_with("-map 0:2 -c:0 webvtt /media/Movie/Movie_2.vtt"));
        assert!(runs[1].args.contains(&"--no-concurrent".to_string()));
        assert!(runs[2].args.join(" ").ends_with("-c:0 mov_text /media/Movie/Movie_2.mov_text.mp4"));

        let remux = runs[3].args.join(" ");
        assert!(remux.contains("-map 1:0 -c:2 copy"));
        assert!(!remux.contains("-map 0:2"));
        assert!(!remux.contains("[COMPAT]"));
    }

    #[test]
    fn test_stored_subtitle_without_sanitizing_is_converted_in_remux() {
        let matrix = CompatibilityMatrix::from_toml_str(
            r#"
            [mp4]
            video = ["h264"]
            subtitle = ["mov_text", "subrip"]
            text_subtitle = "mov_text"
            concurrent_subtitles = true

            [mp4.store_as]
            subrip = "mov_text"
            "#,
        )
        .unwrap();
        let mut options = PlanOptions::default();
        options.formats = vec!["mp4".to_string()];
        let planner = Planner::new(Arc::new(matrix), options);
        let streams = [
            StreamDescriptor::video(0, "h264").with_resolution(1280, 720).with_bitrate(2_000_000),
            StreamDescriptor::subtitle(1, "subrip"),
        ];
        let plan = planner.plan(Path::new("/media/Movie.mkv"), &streams).unwrap();

        let steps = renderer().render(&plan, &paths());
        let runs = runs(&steps);
        assert_eq!(runs.len(), 1);
        let remux = runs[0].args.join(" ");
        assert!(remux.contains("-map 0:0 -c:0 copy"));
        assert!(remux.contains("-map 0:1 -c:1 mov_text"));
    }

    #[test]
    fn test_ocr_chain() {
        let mut options = PlanOptions::default();
        options.ocr_available = true;
        let streams = [StreamDescriptor::subtitle(3, "hdmv_pgs_subtitle")];
        let renderer = renderer().with_ocr(&["pgs2srt", "{input}", "--lang", "{language}"], "fra");

        let steps = renderer.render(&plan(options, &streams), &paths());
        let runs = runs(&steps);
        assert!(runs[0].args.join(" ").ends_with("-c:0 copy /media/Movie/Movie_3.sup"));
        assert_eq!(runs[1].program, PathBuf::from("pgs2srt"));
        assert_eq!(runs[1].args, vec!["/media/Movie/Movie_3.sup", "--lang", "fra"]);
        assert!(steps.contains(&Step::AssertExists { path: PathBuf::from("/media/Movie/Movie_3.srt") }));
        assert_eq!(runs[2].args[2], "/media/Movie/Movie_3.srt");
    }

    #[test]
    fn test_mkv_fixup() {
        let streams = [
            StreamDescriptor::video(0, "h264").with_resolution(1920, 1080).with_bitrate(4_000_000),
            StreamDescriptor::attachment(1, "ttf"),
        ];
        let mut paths = paths();
        paths.output = PathBuf::from("/media/Movie.standalone.mkv");
        let steps = renderer().render(&plan(PlanOptions::default().with_mode(Mode::Standalone), &streams), &paths);

        let n = steps.len();
        assert_eq!(
            steps[n - 4],
            Step::Rename {
                from: PathBuf::from("/media/Movie.standalone.mkv"),
                to: PathBuf::from("/media/Movie/fixup.mkv"),
            }
        );
        assert_matches::assert_matches!(&steps[n - 3], Step::Run { invocation } if invocation.program == Path::new("mkvmerge"));
        assert_eq!(steps[n - 2], Step::Remove { path: PathBuf::from("/media/Movie/fixup.mkv") });

        // attachments carry no stream metadata
        let remux = runs(&steps)[0].args.join(" ");
        assert!(remux.contains("-map 0:1 -c:1 copy /media"));
    }

    #[test]
    fn test_template_is_never_modified() {
        let renderer = renderer();
        let before = renderer.encoder().clone();
        let streams = [StreamDescriptor::audio(0, "flac", 2)];
        let _ = renderer.render(&plan(PlanOptions::default(), &streams), &paths());
        assert_eq!(renderer.encoder(), &before);
        assert_eq!(renderer.encoder().args(), &FFMPEG_BASE_ARGS);
    }

    #[test]
    fn test_encoder_names() {
        assert_eq!(encoder_for("h264"), "libx264");
        assert_eq!(encoder_for("vp8"), "libvpx");
        assert_eq!(encoder_for("aac"), "aac");
    }
}
