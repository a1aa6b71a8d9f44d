//! Shell script emission for rendered steps.

use super::{Invocation, Step};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Script dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFlavor {
    Bash,
    Batch,
}

impl ScriptFlavor {
    /// Dialect of the platform we run on.
    pub fn native() -> Self {
        if cfg!(windows) {
            ScriptFlavor::Batch
        } else {
            ScriptFlavor::Bash
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ScriptFlavor::Bash => "sh",
            ScriptFlavor::Batch => "bat",
        }
    }

    fn header(&self) -> &'static str {
        match self {
            ScriptFlavor::Bash => "#!/bin/bash\n",
            ScriptFlavor::Batch => "@echo off\nchcp 65001 > NUL\n",
        }
    }

    fn comment(&self, text: &str) -> String {
        match self {
            ScriptFlavor::Bash => format!("# {}\n", text),
            ScriptFlavor::Batch => format!("REM {}\n", text),
        }
    }

    fn quote(&self, arg: &str) -> String {
        match self {
            ScriptFlavor::Bash => bash_quote(arg),
            ScriptFlavor::Batch => batch_quote(arg),
        }
    }

    fn quote_path(&self, path: &Path) -> String {
        self.quote(&path.to_string_lossy())
    }

    fn command(&self, inv: &Invocation) -> String {
        let mut line = self.quote_path(&inv.program);
        for arg in &inv.args {
            line.push(' ');
            line.push_str(&self.quote(arg));
        }
        line
    }
}

impl fmt::Display for ScriptFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptFlavor::Bash => write!(f, "bash"),
            ScriptFlavor::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for ScriptFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bash" | "sh" => Ok(ScriptFlavor::Bash),
            "batch" | "bat" | "cmd" => Ok(ScriptFlavor::Batch),
            _ => Err(format!("Unknown script flavor: {} (expected bash or batch)", s)),
        }
    }
}

fn is_plain(arg: &str, extra: &[char]) -> bool {
    !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@".contains(c) || extra.contains(&c))
}

fn bash_quote(arg: &str) -> String {
    if is_plain(arg, &[]) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn batch_quote(arg: &str) -> String {
    let escaped = arg.replace('%', "%%");
    if is_plain(arg, &['\\']) {
        escaped
    } else {
        format!("\"{}\"", escaped)
    }
}

/// Render `steps` as a standalone script. Failing commands stop the script;
/// two-pass statistics files are removed before it stops.
pub fn render_script(steps: &[Step], flavor: ScriptFlavor, description: &str) -> String {
    let mut out = String::from(flavor.header());
    if !description.is_empty() {
        out.push_str(&flavor.comment(description));
    }
    out.push('\n');

    for step in steps {
        match flavor {
            ScriptFlavor::Bash => bash_step(&mut out, step),
            ScriptFlavor::Batch => batch_step(&mut out, step),
        }
    }
    out
}

fn bash_step(out: &mut String, step: &Step) {
    let q = |p: &Path| bash_quote(&p.to_string_lossy());
    let flavor = ScriptFlavor::Bash;
    match step {
        Step::MakeDir { path } => out.push_str(&format!("mkdir -p {} || exit 1\n", q(path))),
        Step::Run { invocation } => {
            out.push_str(&format!("{} || exit 1\n", flavor.command(invocation)));
        }
        Step::TwoPass { passlog, first, second } => {
            out.push_str(&format!(
                "{} && {}\nstatus=$?\nrm -f {}-*.log*\n[ $status -eq 0 ] || exit $status\n",
                flavor.command(first),
                flavor.command(second),
                q(passlog)
            ));
        }
        Step::AssertExists { path } => {
            out.push_str(&format!(
                "if [ ! -f {p} ]; then echo \"Error: missing\" {p} >&2; exit 1; fi\n",
                p = q(path)
            ));
        }
        Step::Rename { from, to } => out.push_str(&format!("mv -f {} {}\n", q(from), q(to))),
        Step::Remove { path } => out.push_str(&format!("rm -f {}\n", q(path))),
        Step::RemoveDir { path } => out.push_str(&format!("rm -rf {}\n", q(path))),
    }
}

fn batch_step(out: &mut String, step: &Step) {
    let q = |p: &Path| batch_quote(&p.to_string_lossy());
    let flavor = ScriptFlavor::Batch;
    match step {
        Step::MakeDir { path } => out.push_str(&format!("MD {} || EXIT /B 1\n", q(path))),
        Step::Run { invocation } => {
            out.push_str(&format!("{} || EXIT /B 1\n", flavor.command(invocation)));
        }
        Step::TwoPass { passlog, first, second } => {
            let pattern = PathBuf::from(format!("{}-*.log*", passlog.to_string_lossy()));
            out.push_str(&format!(
                "{}\nIF NOT ERRORLEVEL 1 {}\nSET STATUS=%ERRORLEVEL%\nDEL /Q {} 2> NUL\nIF NOT %STATUS%==0 EXIT /B %STATUS%\n",
                flavor.command(first),
                flavor.command(second),
                q(&pattern)
            ));
        }
        Step::AssertExists { path } => {
            out.push_str(&format!(
                "IF NOT EXIST {p} (ECHO Error: missing {p} & EXIT /B 1)\n",
                p = q(path)
            ));
        }
        Step::Rename { from, to } => out.push_str(&format!("MOVE /Y {} {} > NUL\n", q(from), q(to))),
        Step::Remove { path } => out.push_str(&format!("DEL /Q {}\n", q(path))),
        Step::RemoveDir { path } => out.push_str(&format!("RD /S /Q {}\n", q(path))),
    }
}

/// Script running every per-file script in order.
pub fn render_aggregate(scripts: &[PathBuf], flavor: ScriptFlavor) -> String {
    let mut out = String::from(flavor.header());
    out.push('\n');
    for script in scripts {
        let line = match flavor {
            ScriptFlavor::Bash => format!("bash {}\n", bash_quote(&script.to_string_lossy())),
            ScriptFlavor::Batch => format!("CALL {}\n", batch_quote(&script.to_string_lossy())),
        };
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_steps() -> Vec<Step> {
        vec![
            Step::MakeDir { path: PathBuf::from("/tmp/My Movie") },
            Step::Run {
                invocation: Invocation::new("ffmpeg").args(["-i", "/tmp/It's.mkv", "out.mkv"]),
            },
            Step::TwoPass {
                passlog: PathBuf::from("/tmp/My Movie/m_0.passlog"),
                first: Invocation::new("ffmpeg").args(["-pass", "1"]),
                second: Invocation::new("ffmpeg").args(["-pass", "2"]),
            },
            Step::AssertExists { path: PathBuf::from("/tmp/My Movie/direct.mkv") },
            Step::Rename {
                from: PathBuf::from("out.mkv"),
                to: PathBuf::from("/tmp/My Movie/fixup.mkv"),
            },
            Step::Remove { path: PathBuf::from("/tmp/My Movie/fixup.mkv") },
            Step::RemoveDir { path: PathBuf::from("/tmp/My Movie") },
        ]
    }

    #[test]
    fn test_bash_script() {
        let script = render_script(&sample_steps(), ScriptFlavor::Bash, "Movie.mkv -> Movie.lite.mp4");
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "# Movie.mkv -> Movie.lite.mp4");
        assert!(script.contains("mkdir -p '/tmp/My Movie' || exit 1\n"));
        assert!(script.contains("ffmpeg -i '/tmp/It'\\''s.mkv' out.mkv || exit 1\n"));
        assert!(script.contains("ffmpeg -pass 1 && ffmpeg -pass 2\nstatus=$?\nrm -f '/tmp/My Movie/m_0.passlog'-*.log*\n"));
        assert!(script.contains("if [ ! -f '/tmp/My Movie/direct.mkv' ]; then"));
        assert!(script.contains("mv -f out.mkv '/tmp/My Movie/fixup.mkv'\n"));
        assert!(script.ends_with("rm -rf '/tmp/My Movie'\n"));
    }

    #[test]
    fn test_batch_script() {
        let script = render_script(&sample_steps(), ScriptFlavor::Batch, "");
        assert!(script.starts_with("@echo off\nchcp 65001 > NUL\n"));
        assert!(script.contains("MD \"/tmp/My Movie\" || EXIT /B 1\n"));
        assert!(script.contains("IF NOT ERRORLEVEL 1 ffmpeg -pass 2\n"));
        assert!(script.contains("DEL /Q \"/tmp/My Movie/m_0.passlog-*.log*\" 2> NUL\n"));
        assert!(script.contains("IF NOT EXIST \"/tmp/My Movie/direct.mkv\" (ECHO Error"));
        assert!(script.ends_with("RD /S /Q \"/tmp/My Movie\"\n"));
    }

    #[test]
    fn test_batch_escapes_percent() {
        assert_eq!(batch_quote("100%"), "\"100%%\"");
        assert_eq!(batch_quote(r"C:\media\a.mkv"), r"C:\media\a.mkv");
        assert_eq!(bash_quote(""), "''");
    }

    #[test]
    fn test_aggregate() {
        let scripts = [PathBuf::from("a.optimizer.lite.sh"), PathBuf::from("b c.optimizer.lite.sh")];
        assert_eq!(
            render_aggregate(&scripts, ScriptFlavor::Bash),
            "#!/bin/bash\n\nbash a.optimizer.lite.sh\nbash 'b c.optimizer.lite.sh'\n"
        );
        assert!(render_aggregate(&scripts, ScriptFlavor::Batch).contains("CALL \"b c.optimizer.lite.sh\"\n"));
    }

    #[test]
    fn test_flavor_parse() {
        assert_eq!("sh".parse::<ScriptFlavor>(), Ok(ScriptFlavor::Bash));
        assert_eq!("BAT".parse::<ScriptFlavor>(), Ok(ScriptFlavor::Batch));
        assert!("zsh".parse::<ScriptFlavor>().is_err());
        assert_eq!(ScriptFlavor::Batch.extension(), "bat");
    }
}
