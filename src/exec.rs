//! Direct execution of rendered steps (`compatplan run`).

use crate::render::{Invocation, Step};
use anyhow::{Context, Result};
use compatplan_av::PassLogScope;
use std::path::Path;
use std::process::Command;

/// Run `steps` in order, stopping at the first failure.
///
/// On failure, directories created by earlier steps that a later step
/// would have removed are removed before the error is returned.
pub fn execute(steps: &[Step]) -> Result<()> {
    let mut created: Vec<&Path> = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        tracing::debug!("Step {}/{}: {}", i + 1, steps.len(), step);
        if let Err(err) = run_step(step) {
            discard_scratch(&created, &steps[i + 1..]);
            return Err(err);
        }
        match step {
            Step::MakeDir { path } => created.push(path),
            Step::RemoveDir { path } => created.retain(|dir| *dir != path.as_path()),
            _ => {}
        }
    }
    Ok(())
}

fn discard_scratch(created: &[&Path], pending: &[Step]) {
    for dir in created {
        let scheduled = pending
            .iter()
            .any(|s| matches!(s, Step::RemoveDir { path } if path.as_path() == *dir));
        if !scheduled {
            continue;
        }
        match std::fs::remove_dir_all(dir) {
            Ok(()) => tracing::debug!("Removed scratch directory {}", dir.display()),
            Err(e) => tracing::warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}

fn run_step(step: &Step) -> Result<()> {
    match step {
        Step::MakeDir { path } => std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create {}", path.display())),
        Step::Run { invocation } => run(invocation),
        Step::TwoPass {
            passlog,
            first,
            second,
        } => {
            // Statistics files are removed when the scope drops, pass failure included
            let scope = PassLogScope::acquire(passlog.as_path())?;
            run(first)?;
            run(second)?;
            let removed = scope.release()?;
            tracing::debug!("Removed {} pass log file(s)", removed);
            Ok(())
        }
        Step::AssertExists { path } => {
            if path.is_file() {
                Ok(())
            } else {
                anyhow::bail!("Expected file was not produced: {}", path.display())
            }
        }
        Step::Rename { from, to } => std::fs::rename(from, to)
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display())),
        Step::Remove { path } => std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
        Step::RemoveDir { path } => std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn run(invocation: &Invocation) -> Result<()> {
    tracing::info!("Executing: {}", invocation);

    let status = Command::new(&invocation.program)
        .args(&invocation.args)
        .status()
        .with_context(|| format!("Failed to execute: {}", invocation.program.display()))?;

    if !status.success() {
        anyhow::bail!(
            "{} failed with exit code {:?}",
            invocation.program.display(),
            status.code()
        );
    }
    Ok(())
}
