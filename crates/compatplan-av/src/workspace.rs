//! Scratch file management for plan execution.
//!
//! Two-pass encoding leaves statistics files behind (`<prefix>-0.log`,
//! `<prefix>-0.log.mbtree`, ...). [`PassLogScope`] owns them from before
//! pass 1 until after pass 2 and removes them on every exit path.

use crate::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Scoped ownership of the statistics files of one two-pass encode.
///
/// # Example
///
/// ```no_run
/// use compatplan_av::PassLogScope;
///
/// let scope = PassLogScope::acquire("/work/movie/movie.mkv_0.passlog")?;
/// // run pass 1 and pass 2 with `-passlogfile <scope.prefix()>`
/// let removed = scope.release()?;
/// # Ok::<(), compatplan_av::Error>(())
/// ```
#[derive(Debug)]
pub struct PassLogScope {
    prefix: PathBuf,
    released: bool,
}

impl PassLogScope {
    /// Take ownership of the statistics files for `prefix`.
    ///
    /// Stale files from an interrupted earlier run are removed so pass 2
    /// can never read statistics that pass 1 of this run did not write.
    pub fn acquire<P: Into<PathBuf>>(prefix: P) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.file_name().is_none() {
            return Err(Error::Workspace(format!(
                "Invalid pass log prefix: {:?}",
                prefix
            )));
        }

        let scope = Self {
            prefix,
            released: false,
        };
        let stale = scope.remove_artifacts()?;
        if stale > 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Removed {} stale pass log file(s) for {}",
                stale,
                scope.prefix.display()
            );
        }
        Ok(scope)
    }

    /// The value to hand to ffmpeg's `-passlogfile`.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Statistics files currently on disk for this scope.
    pub fn artifacts(&self) -> Result<Vec<PathBuf>> {
        let dir = match self.prefix.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let stem = match self.prefix.file_name() {
            Some(name) => format!("{}-", name.to_string_lossy()),
            None => return Ok(Vec::new()),
        };

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&stem) && name.contains(".log") && entry.path().is_file() {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Remove the statistics files now and report how many were deleted.
    pub fn release(mut self) -> Result<usize> {
        self.released = true;
        self.remove_artifacts()
    }

    fn remove_artifacts(&self) -> Result<usize> {
        let artifacts = self.artifacts()?;
        for path in &artifacts {
            std::fs::remove_file(path).map_err(|e| {
                Error::Workspace(format!("Failed to remove {}: {}", path.display(), e))
            })?;
        }
        Ok(artifacts.len())
    }
}

impl Drop for PassLogScope {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.remove_artifacts() {
            Ok(_count) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Cleaned {} pass log file(s) for {}",
                    _count,
                    self.prefix.display()
                );
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Pass log cleanup failed: {}", _e);
            }
        }
    }
}

/// Write `contents` to `path` through a temp file in the same directory.
///
/// A reader never observes a half-written script or subtitle file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::Workspace(format!("Failed to create temp file in {:?}: {}", dir, e)))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| {
        Error::Workspace(format!("Failed to move output to {}: {}", path.display(), e))
    })?;
    Ok(())
}
