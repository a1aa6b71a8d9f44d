//! Path utilities for detecting media files and picking output locations.
//!
//! The batch driver uses these to filter directory listings and to choose
//! scratch directories, output files and script files that never clobber
//! something already on disk.

use std::path::{Path, PathBuf};

/// List of supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "m4v", "mov", "avi", "ts", "webm"];

/// Characters most filesystems reject in a file name.
const UNSAFE_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Placeholder marking where a disambiguating suffix goes in a base name.
const SUFFIX_PLACEHOLDER: &str = "{suffix}";

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use compatplan_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.mkv")));
/// assert!(is_video_file(Path::new("/path/to/video.MP4")));
/// assert!(!is_video_file(Path::new("subtitle.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    has_extension_in(path, VIDEO_EXTENSIONS)
}

fn has_extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check whether a file looks like something a previous planning run produced.
///
/// Outputs are named `<stem>.<mode>.<container>`, possibly with a ` (N)`
/// collision suffix, so a second run over the same directory must not pick
/// them up as fresh inputs.
pub fn is_planner_output(path: &Path, modes: &[&str]) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let stem = strip_collision_suffix(stem);
    modes
        .iter()
        .any(|mode| stem.ends_with(&format!(".{}", mode)))
}

fn strip_collision_suffix(stem: &str) -> &str {
    let Some(inner) = stem.strip_suffix(')') else {
        return stem;
    };
    match inner.rfind(" (") {
        Some(idx) if inner[idx + 2..].chars().all(|c| c.is_ascii_digit()) && idx + 2 < inner.len() => {
            &stem[..idx]
        }
        _ => stem,
    }
}

/// Strip characters that are illegal in file names on common filesystems.
///
/// # Examples
///
/// ```
/// use compatplan_common::paths::make_fs_safe;
///
/// assert_eq!(make_fs_safe("What? A: Movie"), "What A Movie");
/// ```
pub fn make_fs_safe(name: &str) -> String {
    name.chars().filter(|c| !UNSAFE_CHARS.contains(c)).collect()
}

/// Whether the path to find is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Dir,
}

/// Return a path under `root` named after `base_name` that does not exist yet.
///
/// `base_name` may contain `{suffix}` to control where the disambiguating
/// ` (N)` goes; otherwise it is placed before the last extension
/// (`movie.lite.mp4` becomes `movie.lite (1).mp4`).
pub fn find_available_path(root: &Path, base_name: &str, kind: PathKind) -> PathBuf {
    find_available_path_with(root, base_name, kind, |_| false)
}

/// Like [`find_available_path`], but also skips candidates for which
/// `reserved` returns true (paths handed out earlier but not created yet).
pub fn find_available_path_with<F>(root: &Path, base_name: &str, kind: PathKind, reserved: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let template = if base_name.contains(SUFFIX_PLACEHOLDER) {
        base_name.to_string()
    } else {
        match base_name.rfind('.') {
            Some(idx) if idx > 0 => format!(
                "{}{}{}",
                &base_name[..idx],
                SUFFIX_PLACEHOLDER,
                &base_name[idx..]
            ),
            _ => format!("{}{}", base_name, SUFFIX_PLACEHOLDER),
        }
    };
    let template = make_fs_safe(&template);

    let mut counter = 0u32;
    loop {
        let suffix = if counter == 0 {
            String::new()
        } else {
            format!(" ({})", counter)
        };
        let candidate = root.join(template.replace(SUFFIX_PLACEHOLDER, &suffix));
        let taken = match kind {
            PathKind::File => candidate.is_file(),
            PathKind::Dir => candidate.is_dir(),
        };
        if !taken && !reserved(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("movie.mkv")));
        assert!(is_video_file(Path::new("movie.mp4")));
        assert!(is_video_file(Path::new("movie.MKV")));
        assert!(is_video_file(Path::new("/path/to/movie.mov")));

        assert!(!is_video_file(Path::new("subtitle.srt")));
        assert!(!is_video_file(Path::new("no_extension")));
    }

    #[test]
    fn test_is_planner_output() {
        let modes = ["lite", "standalone", "full"];
        assert!(is_planner_output(Path::new("/m/movie.lite.mp4"), &modes));
        assert!(is_planner_output(Path::new("movie.full.mkv"), &modes));
        assert!(!is_planner_output(Path::new("movie.mkv"), &modes));
        assert!(!is_planner_output(Path::new("elite.mkv"), &modes));
        assert!(is_planner_output(Path::new("movie.lite (2).mp4"), &modes));
        assert!(!is_planner_output(Path::new("Movie (2019).mkv"), &modes));
    }

    #[test]
    fn test_make_fs_safe() {
        assert_eq!(make_fs_safe("a/b\\c*d?e:f\"g<h>i|j"), "abcdefghij");
        assert_eq!(make_fs_safe("plain name.mkv"), "plain name.mkv");
    }

    #[test]
    fn test_find_available_path_file() {
        let dir = tempdir().unwrap();

        let first = find_available_path(dir.path(), "movie.lite.mp4", PathKind::File);
        assert_eq!(first, dir.path().join("movie.lite.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = find_available_path(dir.path(), "movie.lite.mp4", PathKind::File);
        assert_eq!(second, dir.path().join("movie.lite (1).mp4"));

        std::fs::write(&second, b"x").unwrap();
        let third = find_available_path(dir.path(), "movie.lite.mp4", PathKind::File);
        assert_eq!(third, dir.path().join("movie.lite (2).mp4"));
    }

    #[test]
    fn test_find_available_path_dir_and_placeholder() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("movie")).unwrap();

        let scratch = find_available_path(dir.path(), "movie", PathKind::Dir);
        assert_eq!(scratch, dir.path().join("movie (1)"));

        let named = find_available_path(dir.path(), "movie{suffix}_work.mkv", PathKind::File);
        assert_eq!(named, dir.path().join("movie_work.mkv"));
    }

    #[test]
    fn test_find_available_path_with_reservations() {
        let dir = tempdir().unwrap();
        let taken = dir.path().join("movie.lite.mp4");

        let next = find_available_path_with(dir.path(), "movie.lite.mp4", PathKind::File, |p| p == taken);
        assert_eq!(next, dir.path().join("movie.lite (1).mp4"));
    }
}
