//! Container compatibility matrix.
//!
//! A declarative table of which codecs each output container can hold, per
//! stream kind, plus a few container-level capability flags. It is loaded
//! once per process and only ever read afterwards: there is no `&mut` API,
//! and a structural fingerprint taken at load time lets the planner prove
//! that nothing changed it between plans.

use crate::error::{MatrixError, PlanError};
use compatplan_common::StreamKind;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Matrix shipped with the binary: a strict `mp4` and a permissive `mkv`.
pub const DEFAULT_MATRIX: &str = include_str!("../../matrix/default.toml");

/// Capabilities of one output container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerCaps {
    #[serde(default)]
    pub video: BTreeSet<String>,

    #[serde(default)]
    pub audio: BTreeSet<String>,

    #[serde(default)]
    pub subtitle: BTreeSet<String>,

    /// Attachment formats (`ttf`, `otf`, ...).
    #[serde(default)]
    pub attachment: BTreeSet<String>,

    /// Text codec that subtitles are converted to for this container.
    #[serde(default)]
    pub text_subtitle: Option<String>,

    /// Whether players render overlapping subtitle cues from this container.
    #[serde(default)]
    pub concurrent_subtitles: bool,

    /// Subtitle codecs accepted as-is by the planner but written into the
    /// file as another codec (`subrip = "mov_text"` for mp4).
    #[serde(default)]
    pub store_as: BTreeMap<String, String>,

    #[serde(default)]
    pub max_video_streams: Option<u32>,

    #[serde(default)]
    pub max_audio_streams: Option<u32>,

    #[serde(default)]
    pub max_subtitle_streams: Option<u32>,

    /// Output must be rewritten by mkvmerge to get correct track metadata.
    #[serde(default)]
    pub remux_fixup: bool,
}

impl ContainerCaps {
    /// Codec set for a stream kind.
    pub fn codecs(&self, kind: StreamKind) -> &BTreeSet<String> {
        match kind {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
            StreamKind::Subtitle => &self.subtitle,
            StreamKind::Attachment => &self.attachment,
        }
    }

    /// Whether this container can hold `codec` as a stream of `kind`.
    pub fn supports(&self, kind: StreamKind, codec: &str) -> bool {
        self.codecs(kind).contains(codec)
    }

    /// Per-kind stream cap. Attachments are never capped.
    pub fn max_streams(&self, kind: StreamKind) -> Option<u32> {
        match kind {
            StreamKind::Video => self.max_video_streams,
            StreamKind::Audio => self.max_audio_streams,
            StreamKind::Subtitle => self.max_subtitle_streams,
            StreamKind::Attachment => None,
        }
    }

    fn normalize(&mut self) {
        for set in [
            &mut self.video,
            &mut self.audio,
            &mut self.subtitle,
            &mut self.attachment,
        ] {
            *set = set.iter().map(|c| c.trim().to_lowercase()).collect();
        }
        if let Some(text) = self.text_subtitle.as_mut() {
            *text = text.trim().to_lowercase();
        }
        self.store_as = self
            .store_as
            .iter()
            .map(|(from, to)| (from.trim().to_lowercase(), to.trim().to_lowercase()))
            .collect();
    }
}

/// Read-only table of container capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityMatrix {
    containers: BTreeMap<String, ContainerCaps>,
    fingerprint: u64,
}

impl CompatibilityMatrix {
    /// The embedded default matrix.
    pub fn builtin() -> Result<Self, MatrixError> {
        Self::from_toml_str(DEFAULT_MATRIX)
    }

    /// Load a matrix file; `.json` files are read as JSON, anything else as
    /// TOML.
    pub fn load(path: &Path) -> Result<Self, MatrixError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let matrix = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        tracing::debug!(
            "Loaded compatibility matrix from {} ({} containers)",
            path.display(),
            matrix.containers.len()
        );
        Ok(matrix)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MatrixError> {
        let containers: BTreeMap<String, ContainerCaps> = toml::from_str(content)?;
        Self::from_containers(containers)
    }

    pub fn from_json_str(content: &str) -> Result<Self, MatrixError> {
        let containers: BTreeMap<String, ContainerCaps> = serde_json::from_str(content)?;
        Self::from_containers(containers)
    }

    /// Build from an in-memory table, normalizing and validating it.
    pub fn from_containers(containers: BTreeMap<String, ContainerCaps>) -> Result<Self, MatrixError> {
        if containers.is_empty() {
            return Err(MatrixError::Invalid("matrix defines no containers".into()));
        }

        let mut normalized = BTreeMap::new();
        for (name, mut caps) in containers {
            let name = name.trim().to_lowercase();
            caps.normalize();

            if let Some(ref text) = caps.text_subtitle {
                if !caps.subtitle.contains(text) {
                    return Err(MatrixError::Invalid(format!(
                        "container '{}': text_subtitle '{}' is not in its subtitle list",
                        name, text
                    )));
                }
            }
            for (from, to) in &caps.store_as {
                if !caps.subtitle.contains(from) || !caps.subtitle.contains(to) {
                    return Err(MatrixError::Invalid(format!(
                        "container '{}': store_as {} -> {} must map between listed subtitle codecs",
                        name, from, to
                    )));
                }
            }
            for kind in [StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle] {
                if caps.max_streams(kind) == Some(0) {
                    return Err(MatrixError::Invalid(format!(
                        "container '{}': max_{}_streams must be at least 1",
                        name, kind
                    )));
                }
            }
            if normalized.insert(name.clone(), caps).is_some() {
                return Err(MatrixError::Invalid(format!(
                    "container '{}' is defined twice",
                    name
                )));
            }
        }

        let fingerprint = fingerprint_of(&normalized);
        Ok(Self {
            containers: normalized,
            fingerprint,
        })
    }

    /// Capabilities of a container, if the matrix knows it.
    pub fn get(&self, container: &str) -> Option<&ContainerCaps> {
        self.containers.get(container)
    }

    /// Container names in sorted order.
    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }

    pub fn containers(&self) -> &BTreeMap<String, ContainerCaps> {
        &self.containers
    }

    /// Fingerprint taken at load time.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Recompute the fingerprint and compare it with the load-time value.
    pub fn verify(&self) -> Result<(), PlanError> {
        let current = fingerprint_of(&self.containers);
        if current != self.fingerprint {
            return Err(PlanError::SharedStateViolation(format!(
                "compatibility matrix changed after load (fingerprint {:016x} != {:016x})",
                current, self.fingerprint
            )));
        }
        Ok(())
    }
}

fn fingerprint_of(containers: &BTreeMap<String, ContainerCaps>) -> u64 {
    let mut hasher = DefaultHasher::new();
    containers.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_matrix() {
        let matrix = CompatibilityMatrix::builtin().unwrap();
        let names: Vec<&str> = matrix.container_names().collect();
        assert_eq!(names, vec!["mkv", "mp4"]);

        let mp4 = matrix.get("mp4").unwrap();
        assert!(mp4.supports(StreamKind::Video, "h264"));
        assert!(!mp4.supports(StreamKind::Subtitle, "hdmv_pgs_subtitle"));
        assert!(mp4.attachment.is_empty());
        assert!(!mp4.concurrent_subtitles);
        assert_eq!(mp4.max_streams(StreamKind::Video), Some(1));
        assert_eq!(mp4.text_subtitle.as_deref(), Some("mov_text"));

        assert_eq!(mp4.store_as.get("subrip").map(String::as_str), Some("mov_text"));
        assert!(!mp4.store_as.contains_key("mov_text"));

        let mkv = matrix.get("mkv").unwrap();
        assert!(mkv.supports(StreamKind::Attachment, "ttf"));
        assert!(mkv.supports(StreamKind::Attachment, "jpg"));
        assert!(mkv.store_as.is_empty());
        assert!(mkv.remux_fixup);
        assert_eq!(mkv.max_streams(StreamKind::Video), None);
    }

    #[test]
    fn test_codecs_are_lowercased() {
        let matrix = CompatibilityMatrix::from_toml_str(
            r#"
            [MP4]
            video = ["H264"]
            subtitle = ["MOV_TEXT"]
            text_subtitle = "Mov_Text"
            "#,
        )
        .unwrap();

        let mp4 = matrix.get("mp4").unwrap();
        assert!(mp4.supports(StreamKind::Video, "h264"));
        assert_eq!(mp4.text_subtitle.as_deref(), Some("mov_text"));
    }

    #[test]
    fn test_json_matrix() {
        let matrix = CompatibilityMatrix::from_json_str(
            r#"{"webm": {"video": ["vp9"], "audio": ["opus"], "max_audio_streams": 2}}"#,
        )
        .unwrap();
        assert_eq!(matrix.get("webm").unwrap().max_streams(StreamKind::Audio), Some(2));
    }

    #[test]
    fn test_invalid_matrices() {
        assert!(matches!(
            CompatibilityMatrix::from_toml_str(""),
            Err(MatrixError::Invalid(_))
        ));
        assert!(matches!(
            CompatibilityMatrix::from_toml_str("[mp4]\ntext_subtitle = \"mov_text\"\n"),
            Err(MatrixError::Invalid(_))
        ));
        assert!(matches!(
            CompatibilityMatrix::from_toml_str("[mp4]\nmax_video_streams = 0\n"),
            Err(MatrixError::Invalid(_))
        ));
        assert!(matches!(
            CompatibilityMatrix::from_toml_str(
                "[mp4]\nsubtitle = [\"mov_text\"]\n[mp4.store_as]\nsubrip = \"mov_text\"\n"
            ),
            Err(MatrixError::Invalid(_))
        ));
        assert!(matches!(
            CompatibilityMatrix::from_toml_str("[mp4]\nvideos = []\n"),
            Err(MatrixError::Toml(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = CompatibilityMatrix::builtin().unwrap();
        let b = CompatibilityMatrix::builtin().unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.verify().is_ok());

        let other = CompatibilityMatrix::from_toml_str("[mkv]\nvideo = [\"h264\"]\n").unwrap();
        assert_ne!(a.fingerprint(), other.fingerprint());
    }
}
