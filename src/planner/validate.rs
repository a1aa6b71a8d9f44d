//! Plan validation against container caps and mode policy.

use super::action::ConversionAction;
use super::classify::Classification;
use super::{Mode, PlanEntry};
use crate::matrix::ContainerCaps;
use compatplan_av::StreamDescriptor;
use compatplan_common::StreamKind;
use std::collections::BTreeMap;

/// Check a resolved entry list. Returns every violation found, so a rejected
/// container reports all of its problems at once.
pub(crate) fn validate(
    entries: &[PlanEntry],
    streams: &[StreamDescriptor],
    classes: &[Classification],
    caps: &ContainerCaps,
    mode: Mode,
) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    check_coverage(entries, streams, classes, mode, &mut violations);
    check_codecs(entries, caps, &mut violations);
    check_stream_caps(entries, caps, &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_coverage(
    entries: &[PlanEntry],
    streams: &[StreamDescriptor],
    classes: &[Classification],
    mode: Mode,
    violations: &mut Vec<String>,
) {
    for (stream, class) in streams.iter().zip(classes) {
        let actions: Vec<&ConversionAction> = entries
            .iter()
            .filter(|e| e.source == stream.index)
            .map(|e| &e.action)
            .collect();
        let copies = actions.iter().filter(|a| a.is_copy()).count();
        let index = stream.index;

        if actions.is_empty() {
            violations.push(format!("stream #{} has no action", index));
            continue;
        }

        match mode {
            Mode::Lite | Mode::Standalone => {
                if actions.len() > 1 {
                    violations.push(format!("stream #{} has {} actions", index, actions.len()));
                }
                if stream.kind == StreamKind::Video && class.needs_conversion() && copies > 0 {
                    violations.push(format!(
                        "stream #{}: original low-compatibility video retained",
                        index
                    ));
                }
            }
            Mode::Full => {
                if actions.len() > 2 {
                    violations.push(format!("stream #{} appears {} times", index, actions.len()));
                }
                let dropped = actions.iter().any(|a| a.is_drop());
                if !dropped && copies != 1 {
                    violations.push(format!(
                        "stream #{} must be copied exactly once, found {}",
                        index, copies
                    ));
                }
            }
        }

        if class.is_compatible() && !actions.iter().all(|a| a.is_copy()) {
            violations.push(format!("compatible stream #{} is not copied", index));
        }
    }
}

fn check_codecs(entries: &[PlanEntry], caps: &ContainerCaps, violations: &mut Vec<String>) {
    for entry in entries {
        let codec = match &entry.action {
            ConversionAction::Drop { .. } => continue,
            ConversionAction::Copy => entry.codec.as_deref(),
            action => action.target_codec(),
        };
        match codec {
            Some(codec) if caps.supports(entry.kind, codec) => {}
            Some(codec) => violations.push(format!(
                "stream #{}: {} {} not storable in container",
                entry.source, entry.kind, codec
            )),
            None => violations.push(format!("stream #{}: output codec unknown", entry.source)),
        }
    }
}

fn check_stream_caps(entries: &[PlanEntry], caps: &ContainerCaps, violations: &mut Vec<String>) {
    let mut counts: BTreeMap<StreamKind, u32> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.action.is_drop()) {
        *counts.entry(entry.kind).or_default() += 1;
    }

    for (kind, count) in counts {
        if let Some(max) = caps.max_streams(kind) {
            if count > max {
                violations.push(format!("{} {} streams exceed the limit of {}", count, kind, max));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CompatibilityMatrix;
    use crate::planner::action::{ChannelPolicy, DropReason};
    use crate::planner::classify::UnsupportedReason;

    fn entry(source: u32, kind: StreamKind, codec: &str, action: ConversionAction) -> PlanEntry {
        PlanEntry {
            source,
            kind,
            codec: Some(codec.to_string()),
            action,
        }
    }

    fn caps(container: &str) -> ContainerCaps {
        CompatibilityMatrix::builtin().unwrap().get(container).unwrap().clone()
    }

    #[test]
    fn test_copy_of_unstorable_codec_rejected() {
        let streams = [StreamDescriptor::audio(0, "dts", 6)];
        let classes = [Classification::Compatible];
        let entries = [entry(0, StreamKind::Audio, "dts", ConversionAction::Copy)];

        let err = validate(&entries, &streams, &classes, &caps("mp4"), Mode::Lite).unwrap_err();
        assert!(err[0].contains("dts"));
        assert!(validate(&entries, &streams, &classes, &caps("mkv"), Mode::Lite).is_ok());
    }

    #[test]
    fn test_video_stream_cap() {
        let streams = [StreamDescriptor::video(0, "h264"), StreamDescriptor::video(1, "h264")];
        let classes = [Classification::Compatible, Classification::Compatible];
        let entries = [
            entry(0, StreamKind::Video, "h264", ConversionAction::Copy),
            entry(1, StreamKind::Video, "h264", ConversionAction::Copy),
        ];

        let err = validate(&entries, &streams, &classes, &caps("mp4"), Mode::Standalone).unwrap_err();
        assert!(err.iter().any(|v| v.contains("exceed")));
    }

    #[test]
    fn test_dropped_streams_do_not_count() {
        let streams = [StreamDescriptor::video(0, "h264"), StreamDescriptor::video(1, "h264")];
        let reason = UnsupportedReason::Malformed("missing codec name".into());
        let classes = [Classification::Compatible, Classification::Unsupported(reason.clone())];
        let entries = [
            entry(0, StreamKind::Video, "h264", ConversionAction::Copy),
            entry(1, StreamKind::Video, "h264", ConversionAction::Drop {
                reason: DropReason::Unsupported(reason),
            }),
        ];
        assert!(validate(&entries, &streams, &classes, &caps("mp4"), Mode::Lite).is_ok());
    }

    #[test]
    fn test_full_requires_single_copy() {
        let streams = [StreamDescriptor::audio(0, "dts", 6)];
        let classes = [Classification::NeedsConversion(
            crate::planner::classify::ConversionReason::Codec("dts".into()),
        )];
        let transcode = ConversionAction::TranscodeAudio {
            codec: "ac3".into(),
            channels: ChannelPolicy::Surround { downmix: false },
        };

        let missing_copy = [entry(0, StreamKind::Audio, "dts", transcode.clone())];
        assert!(validate(&missing_copy, &streams, &classes, &caps("mkv"), Mode::Full).is_err());

        let both = [
            entry(0, StreamKind::Audio, "dts", transcode),
            entry(0, StreamKind::Audio, "dts", ConversionAction::Copy),
        ];
        assert!(validate(&both, &streams, &classes, &caps("mkv"), Mode::Full).is_ok());
    }

    #[test]
    fn test_standalone_refuses_original_video() {
        let streams = [StreamDescriptor::video(0, "hevc").with_bit_depth(10)];
        let classes = [Classification::NeedsConversion(
            crate::planner::classify::ConversionReason::BitDepth(10),
        )];
        let entries = [entry(0, StreamKind::Video, "hevc", ConversionAction::Copy)];

        let err = validate(&entries, &streams, &classes, &caps("mkv"), Mode::Standalone).unwrap_err();
        assert!(err.iter().any(|v| v.contains("retained")));
    }

    #[test]
    fn test_missing_action() {
        let streams = [StreamDescriptor::audio(0, "aac", 2)];
        let classes = [Classification::Compatible];
        let err = validate(&[], &streams, &classes, &caps("mp4"), Mode::Lite).unwrap_err();
        assert_eq!(err, vec!["stream #0 has no action".to_string()]);
    }
}
