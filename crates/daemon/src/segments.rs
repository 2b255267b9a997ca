//! Diarization segment post-processing.
//!
//! Normalizes raw diarizer turns into the segment list the rest of the
//! pipeline relies on: sorted, gap-merged, with sub-threshold fragments
//! dropped, plus per-speaker aggregation.

use crate::jobs::{Segment, Speaker};
use tracing::debug;

/// Minimum duration a segment must reach to survive the merge pass.
pub const MIN_SEGMENT_DURATION: f64 = 0.5;

/// Maximum inter-segment gap for merging consecutive same-speaker segments.
pub const MERGE_GAP_THRESHOLD: f64 = 0.3;

/// Merge adjacent same-speaker segments and drop short fragments.
///
/// Consecutive segments from the same speaker are merged when the gap
/// between them is at most `gap_threshold` seconds; their texts are joined
/// with a single space. After merging, segments shorter than `min_duration`
/// are discarded. The result is sorted by `start_time`.
pub fn merge_short_segments(
    segments: Vec<Segment>,
    min_duration: f64,
    gap_threshold: f64,
) -> Vec<Segment> {
    if segments.is_empty() {
        return Vec::new();
    }

    let mut sorted = segments;
    sorted.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let input_len = sorted.len();
    let mut iter = sorted.into_iter();
    let mut current = iter.next().expect("non-empty after guard");
    let mut merged: Vec<Segment> = Vec::new();

    for segment in iter {
        let gap = segment.start_time - current.end_time;
        let same_speaker = segment.speaker_id == current.speaker_id;

        if same_speaker && gap <= gap_threshold {
            current.end_time = current.end_time.max(segment.end_time);
            if !segment.text.is_empty() {
                if !current.text.is_empty() {
                    current.text.push(' ');
                }
                current.text.push_str(&segment.text);
            }
        } else {
            merged.push(current);
            current = segment;
        }
    }
    merged.push(current);

    let merged_len = merged.len();
    let filtered: Vec<Segment> = merged
        .into_iter()
        .filter(|seg| seg.duration() >= min_duration)
        .collect();

    debug!(
        input = input_len,
        merged = merged_len,
        kept = filtered.len(),
        min_duration,
        gap_threshold,
        "segment merge pass"
    );
    filtered
}

/// Aggregate segments into per-speaker summaries.
///
/// Speakers are labelled `"Speaker N"` (1-indexed) in order of first
/// appearance in the segment list.
pub fn derive_speakers(segments: &[Segment]) -> Vec<Speaker> {
    let mut speakers: Vec<Speaker> = Vec::new();

    for segment in segments {
        let duration = segment.duration();
        match speakers
            .iter_mut()
            .find(|s| s.speaker_id == segment.speaker_id)
        {
            Some(speaker) => {
                speaker.segment_count += 1;
                speaker.total_duration += duration;
            }
            None => {
                speakers.push(Speaker {
                    speaker_id: segment.speaker_id.clone(),
                    label: format!("Speaker {}", speakers.len() + 1),
                    segment_count: 1,
                    total_duration: duration,
                    assigned_voice_ref: None,
                });
            }
        }
    }

    speakers
}
