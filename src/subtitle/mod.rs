//! Caption timing for the narration track.
//!
//! Narration is cut into fixed-size word groups and the measured audio
//! length is shared equally between them. The last cue always ends exactly
//! on the total duration.

use crate::error::{Result, VideoError};
use crate::scene::SubtitleCue;

/// Words per caption, short enough to read at a glance.
pub const DEFAULT_WORDS_PER_CUE: usize = 4;

/// Builds contiguous cues covering `[0, total_duration]`.
///
/// Text with no words yields no cues.
pub fn build_cues(text: &str, total_duration: f64, words_per_cue: usize) -> Result<Vec<SubtitleCue>> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(VideoError::InvalidRequest(format!(
            "subtitle duration must be positive, got {}",
            total_duration
        )));
    }
    let group_size = words_per_cue.max(1);

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let groups: Vec<&[&str]> = words.chunks(group_size).collect();
    let count = groups.len();
    let slice = total_duration / count as f64;

    let cues = groups
        .into_iter()
        .enumerate()
        .map(|(k, group)| {
            let start = k as f64 * slice;
            let end = if k + 1 == count {
                total_duration
            } else {
                (k + 1) as f64 * slice
            };
            SubtitleCue {
                words: group.iter().map(|w| w.to_string()).collect(),
                start,
                end,
            }
        })
        .collect();

    Ok(cues)
}
