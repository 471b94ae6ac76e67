//! Subtitle timeline: per-chunk vocal segments in, global cues out.

pub mod format;
pub mod timeline;

pub use format::{to_srt, to_vtt, write_subtitles};
pub use timeline::{SubtitleTimelineBuilder, Timeline};

use serde::{Deserialize, Serialize};

/// One subtitle entry, in global seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TimelineConfig {
    /// Cues closer than this merge into one.
    pub min_cue_gap_secs: f64,
    /// Text carried by every cue.
    pub placeholder_text: String,
    /// Spacing of placeholder cues when detection is not trusted.
    pub placeholder_interval_secs: f64,
    /// Below `ceil(minutes · this)` detected segments the timeline falls
    /// back to placeholder cues.
    pub min_segments_per_minute: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            min_cue_gap_secs: 0.3,
            placeholder_text: "♪ ♪ ♪".to_string(),
            placeholder_interval_secs: 4.0,
            min_segments_per_minute: 1.0,
        }
    }
}

impl TimelineConfig {
    pub fn normalize(&mut self) {
        self.min_cue_gap_secs = self.min_cue_gap_secs.clamp(0.0, 10.0);
        self.placeholder_interval_secs = self.placeholder_interval_secs.clamp(0.5, 600.0);
        self.min_segments_per_minute = self.min_segments_per_minute.clamp(0.0, 120.0);
        if self.placeholder_text.trim().is_empty() {
            self.placeholder_text = Self::default().placeholder_text;
        }
    }

    /// Fewest detected segments accepted for `duration_secs` of audio.
    pub fn required_segments(&self, duration_secs: f64) -> usize {
        let minutes = duration_secs.max(0.0) / 60.0;
        ((minutes * self.min_segments_per_minute).ceil() as usize).max(1)
    }
}
