//! Event and notice types emitted by the engine.
//!
//! | Type | Delivered via |
//! |------|---------------|
//! | `Notice` | `KaraokeOutput::notices` and `KaraokeEngine::subscribe_notices` |
//! | `ProgressEvent` | `KaraokeEngine::subscribe_progress` |
//! | `EngineStatusEvent` | `KaraokeEngine::subscribe_status` |
//!
//! Everything is serde-serializable so hosts can forward it as JSON.

use serde::{Deserialize, Serialize};

use crate::removal::RemovalStrategy;

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// A non-fatal condition recorded during processing.
///
/// Processing always continues after a notice, with degraded but defined
/// output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notice {
    /// A strategy could not run as configured and passed the chunk through
    /// (or ran a reduced stage) instead.
    FallbackApplied {
        chunk_index: usize,
        strategy: RemovalStrategy,
        reason: String,
    },
    /// Output exceeded [-1, 1] and had to be clamped.
    ClippingOccurred {
        chunk_index: usize,
        clipped_samples: usize,
    },
    /// Too few vocal segments were detected; placeholder cues were emitted.
    DetectorLowConfidence {
        detected_segments: usize,
        required_segments: usize,
        placeholder_cues: usize,
    },
}

impl Notice {
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Notice::FallbackApplied { chunk_index, .. }
            | Notice::ClippingOccurred { chunk_index, .. } => Some(*chunk_index),
            Notice::DetectorLowConfidence { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Emitted once per chunk after it has been assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub chunks_done: usize,
    pub chunks_total: usize,
    /// Completion in [0, 100].
    pub percent: f32,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the karaoke engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// No pass running.
    Idle,
    /// A pass is running.
    Processing,
    /// The last pass finished and produced output.
    Completed,
    /// The last pass was cancelled between chunks.
    Cancelled,
    /// The last pass failed.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_serializes_with_kind_tag_and_camel_case_fields() {
        let notice = Notice::FallbackApplied {
            chunk_index: 3,
            strategy: RemovalStrategy::CenterChannelCancellation,
            reason: "mono input".into(),
        };

        let json = serde_json::to_value(&notice).expect("serialize notice");
        assert_eq!(json["kind"], "fallbackApplied");
        assert_eq!(json["chunkIndex"], 3);
        assert_eq!(json["strategy"], "centerChannelCancellation");
        assert_eq!(json["reason"], "mono input");

        let round_trip: Notice = serde_json::from_value(json).expect("deserialize notice");
        assert_eq!(round_trip, notice);
        assert_eq!(round_trip.chunk_index(), Some(3));
    }

    #[test]
    fn low_confidence_notice_has_no_chunk() {
        let notice = Notice::DetectorLowConfidence {
            detected_segments: 0,
            required_segments: 2,
            placeholder_cues: 9,
        };
        let json = serde_json::to_value(&notice).expect("serialize notice");
        assert_eq!(json["kind"], "detectorLowConfidence");
        assert_eq!(json["placeholderCues"], 9);
        assert_eq!(notice.chunk_index(), None);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::Processing,
            detail: Some("chunk 2/9".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["detail"], "chunk 2/9");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::Processing);
    }

    #[test]
    fn progress_event_serializes_with_camel_case_fields() {
        let event = ProgressEvent {
            seq: 4,
            chunks_done: 2,
            chunks_total: 8,
            percent: 25.0,
        };
        let json = serde_json::to_value(&event).expect("serialize progress event");
        assert_eq!(json["chunksDone"], 2);
        assert_eq!(json["chunksTotal"], 8);
    }

    #[test]
    fn engine_status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<EngineStatus>(r#""Processing""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
