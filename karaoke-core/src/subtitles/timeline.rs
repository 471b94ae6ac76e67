//! Merges per-chunk vocal segments into one global cue list.
//!
//! Chunks arrive in order. Each segment is shifted to global time and owned
//! by the chunk whose core contains its midpoint. A segment whose midpoint
//! falls on the neighbour's side of a seam is dropped if that neighbour
//! reported an intersecting segment, and kept otherwise (the neighbour may
//! have missed it). Segments in the right-hand overlap can only be resolved
//! once the next chunk arrives, so they wait one step.
//!
//! When both chunks place the same phrase on each other's side of the seam,
//! neither owns it by midpoint; the two reports collapse into their union so
//! the phrase survives exactly once.
//!
//! Surviving segments are sorted and merged when closer than the minimum cue
//! gap. If too few segments were found for the input's duration the whole
//! track is replaced with evenly spaced placeholder cues.

use tracing::{debug, info};

use super::{SubtitleCue, TimelineConfig};
use crate::buffering::ChunkSpan;
use crate::error::{KaraokeError, Result};
use crate::events::Notice;
use crate::vad::segments::merge_close;
use crate::vad::VocalSegment;

/// Final subtitle track.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub cues: Vec<SubtitleCue>,
    /// Segments that survived seam deduplication.
    pub detected_segments: usize,
    pub fallback_used: bool,
    /// `DetectorLowConfidence` when the placeholder track was used.
    pub notice: Option<Notice>,
}

/// The previous chunk, kept until the next one resolves its right overlap.
struct Previous {
    /// Segments the previous chunk already accepted.
    owned: Vec<VocalSegment>,
    deferred: Vec<VocalSegment>,
}

/// A deferred segment waiting on the current chunk.
struct Pending {
    segment: VocalSegment,
    /// Merged with a left-overlap report of the current chunk.
    shared: bool,
}

pub struct SubtitleTimelineBuilder {
    config: TimelineConfig,
    sample_rate: u32,
    next_index: usize,
    previous: Option<Previous>,
    accepted: Vec<VocalSegment>,
}

impl SubtitleTimelineBuilder {
    /// `sample_rate` is the rate chunk spans are measured in.
    pub fn new(config: TimelineConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            next_index: 0,
            previous: None,
            accepted: Vec::new(),
        }
    }

    /// Add one chunk's chunk-local segments.
    pub fn push(&mut self, span: &ChunkSpan, segments: &[VocalSegment]) -> Result<()> {
        if span.index != self.next_index {
            return Err(KaraokeError::OutOfOrder {
                expected: self.next_index,
                got: span.index,
            });
        }
        self.next_index += 1;

        let offset = span.offset_secs(self.sample_rate);
        let (core_start, core_end) = span.core_secs(self.sample_rate);
        let has_right = span.core_end_sample < span.global_end_sample;

        let (prev_owned, mut pending) = match self.previous.take() {
            Some(prev) => (
                prev.owned,
                prev.deferred
                    .into_iter()
                    .map(|segment| Pending {
                        segment,
                        shared: false,
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::<Pending>::new()),
        };

        let mut kept = Vec::with_capacity(segments.len());
        let mut deferred = Vec::new();

        for seg in segments.iter().map(|s| s.offset(offset)) {
            let mid = seg.midpoint();
            if mid < core_start {
                if prev_owned.iter().any(|s| s.intersects(&seg)) {
                    debug!(chunk = span.index, start = seg.start, "segment owned by previous chunk");
                } else if let Some(p) = pending.iter_mut().find(|p| p.segment.intersects(&seg)) {
                    debug!(chunk = span.index, start = seg.start, "seam segment reported by both chunks");
                    p.segment = p.segment.union(&seg);
                    p.shared = true;
                } else {
                    kept.push(seg);
                }
            } else if mid >= core_end && has_right {
                deferred.push(seg);
            } else {
                kept.push(seg);
            }
        }

        let mut owned = Vec::with_capacity(kept.len() + pending.len());
        for p in pending {
            let claimed = kept
                .iter()
                .chain(&deferred)
                .any(|s| s.intersects(&p.segment));
            if claimed && !p.shared {
                debug!(chunk = span.index, start = p.segment.start, "segment owned by this chunk");
            } else {
                owned.push(p.segment);
            }
        }
        owned.extend(kept);

        self.accepted.extend_from_slice(&owned);
        self.previous = Some(Previous { owned, deferred });
        Ok(())
    }

    /// Chunks pushed so far.
    pub fn chunks_seen(&self) -> usize {
        self.next_index
    }

    /// Close the timeline for an input of `duration_secs`.
    pub fn finish(mut self, duration_secs: f64) -> Timeline {
        if let Some(prev) = self.previous.take() {
            self.accepted.extend(prev.deferred);
        }

        let duration = duration_secs.max(0.0);
        let mut segments: Vec<VocalSegment> = self
            .accepted
            .iter()
            .map(|s| VocalSegment::new(s.start.max(0.0), s.end.min(duration)))
            .filter(|s| s.end > s.start)
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        let detected = segments.len();

        let required = self.config.required_segments(duration);
        if detected < required {
            let cues = self.placeholder_cues(duration);
            info!(
                detected,
                required,
                placeholder_cues = cues.len(),
                "low detection density, using placeholder cues"
            );
            return Timeline {
                notice: Some(Notice::DetectorLowConfidence {
                    detected_segments: detected,
                    required_segments: required,
                    placeholder_cues: cues.len(),
                }),
                cues,
                detected_segments: detected,
                fallback_used: true,
            };
        }

        let cues: Vec<SubtitleCue> = merge_close(&segments, self.config.min_cue_gap_secs)
            .into_iter()
            .map(|s| self.cue(s.start, s.end))
            .collect();
        info!(detected, cues = cues.len(), "subtitle timeline built");
        Timeline {
            cues,
            detected_segments: detected,
            fallback_used: false,
            notice: None,
        }
    }

    /// `ceil(D / I)` cues `[i·I, min((i+1)·I, D))`.
    fn placeholder_cues(&self, duration: f64) -> Vec<SubtitleCue> {
        let interval = self.config.placeholder_interval_secs;
        if duration <= 0.0 || interval <= 0.0 {
            return Vec::new();
        }
        let count = (duration / interval).ceil() as usize;
        (0..count)
            .map(|i| {
                let start = i as f64 * interval;
                let end = ((i + 1) as f64 * interval).min(duration);
                self.cue(start, end)
            })
            .collect()
    }

    fn cue(&self, start: f64, end: f64) -> SubtitleCue {
        SubtitleCue {
            start,
            end,
            text: self.config.placeholder_text.clone(),
        }
    }
}
