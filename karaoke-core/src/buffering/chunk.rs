//! Typed audio chunk passed from the scheduler to the removal and VAD stages.

use std::ops::Range;

/// Where a chunk sits in the source buffer, in per-channel sample frames.
///
/// `[global_start_sample, global_end_sample)` is the processed span. The core
/// `[core_start_sample, core_end_sample)` is the part this chunk owns; cores of
/// consecutive chunks tile the buffer exactly once. The span extends the core
/// by half of `overlap_samples` on each interior side, so neighbours share
/// `overlap_samples` frames around every core boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub global_start_sample: usize,
    pub global_end_sample: usize,
    pub core_start_sample: usize,
    pub core_end_sample: usize,
    pub overlap_samples: usize,
}

impl ChunkSpan {
    /// Span length in frames.
    pub fn frames(&self) -> usize {
        self.global_end_sample - self.global_start_sample
    }

    /// The core as a range of chunk-local frames.
    pub fn local_core(&self) -> Range<usize> {
        (self.core_start_sample - self.global_start_sample)
            ..(self.core_end_sample - self.global_start_sample)
    }

    /// Half-width of the shared region around a core boundary.
    pub fn half_overlap(&self) -> usize {
        self.overlap_samples / 2
    }

    pub fn offset_secs(&self, sample_rate: u32) -> f64 {
        self.global_start_sample as f64 / sample_rate as f64
    }

    pub fn end_secs(&self, sample_rate: u32) -> f64 {
        self.global_end_sample as f64 / sample_rate as f64
    }

    pub fn core_secs(&self, sample_rate: u32) -> (f64, f64) {
        (
            self.core_start_sample as f64 / sample_rate as f64,
            self.core_end_sample as f64 / sample_rate as f64,
        )
    }
}

/// A contiguous block of interleaved PCM plus its mono detection derivative.
///
/// Allocated once per scheduler step and dropped once both stages are done
/// with it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub span: ChunkSpan,
    /// Interleaved f32 samples at the source rate/channels.
    pub samples: Vec<f32>,
    pub channels: u16,
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Mono samples at `detection_rate`, covering the same span.
    pub detection: Vec<f32>,
    pub detection_rate: u32,
}

impl AudioChunk {
    pub fn index(&self) -> usize {
        self.span.index
    }

    /// Per-channel frame count of the span.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}
