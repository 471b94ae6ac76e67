//! `ChunkScheduler`: lazy, restartable, overlap-safe chunking of a buffer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{resample::DetectionResampler, AudioBuffer};
use crate::buffering::chunk::{AudioChunk, ChunkSpan};
use crate::error::{KaraokeError, Result};

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ChunkConfig {
    /// Core length of each chunk. Normalized into [20, 30] s.
    pub chunk_duration_secs: f32,
    /// Frames shared by neighbouring chunks, in milliseconds.
    pub overlap_ms: f32,
    /// Rate of the mono derivative handed to the detector.
    pub detection_sample_rate: u32,
    /// Only mono detection is supported.
    pub detection_channels: u16,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 25.0,
            overlap_ms: 50.0,
            detection_sample_rate: 16_000,
            detection_channels: 1,
        }
    }
}

impl ChunkConfig {
    pub fn normalize(&mut self) {
        self.chunk_duration_secs = self.chunk_duration_secs.clamp(20.0, 30.0);
        self.overlap_ms = self.overlap_ms.clamp(10.0, 500.0);
        if self.detection_sample_rate == 0 {
            self.detection_sample_rate = 16_000;
        }
        self.detection_channels = 1;
    }

    /// Core length in frames at `sample_rate` (at least one frame).
    pub fn chunk_frames(&self, sample_rate: u32) -> usize {
        ((self.chunk_duration_secs as f64 * sample_rate as f64).round() as usize).max(1)
    }

    /// Overlap in frames at `sample_rate`, rounded down to an even count and
    /// never longer than one chunk core.
    pub fn overlap_frames(&self, sample_rate: u32) -> usize {
        let raw = (self.overlap_ms as f64 * sample_rate as f64 / 1000.0).round() as usize;
        let capped = raw.min(self.chunk_frames(sample_rate));
        capped - capped % 2
    }
}

/// Owns the source buffer and hands out chunks on demand.
pub struct ChunkScheduler {
    buffer: AudioBuffer,
    config: ChunkConfig,
    chunk_frames: usize,
    overlap_frames: usize,
}

impl ChunkScheduler {
    /// # Errors
    /// - `InvalidAudio` if the buffer fails validation.
    /// - `Config` for a non-positive chunk duration, a zero detection rate, or
    ///   a detection channel count other than 1.
    pub fn new(buffer: AudioBuffer, config: ChunkConfig) -> Result<Self> {
        buffer.validate()?;
        if !(config.chunk_duration_secs.is_finite() && config.chunk_duration_secs > 0.0) {
            return Err(KaraokeError::Config(format!(
                "chunk duration must be positive, got {}",
                config.chunk_duration_secs
            )));
        }
        if !(config.overlap_ms.is_finite() && config.overlap_ms >= 0.0) {
            return Err(KaraokeError::Config(format!(
                "overlap must be non-negative, got {}",
                config.overlap_ms
            )));
        }
        if config.detection_sample_rate == 0 {
            return Err(KaraokeError::Config("detection sample rate is zero".into()));
        }
        if config.detection_channels != 1 {
            return Err(KaraokeError::Config(format!(
                "detection requires mono, got {} channels",
                config.detection_channels
            )));
        }

        let chunk_frames = config.chunk_frames(buffer.sample_rate);
        let overlap_frames = config.overlap_frames(buffer.sample_rate);

        debug!(
            frames = buffer.frames(),
            chunk_frames,
            overlap_frames,
            "chunk scheduler ready"
        );

        Ok(Self {
            buffer,
            config,
            chunk_frames,
            overlap_frames,
        })
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn overlap_frames(&self) -> usize {
        self.overlap_frames
    }

    /// Total number of chunks the buffer splits into.
    ///
    /// A trailing core shorter than half the overlap is folded into the
    /// previous chunk, so every pair of neighbours shares the full overlap.
    pub fn chunk_count(&self) -> usize {
        let total = self.buffer.frames();
        let count = total.div_ceil(self.chunk_frames);
        if count > 1 && total - (count - 1) * self.chunk_frames < self.overlap_frames / 2 {
            count - 1
        } else {
            count
        }
    }

    /// Layout of chunk `index` without materialising any samples.
    pub fn span(&self, index: usize) -> Option<ChunkSpan> {
        let count = self.chunk_count();
        if index >= count {
            return None;
        }
        let total = self.buffer.frames();
        let core_start = index * self.chunk_frames;
        let core_end = if index + 1 == count {
            total
        } else {
            core_start + self.chunk_frames
        };
        let half = self.overlap_frames / 2;
        Some(ChunkSpan {
            index,
            global_start_sample: core_start.saturating_sub(half),
            global_end_sample: (core_end + half).min(total),
            core_start_sample: core_start,
            core_end_sample: core_end,
            overlap_samples: self.overlap_frames,
        })
    }

    /// A fresh iterator over every chunk, in order.
    ///
    /// Each call starts from chunk 0, so the sequence can be replayed.
    pub fn chunks(&self) -> Result<Chunks<'_>> {
        let resampler =
            DetectionResampler::new(self.buffer.sample_rate, self.config.detection_sample_rate)?;
        Ok(Chunks {
            scheduler: self,
            resampler,
            next: 0,
        })
    }

    fn materialize(&self, span: ChunkSpan, resampler: &mut DetectionResampler) -> Result<AudioChunk> {
        let ch = self.buffer.channels as usize;
        let samples =
            self.buffer.samples[span.global_start_sample * ch..span.global_end_sample * ch].to_vec();
        let detection = resampler.process(&samples, self.buffer.channels)?;
        Ok(AudioChunk {
            span,
            samples,
            channels: self.buffer.channels,
            sample_rate: self.buffer.sample_rate,
            detection,
            detection_rate: self.config.detection_sample_rate,
        })
    }
}

/// Lazy chunk iterator; holds at most one chunk at a time.
pub struct Chunks<'a> {
    scheduler: &'a ChunkScheduler,
    resampler: DetectionResampler,
    next: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.scheduler.span(self.next)?;
        self.next += 1;
        Some(self.scheduler.materialize(span, &mut self.resampler))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.scheduler.chunk_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
