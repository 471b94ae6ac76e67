//! Reassembly of processed chunks into one continuous buffer.
//!
//! The overlap between chunks exists only to give the strategies context at
//! their edges; it must disappear before output. `Trim` keeps each chunk's
//! core and discards the rest. `Crossfade` blends both versions of every
//! shared region with complementary linear ramps centred on the core
//! boundary, so the weights of the two chunks always sum to one.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::buffering::chunk::ChunkSpan;
use crate::error::{KaraokeError, Result};

/// How chunk overlap is removed on reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapMode {
    #[default]
    Trim,
    Crossfade,
}

/// Collects processed chunks (in order) into the output buffer.
pub struct OutputAssembler {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    mode: OverlapMode,
    next_index: usize,
    /// End of the last core written, in frames.
    covered: usize,
}

impl OutputAssembler {
    pub fn new(total_frames: usize, channels: u16, sample_rate: u32, mode: OverlapMode) -> Self {
        Self {
            samples: vec![0.0; total_frames * channels as usize],
            channels,
            sample_rate,
            mode,
            next_index: 0,
            covered: 0,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Add one processed chunk. `processed` is interleaved and spans
    /// `span.global_start_sample..span.global_end_sample`.
    ///
    /// # Errors
    /// - `OutOfOrder` if chunks arrive out of index order.
    /// - `InvalidAudio` if `processed` does not match the span length.
    pub fn push(&mut self, span: &ChunkSpan, processed: &[f32]) -> Result<()> {
        if span.index != self.next_index {
            return Err(KaraokeError::OutOfOrder {
                expected: self.next_index,
                got: span.index,
            });
        }
        let ch = self.channels as usize;
        if processed.len() != span.frames() * ch || span.global_end_sample > self.total_frames() {
            return Err(KaraokeError::InvalidAudio(format!(
                "chunk {} carries {} samples for a {}-frame span",
                span.index,
                processed.len(),
                span.frames()
            )));
        }

        match self.mode {
            OverlapMode::Trim => {
                let local = span.local_core();
                let dst = span.core_start_sample * ch..span.core_end_sample * ch;
                self.samples[dst].copy_from_slice(&processed[local.start * ch..local.end * ch]);
            }
            OverlapMode::Crossfade => {
                let half = span.half_overlap();
                for frame in 0..span.frames() {
                    let g = span.global_start_sample + frame;
                    let w = crossfade_weight(g, span, half);
                    if w == 0.0 {
                        continue;
                    }
                    for c in 0..ch {
                        self.samples[g * ch + c] += w * processed[frame * ch + c];
                    }
                }
            }
        }

        self.next_index += 1;
        self.covered = span.core_end_sample;
        Ok(())
    }

    /// Return the reassembled buffer.
    ///
    /// # Errors
    /// `InvalidAudio` if the pushed cores do not reach the end of the buffer.
    pub fn finish(self) -> Result<AudioBuffer> {
        let total = self.total_frames();
        if self.covered != total {
            return Err(KaraokeError::InvalidAudio(format!(
                "reassembly incomplete: {} of {} frames covered",
                self.covered, total
            )));
        }
        Ok(AudioBuffer::new(self.samples, self.channels, self.sample_rate))
    }
}

/// Weight of chunk `span` at global frame `g`.
///
/// Inside a shared region `[B - half, B + half)` around a core boundary `B`,
/// the chunk to the right of `B` ramps up while the chunk to the left ramps
/// down by the complementary amount.
fn crossfade_weight(g: usize, span: &ChunkSpan, half: usize) -> f32 {
    if half == 0 {
        return if g >= span.core_start_sample && g < span.core_end_sample {
            1.0
        } else {
            0.0
        };
    }
    let width = (2 * half) as f32;
    let rising = |boundary: usize| ((g + half) as f32 - boundary as f32 + 0.5) / width;

    let has_left = span.global_start_sample < span.core_start_sample;
    let has_right = span.global_end_sample > span.core_end_sample;

    if has_left && g + half >= span.core_start_sample && g < span.core_start_sample + half {
        return rising(span.core_start_sample).clamp(0.0, 1.0);
    }
    if has_right && g + half >= span.core_end_sample && g < span.core_end_sample + half {
        return (1.0 - rising(span.core_end_sample)).clamp(0.0, 1.0);
    }
    if g >= span.core_start_sample && g < span.core_end_sample {
        1.0
    } else {
        0.0
    }
}
