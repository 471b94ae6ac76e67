//! Decoded PCM audio and the sample-level helpers shared by every stage.
//!
//! Buffers are interleaved `f32` in [-1.0, 1.0]. Decoding/encoding of
//! container formats is the caller's job; `wav` only exists for the host
//! binary and tests.

pub mod resample;
pub mod wav;

use crate::error::{KaraokeError, Result};

/// Maximum channel count the pipeline accepts.
pub const MAX_CHANNELS: u16 = 2;

/// A decoded, interleaved audio buffer.
///
/// Sample rate and channel count never change for the lifetime of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// Sample rate in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Build an interleaved buffer from per-channel sample vectors.
    ///
    /// # Errors
    /// `InvalidAudio` when the channel vectors differ in length.
    pub fn from_planar(planar: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        if let Some(first) = planar.first() {
            if planar.iter().any(|ch| ch.len() != first.len()) {
                return Err(KaraokeError::InvalidAudio(
                    "planar channels differ in length".into(),
                ));
            }
        }
        Ok(Self::new(
            interleave(planar),
            planar.len() as u16,
            sample_rate,
        ))
    }

    /// Number of per-channel frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check every invariant the pipeline relies on.
    ///
    /// # Errors
    /// `InvalidAudio` on an empty buffer, a channel count outside 1..=2, a zero
    /// sample rate, a ragged final frame, or any NaN/infinite sample.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(KaraokeError::InvalidAudio(format!(
                "unsupported channel count {} (expected 1 or 2)",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(KaraokeError::InvalidAudio("sample rate is zero".into()));
        }
        if self.samples.is_empty() {
            return Err(KaraokeError::InvalidAudio("buffer has zero length".into()));
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(KaraokeError::InvalidAudio(format!(
                "{} samples do not divide into {} channels",
                self.samples.len(),
                self.channels
            )));
        }
        if let Some(pos) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(KaraokeError::InvalidAudio(format!(
                "non-finite sample at index {pos}"
            )));
        }
        Ok(())
    }
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().copied().sum::<f32>() / channels as f32)
        .collect()
}

/// Split interleaved samples into one vector per channel.
pub fn deinterleave(interleaved: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let ch = channels.max(1) as usize;
    let frames = interleaved.len() / ch;
    let mut planar = vec![Vec::with_capacity(frames); ch];
    for frame in interleaved.chunks_exact(ch) {
        for (c, &s) in frame.iter().enumerate() {
            planar[c].push(s);
        }
    }
    planar
}

/// Inverse of [`deinterleave`]. Channels are assumed equal length.
pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for ch in planar {
            out.push(ch[i]);
        }
    }
    out
}

/// Absolute peak of a sample slice.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Clamp samples into [-1.0, 1.0] and return how many had to be clipped.
pub fn clamp_in_place(samples: &mut [f32]) -> usize {
    let mut clipped = 0usize;
    for s in samples.iter_mut() {
        if *s > 1.0 || *s < -1.0 {
            *s = s.clamp(-1.0, 1.0);
            clipped += 1;
        }
    }
    clipped
}

/// Scale samples down so the peak sits at `ceiling`. No-op when already below.
///
/// Returns the gain applied (1.0 when untouched).
pub fn peak_normalize(samples: &mut [f32], ceiling: f32) -> f32 {
    let p = peak(samples);
    if p <= ceiling || p == 0.0 {
        return 1.0;
    }
    let gain = ceiling / p;
    for s in samples.iter_mut() {
        *s *= gain;
    }
    gain
}
