//! Adaptive vocal-band filter.
//!
//! ## Algorithm (per frame, per vocal-band bin `k`)
//!
//! 1. `estimate[k] ← (1 - λ)·estimate[k] + λ·|X[k]|`
//! 2. `|X'[k]| = max(|X[k]| - γ·estimate[k], 0)`, phase unchanged.
//!
//! The estimate is the running vocal-band envelope. It starts at zero, so the
//! first frames of a session are suppressed less than later ones. It lives in
//! `AdaptiveState`, which the caller threads from one chunk to the next; this
//! is the only strategy whose output depends on earlier chunks.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{deinterleave, interleave};
use crate::error::{KaraokeError, Result};
use crate::removal::stft::Stft;
use crate::removal::{
    RemovalInput, RemovalParams, RemovalStrategy, Transformed, VocalRemover,
};

/// Envelope carried between chunks of one processing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptiveState {
    /// One envelope per channel, one value per vocal-band bin.
    envelope: Vec<Vec<f32>>,
    /// Geometry the envelope was built for: (frame size, sample rate, first band bin).
    geometry: Option<(usize, u32, usize)>,
    /// Frames folded into the envelope since the last reset.
    pub frames_seen: u64,
    /// Chunks processed since the last reset.
    pub chunks_seen: u64,
}

impl AdaptiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first frame has been processed.
    pub fn is_cold(&self) -> bool {
        self.frames_seen == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Envelope for `channel`, if one has been built.
    pub fn envelope(&self, channel: usize) -> Option<&[f32]> {
        self.envelope.get(channel).map(Vec::as_slice)
    }

    /// Make sure the envelope matches the current frame layout; a mismatch
    /// (different rate, channel count or band) starts over from zero.
    fn ensure_geometry(
        &mut self,
        channels: usize,
        frame_size: usize,
        sample_rate: u32,
        band: &std::ops::Range<usize>,
    ) {
        let geometry = Some((frame_size, sample_rate, band.start));
        let fits = self.geometry == geometry
            && self.envelope.len() == channels
            && self.envelope.iter().all(|e| e.len() == band.len());
        if !fits {
            if self.geometry.is_some() {
                debug!("adaptive state geometry changed, resetting envelope");
            }
            self.envelope = vec![vec![0.0; band.len()]; channels];
            self.geometry = geometry;
            self.frames_seen = 0;
            self.chunks_seen = 0;
        }
    }
}

/// When the carried envelope is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdaptiveReset {
    /// Keep one envelope for the whole input.
    #[default]
    PerSession,
    /// Start over every `n` chunks to limit drift on very long inputs.
    EveryChunks(u32),
}

impl AdaptiveReset {
    /// Apply the policy before processing the next chunk. Returns `true` when
    /// the state was reset.
    pub fn apply(self, state: &mut AdaptiveState) -> bool {
        match self {
            AdaptiveReset::PerSession => false,
            AdaptiveReset::EveryChunks(n) => {
                let n = u64::from(n.max(1));
                if state.chunks_seen > 0 && state.chunks_seen % n == 0 {
                    state.reset();
                    true
                } else {
                    false
                }
            }
        }
    }
}

pub struct AdaptiveFilter {
    lambda: f32,
    scale: f32,
    band_low_hz: f32,
    band_high_hz: f32,
}

impl AdaptiveFilter {
    pub fn new(params: &RemovalParams) -> Self {
        Self {
            lambda: params.lambda,
            scale: params.adaptive_scale,
            band_low_hz: params.band_low_hz,
            band_high_hz: params.band_high_hz,
        }
    }
}

impl VocalRemover for AdaptiveFilter {
    fn strategy(&self) -> RemovalStrategy {
        RemovalStrategy::AdaptiveFilter
    }

    fn transform(
        &self,
        input: &RemovalInput<'_>,
        mut state: AdaptiveState,
    ) -> Result<(Transformed, AdaptiveState)> {
        if !(self.lambda > 0.0 && self.lambda < 1.0) {
            return Err(KaraokeError::Config(format!(
                "adaptive rate must be in (0, 1), got {}",
                self.lambda
            )));
        }

        let stft = Stft::for_rate(input.sample_rate);
        let band = stft.band_bins(self.band_low_hz, self.band_high_hz);
        let channels = input.channels.max(1) as usize;
        state.ensure_geometry(channels, stft.size(), input.sample_rate, &band);

        let lambda = self.lambda;
        let scale = self.scale;
        let mut frames = 0u64;
        let mut planar = deinterleave(input.samples, input.channels);

        for (c, signal) in planar.iter_mut().enumerate() {
            let envelope = &mut state.envelope[c];
            let processed = stft.process(signal, |_, spectrum| {
                for (env, bin) in envelope.iter_mut().zip(&mut spectrum[band.clone()]) {
                    let mag = bin.norm();
                    *env = (1.0 - lambda) * *env + lambda * mag;
                    let target = (mag - scale * *env).max(0.0);
                    if mag > 1e-12 {
                        *bin *= target / mag;
                    }
                }
                if c == 0 {
                    frames += 1;
                }
            });
            *signal = processed;
        }

        state.frames_seen += frames;
        state.chunks_seen += 1;
        Ok((Transformed::new(interleave(&planar)), state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, rate: u32, frames: usize, amp: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(s: &[f32]) -> f32 {
        (s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32).sqrt()
    }

    fn filter() -> AdaptiveFilter {
        AdaptiveFilter::new(&RemovalParams::default())
    }

    #[test]
    fn warm_state_suppresses_more_than_cold_start() {
        let signal = tone(800.0, 16_000, 16_000, 0.5);
        let input = RemovalInput::new(&signal, 1, 16_000, 0);

        let (cold, warm_state) = filter().transform(&input, AdaptiveState::new()).unwrap();
        assert!(!warm_state.is_cold());
        assert_eq!(warm_state.chunks_seen, 1);

        let (warm, _) = filter().transform(&input, warm_state).unwrap();
        let head = 0..4_000;
        assert!(
            rms(&warm.samples[head.clone()]) < rms(&cold.samples[head]),
            "warm state should suppress the opening frames harder"
        );
    }

    #[test]
    fn magnitudes_never_flip_sign() {
        // Steady tone: once the envelope converges the bin goes to zero, not negative.
        let signal = tone(1_200.0, 16_000, 48_000, 0.5);
        let input = RemovalInput::new(&signal, 1, 16_000, 0);
        let (out, state) = filter().transform(&input, AdaptiveState::new()).unwrap();
        let tail = 40_000..46_000;
        assert!(rms(&out.samples[tail.clone()]) < 0.05 * rms(&signal[tail]));
        assert!(state.envelope(0).unwrap().iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn out_of_band_content_is_untouched() {
        let signal = tone(60.0, 16_000, 16_000, 0.5);
        let input = RemovalInput::new(&signal, 1, 16_000, 0);
        let (out, _) = filter().transform(&input, AdaptiveState::new()).unwrap();
        let mid = 2_000..14_000;
        let kept = rms(&out.samples[mid.clone()]) / rms(&signal[mid]);
        assert!((kept - 1.0).abs() < 0.02, "kept={kept}");
    }

    #[test]
    fn geometry_change_resets_envelope() {
        let a = tone(800.0, 16_000, 8_000, 0.5);
        let (_, state) = filter()
            .transform(&RemovalInput::new(&a, 1, 16_000, 0), AdaptiveState::new())
            .unwrap();
        assert_eq!(state.envelope.len(), 1);

        let b: Vec<f32> = a.iter().flat_map(|&s| [s, s]).collect();
        let (_, state) = filter()
            .transform(&RemovalInput::new(&b, 2, 16_000, 1), state)
            .unwrap();
        assert_eq!(state.envelope.len(), 2);
        assert_eq!(state.chunks_seen, 1);
    }

    #[test]
    fn invalid_rate_is_an_error() {
        let f = AdaptiveFilter::new(&RemovalParams {
            lambda: 1.0,
            ..RemovalParams::default()
        });
        let s = vec![0.0; 16];
        assert!(f
            .transform(&RemovalInput::new(&s, 1, 16_000, 0), AdaptiveState::new())
            .is_err());
    }

    #[test]
    fn reset_policy_every_n_chunks() {
        let mut state = AdaptiveState::new();
        state.frames_seen = 10;
        state.chunks_seen = 3;
        assert!(!AdaptiveReset::PerSession.apply(&mut state));
        assert!(!AdaptiveReset::EveryChunks(2).apply(&mut state));
        state.chunks_seen = 4;
        assert!(AdaptiveReset::EveryChunks(2).apply(&mut state));
        assert!(state.is_cold());
        assert_eq!(state.chunks_seen, 0);
    }
}
