//! Spectral subtraction: fixed attenuation of the vocal band.
//!
//! Each channel is transformed frame by frame; bins inside the vocal band are
//! scaled by `1 - β` (magnitude only, phase kept), everything else is left
//! alone, and the frames are overlap-added back together.

use crate::audio::{deinterleave, interleave};
use crate::error::Result;
use crate::removal::stft::Stft;
use crate::removal::{
    AdaptiveState, RemovalInput, RemovalParams, RemovalStrategy, Transformed, VocalRemover,
};

pub struct SpectralSubtraction {
    beta: f32,
    band_low_hz: f32,
    band_high_hz: f32,
}

impl SpectralSubtraction {
    pub fn new(params: &RemovalParams) -> Self {
        Self {
            beta: params.beta,
            band_low_hz: params.band_low_hz,
            band_high_hz: params.band_high_hz,
        }
    }

    /// Attenuate the vocal band of one planar channel.
    pub fn process_channel(&self, stft: &Stft, signal: &[f32]) -> Vec<f32> {
        let gain = 1.0 - self.beta.clamp(0.0, 1.0);
        let band = stft.band_bins(self.band_low_hz, self.band_high_hz);
        stft.process(signal, |_, spectrum| {
            for bin in &mut spectrum[band.clone()] {
                *bin *= gain;
            }
        })
    }
}

impl VocalRemover for SpectralSubtraction {
    fn strategy(&self) -> RemovalStrategy {
        RemovalStrategy::SpectralSubtraction
    }

    fn transform(
        &self,
        input: &RemovalInput<'_>,
        state: AdaptiveState,
    ) -> Result<(Transformed, AdaptiveState)> {
        let stft = Stft::for_rate(input.sample_rate);
        let planar: Vec<Vec<f32>> = deinterleave(input.samples, input.channels)
            .iter()
            .map(|ch| self.process_channel(&stft, ch))
            .collect();
        Ok((Transformed::new(interleave(&planar)), state))
    }
}
