//! Composite strategy: center cancellation, then spectral subtraction, then
//! the adaptive filter, each stage reading the previous stage's output.
//!
//! Notices from every stage are kept. A stage that cannot run (center
//! cancellation on mono) contributes its notice and passes audio on, so the
//! remaining stages still apply. The removed content (input minus output) is
//! measured per STFT hop and returned as the vocal-energy estimate.

use tracing::debug;

use crate::audio::{downmix_to_mono, peak_normalize};
use crate::error::Result;
use crate::removal::stft::frame_size_for_rate;
use crate::removal::{
    AdaptiveFilter, AdaptiveState, CenterChannelCancellation, RemovalInput, RemovalParams,
    RemovalStrategy, SpectralSubtraction, Transformed, VocalEnergyEstimate, VocalRemover,
};

pub struct Combined {
    center: CenterChannelCancellation,
    spectral: SpectralSubtraction,
    adaptive: AdaptiveFilter,
}

impl Combined {
    pub fn new(params: &RemovalParams) -> Self {
        Self {
            center: CenterChannelCancellation::new(params.alpha),
            spectral: SpectralSubtraction::new(params),
            adaptive: AdaptiveFilter::new(params),
        }
    }
}

impl VocalRemover for Combined {
    fn strategy(&self) -> RemovalStrategy {
        RemovalStrategy::Combined
    }

    fn transform(
        &self,
        input: &RemovalInput<'_>,
        state: AdaptiveState,
    ) -> Result<(Transformed, AdaptiveState)> {
        let mut notices = Vec::new();

        let (centered, state) = self.center.transform(input, state)?;
        notices.extend(centered.notices);

        let (spectral, state) = self
            .spectral
            .transform(&input.with_samples(&centered.samples), state)?;
        notices.extend(spectral.notices);

        let (adaptive, state) = self
            .adaptive
            .transform(&input.with_samples(&spectral.samples), state)?;
        notices.extend(adaptive.notices);

        let mut samples = adaptive.samples;
        let gain = peak_normalize(&mut samples, 1.0);
        if gain < 1.0 {
            debug!(chunk = input.chunk_index, gain, "combined output peak-normalized");
        }

        let vocal_energy = residual_energy(input, &samples);
        Ok((
            Transformed {
                samples,
                notices,
                vocal_energy: Some(vocal_energy),
            },
            state,
        ))
    }
}

/// Mean squared amplitude of `input - output` (downmixed) per STFT hop.
fn residual_energy(input: &RemovalInput<'_>, output: &[f32]) -> VocalEnergyEstimate {
    let residual: Vec<f32> = input
        .samples
        .iter()
        .zip(output)
        .map(|(a, b)| a - b)
        .collect();
    let mono = downmix_to_mono(&residual, input.channels);

    let hop = frame_size_for_rate(input.sample_rate) / 2;
    let energy = mono
        .chunks(hop)
        .map(|frame| frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32)
        .collect();

    VocalEnergyEstimate {
        hop_secs: hop as f64 / input.sample_rate.max(1) as f64,
        energy,
    }
}
