//! Center-channel cancellation.
//!
//! Content mixed at equal level into both channels (usually the lead vocal)
//! cancels when one channel is subtracted from the other:
//! `L' = L - α·R`, `R' = R - α·L`. Off-center content survives, with some
//! inverted leakage into the opposite channel.

use tracing::debug;

use crate::error::Result;
use crate::events::Notice;
use crate::removal::{AdaptiveState, RemovalInput, RemovalStrategy, Transformed, VocalRemover};

pub const MIN_ALPHA: f32 = 0.001;

pub struct CenterChannelCancellation {
    alpha: f32,
}

impl CenterChannelCancellation {
    /// `alpha` is clamped into (0, 1]; a non-finite value means full cancellation.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(MIN_ALPHA, 1.0)
        } else {
            1.0
        };
        Self { alpha }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl VocalRemover for CenterChannelCancellation {
    fn strategy(&self) -> RemovalStrategy {
        RemovalStrategy::CenterChannelCancellation
    }

    fn transform(
        &self,
        input: &RemovalInput<'_>,
        state: AdaptiveState,
    ) -> Result<(Transformed, AdaptiveState)> {
        if input.channels != 2 {
            debug!(
                chunk = input.chunk_index,
                channels = input.channels,
                "center cancellation needs stereo, passing through"
            );
            let out = Transformed {
                samples: input.samples.to_vec(),
                notices: vec![Notice::FallbackApplied {
                    chunk_index: input.chunk_index,
                    strategy: self.strategy(),
                    reason: format!(
                        "center cancellation requires 2 channels, got {}",
                        input.channels
                    ),
                }],
                vocal_energy: None,
            };
            return Ok((out, state));
        }

        Ok((
            Transformed::new(cancel_center(input.samples, self.alpha)),
            state,
        ))
    }
}

/// Apply `L' = L - α·R`, `R' = R - α·L` to interleaved stereo samples.
pub fn cancel_center(interleaved: &[f32], alpha: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(interleaved.len());
    for frame in interleaved.chunks_exact(2) {
        let (l, r) = (frame[0], frame[1]);
        out.push(l - alpha * r);
        out.push(r - alpha * l);
    }
    out
}
