//! Vocal removal strategies.
//!
//! The `VocalRemover` trait is the extensibility point: one capability,
//! `transform(input, state) -> (output, state)`, implemented by the four
//! strategies. `Combined` is a composite that sequences the other three.
//!
//! Only `AdaptiveFilter` (and therefore `Combined`) reads or writes
//! `AdaptiveState`; the others pass it through untouched. The state is a
//! plain value threaded by the caller, never shared behind a lock.

pub mod adaptive;
pub mod center;
pub mod combined;
pub mod spectral;
pub mod stft;

pub use adaptive::{AdaptiveFilter, AdaptiveReset, AdaptiveState};
pub use center::CenterChannelCancellation;
pub use combined::Combined;
pub use spectral::SpectralSubtraction;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::clamp_in_place;
use crate::error::Result;
use crate::events::Notice;

/// Which vocal removal strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalStrategy {
    CenterChannelCancellation,
    SpectralSubtraction,
    AdaptiveFilter,
    #[default]
    Combined,
}

impl RemovalStrategy {
    /// Strategies whose output for chunk N depends on chunk N-1.
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            RemovalStrategy::AdaptiveFilter | RemovalStrategy::Combined
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RemovalStrategy::CenterChannelCancellation => "centerChannelCancellation",
            RemovalStrategy::SpectralSubtraction => "spectralSubtraction",
            RemovalStrategy::AdaptiveFilter => "adaptiveFilter",
            RemovalStrategy::Combined => "combined",
        }
    }
}

impl std::str::FromStr for RemovalStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "center" | "centerchannelcancellation" => Ok(Self::CenterChannelCancellation),
            "spectral" | "spectralsubtraction" => Ok(Self::SpectralSubtraction),
            "adaptive" | "adaptivefilter" => Ok(Self::AdaptiveFilter),
            "combined" => Ok(Self::Combined),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Tuning for all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RemovalParams {
    /// Center cancellation factor α in (0, 1]. 1.0 = full cancellation.
    pub alpha: f32,
    /// Spectral suppression strength β in [0, 1]. The vocal band is scaled by
    /// `1 - β`: 0.0 leaves the signal untouched, 1.0 removes the band.
    pub beta: f32,
    /// Lower edge of the vocal band (Hz).
    pub band_low_hz: f32,
    /// Upper edge of the vocal band (Hz).
    pub band_high_hz: f32,
    /// Adaptive envelope convergence rate λ in (0, 1).
    pub lambda: f32,
    /// Scale applied to the adaptive envelope before subtraction.
    pub adaptive_scale: f32,
}

impl Default for RemovalParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.85,
            band_low_hz: 300.0,
            band_high_hz: 3_000.0,
            lambda: 0.2,
            adaptive_scale: 1.0,
        }
    }
}

impl RemovalParams {
    pub fn normalize(&mut self) {
        self.alpha = self.alpha.clamp(center::MIN_ALPHA, 1.0);
        self.beta = self.beta.clamp(0.0, 1.0);
        self.band_low_hz = self.band_low_hz.clamp(0.0, 20_000.0);
        self.band_high_hz = self.band_high_hz.clamp(self.band_low_hz + 1.0, 24_000.0);
        self.lambda = self.lambda.clamp(0.001, 0.999);
        self.adaptive_scale = self.adaptive_scale.clamp(0.0, 4.0);
    }
}

/// One chunk of interleaved audio handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct RemovalInput<'a> {
    pub samples: &'a [f32],
    pub channels: u16,
    pub sample_rate: u32,
    /// Used to label notices.
    pub chunk_index: usize,
}

impl<'a> RemovalInput<'a> {
    pub fn new(samples: &'a [f32], channels: u16, sample_rate: u32, chunk_index: usize) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
            chunk_index,
        }
    }

    /// Same chunk metadata over different samples (used between stages).
    pub fn with_samples<'b>(&self, samples: &'b [f32]) -> RemovalInput<'b> {
        RemovalInput {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
            chunk_index: self.chunk_index,
        }
    }
}

/// Per-frame energy of the content a strategy removed.
///
/// The detector can use it as a guide for where vocals actually were.
#[derive(Debug, Clone, PartialEq)]
pub struct VocalEnergyEstimate {
    /// Stride between frames, in seconds.
    pub hop_secs: f64,
    /// Mean squared amplitude of the removed signal per frame.
    pub energy: Vec<f32>,
}

impl VocalEnergyEstimate {
    /// Energy of the frame covering chunk-local time `t` (0 past the end).
    pub fn energy_at(&self, t: f64) -> f32 {
        if self.hop_secs <= 0.0 || t < 0.0 {
            return 0.0;
        }
        let idx = (t / self.hop_secs) as usize;
        self.energy.get(idx).copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f32 {
        self.energy.iter().copied().fold(0.0, f32::max)
    }
}

/// Output of a single strategy stage.
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub samples: Vec<f32>,
    pub notices: Vec<Notice>,
    pub vocal_energy: Option<VocalEnergyEstimate>,
}

impl Transformed {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }
}

/// Final per-chunk result handed to the assembler and the detector.
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Interleaved instrumental samples over the chunk span.
    pub instrumental: Vec<f32>,
    pub vocal_energy: Option<VocalEnergyEstimate>,
    pub notices: Vec<Notice>,
}

/// Contract for vocal removal strategies.
pub trait VocalRemover: Send + Sync {
    fn strategy(&self) -> RemovalStrategy;

    /// Transform one chunk, consuming the carried state and returning the
    /// state to carry into the next chunk.
    ///
    /// # Errors
    /// Implementations return an error for input they cannot process; the
    /// caller substitutes a passthrough.
    fn transform(
        &self,
        input: &RemovalInput<'_>,
        state: AdaptiveState,
    ) -> Result<(Transformed, AdaptiveState)>;
}

/// Build the remover for `strategy`.
pub fn remover_for(strategy: RemovalStrategy, params: &RemovalParams) -> Box<dyn VocalRemover> {
    match strategy {
        RemovalStrategy::CenterChannelCancellation => {
            Box::new(CenterChannelCancellation::new(params.alpha))
        }
        RemovalStrategy::SpectralSubtraction => Box::new(SpectralSubtraction::new(params)),
        RemovalStrategy::AdaptiveFilter => Box::new(AdaptiveFilter::new(params)),
        RemovalStrategy::Combined => Box::new(Combined::new(params)),
    }
}

/// Run `remover` on one chunk and enforce the output contract.
///
/// Never fails: a strategy error, a length mismatch or any non-finite output
/// sample turns into a passthrough of the input plus a `FallbackApplied`
/// notice, and the incoming state is carried forward unchanged. Samples
/// outside [-1, 1] are clamped and reported as `ClippingOccurred`.
pub fn apply_remover(
    remover: &dyn VocalRemover,
    input: &RemovalInput<'_>,
    state: AdaptiveState,
) -> (RemovalResult, AdaptiveState) {
    let strategy = remover.strategy();
    let prior = state.clone();

    let failure = match remover.transform(input, state) {
        Ok((out, next)) => {
            if out.samples.len() != input.samples.len() {
                format!(
                    "strategy returned {} samples for {}",
                    out.samples.len(),
                    input.samples.len()
                )
            } else if out.samples.iter().any(|s| !s.is_finite()) {
                "non-finite output".to_string()
            } else {
                return (finalize(out, input.chunk_index), next);
            }
        }
        Err(e) => e.to_string(),
    };

    warn!(
        chunk = input.chunk_index,
        strategy = strategy.as_str(),
        reason = %failure,
        "strategy failed on chunk, passing it through"
    );
    let result = RemovalResult {
        instrumental: input.samples.to_vec(),
        vocal_energy: None,
        notices: vec![Notice::FallbackApplied {
            chunk_index: input.chunk_index,
            strategy,
            reason: failure,
        }],
    };
    (result, prior)
}

/// Convenience wrapper: build the strategy and apply it to one chunk.
pub fn remove_vocals(
    input: &RemovalInput<'_>,
    strategy: RemovalStrategy,
    params: &RemovalParams,
    state: AdaptiveState,
) -> (RemovalResult, AdaptiveState) {
    let remover = remover_for(strategy, params);
    apply_remover(remover.as_ref(), input, state)
}

fn finalize(mut out: Transformed, chunk_index: usize) -> RemovalResult {
    let clipped = clamp_in_place(&mut out.samples);
    if clipped > 0 {
        warn!(chunk = chunk_index, clipped, "output clipped to [-1, 1]");
        out.notices.push(Notice::ClippingOccurred {
            chunk_index,
            clipped_samples: clipped,
        });
    }
    RemovalResult {
        instrumental: out.samples,
        vocal_energy: out.vocal_energy,
        notices: out.notices,
    }
}
