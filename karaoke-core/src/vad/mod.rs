//! Vocal activity detection.
//!
//! The `VoiceActivityDetector` trait is the extensibility point: the pipeline
//! hands each chunk's mono detection signal (plus, when available, the energy
//! of whatever the removal strategy took out) to a detector and gets back
//! chunk-local vocal segments. `EnergyDetector` is the only implementation.

pub mod energy;
pub mod segments;

pub use energy::EnergyDetector;

use serde::{Deserialize, Serialize};

use crate::removal::VocalEnergyEstimate;

/// A time interval, in seconds, judged to contain vocals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocalSegment {
    pub start: f64,
    pub end: f64,
}

impl VocalSegment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.start + self.end)
    }

    /// Shift into another time base (e.g. chunk-local to global).
    pub fn offset(&self, by: f64) -> Self {
        Self::new(self.start + by, self.end + by)
    }

    /// True if the two intervals share any time (touching counts).
    pub fn intersects(&self, other: &VocalSegment) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest interval covering both.
    pub fn union(&self, other: &VocalSegment) -> Self {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Energy of one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEnergy {
    pub frame_index: usize,
    /// Frame start in chunk-local seconds.
    pub time: f64,
    pub raw_energy: f32,
    pub normalized_energy: f32,
}

/// Per-chunk detector output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub frames: Vec<FrameEnergy>,
    pub segments: Vec<VocalSegment>,
}

/// How frames are classified as active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdMode {
    /// Active when normalized energy exceeds the value.
    Fixed(f32),
    /// Active when normalized energy exceeds `mean + k·std` of the chunk.
    Adaptive { k: f32 },
}

impl Default for ThresholdMode {
    fn default() -> Self {
        ThresholdMode::Fixed(0.1)
    }
}

/// What frame energies are divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnergyNormalization {
    /// The loudest frame of the current chunk.
    #[default]
    Chunk,
    /// The loudest frame seen so far in the session. Makes detection
    /// order-dependent.
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct DetectorConfig {
    pub frame_ms: f32,
    pub hop_ms: f32,
    pub threshold: ThresholdMode,
    pub normalization: EnergyNormalization,
    /// Raw segments closer than this merge.
    pub min_gap_ms: f32,
    /// Merged segments shorter than this are dropped.
    pub min_segment_ms: f32,
    /// Gate frames on the removal strategy's vocal-energy estimate when one
    /// is available.
    pub use_vocal_guide: bool,
    /// Minimum guide energy (relative to the guide's peak) for a frame to
    /// stay active.
    pub guide_floor: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            frame_ms: 25.0,
            hop_ms: 10.0,
            threshold: ThresholdMode::default(),
            normalization: EnergyNormalization::default(),
            min_gap_ms: 250.0,
            min_segment_ms: 300.0,
            use_vocal_guide: true,
            guide_floor: 0.1,
        }
    }
}

impl DetectorConfig {
    pub fn normalize(&mut self) {
        self.frame_ms = self.frame_ms.clamp(5.0, 200.0);
        self.hop_ms = self.hop_ms.clamp(1.0, self.frame_ms);
        self.threshold = match self.threshold {
            ThresholdMode::Fixed(t) => ThresholdMode::Fixed(t.clamp(0.0, 1.0)),
            ThresholdMode::Adaptive { k } => ThresholdMode::Adaptive { k: k.clamp(-3.0, 10.0) },
        };
        self.min_gap_ms = self.min_gap_ms.clamp(0.0, 5_000.0);
        self.min_segment_ms = self.min_segment_ms.clamp(0.0, 10_000.0);
        self.guide_floor = self.guide_floor.clamp(0.0, 1.0);
    }

    /// Detection for chunk N depends on chunk N-1.
    pub fn is_sequential(&self) -> bool {
        self.normalization == EnergyNormalization::Running
    }
}

/// Trait for vocal activity detectors.
///
/// Implementors may carry state across chunks (a running maximum); such
/// detectors must see chunks in order.
pub trait VoiceActivityDetector: Send {
    /// Analyse one chunk of mono audio and return its frame energies and
    /// chunk-local vocal segments.
    fn detect(
        &mut self,
        mono: &[f32],
        sample_rate: u32,
        guide: Option<&VocalEnergyEstimate>,
    ) -> DetectionReport;

    /// Forget anything carried from earlier chunks.
    fn reset(&mut self);
}
