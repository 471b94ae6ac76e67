//! Short-term energy detector.
//!
//! ## Algorithm
//!
//! 1. Split the chunk into frames (`frame_ms` long, `hop_ms` apart).
//! 2. Mean squared amplitude per frame.
//! 3. Divide by the chunk's loudest frame, or by the loudest frame seen this
//!    session (`EnergyNormalization::Running`).
//! 4. A frame is active above the threshold (fixed, or mean + k·std of the
//!    chunk's normalized energies), and, if a vocal guide is in use, only
//!    where the guide shows removed energy of at least `guide_floor`.
//! 5. Runs of active frames become segments; close ones merge, short ones drop.

use tracing::trace;

use super::segments::{drop_short, merge_close, runs_to_segments};
use super::{
    DetectionReport, DetectorConfig, EnergyNormalization, FrameEnergy, ThresholdMode,
    VoiceActivityDetector,
};
use crate::removal::VocalEnergyEstimate;

/// Frame energies at or below this are treated as digital silence.
const SILENCE_FLOOR: f32 = 1e-10;

#[derive(Debug, Clone)]
pub struct EnergyDetector {
    config: DetectorConfig,
    /// Loudest raw frame energy seen since the last reset.
    running_max: f32,
}

impl EnergyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            running_max: 0.0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Mean squared amplitude of a sample slice.
    fn energy(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32
    }

    fn threshold(&self, normalized: &[f32]) -> f32 {
        match self.config.threshold {
            ThresholdMode::Fixed(t) => t,
            ThresholdMode::Adaptive { k } => {
                let n = normalized.len().max(1) as f32;
                let mean = normalized.iter().sum::<f32>() / n;
                let var = normalized.iter().map(|e| (e - mean).powi(2)).sum::<f32>() / n;
                mean + k * var.sqrt()
            }
        }
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl VoiceActivityDetector for EnergyDetector {
    fn detect(
        &mut self,
        mono: &[f32],
        sample_rate: u32,
        guide: Option<&VocalEnergyEstimate>,
    ) -> DetectionReport {
        if mono.is_empty() || sample_rate == 0 {
            return DetectionReport::default();
        }
        let rate = sample_rate as f64;
        let frame_len = ((rate * self.config.frame_ms as f64 / 1000.0).round() as usize).max(1);
        let hop = ((rate * self.config.hop_ms as f64 / 1000.0).round() as usize).max(1);
        let frame_count = if mono.len() <= frame_len {
            1
        } else {
            (mono.len() - frame_len) / hop + 1
        };

        let raw: Vec<f32> = (0..frame_count)
            .map(|i| {
                let start = i * hop;
                Self::energy(&mono[start..(start + frame_len).min(mono.len())])
            })
            .collect();

        let chunk_max = raw.iter().copied().fold(0.0f32, f32::max);
        let denom = match self.config.normalization {
            EnergyNormalization::Chunk => chunk_max,
            EnergyNormalization::Running => {
                self.running_max = self.running_max.max(chunk_max);
                self.running_max
            }
        };

        let normalized: Vec<f32> = raw
            .iter()
            .map(|&e| if denom > SILENCE_FLOOR { e / denom } else { 0.0 })
            .collect();

        let frames: Vec<FrameEnergy> = raw
            .iter()
            .zip(&normalized)
            .enumerate()
            .map(|(i, (&raw_energy, &normalized_energy))| FrameEnergy {
                frame_index: i,
                time: (i * hop) as f64 / rate,
                raw_energy,
                normalized_energy,
            })
            .collect();

        if chunk_max <= SILENCE_FLOOR {
            trace!(frames = frame_count, "silent chunk, no segments");
            return DetectionReport {
                frames,
                segments: Vec::new(),
            };
        }

        let tau = self.threshold(&normalized);
        let half_frame = frame_len as f64 / (2.0 * rate);
        let guide_peak = guide.map(VocalEnergyEstimate::max).unwrap_or(0.0);
        let gate = self.config.use_vocal_guide && guide_peak > SILENCE_FLOOR;

        let active: Vec<bool> = frames
            .iter()
            .map(|f| {
                let loud = f.normalized_energy > tau;
                match guide {
                    Some(g) if gate => {
                        loud && g.energy_at(f.time + half_frame) / guide_peak
                            >= self.config.guide_floor
                    }
                    _ => loud,
                }
            })
            .collect();

        let limit = mono.len() as f64 / rate;
        let raw_segments = runs_to_segments(&active, |i| (i * hop) as f64 / rate + half_frame, limit);
        let merged = merge_close(&raw_segments, self.config.min_gap_ms as f64 / 1000.0);
        let segments = drop_short(merged, self.config.min_segment_ms as f64 / 1000.0);

        trace!(
            frames = frame_count,
            threshold = tau,
            raw = raw_segments.len(),
            kept = segments.len(),
            "chunk detection"
        );

        DetectionReport { frames, segments }
    }

    fn reset(&mut self) {
        self.running_max = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VocalSegment;
    use std::f32::consts::PI;

    const RATE: u32 = 16_000;

    /// Silence with a 440 Hz burst over `[from, to)` seconds.
    fn burst(total_secs: f64, from: f64, to: f64, amp: f32) -> Vec<f32> {
        let n = (total_secs * RATE as f64) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / RATE as f64;
                if t >= from && t < to {
                    amp * (2.0 * PI * 440.0 * t as f32).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn single_burst_yields_one_segment_within_one_hop() {
        let signal = burst(5.0, 2.0, 3.2, 0.6);
        let mut det = EnergyDetector::default();
        let report = det.detect(&signal, RATE, None);

        assert_eq!(report.segments.len(), 1, "{:?}", report.segments);
        let seg = report.segments[0];
        let hop = 0.010;
        assert!((seg.start - 2.0).abs() <= hop, "start={}", seg.start);
        assert!((seg.end - 3.2).abs() <= hop, "end={}", seg.end);
    }

    #[test]
    fn silent_chunk_produces_frames_but_no_segments() {
        let mut det = EnergyDetector::default();
        let report = det.detect(&vec![0.0; 16_000], RATE, None);
        assert!(report.segments.is_empty());
        assert_eq!(report.frames.len(), (16_000 - 400) / 160 + 1);
        assert!(report.frames.iter().all(|f| f.normalized_energy == 0.0));
    }

    #[test]
    fn short_blip_is_dropped() {
        let signal = burst(2.0, 1.0, 1.1, 0.6);
        let report = EnergyDetector::default().detect(&signal, RATE, None);
        assert!(report.segments.is_empty());
    }

    #[test]
    fn nearby_bursts_merge() {
        let mut signal = burst(4.0, 0.5, 1.2, 0.6);
        let second = burst(4.0, 1.35, 2.0, 0.6);
        for (a, b) in signal.iter_mut().zip(second) {
            *a += b;
        }
        let report = EnergyDetector::default().detect(&signal, RATE, None);
        assert_eq!(report.segments.len(), 1);
    }

    #[test]
    fn adaptive_threshold_finds_burst() {
        let signal = burst(5.0, 1.0, 2.0, 0.5);
        let mut det = EnergyDetector::new(DetectorConfig {
            threshold: ThresholdMode::Adaptive { k: 0.5 },
            ..DetectorConfig::default()
        });
        let report = det.detect(&signal, RATE, None);
        assert_eq!(report.segments.len(), 1);
    }

    #[test]
    fn running_normalization_remembers_loud_chunks() {
        let mut det = EnergyDetector::new(DetectorConfig {
            normalization: EnergyNormalization::Running,
            ..DetectorConfig::default()
        });
        let loud = burst(3.0, 1.0, 2.0, 0.8);
        assert_eq!(det.detect(&loud, RATE, None).segments.len(), 1);

        // A quiet burst (under 2 % of the loud energy) falls below the threshold.
        let quiet = burst(3.0, 1.0, 2.0, 0.1);
        assert!(det.detect(&quiet, RATE, None).segments.is_empty());

        det.reset();
        assert_eq!(det.detect(&quiet, RATE, None).segments.len(), 1);
    }

    #[test]
    fn vocal_guide_gates_instrumental_energy() {
        // Loud content everywhere in [0.5, 3.5), but the removal stage only
        // took energy out of [1.0, 2.0).
        let signal = burst(4.0, 0.5, 3.5, 0.5);
        let hop_secs = 0.032;
        let energy = (0..(4.0 / hop_secs) as usize)
            .map(|i| {
                let t = i as f64 * hop_secs;
                if (1.0..2.0).contains(&t) { 0.2 } else { 0.0 }
            })
            .collect();
        let guide = VocalEnergyEstimate { hop_secs, energy };

        let report = EnergyDetector::default().detect(&signal, RATE, Some(&guide));
        assert_eq!(report.segments.len(), 1);
        let VocalSegment { start, end } = report.segments[0];
        assert!((start - 1.0).abs() < 0.05, "start={start}");
        assert!((end - 2.0).abs() < 0.05, "end={end}");

        let mut ungated = EnergyDetector::new(DetectorConfig {
            use_vocal_guide: false,
            ..DetectorConfig::default()
        });
        let seg = ungated.detect(&signal, RATE, Some(&guide)).segments[0];
        assert!((seg.start - 0.5).abs() < 0.02);
    }
}
