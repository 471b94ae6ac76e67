//! Detection-path sample-rate conversion using a rubato `SincFixedIn` resampler.
//!
//! ## Design
//!
//! The removal strategies run at the chunk's native rate, the voice activity
//! detector at 16 kHz mono. `DetectionResampler` downmixes and converts each
//! chunk span in one call. The sinc interpolator's windowed low-pass is what
//! band-limits the signal before decimation, so content above the detection
//! Nyquist does not alias into the vocal band.
//!
//! When native rate == detection rate the converter is a plain downmix; no
//! rubato session is created at all.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = DetectionResampler::new(44_100, 16_000)?;
//! let mono16k = rc.process(&interleaved, 2)?;
//! ```

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::audio::downmix_to_mono;
use crate::error::{KaraokeError, Result};

/// Input frames per rubato call.
const BLOCK: usize = 1024;

/// Converts interleaved audio at a fixed native rate to mono at the detection rate.
pub struct DetectionResampler {
    /// `None` when native rate == detection rate (passthrough mode).
    resampler: Option<SincFixedIn<f32>>,
    ratio: f64,
    native_rate: u32,
    target_rate: u32,
}

impl DetectionResampler {
    /// Create a new converter.
    ///
    /// # Errors
    /// Returns `KaraokeError::Resampler` if either rate is zero or rubato
    /// fails to initialise.
    pub fn new(native_rate: u32, target_rate: u32) -> Result<Self> {
        if native_rate == 0 || target_rate == 0 {
            return Err(KaraokeError::Resampler(format!(
                "invalid rates {native_rate} -> {target_rate}"
            )));
        }
        let ratio = target_rate as f64 / native_rate as f64;
        if native_rate == target_rate {
            return Ok(Self {
                resampler: None,
                ratio,
                native_rate,
                target_rate,
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            // Cutoff relative to the lower of the two Nyquist frequencies.
            f_cutoff: 0.92,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, BLOCK, 1)
            .map_err(|e| KaraokeError::Resampler(format!("resampler init: {e}")))?;

        debug!(
            native_rate,
            target_rate,
            delay = resampler.output_delay(),
            "detection resampler ready"
        );

        Ok(Self {
            resampler: Some(resampler),
            ratio,
            native_rate,
            target_rate,
        })
    }

    /// Downmix `interleaved` and convert it to the detection rate.
    ///
    /// The output length is `round(frames * target / native)`; the resampler's
    /// group delay is removed so output sample `i` lines up with input time
    /// `i / target_rate`. State is reset on every call, so spans are
    /// converted independently.
    pub fn process(&mut self, interleaved: &[f32], channels: u16) -> Result<Vec<f32>> {
        let mono = downmix_to_mono(interleaved, channels);
        let Some(ref mut resampler) = self.resampler else {
            return Ok(mono);
        };

        resampler.reset();
        let expected = (mono.len() as f64 * self.ratio).round() as usize;
        let delay = resampler.output_delay();
        let mut out: Vec<f32> = Vec::with_capacity(expected + delay + BLOCK);

        let mut pos = 0usize;
        while pos + BLOCK <= mono.len() {
            let block = resampler
                .process(&[&mono[pos..pos + BLOCK]], None)
                .map_err(|e| KaraokeError::Resampler(e.to_string()))?;
            out.extend_from_slice(&block[0]);
            pos += BLOCK;
        }
        if pos < mono.len() {
            let block = resampler
                .process_partial(Some(&[&mono[pos..]]), None)
                .map_err(|e| KaraokeError::Resampler(e.to_string()))?;
            out.extend_from_slice(&block[0]);
        }
        // Flush the filter tail until the delayed signal is fully out.
        while out.len() < expected + delay {
            let block = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| KaraokeError::Resampler(e.to_string()))?;
            if block[0].is_empty() {
                break;
            }
            out.extend_from_slice(&block[0]);
        }

        out.drain(..delay.min(out.len()));
        out.resize(expected, 0.0);
        Ok(out)
    }

    /// Returns `true` when native rate == detection rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn native_rate(&self) -> u32 {
        self.native_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}
