//! Short-time Fourier transform with overlap-add resynthesis.
//!
//! Frames are windowed with a periodic Hann window at 50 % overlap, which
//! satisfies the constant-overlap-add condition (`w[n] + w[n + N/2] = 1`).
//! The signal is centre-padded by half a frame so every input sample is
//! covered by exactly two frames, and the accumulated window sum is divided
//! out after overlap-add. With an untouched spectrum the output equals the
//! input up to FFT rounding.

use std::ops::Range;
use std::sync::Arc;

use rustfft::{num_complex::Complex32, num_traits::Zero, Fft, FftPlanner};

/// Shortest analysis frame, in samples.
pub const MIN_FRAME_SIZE: usize = 1024;

/// Target frame duration before rounding up to a power of two.
const TARGET_FRAME_SECS: f64 = 0.046;

/// Planned forward/inverse transforms for one frame size.
pub struct Stft {
    size: usize,
    hop: usize,
    sample_rate: u32,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    /// Plan a transform sized for `sample_rate` (see [`frame_size_for_rate`]).
    pub fn for_rate(sample_rate: u32) -> Self {
        Self::with_size(frame_size_for_rate(sample_rate), sample_rate)
    }

    /// Plan a transform with an explicit power-of-two frame size.
    pub fn with_size(size: usize, sample_rate: u32) -> Self {
        debug_assert!(size.is_power_of_two() && size >= 2);
        let mut planner = FftPlanner::<f32>::new();
        Self {
            size,
            hop: size / 2,
            sample_rate,
            window: periodic_hann(size),
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Positive-frequency bins whose centre frequency lies in `[low_hz, high_hz]`.
    pub fn band_bins(&self, low_hz: f32, high_hz: f32) -> Range<usize> {
        let bin_hz = self.sample_rate as f32 / self.size as f32;
        let nyquist_bin = self.size / 2;
        let lo = ((low_hz / bin_hz).ceil().max(0.0) as usize).min(nyquist_bin + 1);
        let hi = ((high_hz / bin_hz).floor().max(0.0) as usize + 1).min(nyquist_bin + 1);
        lo..hi.max(lo)
    }

    /// Run `edit` on every frame's spectrum and resynthesise the signal.
    ///
    /// `edit(frame_index, spectrum)` may change bins `0..=size/2`; the
    /// negative-frequency half is rebuilt as their complex conjugate so the
    /// inverse transform stays real.
    pub fn process<F>(&self, signal: &[f32], mut edit: F) -> Vec<f32>
    where
        F: FnMut(usize, &mut [Complex32]),
    {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let size = self.size;
        let hop = self.hop;
        let pad = size / 2;
        let frames = (pad + n) / hop + 1;
        let padded_len = (frames - 1) * hop + size;

        let mut padded = vec![0.0f32; padded_len];
        padded[pad..pad + n].copy_from_slice(signal);

        let mut out = vec![0.0f32; padded_len];
        let mut window_sum = vec![0.0f32; padded_len];
        let mut buf = vec![Complex32::zero(); size];
        let scale = 1.0 / size as f32;

        for fr in 0..frames {
            let start = fr * hop;
            let frame = &padded[start..start + size];
            for i in 0..size {
                buf[i] = Complex32::new(frame[i] * self.window[i], 0.0);
            }

            self.forward.process(&mut buf);
            edit(fr, &mut buf);

            // Mirror the positive half; DC and Nyquist must be real.
            for k in 1..size / 2 {
                buf[size - k] = buf[k].conj();
            }
            buf[0].im = 0.0;
            buf[size / 2].im = 0.0;

            self.inverse.process(&mut buf);

            for i in 0..size {
                out[start + i] += buf[i].re * scale;
                window_sum[start + i] += self.window[i];
            }
        }

        for (s, w) in out.iter_mut().zip(&window_sum) {
            if *w > 1e-6 {
                *s /= w;
            }
        }

        out[pad..pad + n].to_vec()
    }
}

/// Frame size for spectral processing at `sample_rate`: the smallest power of
/// two that is at least 1024 samples and at least ~46 ms long.
pub fn frame_size_for_rate(sample_rate: u32) -> usize {
    let target = (sample_rate as f64 * TARGET_FRAME_SECS).ceil() as usize;
    target.max(MIN_FRAME_SIZE).next_power_of_two()
}

/// Periodic Hann window (COLA at 50 % overlap).
fn periodic_hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
        .collect()
}
