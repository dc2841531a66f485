//! Plan-caching FFT wrapper for real signals.
//!
//! Wraps rustfft with the real-signal convention used throughout the
//! engine: a forward transform of `size` real samples yields `size/2 + 1`
//! complex bins (DC through Nyquist); the inverse reconstructs the full
//! spectrum by conjugate mirroring and normalizes by `1/size`.
//!
//! Plans are cached per size; [`resize`](SpectralFft::resize) replans only
//! when the size actually changes, so the engine can call it every block.

use std::sync::Arc;

use rustfft::{FftPlanner, num_complex::Complex};

/// Forward/inverse FFT pair with preallocated scratch.
///
/// The processing methods are allocation-free; callers provide bin and
/// time buffers of the documented lengths.
pub struct SpectralFft {
    planner: FftPlanner<f32>,
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
    scratch: Vec<Complex<f32>>,
    /// rustfft's in-place working memory, sized at plan time.
    work: Vec<Complex<f32>>,
}

impl SpectralFft {
    /// Creates a transform pair for the given size (must be a power of
    /// two for the engine's use, though rustfft accepts any size).
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let work_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            planner,
            forward,
            inverse,
            size,
            scratch: vec![Complex::new(0.0, 0.0); size],
            work: vec![Complex::new(0.0, 0.0); work_len],
        }
    }

    /// Transform size in samples.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of usable bins: `size/2 + 1` (DC through Nyquist).
    pub fn bin_count(&self) -> usize {
        self.size / 2 + 1
    }

    /// Replans for a new size if it changed.
    pub fn resize(&mut self, size: usize) {
        if size != self.size {
            self.forward = self.planner.plan_fft_forward(size);
            self.inverse = self.planner.plan_fft_inverse(size);
            self.size = size;
            self.scratch.resize(size, Complex::new(0.0, 0.0));
            self.scratch.fill(Complex::new(0.0, 0.0));
            let work_len = self
                .forward
                .get_inplace_scratch_len()
                .max(self.inverse.get_inplace_scratch_len());
            self.work.resize(work_len, Complex::new(0.0, 0.0));
        }
    }

    /// Forward transform: `size` real samples into `size/2 + 1` bins.
    ///
    /// # Panics
    ///
    /// Debug-asserts the buffer lengths; mismatched sizes are a
    /// programming defect.
    pub fn forward(&mut self, time: &[f32], bins: &mut [Complex<f32>]) {
        debug_assert_eq!(time.len(), self.size, "time buffer must match FFT size");
        debug_assert_eq!(bins.len(), self.bin_count(), "bin buffer must be size/2 + 1");
        for (slot, &sample) in self.scratch.iter_mut().zip(time.iter()) {
            *slot = Complex::new(sample, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.scratch, &mut self.work);
        let bin_count = self.bin_count();
        bins.copy_from_slice(&self.scratch[..bin_count]);
    }

    /// Inverse transform: `size/2 + 1` bins back into `size` real samples,
    /// normalized by `1/size`.
    pub fn inverse(&mut self, bins: &[Complex<f32>], time: &mut [f32]) {
        debug_assert_eq!(bins.len(), self.bin_count(), "bin buffer must be size/2 + 1");
        debug_assert_eq!(time.len(), self.size, "time buffer must match FFT size");
        let half = self.size / 2;
        self.scratch[..bins.len()].copy_from_slice(bins);
        // Negative frequencies by conjugate symmetry.
        for i in 1..half {
            self.scratch[self.size - i] = bins[i].conj();
        }
        self.inverse
            .process_with_scratch(&mut self.scratch, &mut self.work);
        let scale = 1.0 / self.size as f32;
        for (out, c) in time.iter_mut().zip(self.scratch.iter()) {
            *out = c.re * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    #[test]
    fn round_trip_recovers_signal() {
        let mut fft = SpectralFft::new(256);
        let input: Vec<f32> = (0..256)
            .map(|i| (2.0 * PI * 10.0 * i as f32 / 256.0).sin())
            .collect();

        let mut bins = vec![Complex::new(0.0, 0.0); fft.bin_count()];
        let mut output = vec![0.0; 256];
        fft.forward(&input, &mut bins);
        fft.inverse(&bins, &mut output);

        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 1e-4, "mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn dc_signal_lands_in_dc_bin() {
        let mut fft = SpectralFft::new(256);
        let input = vec![1.0; 256];
        let mut bins = vec![Complex::new(0.0, 0.0); fft.bin_count()];
        fft.forward(&input, &mut bins);

        let dc = bins[0].norm();
        let rest: f32 = bins[1..].iter().map(|c| c.norm()).sum();
        assert!(dc > rest * 10.0, "dc {dc} not dominant over {rest}");
    }

    #[test]
    fn resize_replans() {
        let mut fft = SpectralFft::new(128);
        fft.resize(512);
        assert_eq!(fft.size(), 512);
        assert_eq!(fft.bin_count(), 257);

        let input = vec![0.5; 512];
        let mut bins = vec![Complex::new(0.0, 0.0); 257];
        let mut output = vec![0.0; 512];
        fft.forward(&input, &mut bins);
        fft.inverse(&bins, &mut output);
        assert!((output[100] - 0.5).abs() < 1e-4);
    }
}
