//! Frequency-domain block passed through the effect lanes.

use rustfft::num_complex::Complex;

/// One frame of spectra: `fft_size/2 + 1` complex bins per channel, plus
/// the context (size, rate) modules need to interpret them.
///
/// Blocks are preallocated by the engine and reused every frame; none of
/// the per-frame operations allocate.
#[derive(Debug, Clone)]
pub struct SpectrumBlock {
    fft_size: usize,
    sample_rate: f32,
    channels: Vec<Vec<Complex<f32>>>,
}

impl SpectrumBlock {
    /// Creates a cleared block for the given channel count and FFT size.
    pub fn new(channels: usize, fft_size: usize, sample_rate: f32) -> Self {
        let bins = fft_size / 2 + 1;
        Self {
            fft_size,
            sample_rate,
            channels: vec![vec![Complex::new(0.0, 0.0); bins]; channels],
        }
    }

    /// FFT size the bins were produced with.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Sample rate of the underlying stream in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Bins per channel (`fft_size/2 + 1`).
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Center frequency of a bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate / self.fft_size as f32
    }

    /// One channel's bins.
    pub fn channel(&self, channel: usize) -> &[Complex<f32>] {
        &self.channels[channel]
    }

    /// One channel's bins, mutably.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [Complex<f32>] {
        &mut self.channels[channel]
    }

    /// Zeroes every bin.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(Complex::new(0.0, 0.0));
        }
    }

    /// Total spectral energy of one channel (sum of squared magnitudes).
    pub fn energy(&self, channel: usize) -> f32 {
        self.channels[channel].iter().map(|c| c.norm_sqr()).sum()
    }

    /// Copies a channel's bins from another block.
    pub fn copy_channel_from(&mut self, channel: usize, other: &Self, other_channel: usize) {
        debug_assert_eq!(self.bin_count(), other.bin_count());
        self.channels[channel].copy_from_slice(&other.channels[other_channel]);
    }

    /// Accumulates a channel's bins from another block.
    pub fn add_channel_from(&mut self, channel: usize, other: &Self, other_channel: usize) {
        debug_assert_eq!(self.bin_count(), other.bin_count());
        for (dst, src) in self.channels[channel]
            .iter_mut()
            .zip(other.channels[other_channel].iter())
        {
            *dst += src;
        }
    }

    /// Reconfigures the block for a new layout, clearing all bins.
    pub fn reconfigure(&mut self, channels: usize, fft_size: usize, sample_rate: f32) {
        let bins = fft_size / 2 + 1;
        self.fft_size = fft_size;
        self.sample_rate = sample_rate;
        self.channels
            .resize_with(channels, || vec![Complex::new(0.0, 0.0); bins]);
        for channel in &mut self.channels {
            channel.resize(bins, Complex::new(0.0, 0.0));
            channel.fill(Complex::new(0.0, 0.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_frequencies() {
        let block = SpectrumBlock::new(2, 1024, 48000.0);
        assert_eq!(block.bin_count(), 513);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.bin_frequency(0), 0.0);
        assert!((block.bin_frequency(512) - 24000.0).abs() < 1e-3);
    }

    #[test]
    fn energy_and_accumulate() {
        let mut a = SpectrumBlock::new(1, 8, 48000.0);
        let mut b = SpectrumBlock::new(1, 8, 48000.0);
        a.channel_mut(0)[1] = Complex::new(3.0, 4.0);
        b.channel_mut(0)[1] = Complex::new(1.0, 0.0);

        assert!((a.energy(0) - 25.0).abs() < 1e-6);

        b.add_channel_from(0, &a, 0);
        assert_eq!(b.channel(0)[1], Complex::new(4.0, 4.0));

        b.copy_channel_from(0, &a, 0);
        assert_eq!(b.channel(0)[1], Complex::new(3.0, 4.0));

        b.clear();
        assert_eq!(b.energy(0), 0.0);
    }

    #[test]
    fn reconfigure_resizes_and_clears() {
        let mut block = SpectrumBlock::new(1, 8, 48000.0);
        block.channel_mut(0)[0] = Complex::new(1.0, 0.0);
        block.reconfigure(2, 16, 44100.0);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.bin_count(), 9);
        assert_eq!(block.energy(0), 0.0);
        assert_eq!(block.sample_rate(), 44100.0);
    }
}
