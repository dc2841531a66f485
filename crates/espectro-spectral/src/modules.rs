//! Built-in frequency-domain effect modules.
//!
//! Deliberately small: the pipeline treats effect algorithms as pluggable
//! units behind [`SpectralModule`](crate::SpectralModule), and these three
//! exist to exercise that contract — an identity unit with an observable
//! counter, a broadband gain, and a spectral tilt.

use std::sync::Arc;

use espectro_core::{ParamDetails, ParameterValue};

use crate::block::SpectrumBlock;
use crate::module::SpectralModule;

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Identity module. Counts the frames it has processed so tests can
/// observe whether a lane's chain is running.
#[derive(Debug, Default)]
pub struct Passthrough {
    frames: u64,
}

impl Passthrough {
    /// Creates the module with the counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames the module has been applied to.
    pub fn frames_applied(&self) -> u64 {
        self.frames
    }
}

impl SpectralModule for Passthrough {
    fn type_id(&self) -> &'static str {
        "passthrough"
    }

    fn apply(&mut self, _block: &mut SpectrumBlock) {
        self.frames += 1;
    }

    fn reset(&mut self) {
        self.frames = 0;
    }
}

/// Broadband gain applied uniformly to every bin.
pub struct SpectralGain {
    params: [Arc<ParameterValue>; 1],
}

impl Default for SpectralGain {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralGain {
    /// Creates the module at unity gain.
    pub fn new() -> Self {
        Self {
            params: [Arc::new(ParameterValue::new(ParamDetails::gain_db(
                "Gain", "Gain", -24.0, 24.0, 0.0,
            )))],
        }
    }

    /// The gain parameter.
    pub fn gain(&self) -> &Arc<ParameterValue> {
        &self.params[0]
    }
}

impl SpectralModule for SpectralGain {
    fn type_id(&self) -> &'static str {
        "spectral_gain"
    }

    fn apply(&mut self, block: &mut SpectrumBlock) {
        let linear = db_to_linear(self.params[0].scalar(false));
        for channel in 0..block.channel_count() {
            for bin in block.channel_mut(channel) {
                *bin *= linear;
            }
        }
    }

    fn params(&self) -> &[Arc<ParameterValue>] {
        &self.params
    }
}

/// Spectral tilt: a dB/octave slope pivoting at 1 kHz.
///
/// Positive slopes brighten, negative darken. The per-bin gain table is
/// rebuilt in `prepare`, so `apply` is a multiply per bin.
pub struct SpectralTilt {
    params: [Arc<ParameterValue>; 1],
    gains: Vec<f32>,
    sample_rate: f32,
    fft_size: usize,
    /// Slope the gain table was built for.
    cached_slope: f32,
}

/// Tilt pivot frequency in Hz.
const PIVOT_HZ: f32 = 1000.0;

impl Default for SpectralTilt {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTilt {
    /// Creates the module with a flat slope.
    pub fn new() -> Self {
        Self {
            params: [Arc::new(ParameterValue::new(
                ParamDetails::linear("Tilt", "Tilt", -12.0, 12.0, 0.0).with_unit(" dB/oct"),
            ))],
            gains: Vec::new(),
            sample_rate: 0.0,
            fft_size: 0,
            cached_slope: 0.0,
        }
    }

    /// The slope parameter in dB/octave.
    pub fn slope(&self) -> &Arc<ParameterValue> {
        &self.params[0]
    }

    fn rebuild_gains(&mut self, slope: f32) {
        let bins = self.fft_size / 2 + 1;
        self.gains.resize(bins, 1.0);
        self.gains[0] = 1.0;
        for bin in 1..bins {
            let freq = bin as f32 * self.sample_rate / self.fft_size as f32;
            let octaves = (freq / PIVOT_HZ).log2();
            self.gains[bin] = db_to_linear(slope * octaves);
        }
        self.cached_slope = slope;
    }
}

impl SpectralModule for SpectralTilt {
    fn type_id(&self) -> &'static str {
        "spectral_tilt"
    }

    fn prepare(&mut self, sample_rate: f32, fft_size: usize) {
        self.sample_rate = sample_rate;
        self.fft_size = fft_size;
        self.rebuild_gains(self.params[0].scalar(false));
    }

    fn apply(&mut self, block: &mut SpectrumBlock) {
        if self.fft_size != block.fft_size() || self.sample_rate != block.sample_rate() {
            // Defensive resync; prepare should have run at the boundary.
            self.sample_rate = block.sample_rate();
            self.fft_size = block.fft_size();
            self.rebuild_gains(self.params[0].scalar(false));
        }
        let slope = self.params[0].scalar(false);
        if slope != self.cached_slope {
            self.rebuild_gains(slope);
        }
        for channel in 0..block.channel_count() {
            for (bin, gain) in block.channel_mut(channel).iter_mut().zip(self.gains.iter()) {
                *bin *= *gain;
            }
        }
    }

    fn params(&self) -> &[Arc<ParameterValue>] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use rustfft::num_complex::Complex;

    use super::*;

    fn block_with_ones(channels: usize) -> SpectrumBlock {
        let mut block = SpectrumBlock::new(channels, 1024, 48000.0);
        for c in 0..channels {
            for bin in block.channel_mut(c) {
                *bin = Complex::new(1.0, 0.0);
            }
        }
        block
    }

    #[test]
    fn passthrough_counts_frames() {
        let mut module = Passthrough::new();
        let mut block = block_with_ones(1);
        let before = block.channel(0).to_vec();

        module.apply(&mut block);
        module.apply(&mut block);
        assert_eq!(module.frames_applied(), 2);
        assert_eq!(block.channel(0), &before[..]);

        module.reset();
        assert_eq!(module.frames_applied(), 0);
    }

    #[test]
    fn gain_scales_all_bins() {
        let mut module = SpectralGain::new();
        module.gain().set_normalised(module.gain().details().normalize(6.0));
        module.gain().update_values(48000.0, 512, None);

        let mut block = block_with_ones(2);
        module.apply(&mut block);

        let expected = db_to_linear(6.0);
        for c in 0..2 {
            for bin in block.channel(c) {
                assert!((bin.re - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn tilt_pivots_at_1k() {
        let mut module = SpectralTilt::new();
        module
            .slope()
            .set_normalised(module.slope().details().normalize(6.0));
        module.slope().update_values(48000.0, 512, None);
        module.prepare(48000.0, 1024);

        let mut block = block_with_ones(1);
        module.apply(&mut block);

        // Bin nearest 1 kHz stays ~unity; an octave above gains ~6 dB.
        let pivot_bin = (1000.0_f64 / (48000.0 / 1024.0)).round() as usize;
        let octave_bin = pivot_bin * 2;
        let pivot_gain = block.channel(0)[pivot_bin].re;
        let octave_gain = block.channel(0)[octave_bin].re;
        assert!((pivot_gain - 1.0).abs() < 0.05, "pivot gain {pivot_gain}");
        assert!(
            (octave_gain - db_to_linear(6.0)).abs() < 0.1,
            "octave gain {octave_gain}"
        );
    }
}
