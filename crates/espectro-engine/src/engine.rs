//! The per-block spectral pipeline.
//!
//! [`SoundEngine`] is driven by an external audio callback: once per
//! callback it drains pending structural edits, refreshes the block-scoped
//! parameters exactly once, then streams samples through the STFT chain —
//! input FIFO → window → forward FFT → effect lanes → inverse FFT →
//! overlap-add — and blends the result with a latency-compensated dry
//! path. Mid-block parameter changes defer to the next callback so the
//! transform configuration is stable for the duration of a block.
//!
//! Processing latency is one full transform block; the engine reports it
//! via [`latency_samples`](SoundEngine::latency_samples) so the host can
//! compensate. All steady-state processing is allocation-free: every
//! buffer is sized for the maximum transform at construction, and
//! transform reconfiguration (an order/window change) is the one path
//! allowed to touch capacity.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use espectro_core::{ParamDetails, ParameterBridge, ParameterValue};
use espectro_spectral::{SpectralFft, SpectrumBlock, WINDOW_NAMES, Window};

use crate::commands::{EditChannels, LaneCommand};
use crate::lanes::{EffectsState, MAX_LANES};
use crate::tree::{ProcessorId, ProcessorTree, next_processor_id};

/// Smallest supported FFT order (64-point transform).
pub const MIN_FFT_ORDER: usize = 6;

/// Largest supported FFT order (16384-point transform).
pub const MAX_FFT_ORDER: usize = 14;

/// Largest transform size; all streaming buffers are sized for it.
pub const MAX_FFT_SIZE: usize = 1 << MAX_FFT_ORDER;

/// Documented overlap ceiling: 63/64. Values between the ceiling and 1.0
/// clamp to it; exactly 1.0 is stored but processes at the ceiling.
pub const MAX_OVERLAP: f32 = 1.0 - 1.0 / 64.0;

/// The effective hop never drops below `fft_size / MIN_HOP_DIVISOR`.
const MIN_HOP_DIVISOR: usize = 64;

/// Length of the overlap-add accumulator ring.
const OLA_LEN: usize = 2 * MAX_FFT_SIZE;

/// Consumer of post-lane frequency-domain frames (a visualization tap).
///
/// While a consumer is attached the transform runs even at mix 0, so the
/// tap keeps receiving data; rendering itself is out of scope here.
pub trait AnalysisConsumer: Send + Sync {
    /// Receives each processed frame, synchronously on the render thread.
    fn consume_spectrum(&self, block: &SpectrumBlock);
}

/// Stream configuration fixed at engine construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Input/output channel count (1 or 2).
    pub channels: usize,
    /// Stream sample rate in Hz.
    pub sample_rate: f32,
    /// Number of host automation slots to expose.
    pub automation_slots: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000.0,
            automation_slots: 8,
        }
    }
}

/// The engine's block-scoped parameters.
///
/// Cloning shares the underlying values; hand a clone to the UI side
/// before moving the engine onto the render thread.
#[derive(Clone)]
pub struct EngineParams {
    /// Transform order; the block size is `2^order`. Indexed 6..=14.
    pub order: Arc<ParameterValue>,
    /// Analysis window kind, indexed over [`WINDOW_NAMES`].
    pub window: Arc<ParameterValue>,
    /// Window shape parameter (Tukey taper fraction; others ignore it).
    pub shape: Arc<ParameterValue>,
    /// Overlap fraction in \[0, [`MAX_OVERLAP`]\] ∪ {1.0}.
    pub overlap: Arc<ParameterValue>,
    /// Dry/wet mix, stereo-capable.
    pub mix: Arc<ParameterValue>,
}

impl EngineParams {
    fn new() -> Self {
        Self {
            order: Arc::new(ParameterValue::new(ParamDetails::indexed(
                "FFT Order",
                "Order",
                MIN_FFT_ORDER as i32,
                MAX_FFT_ORDER as i32,
                10,
            ))),
            window: Arc::new(ParameterValue::new(
                ParamDetails::indexed("Window", "Win", 0, WINDOW_NAMES.len() as i32 - 1, 1)
                    .with_lookup(WINDOW_NAMES),
            )),
            shape: Arc::new(ParameterValue::new(ParamDetails::linear(
                "Window Shape",
                "Shape",
                0.0,
                1.0,
                0.5,
            ))),
            overlap: Arc::new(ParameterValue::new(ParamDetails::linear(
                "Overlap", "Overlap", 0.0, 1.0, 0.5,
            ))),
            mix: Arc::new(ParameterValue::new(
                ParamDetails::unipolar("Mix", "Mix").with_stereo(),
            )),
        }
    }

    /// All engine parameters, in the order serialization uses.
    pub fn all(&self) -> [&Arc<ParameterValue>; 5] {
        [&self.order, &self.window, &self.shape, &self.overlap, &self.mix]
    }

    /// Sets the transform order (clamped to the supported range).
    pub fn set_order(&self, order: usize) {
        let clamped = order.clamp(MIN_FFT_ORDER, MAX_FFT_ORDER) as f32;
        self.order.set_normalised(self.order.details().normalize(clamped));
    }

    /// Sets the window kind by its index in [`WINDOW_NAMES`].
    pub fn set_window_index(&self, index: usize) {
        self.window
            .set_normalised(self.window.details().normalize(index as f32));
    }

    /// Sets the overlap fraction with the documented clamp policy:
    /// values in `(MAX_OVERLAP, 1.0)` store the ceiling, exactly 1.0
    /// stores 1.0.
    pub fn set_overlap(&self, fraction: f32) {
        let stored = if fraction >= 1.0 {
            1.0
        } else {
            fraction.clamp(0.0, MAX_OVERLAP)
        };
        self.overlap
            .set_normalised(self.overlap.details().normalize(stored));
    }

    /// Sets the dry/wet mix in \[0, 1\].
    pub fn set_mix(&self, mix: f32) {
        self.mix.set_normalised(self.mix.details().normalize(mix));
    }
}

/// Computes the hop in samples for a stored overlap fraction.
///
/// The hop is floored at `fft_size / 64`, so a stored overlap of 1.0
/// processes at the documented ceiling instead of freezing the stream.
pub fn effective_hop(fft_size: usize, overlap: f32) -> usize {
    let raw = (fft_size as f32 * (1.0 - overlap.clamp(0.0, 1.0))).round() as usize;
    raw.clamp((fft_size / MIN_HOP_DIVISOR).max(1), fft_size)
}

/// The spectral processing engine. One instance per stream; owned by the
/// render side once running.
pub struct SoundEngine {
    channels: usize,
    sample_rate: f32,
    params: EngineParams,
    bridges: Vec<Arc<ParameterBridge>>,
    effects: EffectsState,
    commands_rx: Receiver<LaneCommand>,
    tree: Option<ProcessorTree>,

    fft: SpectralFft,
    fft_size: usize,
    window: Window,
    window_shape: f32,
    window_coeffs: Vec<f32>,

    /// Per-channel input accumulation, `fft_size` samples in use.
    fifo: Vec<Vec<f32>>,
    fifo_fill: usize,
    /// Per-channel overlap-add accumulator ring.
    ola: Vec<Vec<f32>>,
    ola_read: usize,
    /// Per-channel dry delay ring (delay = one transform block).
    dry: Vec<Vec<f32>>,
    dry_pos: usize,
    /// Time-domain frame scratch.
    frame_time: Vec<f32>,
    spectrum_in: SpectrumBlock,
    spectrum_out: SpectrumBlock,
    analysis: Option<Arc<dyn AnalysisConsumer>>,
}

impl SoundEngine {
    /// Builds an engine and its processor tree. Take the tree with
    /// [`take_tree`](Self::take_tree) before moving the engine to the
    /// render thread.
    pub fn new(config: EngineConfig) -> Self {
        assert!(
            (1..=2).contains(&config.channels),
            "engine supports 1 or 2 channels"
        );
        let channels = config.channels;
        let sample_rate = config.sample_rate;
        let params = EngineParams::new();
        let fft_size = 1usize << params.order.index();
        let window = Window::from_index(params.window.index());
        let window_shape = params.shape.scalar(false);

        let engine_id = next_processor_id();
        let lane_ids: Vec<ProcessorId> = (0..MAX_LANES).map(|_| next_processor_id()).collect();
        let channels_pair = EditChannels::new();

        let effects = EffectsState::new(
            &lane_ids,
            channels,
            fft_size,
            sample_rate,
            channels_pair.retired_tx,
        );
        let tree = ProcessorTree::new(
            engine_id,
            params.all().iter().map(|p| Arc::clone(p)).collect(),
            &lane_ids,
            channels_pair.commands_tx,
            channels_pair.retired_rx,
            sample_rate,
            fft_size,
        );

        let bridges: Vec<Arc<ParameterBridge>> = (0..config.automation_slots)
            .map(ParameterBridge::new)
            .collect();
        for (bridge, param) in bridges.iter().zip(params.all().iter()) {
            bridge.rebind(Some(Arc::clone(param)), true);
        }

        let mut spectrum_in = SpectrumBlock::new(channels, MAX_FFT_SIZE, sample_rate);
        let mut spectrum_out = SpectrumBlock::new(channels, MAX_FFT_SIZE, sample_rate);
        spectrum_in.reconfigure(channels, fft_size, sample_rate);
        spectrum_out.reconfigure(channels, fft_size, sample_rate);

        Self {
            channels,
            sample_rate,
            params,
            bridges,
            effects,
            commands_rx: channels_pair.commands_rx,
            tree: Some(tree),
            fft: SpectralFft::new(fft_size),
            fft_size,
            window,
            window_shape,
            window_coeffs: window.coefficients(fft_size, window_shape),
            fifo: vec![vec![0.0; MAX_FFT_SIZE]; channels],
            fifo_fill: 0,
            ola: vec![vec![0.0; OLA_LEN]; channels],
            ola_read: 0,
            dry: vec![vec![0.0; MAX_FFT_SIZE]; channels],
            dry_pos: 0,
            frame_time: vec![0.0; MAX_FFT_SIZE],
            spectrum_in,
            spectrum_out,
            analysis: None,
        }
    }

    /// Hands the processor tree to the edit side. Call exactly once.
    ///
    /// # Panics
    ///
    /// Panics on a second call; the tree has a single owner.
    pub fn take_tree(&mut self) -> ProcessorTree {
        self.tree.take().expect("processor tree already taken")
    }

    /// The engine's block-scoped parameters.
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// The host automation slots, pre-bound to the engine parameters in
    /// [`EngineParams::all`] order.
    pub fn bridges(&self) -> &[Arc<ParameterBridge>] {
        &self.bridges
    }

    /// Current processing latency in samples (one transform block).
    pub fn latency_samples(&self) -> usize {
        self.fft_size
    }

    /// Stream channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Current analysis window coefficient table.
    pub fn window_table(&self) -> &[f32] {
        &self.window_coeffs
    }

    /// Attaches (or detaches) the visualization tap. Configured from the
    /// render side; while attached, the transform runs even at mix 0.
    pub fn set_analysis_consumer(&mut self, consumer: Option<Arc<dyn AnalysisConsumer>>) {
        self.analysis = consumer;
    }

    /// Clears all streaming state and module state; parameters and
    /// structure are untouched.
    pub fn reset(&mut self) {
        self.clear_streams();
        self.effects.reset();
    }

    fn clear_streams(&mut self) {
        for channel in 0..self.channels {
            self.fifo[channel].fill(0.0);
            self.ola[channel].fill(0.0);
            self.dry[channel].fill(0.0);
        }
        self.fifo_fill = 0;
        self.ola_read = 0;
        self.dry_pos = 0;
    }

    /// Processes one audio callback's worth of samples.
    ///
    /// `input` and `output` are planar channel slices, at least
    /// [`channels`](Self::channels) each, all the same length.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        let samples = input.first().map_or(0, |c| c.len());
        debug_assert!(input.len() >= self.channels);
        debug_assert!(output.len() >= self.channels);

        // Structural edits land between blocks, never mid-render.
        while let Ok(command) = self.commands_rx.try_recv() {
            self.effects.apply(command);
        }

        // Block-scoped parameter refresh, exactly once per callback.
        for param in self.params.all() {
            param.update_values(self.sample_rate, samples, None);
        }
        self.effects.refresh_params(self.sample_rate, samples);

        let order = self
            .params
            .order
            .index()
            .clamp(MIN_FFT_ORDER, MAX_FFT_ORDER);
        let wanted_size = 1usize << order;
        let window = Window::from_index(self.params.window.index());
        let shape = self.params.shape.scalar(false);
        self.reconfigure_if_needed(wanted_size, window, shape);

        // Overlap policy at point of use: a rectangular window forces the
        // stored overlap to zero (high-overlap rectangular analysis combs).
        let mut overlap = self.params.overlap.scalar(false);
        if self.window.is_rectangular() && overlap != 0.0 {
            tracing::warn!("rectangular window forces overlap to 0");
            self.params.overlap.set_normalised(0.0);
            overlap = 0.0;
        }
        let hop = effective_hop(self.fft_size, overlap);

        let mix_lanes = self.params.mix.lanes(false);
        let mut mix = [0.0f32; 2];
        for channel in 0..self.channels {
            mix[channel] = mix_lanes[channel.min(1)].clamp(0.0, 1.0);
        }
        let bypass = self.analysis.is_none()
            && (0..self.channels).all(|channel| mix[channel] == 0.0);

        for i in 0..samples {
            for channel in 0..self.channels {
                let sample = input[channel][i];
                let dry = self.dry[channel][self.dry_pos];
                self.dry[channel][self.dry_pos] = sample;

                let wet = self.ola[channel][self.ola_read];
                self.ola[channel][self.ola_read] = 0.0;

                let m = mix[channel];
                output[channel][i] = dry * (1.0 - m) + wet * m;
                self.fifo[channel][self.fifo_fill] = sample;
            }
            self.dry_pos = (self.dry_pos + 1) % self.fft_size;
            self.ola_read = (self.ola_read + 1) % OLA_LEN;
            self.fifo_fill += 1;

            if self.fifo_fill == self.fft_size {
                if !bypass {
                    self.process_frame();
                }
                self.shift_fifo(hop);
            }
        }
    }

    /// Windows the FIFO, transforms, runs the lanes, and overlap-adds the
    /// resynthesized frame into the output accumulator.
    fn process_frame(&mut self) {
        let size = self.fft_size;
        for channel in 0..self.channels {
            for k in 0..size {
                self.frame_time[k] = self.fifo[channel][k] * self.window_coeffs[k];
            }
            self.fft
                .forward(&self.frame_time[..size], self.spectrum_in.channel_mut(channel));
        }

        self.effects.process(&self.spectrum_in, &mut self.spectrum_out);
        if let Some(consumer) = &self.analysis {
            consumer.consume_spectrum(&self.spectrum_out);
        }

        for channel in 0..self.channels {
            self.fft
                .inverse(self.spectrum_out.channel(channel), &mut self.frame_time[..size]);
            for k in 0..size {
                let slot = (self.ola_read + k) % OLA_LEN;
                self.ola[channel][slot] += self.frame_time[k];
            }
        }
    }

    fn shift_fifo(&mut self, hop: usize) {
        let size = self.fft_size;
        for channel in 0..self.channels {
            self.fifo[channel].copy_within(hop..size, 0);
        }
        self.fifo_fill = size - hop;
    }

    /// Applies a transform configuration change at the block boundary.
    /// An order change resets the streaming state (a documented glitch);
    /// a window or shape change only rebuilds the coefficient table.
    fn reconfigure_if_needed(&mut self, size: usize, window: Window, shape: f32) {
        if size != self.fft_size {
            tracing::debug!(size, "transform size changed");
            self.fft_size = size;
            self.fft.resize(size);
            self.spectrum_in
                .reconfigure(self.channels, size, self.sample_rate);
            self.spectrum_out
                .reconfigure(self.channels, size, self.sample_rate);
            self.effects.prepare(self.sample_rate, size);
            self.window = window;
            self.window_shape = shape;
            self.window_coeffs = window.coefficients(size, shape);
            self.clear_streams();
        } else if window != self.window || shape != self.window_shape {
            self.window = window;
            self.window_shape = shape;
            self.window_coeffs = window.coefficients(size, shape);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_policy() {
        assert_eq!(effective_hop(1024, 0.0), 1024);
        assert_eq!(effective_hop(1024, 0.5), 512);
        assert_eq!(effective_hop(1024, 0.75), 256);
        // The ceiling: 63/64 overlap leaves a hop of size/64.
        assert_eq!(effective_hop(1024, MAX_OVERLAP), 16);
        // Stored 1.0 processes at the ceiling rather than freezing.
        assert_eq!(effective_hop(1024, 1.0), 16);
    }

    #[test]
    fn overlap_clamp_policy() {
        let params = EngineParams::new();
        params.set_overlap(0.99);
        let clamped = params.overlap.normalised();
        params.set_overlap(MAX_OVERLAP);
        assert_eq!(params.overlap.normalised(), clamped);

        params.set_overlap(1.0);
        assert_eq!(params.overlap.normalised(), 1.0);

        params.set_overlap(-0.5);
        assert_eq!(params.overlap.normalised(), 0.0);
    }

    #[test]
    fn rectangular_window_forces_overlap_zero() {
        let mut engine = SoundEngine::new(EngineConfig {
            channels: 1,
            ..EngineConfig::default()
        });
        engine.params().set_overlap(0.9);
        engine.params().set_window_index(0); // Rectangular

        let input = vec![0.0f32; 256];
        let mut out = vec![0.0f32; 256];
        engine.process(&[&input], &mut [&mut out]);

        assert_eq!(engine.params().overlap.normalised(), 0.0);
    }

    #[test]
    fn order_change_updates_latency_at_block_boundary() {
        let mut engine = SoundEngine::new(EngineConfig::default());
        assert_eq!(engine.latency_samples(), 1024);

        engine.params().set_order(8);
        // Not yet: mid-block changes defer to the next callback.
        assert_eq!(engine.latency_samples(), 1024);

        let input = vec![0.0f32; 64];
        let mut left = vec![0.0f32; 64];
        let mut right = vec![0.0f32; 64];
        let inputs = [&input[..], &input[..]];
        engine.process(&inputs, &mut [&mut left, &mut right]);
        assert_eq!(engine.latency_samples(), 256);
    }

    #[test]
    fn bridges_are_bound_to_engine_params() {
        let engine = SoundEngine::new(EngineConfig::default());
        let bridges = engine.bridges();
        assert_eq!(bridges.len(), 8);
        assert_eq!(bridges[0].display_name(), "FFT Order");
        assert_eq!(bridges[4].display_name(), "Mix");
        assert!(!bridges[5].is_mapped());

        // Host write lands on the parameter.
        bridges[4].set_value(0.0);
        assert_eq!(engine.params().mix.normalised(), 0.0);
    }

    #[test]
    fn take_tree_is_single_use() {
        let mut engine = SoundEngine::new(EngineConfig::default());
        let _tree = engine.take_tree();
        assert!(std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.take_tree()
        }))
        .is_err());
    }
}
