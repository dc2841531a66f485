//! Block-rate modulation sources for parameter control.
//!
//! A [`Modulator`] is an autonomous generator (envelope, LFO, follower)
//! that a parameter can sum in. The trait deliberately exposes *deltas* —
//! the change in the source's output since the previous block — so a
//! parameter accumulates modulation without knowing anything about the
//! source's internals, and sources can be swapped freely.
//!
//! Sources are shared as `Arc<Mutex<dyn Modulator + Send>>`: the owning
//! module keeps the `Arc`, parameters hold `Weak` references inside a
//! [`ModulatorSlot`] and silently drop sources whose owner has gone away.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::value::MOD_LANES;

/// Stable identity of a modulation source, minted by the processor tree.
///
/// Used to record modulator bindings in serialized parameter state; the
/// runtime connection is the weak handle, never the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulatorId(pub u64);

/// Shared handle to a modulation source.
pub type ModulatorHandle = Arc<Mutex<dyn Modulator + Send>>;

/// Non-owning handle to a modulation source.
pub type WeakModulatorHandle = Weak<Mutex<dyn Modulator + Send>>;

/// Capability trait for block-rate modulation sources.
///
/// Implementations produce one value per audio block. The engine-facing
/// method is [`advance_block`](Self::advance_block), which advances the
/// source by `samples` and returns the *delta* between the new output and
/// the previous one, in the source's bipolar \[-1, 1\] range.
pub trait Modulator {
    /// Advances the source by one block and returns the change in output
    /// since the previous block.
    fn advance_block(&mut self, sample_rate: f32, samples: usize) -> f32;

    /// The source's current output without advancing.
    fn current(&self) -> f32;

    /// Resets the source to its initial state.
    fn reset(&mut self);
}

/// One entry in a parameter's modulator list.
///
/// Couples the source's serialization identity with the weak runtime handle
/// and per-lane depth weights. A mono modulation uses equal weights on the
/// channel lanes; a stereo modulation weights the two channel lanes
/// differently.
#[derive(Clone, Debug)]
pub struct ModulatorSlot {
    /// Serialization identity of the source.
    pub id: ModulatorId,
    /// Weak handle to the live source.
    pub source: WeakModulatorHandle,
    /// Depth weight applied to the source's delta, per lane.
    pub lanes: [f32; MOD_LANES],
}

impl ModulatorSlot {
    /// Creates a slot applying the source equally to every lane.
    pub fn mono(id: ModulatorId, source: &ModulatorHandle, depth: f32) -> Self {
        Self {
            id,
            source: Arc::downgrade(source),
            lanes: [depth; MOD_LANES],
        }
    }

    /// Creates a slot with explicit per-lane depth weights.
    pub fn with_lanes(id: ModulatorId, source: &ModulatorHandle, lanes: [f32; MOD_LANES]) -> Self {
        Self {
            id,
            source: Arc::downgrade(source),
            lanes,
        }
    }

    /// Returns `true` while the source is still owned somewhere.
    pub fn is_live(&self) -> bool {
        self.source.strong_count() > 0
    }
}

/// Serialized form of a modulator binding: identity plus lane weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulatorBinding {
    /// Source identity.
    pub id: ModulatorId,
    /// Per-lane depth weights.
    pub lanes: [f32; MOD_LANES],
}

impl From<&ModulatorSlot> for ModulatorBinding {
    fn from(slot: &ModulatorSlot) -> Self {
        Self {
            id: slot.id,
            lanes: slot.lanes,
        }
    }
}

/// Low-frequency oscillator waveform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LfoShape {
    /// Smooth sinusoid.
    #[default]
    Sine,
    /// Linear up/down ramps.
    Triangle,
    /// Rising ramp with abrupt reset.
    Saw,
}

/// Block-rate LFO modulation source.
///
/// Phase-accumulating oscillator evaluated once per block. Output is
/// bipolar \[-1, 1\] scaled by `depth`.
///
/// # Example
///
/// ```rust
/// use espectro_core::{BlockLfo, LfoShape, Modulator};
///
/// let mut lfo = BlockLfo::new(2.0, 0.5);
/// lfo.set_shape(LfoShape::Triangle);
/// let delta = lfo.advance_block(48000.0, 256);
/// assert!(delta.abs() <= 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct BlockLfo {
    /// Phase position in \[0, 1).
    phase: f32,
    /// Oscillation rate in Hz.
    rate_hz: f32,
    /// Output scale in \[0, 1\].
    depth: f32,
    shape: LfoShape,
    /// Output at the end of the previous block.
    previous: f32,
}

impl BlockLfo {
    /// Creates an LFO with the given rate and depth, phase at zero.
    pub fn new(rate_hz: f32, depth: f32) -> Self {
        Self {
            phase: 0.0,
            rate_hz,
            depth: depth.clamp(0.0, 1.0),
            shape: LfoShape::Sine,
            previous: 0.0,
        }
    }

    /// Sets the oscillation rate in Hz.
    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = rate_hz;
    }

    /// Sets the output depth in \[0, 1\].
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth.clamp(0.0, 1.0);
    }

    /// Sets the waveform.
    pub fn set_shape(&mut self, shape: LfoShape) {
        self.shape = shape;
    }

    fn value_at_phase(&self) -> f32 {
        let raw = match self.shape {
            LfoShape::Sine => (self.phase * core::f32::consts::TAU).sin(),
            LfoShape::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            LfoShape::Saw => 2.0 * self.phase - 1.0,
        };
        raw * self.depth
    }
}

impl Modulator for BlockLfo {
    fn advance_block(&mut self, sample_rate: f32, samples: usize) -> f32 {
        if sample_rate > 0.0 {
            let increment = self.rate_hz / sample_rate * samples as f32;
            self.phase = (self.phase + increment).rem_euclid(1.0);
        }
        let value = self.value_at_phase();
        let delta = value - self.previous;
        self.previous = value;
        delta
    }

    fn current(&self) -> f32 {
        self.previous
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.previous = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_sum_to_current_value() {
        let mut lfo = BlockLfo::new(3.0, 1.0);
        let mut accumulated = 0.0;
        for _ in 0..64 {
            accumulated += lfo.advance_block(48000.0, 256);
        }
        assert!(
            (accumulated - lfo.current()).abs() < 1e-4,
            "delta sum {accumulated} diverged from output {}",
            lfo.current()
        );
    }

    #[test]
    fn depth_bounds_output() {
        let mut lfo = BlockLfo::new(10.0, 0.25);
        for _ in 0..1000 {
            lfo.advance_block(48000.0, 128);
            assert!(lfo.current().abs() <= 0.25 + 1e-6);
        }
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut lfo = BlockLfo::new(1.0, 1.0);
        lfo.advance_block(48000.0, 4096);
        lfo.reset();
        assert_eq!(lfo.current(), 0.0);
        let first = lfo.advance_block(48000.0, 480);
        let mut again = BlockLfo::new(1.0, 1.0);
        let expected = again.advance_block(48000.0, 480);
        assert!((first - expected).abs() < 1e-6);
    }

    #[test]
    fn slot_liveness_follows_owner() {
        let source: ModulatorHandle = Arc::new(Mutex::new(BlockLfo::new(1.0, 1.0)));
        let slot = ModulatorSlot::mono(ModulatorId(7), &source, 0.5);
        assert!(slot.is_live());
        drop(source);
        assert!(!slot.is_live());
    }
}
