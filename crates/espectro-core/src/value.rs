//! The automatable parameter value shared between UI, host, and audio.
//!
//! A [`ParameterValue`] owns one quantity: the externally-set normalized
//! value, the per-lane modulation accumulator, and the cached internal
//! (plain) value the audio code reads. The internal value is always
//! derivable from the other fields plus the descriptor — it is a cache,
//! recomputed by [`update_values`](ParameterValue::update_values) once per
//! audio block, never independently mutated.
//!
//! # Threading
//!
//! - The normalized value, the cached internal values, and the dirty flag
//!   are individual atomics with acquire/release ordering; readers may see
//!   a combination that is one block stale, which is harmless by design.
//! - The modulation accumulator and the [`ParameterLink`] record live
//!   behind a short `parking_lot` critical section: every guarded region is
//!   bounded by the lane count plus the modulator count and performs no
//!   allocation beyond `Vec` edits within existing capacity.
//! - Cross-parameter writes are never atomic as a group; changes land on
//!   the audio thread at block granularity.

use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bridge::ParameterBridge;
use crate::details::ParamDetails;
use crate::link::{ChangeListener, ParameterLink};
use crate::modulator::{ModulatorBinding, ModulatorId, ModulatorSlot};

/// Number of modulation lanes per parameter: two channel lanes (left,
/// right) plus two auxiliary lanes.
pub const MOD_LANES: usize = 4;

/// Errors reported by parameter operations.
///
/// Only the recoverable cases live here; wrong-representation reads and
/// expired modulator handles are programming defects and panic instead
/// (see the method docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// A modulator list index was out of range.
    #[error("modulator index {index} out of range (list length {len})")]
    ModulatorIndex {
        /// The offending index.
        index: usize,
        /// The list length at the time of the call.
        len: usize,
    },
}

/// Serialized parameter state: the normalized value plus modulator
/// bindings by identity.
///
/// The container format is the consumer's concern; this type only
/// guarantees that value and bindings round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamState {
    /// Externally-set normalized value in \[0, 1\].
    pub normalised: f32,
    /// Modulator bindings in list order.
    pub modulators: Vec<ModulatorBinding>,
}

/// State behind the value's critical section.
struct LinkState {
    link: ParameterLink,
    /// Accumulated modulation per lane, in normalized space.
    modulations: [f32; MOD_LANES],
    /// Cached `clamp(normalised + modulations)` per lane.
    normalised_lanes: [f32; MOD_LANES],
    /// Cached plain value per lane.
    internal_lanes: [f32; MOD_LANES],
}

/// One automatable quantity: normalized value, modulation, cached internal
/// value, and the link record tying it to UI and host.
///
/// Created when its owning processing node is instantiated and destroyed
/// with it; UI and host hold `Arc`s only for as long as they are attached.
///
/// # Example
///
/// ```rust
/// use espectro_core::{ParamDetails, ParameterValue};
///
/// let mix = ParameterValue::new(ParamDetails::unipolar("Mix", "Mix").with_stereo());
/// mix.set_normalised(0.25);
/// mix.update_values(48000.0, 256, None);
/// assert!((mix.scalar(false) - 0.25).abs() < 1e-6);
/// ```
pub struct ParameterValue {
    details: ParamDetails,
    /// Last externally-set value in \[0, 1\], as f32 bits.
    normalised: AtomicU32,
    /// Cached channel-symmetric normalized internal value, as f32 bits.
    normalised_internal: AtomicU32,
    /// Cached channel-symmetric plain internal value, as f32 bits.
    internal: AtomicU32,
    /// Set by external writes, consumed by downstream caches.
    dirty: AtomicBool,
    state: Mutex<LinkState>,
}

impl ParameterValue {
    /// Creates a parameter at its descriptor default with nothing attached.
    pub fn new(details: ParamDetails) -> Self {
        let normalised = details.default_normalized();
        let internal = details.denormalize(normalised);
        Self {
            details,
            normalised: AtomicU32::new(normalised.to_bits()),
            normalised_internal: AtomicU32::new(normalised.to_bits()),
            internal: AtomicU32::new(internal.to_bits()),
            dirty: AtomicBool::new(false),
            state: Mutex::new(LinkState {
                link: ParameterLink::new(),
                modulations: [0.0; MOD_LANES],
                normalised_lanes: [normalised; MOD_LANES],
                internal_lanes: [internal; MOD_LANES],
            }),
        }
    }

    /// The immutable descriptor.
    pub fn details(&self) -> &ParamDetails {
        &self.details
    }

    /// Resets the parameter to `initial` (normalized) or the descriptor
    /// default, zeroes the modulation accumulator, recomputes the cached
    /// internal values, and clears the dirty flag.
    ///
    /// Idempotent: calling twice with the same argument yields identical
    /// observable state.
    pub fn initialise(&self, initial: Option<f32>) {
        let normalised = initial
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or_else(|| self.details.default_normalized());
        let mut state = self.state.lock();
        state.modulations = [0.0; MOD_LANES];
        self.normalised.store(normalised.to_bits(), Ordering::Release);
        Self::recompute(&self.details, &mut state, normalised, &self.normalised_internal, &self.internal);
        drop(state);
        self.dirty.store(false, Ordering::Release);
    }

    /// The last externally-set normalized value.
    pub fn normalised(&self) -> f32 {
        f32::from_bits(self.normalised.load(Ordering::Acquire))
    }

    /// External write from the UI or host. Clamped to \[0, 1\]; the
    /// internal value recomputes at the next block boundary.
    pub fn set_normalised(&self, value: f32) {
        self.normalised
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Release);
        self.dirty.store(true, Ordering::Release);
    }

    /// Returns and clears the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    // --- Representation-typed reads ---

    /// The channel-symmetric internal value as a plain scalar, or the
    /// normalized equivalent when `normalised` is true.
    ///
    /// For a stereo-capable parameter the two channel lanes' modulation is
    /// averaged before scaling, so the result is the symmetric component.
    ///
    /// # Panics
    ///
    /// Panics if the parameter's scale kind is `Toggle` or `Indexed`;
    /// request [`index`](Self::index) instead. Mismatched representation
    /// requests are programming defects, not runtime conditions.
    pub fn scalar(&self, normalised: bool) -> f32 {
        assert!(
            !self.details.scale.is_discrete(),
            "scalar read of discrete parameter '{}'",
            self.details.name
        );
        let bits = if normalised {
            self.normalised_internal.load(Ordering::Acquire)
        } else {
            self.internal.load(Ordering::Acquire)
        };
        f32::from_bits(bits)
    }

    /// The per-lane internal values (plain, or normalized when `normalised`
    /// is true).
    ///
    /// # Panics
    ///
    /// Panics for `Toggle`/`Indexed` parameters, as with
    /// [`scalar`](Self::scalar).
    pub fn lanes(&self, normalised: bool) -> [f32; MOD_LANES] {
        assert!(
            !self.details.scale.is_discrete(),
            "lane read of discrete parameter '{}'",
            self.details.name
        );
        let state = self.state.lock();
        if normalised {
            state.normalised_lanes
        } else {
            state.internal_lanes
        }
    }

    /// The integer representation of a `Toggle` or `Indexed` parameter:
    /// the plain value rounded to its step.
    ///
    /// # Panics
    ///
    /// Panics for continuous scale kinds.
    pub fn index(&self) -> usize {
        assert!(
            self.details.scale.is_discrete(),
            "integer read of continuous parameter '{}'",
            self.details.name
        );
        let plain = f32::from_bits(self.internal.load(Ordering::Acquire));
        plain.round().max(0.0) as usize
    }

    /// Whether a `Toggle` parameter is on.
    ///
    /// # Panics
    ///
    /// Panics unless the scale kind is `Toggle`.
    pub fn switched_on(&self) -> bool {
        assert!(
            matches!(self.details.scale, crate::ValueScale::Toggle),
            "toggle read of non-toggle parameter '{}'",
            self.details.name
        );
        self.index() != 0
    }

    // --- Modulator list edits ---

    /// Appends or inserts a modulator slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot's source has already been dropped — attaching an
    /// expired modulator is a precondition violation.
    pub fn add_modulator(&self, slot: ModulatorSlot, at: Option<usize>) -> Result<(), ParamError> {
        assert!(
            slot.is_live(),
            "expired modulator {:?} attached to parameter '{}'",
            slot.id,
            self.details.name
        );
        let mut state = self.state.lock();
        let len = state.link.modulators.len();
        let index = at.unwrap_or(len);
        if index > len {
            return Err(ParamError::ModulatorIndex { index, len });
        }
        state.link.modulators.insert(index, slot);
        drop(state);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Replaces the modulator at `index`, returning the previous occupant.
    ///
    /// # Panics
    ///
    /// Panics if the replacement's source has expired.
    pub fn update_modulator(
        &self,
        index: usize,
        slot: ModulatorSlot,
    ) -> Result<ModulatorSlot, ParamError> {
        assert!(
            slot.is_live(),
            "expired modulator {:?} attached to parameter '{}'",
            slot.id,
            self.details.name
        );
        let mut state = self.state.lock();
        let len = state.link.modulators.len();
        if index >= len {
            return Err(ParamError::ModulatorIndex { index, len });
        }
        let previous = std::mem::replace(&mut state.link.modulators[index], slot);
        drop(state);
        self.dirty.store(true, Ordering::Release);
        Ok(previous)
    }

    /// Removes the modulator at `index`, returning it.
    pub fn delete_modulator(&self, index: usize) -> Result<ModulatorSlot, ParamError> {
        let mut state = self.state.lock();
        let len = state.link.modulators.len();
        if index >= len {
            return Err(ParamError::ModulatorIndex { index, len });
        }
        let previous = state.link.modulators.remove(index);
        drop(state);
        self.dirty.store(true, Ordering::Release);
        Ok(previous)
    }

    /// Number of modulators currently attached (live or not yet pruned).
    pub fn modulator_count(&self) -> usize {
        self.state.lock().link.modulators.len()
    }

    /// The attached modulators' identities, in list order.
    pub fn modulator_ids(&self) -> Vec<ModulatorId> {
        self.state
            .lock()
            .link
            .modulators
            .iter()
            .map(|slot| slot.id)
            .collect()
    }

    // --- Block-rate refresh ---

    /// Recomputes the internal values once per audio block.
    ///
    /// Applies the optional externally-supplied normalized value, advances
    /// every live modulator source and sums its weighted delta into the
    /// per-lane accumulator, prunes sources whose owners have gone away,
    /// and refreshes the cached normalized-internal and plain values.
    pub fn update_values(&self, sample_rate: f32, samples: usize, new_normalised: Option<f32>) {
        let mut state = self.state.lock();
        if let Some(v) = new_normalised {
            self.normalised
                .store(v.clamp(0.0, 1.0).to_bits(), Ordering::Release);
        }

        let mut pruned = false;
        let mut deltas: [f32; MOD_LANES] = [0.0; MOD_LANES];
        state.link.modulators.retain(|slot| {
            if let Some(source) = slot.source.upgrade() {
                let delta = source.lock().advance_block(sample_rate, samples);
                for (sum, weight) in deltas.iter_mut().zip(slot.lanes.iter()) {
                    *sum += delta * weight;
                }
                true
            } else {
                pruned = true;
                false
            }
        });
        if pruned {
            tracing::debug!(param = self.details.name, "pruned expired modulator sources");
        }
        for (accum, delta) in state.modulations.iter_mut().zip(deltas.iter()) {
            *accum += delta;
        }

        let base = self.normalised();
        Self::recompute(&self.details, &mut state, base, &self.normalised_internal, &self.internal);
    }

    /// Refreshes the cached lane and scalar values from `base` plus the
    /// accumulator. Caller holds the critical section.
    fn recompute(
        details: &ParamDetails,
        state: &mut LinkState,
        base: f32,
        normalised_internal: &AtomicU32,
        internal: &AtomicU32,
    ) {
        for lane in 0..MOD_LANES {
            let n = (base + state.modulations[lane]).clamp(0.0, 1.0);
            state.normalised_lanes[lane] = n;
            state.internal_lanes[lane] = details.denormalize(n);
        }
        // Channel-symmetric component: mean of the two channel lanes.
        let symmetric = 0.5 * (state.modulations[0] + state.modulations[1]);
        let n = (base + symmetric).clamp(0.0, 1.0);
        normalised_internal.store(n.to_bits(), Ordering::Release);
        internal.store(details.denormalize(n).to_bits(), Ordering::Release);
    }

    // --- Link maintenance ---

    /// Attaches the UI control's change listener, replacing any previous
    /// one.
    pub fn attach_ui(&self, listener: Weak<dyn ChangeListener>) {
        self.state.lock().link.ui = Some(listener);
    }

    /// Clears the UI side of the link. The UI must call this before its
    /// control is destroyed.
    pub fn detach_ui(&self) {
        self.state.lock().link.ui = None;
    }

    /// Records the bridge currently automating this parameter. Called by
    /// [`ParameterBridge::rebind`](crate::ParameterBridge::rebind).
    pub(crate) fn attach_bridge(&self, bridge: Weak<ParameterBridge>) {
        self.state.lock().link.bridge = Some(bridge);
    }

    /// Clears the bridge side of the link.
    pub(crate) fn detach_bridge(&self) {
        self.state.lock().link.bridge = None;
    }

    /// Notifies the attached UI control, if any, that the value changed.
    pub fn notify_ui(&self) {
        let listener = self.state.lock().link.ui.clone();
        if let Some(listener) = listener
            && let Some(listener) = listener.upgrade()
        {
            listener.parameter_changed();
        }
    }

    // --- Serialization ---

    /// Captures the externally-set value and modulator bindings.
    pub fn state(&self) -> ParamState {
        let state = self.state.lock();
        ParamState {
            normalised: self.normalised(),
            modulators: state.link.modulators.iter().map(ModulatorBinding::from).collect(),
        }
    }

    /// Restores a captured state, resolving modulator identities back to
    /// live sources via `resolve`. Bindings that no longer resolve are
    /// skipped with a warning.
    pub fn restore(
        &self,
        snapshot: &ParamState,
        resolve: &dyn Fn(ModulatorId) -> Option<crate::ModulatorHandle>,
    ) {
        let mut state = self.state.lock();
        state.link.modulators.clear();
        for binding in &snapshot.modulators {
            if let Some(source) = resolve(binding.id) {
                state
                    .link
                    .modulators
                    .push(ModulatorSlot::with_lanes(binding.id, &source, binding.lanes));
            } else {
                tracing::warn!(id = binding.id.0, "dropping unresolvable modulator binding");
            }
        }
        state.modulations = [0.0; MOD_LANES];
        let base = snapshot.normalised.clamp(0.0, 1.0);
        self.normalised.store(base.to_bits(), Ordering::Release);
        Self::recompute(&self.details, &mut state, base, &self.normalised_internal, &self.internal);
        drop(state);
        self.dirty.store(true, Ordering::Release);
    }
}
