//! Host-facing automation slots.
//!
//! A [`ParameterBridge`] is a long-lived, host-visible automatable float:
//! one bridge per exposed automation slot. Hosts read and write the
//! normalized value from arbitrary threads at arbitrary rates, so the value
//! itself is a lone atomic with acquire/release ordering and the get/set
//! path never blocks. A bridge may be re-pointed at a different parameter
//! at runtime ([`rebind`](ParameterBridge::rebind)), remapping which
//! internal quantity a host automation lane controls; it keeps its own
//! displayed value while unmapped.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::value::ParameterValue;

/// Capability implemented by the host-side automation surface.
///
/// Notified when the UI moves a bridged value, so the host can record
/// automation. Runs on the writing thread; must be cheap.
pub trait AutomationListener: Send + Sync {
    /// The bridge at `index` changed to `value` from the UI side.
    fn bridge_value_changed(&self, index: usize, value: f32);
}

/// One host-visible automation slot.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use espectro_core::{ParamDetails, ParameterBridge, ParameterValue};
///
/// let mix = Arc::new(ParameterValue::new(ParamDetails::unipolar("Mix", "Mix")));
/// let bridge = ParameterBridge::new(0);
/// bridge.rebind(Some(Arc::clone(&mix)), true);
/// bridge.set_value(0.25);
/// assert!((mix.normalised() - 0.25).abs() < 1e-6);
/// ```
pub struct ParameterBridge {
    /// Stable host-facing slot number.
    index: usize,
    /// Current normalized value as f32 bits.
    value: AtomicU32,
    /// Parameter currently automated by this slot, if any.
    target: Mutex<Option<Arc<ParameterValue>>>,
    listener: Mutex<Option<Weak<dyn AutomationListener>>>,
}

impl ParameterBridge {
    /// Creates an unmapped bridge for the given slot, at value 0.
    pub fn new(index: usize) -> Arc<Self> {
        Arc::new(Self {
            index,
            value: AtomicU32::new(0f32.to_bits()),
            target: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }

    /// The host-facing slot number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the bridge currently automates a parameter.
    pub fn is_mapped(&self) -> bool {
        self.target.lock().is_some()
    }

    /// Registers the host-side listener for UI-originated changes.
    pub fn set_listener(&self, listener: Weak<dyn AutomationListener>) {
        *self.listener.lock() = Some(listener);
    }

    /// The current normalized value. Lock-free.
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Host-driven write: stores the normalized value and forwards it to
    /// the bound parameter (internal recompute lands at the next block).
    /// The parameter's UI listener is notified so the control repaints.
    pub fn set_value(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.value.store(value.to_bits(), Ordering::Release);
        let target = self.target.lock().clone();
        if let Some(target) = target {
            target.set_normalised(value);
            target.notify_ui();
        }
    }

    /// UI-driven write: like [`set_value`](Self::set_value) but notifies
    /// the host-side [`AutomationListener`] instead of the UI.
    pub fn set_value_from_ui(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.value.store(value.to_bits(), Ordering::Release);
        let target = self.target.lock().clone();
        if let Some(target) = target {
            target.set_normalised(value);
        }
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener
            && let Some(listener) = listener.upgrade()
        {
            listener.bridge_value_changed(self.index, value);
        }
    }

    /// Re-points the bridge at a different parameter (or unmaps it).
    ///
    /// With `pull_value` the bridge adopts the new target's current
    /// normalized value, so the host-visible value does not jump; without
    /// it, the bridge pushes its own current value into the new target.
    /// The old target's link is cleared either way.
    pub fn rebind(self: &Arc<Self>, target: Option<Arc<ParameterValue>>, pull_value: bool) {
        let mut slot = self.target.lock();
        if let Some(old) = slot.take() {
            old.detach_bridge();
        }
        if let Some(new) = target {
            if pull_value {
                self.value
                    .store(new.normalised().to_bits(), Ordering::Release);
            } else {
                new.set_normalised(self.value());
            }
            new.attach_bridge(Arc::downgrade(self));
            *slot = Some(new);
        }
    }

    /// Display name for generic host UIs: the bound parameter's name, or a
    /// placeholder while unmapped.
    pub fn display_name(&self) -> String {
        self.target
            .lock()
            .as_ref()
            .map_or_else(|| format!("Slot {}", self.index), |t| t.details().name.to_string())
    }

    /// Step count of the bound parameter (0 while unmapped or continuous).
    pub fn step_count(&self) -> usize {
        self.target
            .lock()
            .as_ref()
            .map_or(0, |t| t.details().step_count())
    }

    /// Formats a normalized value the way the bound parameter displays it.
    pub fn format_value(&self, normalized: f32) -> String {
        self.target.lock().as_ref().map_or_else(
            || format!("{normalized:.2}"),
            |t| {
                let details = t.details();
                details.format_value(details.denormalize(normalized))
            },
        )
    }
}
