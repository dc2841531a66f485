//! The join record between a parameter value, its UI control, and its
//! host-automation bridge.
//!
//! A [`ParameterLink`] is a plain aggregate of non-owning references, owned
//! by the parameter value and only ever read or written under the value's
//! critical section. The UI and host sides hold their own handles to the
//! value; before either side tears down, it clears its pointer here
//! (`detach_ui` / `rebind(None, ..)` on the bridge), so a dead weak is a
//! normal sight and never an error.

use std::sync::Weak;

use crate::bridge::ParameterBridge;
use crate::modulator::ModulatorSlot;

/// Capability implemented by a UI control attached to a parameter.
///
/// Called after host- or modulation-originated writes so the control can
/// repaint. Implementations must be cheap and non-blocking; they run on
/// whatever thread performed the write.
pub trait ChangeListener: Send + Sync {
    /// The linked parameter's externally-set value changed.
    fn parameter_changed(&self);
}

/// Non-owning join record connecting a parameter value to at most one UI
/// control, at most one host bridge, and an ordered list of modulation
/// sources.
#[derive(Default)]
pub struct ParameterLink {
    /// UI control listening for repaints, if one is attached.
    pub(crate) ui: Option<Weak<dyn ChangeListener>>,
    /// Host bridge currently automating this parameter, if any.
    pub(crate) bridge: Option<Weak<ParameterBridge>>,
    /// Ordered modulation sources summed into the value each block.
    pub(crate) modulators: Vec<ModulatorSlot>,
}

impl ParameterLink {
    /// An empty link: nothing attached.
    pub(crate) fn new() -> Self {
        Self::default()
    }
}
