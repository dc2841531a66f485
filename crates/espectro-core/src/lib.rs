//! Espectro Core - parameter, modulation and automation primitives
//!
//! This crate is the value system that bridges three actors of a realtime
//! spectral effects engine: the UI thread, the host-automation surface, and
//! the audio render thread. The audio thread never blocks on the other two.
//!
//! # Core Abstractions
//!
//! ## Descriptors and Scaling
//!
//! - [`ParamDetails`] - immutable per-parameter descriptor (range, default,
//!   names, stereo flag, display lookup)
//! - [`ValueScale`] - normalization curves, including the discrete
//!   `Toggle`/`Indexed` kinds
//!
//! ## Values, Links, Bridges
//!
//! - [`ParameterValue`] - one automatable quantity: normalized value,
//!   4-lane modulation accumulator, cached internal value
//! - [`ParameterLink`] - the non-owning join record (UI control, bridge,
//!   modulator list) read under the value's critical section
//! - [`ParameterBridge`] - a host-visible automation slot, rebindable at
//!   runtime, lock-free on the get/set path
//!
//! ## Modulation
//!
//! - [`Modulator`] - block-rate delta-producing source capability
//! - [`BlockLfo`] - phase-accumulating LFO source
//!
//! # Threading Model
//!
//! Small bounded state sits behind short `parking_lot` critical sections;
//! cross-thread scalars are individual atomics with acquire/release
//! ordering. Parameter changes are observed by the audio thread at block
//! granularity via [`ParameterValue::update_values`]; there is no
//! cross-parameter atomicity across the UI/audio boundary.

pub mod bridge;
pub mod details;
pub mod link;
pub mod modulator;
pub mod value;

pub use bridge::{AutomationListener, ParameterBridge};
pub use details::{ParamDetails, ValueScale};
pub use link::{ChangeListener, ParameterLink};
pub use modulator::{
    BlockLfo, LfoShape, Modulator, ModulatorBinding, ModulatorHandle, ModulatorId, ModulatorSlot,
    WeakModulatorHandle,
};
pub use value::{MOD_LANES, ParamError, ParamState, ParameterValue};
