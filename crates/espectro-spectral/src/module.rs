//! The uniform contract for frequency-domain effect modules.
//!
//! Every effect unit in the lane graph implements [`SpectralModule`]: one
//! capability — transform a [`SpectrumBlock`] in place — plus lifecycle
//! hooks and a parameter surface. Modules are selected at graph-build time
//! through [`create_module`]; the pipeline has no other coupling to the
//! concrete types.

use std::sync::Arc;

use espectro_core::ParameterValue;

use crate::block::SpectrumBlock;
use crate::modules::{Passthrough, SpectralGain, SpectralTilt};

/// Object-safe trait for frequency-domain effect units.
///
/// `apply` runs on the audio thread once per analysis frame and must not
/// allocate or block. Parameter refresh happens at block rate before
/// `apply` via the values returned from [`params`](Self::params).
pub trait SpectralModule: Send {
    /// Stable type identifier, used by the factory and serialization
    /// (e.g. `"spectral_gain"`).
    fn type_id(&self) -> &'static str;

    /// Transforms the block in place.
    fn apply(&mut self, block: &mut SpectrumBlock);

    /// Called off the audio thread when the transform configuration
    /// changes. Modules recompute size-dependent state here.
    fn prepare(&mut self, sample_rate: f32, fft_size: usize) {
        let _ = (sample_rate, fft_size);
    }

    /// Clears internal state without touching parameters.
    fn reset(&mut self) {}

    /// The module's automatable parameters, refreshed at block rate by the
    /// owning lane and walked by serialization.
    fn params(&self) -> &[Arc<ParameterValue>] {
        &[]
    }
}

/// Type identifiers of the built-in modules, in factory order.
pub const MODULE_TYPE_IDS: &[&str] = &["passthrough", "spectral_gain", "spectral_tilt"];

/// Instantiates a built-in module by type identifier.
///
/// Returns `None` for unknown identifiers; external module sets register
/// their own factories on top of this one.
pub fn create_module(type_id: &str) -> Option<Box<dyn SpectralModule + Send>> {
    match type_id {
        "passthrough" => Some(Box::new(Passthrough::new())),
        "spectral_gain" => Some(Box::new(SpectralGain::new())),
        "spectral_tilt" => Some(Box::new(SpectralTilt::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_knows_every_listed_id() {
        for id in MODULE_TYPE_IDS {
            let module = create_module(id).unwrap_or_else(|| panic!("factory missing {id}"));
            assert_eq!(module.type_id(), *id);
        }
        assert!(create_module("granular_cloud").is_none());
    }
}
