//! Espectro Spectral - windowing, transforms and frequency-domain modules
//!
//! The frequency-domain half of the espectro engine:
//!
//! - [`Window`] - analysis window functions with an optional shape
//!   parameter
//! - [`SpectralFft`] - plan-caching forward/inverse FFT pair with the
//!   engine's real-signal bin convention (`size/2 + 1` bins, DC..Nyquist)
//! - [`SpectrumBlock`] - one frame of per-channel spectra handed through
//!   the effect lanes
//! - [`SpectralModule`] - the uniform effect-unit contract, with built-in
//!   [`Passthrough`], [`SpectralGain`] and [`SpectralTilt`] units and the
//!   [`create_module`] factory
//!
//! Everything on the `apply` path is allocation-free; buffers are sized
//! when the transform configuration changes, never per frame.

pub mod block;
pub mod fft;
pub mod module;
pub mod modules;
pub mod window;

pub use block::SpectrumBlock;
pub use fft::SpectralFft;
pub use module::{MODULE_TYPE_IDS, SpectralModule, create_module};
pub use modules::{Passthrough, SpectralGain, SpectralTilt};
pub use window::{WINDOW_NAMES, Window};

// Re-export the complex type modules operate on.
pub use rustfft::num_complex::Complex;
