//! Analysis window functions.
//!
//! The engine windows each frame before the forward transform. All kinds
//! take an optional shape parameter in \[0, 1\]; only `Tukey` uses it (taper
//! fraction: 0 = rectangular, 1 = Hann), the others ignore it.

use std::f32::consts::PI;

/// Window function kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// Rectangular (no windowing). Forces the engine's effective overlap
    /// to zero — high-overlap rectangular analysis combs badly.
    Rectangular,
    /// Hann window (raised cosine).
    #[default]
    Hann,
    /// Hamming window.
    Hamming,
    /// Blackman window.
    Blackman,
    /// Tukey (tapered cosine); shape sets the taper fraction.
    Tukey,
}

/// Display names, indexed to match [`Window::from_index`].
pub const WINDOW_NAMES: &[&str] = &["Rectangular", "Hann", "Hamming", "Blackman", "Tukey"];

impl Window {
    /// Maps an indexed parameter value to a window kind. Out-of-range
    /// indices fall back to Hann.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Window::Rectangular,
            1 => Window::Hann,
            2 => Window::Hamming,
            3 => Window::Blackman,
            4 => Window::Tukey,
            _ => Window::Hann,
        }
    }

    /// Returns `true` for the rectangular (identity) window.
    #[inline]
    pub const fn is_rectangular(&self) -> bool {
        matches!(self, Window::Rectangular)
    }

    fn coefficient(&self, i: usize, n: usize, shape: f32) -> f32 {
        let x = i as f32 / n as f32;
        match self {
            Window::Rectangular => 1.0,
            Window::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            Window::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
            Window::Blackman => {
                let t = 2.0 * PI * x;
                0.42 - 0.5 * t.cos() + 0.08 * (2.0 * t).cos()
            }
            Window::Tukey => {
                let taper = shape.clamp(0.0, 1.0);
                if taper == 0.0 {
                    return 1.0;
                }
                let edge = taper / 2.0;
                if x < edge {
                    0.5 * (1.0 + (PI * (x / edge - 1.0)).cos())
                } else if x > 1.0 - edge {
                    0.5 * (1.0 + (PI * ((x - 1.0 + edge) / edge)).cos())
                } else {
                    1.0
                }
            }
        }
    }

    /// Multiplies the window into a buffer.
    pub fn apply(&self, buffer: &mut [f32], shape: f32) {
        if self.is_rectangular() {
            return;
        }
        let n = buffer.len();
        for (i, sample) in buffer.iter_mut().enumerate() {
            *sample *= self.coefficient(i, n, shape);
        }
    }

    /// Returns the window coefficients for a given size.
    pub fn coefficients(&self, size: usize, shape: f32) -> Vec<f32> {
        (0..size).map(|i| self.coefficient(i, size, shape)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_shape() {
        let coeffs = Window::Hann.coefficients(100, 0.0);
        assert!(coeffs[0] < 0.01);
        assert!(coeffs[99] < 0.1);
        assert!((coeffs[50] - 1.0).abs() < 0.01);
    }

    #[test]
    fn rectangular_is_identity() {
        let mut buffer = vec![0.7; 64];
        Window::Rectangular.apply(&mut buffer, 0.5);
        assert!(buffer.iter().all(|&s| s == 0.7));
    }

    #[test]
    fn tukey_shape_extremes() {
        // Taper 0 degenerates to rectangular.
        let flat = Window::Tukey.coefficients(128, 0.0);
        assert!(flat.iter().all(|&c| (c - 1.0).abs() < 1e-6));

        // Taper 1 matches Hann.
        let tukey = Window::Tukey.coefficients(128, 1.0);
        let hann = Window::Hann.coefficients(128, 0.0);
        for (t, h) in tukey.iter().zip(hann.iter()) {
            assert!((t - h).abs() < 1e-4, "tukey {t} vs hann {h}");
        }
    }

    #[test]
    fn index_round_trip() {
        for (i, _) in WINDOW_NAMES.iter().enumerate() {
            let window = Window::from_index(i);
            assert_eq!(WINDOW_NAMES[i], format!("{window:?}"));
        }
        assert_eq!(Window::from_index(99), Window::Hann);
    }
}
