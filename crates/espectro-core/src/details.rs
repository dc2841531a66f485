//! Parameter descriptors and value scaling.
//!
//! Every automatable quantity is described by a [`ParamDetails`] record:
//! display names, plain-value range, default, stereo capability, and a
//! [`ValueScale`] that maps between the normalized \[0.0, 1.0\] space shared
//! with the UI and host, and the plain engine-facing value.
//!
//! The normalized/plain split lets modulation stay additive in normalized
//! space regardless of the target's scaling curve: the UI and the host only
//! ever see \[0, 1\], while the audio code reads fully scaled values.
//!
//! # Scaling Formulas
//!
//! - **Linear**: `plain = min + x * (max - min)`
//! - **Quadratic**: `plain = min + x^2 * (max - min)`
//! - **Power(exp)**: `plain = min + x^exp * (max - min)`
//! - **Logarithmic**: `plain = min * (max/min)^x` — requires `min > 0`
//! - **Toggle**: `plain = 1.0` when `x >= 0.5`, else `0.0`
//! - **Indexed**: `plain = round(min + x * (max - min))`
//!
//! Reference: JUCE `NormalisableRange` (skew factor), iPlug2 `ShapePowCurve`.

/// Scaling curve mapping a normalized value in \[0, 1\] to a plain value.
///
/// `Toggle` and `Indexed` are the discrete kinds: they quantize on the way
/// out and are the only kinds valid for integer reads. The continuous kinds
/// are the only kinds valid for scalar/vector reads.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ValueScale {
    /// Linear mapping (default). Equal resolution across the range.
    #[default]
    Linear,
    /// Square curve. More resolution at the low end; common for mix and
    /// depth controls.
    Quadratic,
    /// Power curve with a configurable exponent.
    /// exponent < 1.0 → more resolution at the high end,
    /// exponent > 1.0 → more resolution at the low end.
    Power(f32),
    /// Logarithmic mapping for frequency-style ranges (20 Hz → 20 kHz).
    /// Requires `min > 0.0`.
    Logarithmic,
    /// Two-state switch. Plain value is exactly 0.0 or 1.0.
    Toggle,
    /// Stepped integer range `min..=max` (inclusive, integral endpoints).
    Indexed,
}

impl ValueScale {
    /// Returns `true` for the discrete kinds (`Toggle`, `Indexed`).
    #[inline]
    pub const fn is_discrete(&self) -> bool {
        matches!(self, ValueScale::Toggle | ValueScale::Indexed)
    }
}

/// Immutable descriptor for one automatable parameter.
///
/// Shared by the owning parameter value and the UI: the value uses the range
/// and scale to compute plain values, the UI uses the names, unit, and lookup
/// table for display. A descriptor is fixed for the lifetime of the parameter
/// it describes.
///
/// # Example
///
/// ```rust
/// use espectro_core::ParamDetails;
///
/// let mix = ParamDetails::unipolar("Mix", "Mix").with_stereo();
/// assert_eq!(mix.denormalize(0.5), 0.5);
///
/// let window = ParamDetails::indexed("Window", "Win", 0, 4, 1)
///     .with_lookup(&["Rectangular", "Hann", "Hamming", "Blackman", "Tukey"]);
/// assert_eq!(window.format_value(1.0), "Hann");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDetails {
    /// Full parameter name for display (e.g. "FFT Order").
    pub name: &'static str,
    /// Short name for constrained displays, 8 characters or less.
    pub short_name: &'static str,
    /// Unit suffix appended by [`format_value`](Self::format_value)
    /// (e.g. `" Hz"`, `" dB"`, `"%"`). Empty for dimensionless parameters.
    pub unit: &'static str,
    /// Minimum plain value.
    pub min: f32,
    /// Maximum plain value.
    pub max: f32,
    /// Default plain value.
    pub default: f32,
    /// Scaling curve between normalized and plain space.
    pub scale: ValueScale,
    /// Whether the parameter carries independent per-channel modulation.
    pub stereo: bool,
    /// Display strings for discrete kinds, indexed from `min`.
    pub lookup: Option<&'static [&'static str]>,
}

impl ParamDetails {
    /// Linear parameter over an arbitrary plain range.
    pub const fn linear(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: "",
            min,
            max,
            default,
            scale: ValueScale::Linear,
            stereo: false,
            lookup: None,
        }
    }

    /// Linear 0..1 parameter (mix, depth, shape controls).
    pub const fn unipolar(name: &'static str, short_name: &'static str) -> Self {
        Self::linear(name, short_name, 0.0, 1.0, 1.0)
    }

    /// Gain parameter in decibels.
    pub const fn gain_db(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        let mut details = Self::linear(name, short_name, min, max, default);
        details.unit = " dB";
        details
    }

    /// Logarithmic frequency parameter in Hz. Requires `min > 0`.
    pub const fn frequency_hz(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        let mut details = Self::linear(name, short_name, min, max, default);
        details.unit = " Hz";
        details.scale = ValueScale::Logarithmic;
        details
    }

    /// Stepped integer parameter over `min..=max`.
    pub const fn indexed(
        name: &'static str,
        short_name: &'static str,
        min: i32,
        max: i32,
        default: i32,
    ) -> Self {
        let mut details = Self::linear(name, short_name, min as f32, max as f32, default as f32);
        details.scale = ValueScale::Indexed;
        details
    }

    /// Two-state switch parameter.
    pub const fn toggle(name: &'static str, short_name: &'static str, default_on: bool) -> Self {
        let mut details = Self::linear(name, short_name, 0.0, 1.0, if default_on { 1.0 } else { 0.0 });
        details.scale = ValueScale::Toggle;
        details
    }

    /// Sets the scaling curve. Builder pattern.
    pub const fn with_scale(mut self, scale: ValueScale) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the unit suffix. Builder pattern.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Marks the parameter as stereo-capable. Builder pattern.
    pub const fn with_stereo(mut self) -> Self {
        self.stereo = true;
        self
    }

    /// Attaches a display lookup table for a discrete parameter. Builder
    /// pattern; entries index from `min` upward.
    pub const fn with_lookup(mut self, lookup: &'static [&'static str]) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Clamps a plain value to this parameter's range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Number of discrete steps: 0 for continuous kinds, 1 for a toggle,
    /// `max - min` for indexed kinds. Matches host step-count conventions.
    pub fn step_count(&self) -> usize {
        match self.scale {
            ValueScale::Toggle => 1,
            ValueScale::Indexed => (self.max - self.min).round().max(0.0) as usize,
            _ => 0,
        }
    }

    /// The descriptor default in normalized space.
    pub fn default_normalized(&self) -> f32 {
        self.normalize(self.default)
    }

    /// Maps a plain value into normalized \[0, 1\] space.
    ///
    /// Inverse of [`denormalize`](Self::denormalize) for continuous kinds;
    /// discrete kinds map their quantized plain values exactly.
    pub fn normalize(&self, plain: f32) -> f32 {
        let range = self.max - self.min;
        if range == 0.0 {
            return 0.0;
        }
        let linear = (self.clamp(plain) - self.min) / range;
        match self.scale {
            ValueScale::Linear | ValueScale::Indexed => linear,
            ValueScale::Quadratic => linear.sqrt(),
            ValueScale::Power(exp) => linear.powf(1.0 / exp),
            ValueScale::Logarithmic => {
                if self.min <= 0.0 || plain <= 0.0 {
                    return 0.0;
                }
                (plain / self.min).ln() / (self.max / self.min).ln()
            }
            ValueScale::Toggle => {
                if plain >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Maps a normalized value in \[0, 1\] to a plain value.
    ///
    /// Discrete kinds quantize: `Toggle` snaps to 0.0/1.0 at a 0.5
    /// threshold, `Indexed` rounds to the nearest integral step.
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let x = normalized.clamp(0.0, 1.0);
        let range = self.max - self.min;
        match self.scale {
            ValueScale::Linear => self.min + x * range,
            ValueScale::Quadratic => self.min + x * x * range,
            ValueScale::Power(exp) => self.min + x.powf(exp) * range,
            ValueScale::Logarithmic => {
                if self.min <= 0.0 {
                    return self.min;
                }
                self.min * (self.max / self.min).powf(x)
            }
            ValueScale::Toggle => {
                if x >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ValueScale::Indexed => (self.min + x * range).round(),
        }
    }

    /// Formats a plain value for display.
    ///
    /// Discrete parameters with a lookup table show the entry for their
    /// step; everything else prints the number with the unit suffix.
    pub fn format_value(&self, plain: f32) -> String {
        if self.scale.is_discrete()
            && let Some(lookup) = self.lookup
        {
            let index = (self.clamp(plain) - self.min).round() as usize;
            if let Some(text) = lookup.get(index) {
                return (*text).to_string();
            }
        }
        match self.scale {
            ValueScale::Toggle => {
                if plain >= 0.5 { "On".to_string() } else { "Off".to_string() }
            }
            ValueScale::Indexed => format!("{}{}", plain.round() as i64, self.unit),
            _ => format!("{plain:.2}{}", self.unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_round_trip() {
        let details = ParamDetails::gain_db("Gain", "Gain", -60.0, 12.0, 0.0);
        for &plain in &[-60.0, -12.5, 0.0, 6.0, 12.0] {
            let rt = details.denormalize(details.normalize(plain));
            assert!((rt - plain).abs() < 1e-4, "linear round-trip failed for {plain}: {rt}");
        }
    }

    #[test]
    fn quadratic_round_trip() {
        let details =
            ParamDetails::unipolar("Depth", "Depth").with_scale(ValueScale::Quadratic);
        // Quadratic: denormalize(0.5) = 0.25.
        assert!((details.denormalize(0.5) - 0.25).abs() < 1e-6);
        for &x in &[0.0, 0.1, 0.33, 0.5, 0.9, 1.0] {
            let rt = details.normalize(details.denormalize(x));
            assert!((rt - x).abs() < 1e-5, "quadratic round-trip failed for {x}: {rt}");
        }
    }

    #[test]
    fn logarithmic_midpoint_is_geometric_mean() {
        let details = ParamDetails::frequency_hz("Cutoff", "Cutoff", 20.0, 20000.0, 1000.0);
        let mid = details.denormalize(0.5);
        let expected = (20.0f32 * 20000.0).sqrt();
        assert!((mid - expected).abs() < 1.0, "expected ~{expected}, got {mid}");
    }

    #[test]
    fn toggle_quantizes() {
        let details = ParamDetails::toggle("Bypass", "Byp", false);
        assert_eq!(details.denormalize(0.2), 0.0);
        assert_eq!(details.denormalize(0.7), 1.0);
        assert_eq!(details.normalize(1.0), 1.0);
        assert_eq!(details.step_count(), 1);
    }

    #[test]
    fn indexed_quantizes_and_round_trips() {
        let details = ParamDetails::indexed("Order", "Order", 6, 14, 10);
        assert_eq!(details.step_count(), 8);
        for step in 6..=14 {
            let plain = step as f32;
            let rt = details.denormalize(details.normalize(plain));
            assert_eq!(rt, plain, "indexed step {step} did not round-trip");
        }
        // Mid-step values snap to the nearest step.
        let n = details.normalize(10.0) + 0.01;
        assert_eq!(details.denormalize(n), 10.0);
    }

    #[test]
    fn format_uses_lookup() {
        let details = ParamDetails::indexed("Window", "Win", 0, 2, 1)
            .with_lookup(&["Rectangular", "Hann", "Hamming"]);
        assert_eq!(details.format_value(0.0), "Rectangular");
        assert_eq!(details.format_value(1.0), "Hann");
        assert_eq!(details.format_value(2.4), "Hamming");
    }

    #[test]
    fn format_toggle_and_units() {
        let toggle = ParamDetails::toggle("Match", "Match", true);
        assert_eq!(toggle.format_value(1.0), "On");
        assert_eq!(toggle.format_value(0.0), "Off");

        let gain = ParamDetails::gain_db("Gain", "Gain", -60.0, 12.0, 0.0);
        assert_eq!(gain.format_value(-6.0), "-6.00 dB");
    }

    #[test]
    fn zero_range_normalizes_to_zero() {
        let details = ParamDetails::linear("Fixed", "Fixed", 3.0, 3.0, 3.0);
        assert_eq!(details.normalize(3.0), 0.0);
    }
}
