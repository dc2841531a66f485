//! Property-based tests for the overlap and hop policy.

use proptest::prelude::*;

use espectro_engine::{MAX_OVERLAP, MIN_FFT_ORDER, MAX_FFT_ORDER, effective_hop};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The effective hop stays within [size/64, size] for any overlap and
    /// any supported transform size.
    #[test]
    fn hop_is_always_bounded(
        overlap in -0.5f32..=1.5f32,
        order in MIN_FFT_ORDER..=MAX_FFT_ORDER,
    ) {
        let size = 1usize << order;
        let hop = effective_hop(size, overlap);
        prop_assert!(hop >= (size / 64).max(1), "hop {hop} below floor for size {size}");
        prop_assert!(hop <= size, "hop {hop} above size {size}");
    }

    /// Every overlap in (MAX_OVERLAP, 1.0) stores exactly the ceiling.
    #[test]
    fn overlap_above_ceiling_clamps(excess in 0.0001f32..0.015f32) {
        use espectro_engine::{EngineConfig, SoundEngine};
        let engine = SoundEngine::new(EngineConfig::default());
        let params = engine.params();

        params.set_overlap(MAX_OVERLAP + excess);
        let stored = params.overlap.normalised();
        params.set_overlap(MAX_OVERLAP);
        prop_assert_eq!(stored, params.overlap.normalised());
    }
}
