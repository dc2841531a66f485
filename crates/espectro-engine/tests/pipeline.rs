//! End-to-end scenarios for the STFT pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use espectro_engine::{AnalysisConsumer, EngineConfig, SoundEngine};
use espectro_spectral::{SpectralModule, SpectrumBlock, Window};

fn mono_engine() -> SoundEngine {
    SoundEngine::new(EngineConfig {
        channels: 1,
        sample_rate: 48000.0,
        automation_slots: 8,
    })
}

fn run_block(engine: &mut SoundEngine, input: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    engine.process(&[input], &mut [&mut output[..]]);
    output
}

/// A 1024-point impulse through one passthrough lane at mix 1, overlap 0,
/// Hann window must reproduce the windowed input after exactly one block
/// of latency, with matching energy.
#[test]
fn impulse_round_trips_through_window_and_overlap_add() {
    let mut engine = mono_engine();
    let mut tree = engine.take_tree();
    engine.params().set_overlap(0.0);
    engine.params().set_mix(1.0);

    let lane = tree.lane_ids()[0];
    let id = tree.create_module("passthrough").unwrap();
    tree.insert_module(lane, 0, id).unwrap();

    let n = engine.latency_samples();
    assert_eq!(n, 1024);
    let mut impulse = vec![0.0f32; n];
    impulse[512] = 1.0;

    let first = run_block(&mut engine, &impulse);
    assert!(
        first.iter().all(|s| s.abs() < 1e-6),
        "nothing may emerge before one block of latency"
    );

    let silence = vec![0.0f32; n];
    let second = run_block(&mut engine, &silence);
    let window = Window::Hann.coefficients(n, 0.0);

    // Sample-for-sample: the windowed impulse, delayed by one block.
    for (k, sample) in second.iter().enumerate() {
        let expected = if k == 512 { window[512] } else { 0.0 };
        assert!(
            (sample - expected).abs() < 1e-3,
            "sample {k}: expected {expected}, got {sample}"
        );
    }

    let energy: f32 = second.iter().map(|s| s * s).sum();
    let expected_energy = window[512] * window[512];
    assert!(
        (energy - expected_energy).abs() < 1e-3,
        "energy {energy} vs windowed-reconstructed {expected_energy}"
    );
}

/// At mix 0 with no analysis consumer, the output is the delayed dry
/// signal exactly; the transform path is skipped.
#[test]
fn mix_zero_fast_path_outputs_delayed_dry() {
    let mut engine = mono_engine();
    let _tree = engine.take_tree();
    engine.params().set_mix(0.0);

    let n = engine.latency_samples();
    // Deterministic non-trivial signal.
    let input: Vec<f32> = (0..2 * n)
        .map(|i| ((i as f32) * 0.013).sin() * 0.5 + ((i as f32) * 0.0041).cos() * 0.25)
        .collect();

    let first = run_block(&mut engine, &input[..n]);
    let second = run_block(&mut engine, &input[n..]);

    for (k, sample) in first.iter().enumerate() {
        assert!(sample.abs() < 1e-7, "pre-latency output must be silent, sample {k}");
    }
    for (k, sample) in second.iter().enumerate() {
        assert!(
            (sample - input[k]).abs() < 1e-6,
            "delayed dry mismatch at {k}: {sample} vs {}",
            input[k]
        );
    }
}

/// With an analysis consumer attached, the transform still runs at mix 0
/// (the tap keeps receiving frames) and the audible output stays dry.
#[test]
fn analysis_consumer_defeats_the_mix_zero_bypass() {
    struct Tap {
        frames: AtomicUsize,
    }
    impl AnalysisConsumer for Tap {
        fn consume_spectrum(&self, block: &SpectrumBlock) {
            assert_eq!(block.channel_count(), 1);
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    let mut engine = mono_engine();
    let _tree = engine.take_tree();
    engine.params().set_mix(0.0);
    engine.params().set_overlap(0.0);
    let tap = Arc::new(Tap {
        frames: AtomicUsize::new(0),
    });
    engine.set_analysis_consumer(Some(Arc::clone(&tap) as Arc<dyn AnalysisConsumer>));

    let n = engine.latency_samples();
    let input: Vec<f32> = (0..2 * n).map(|i| ((i as f32) * 0.02).sin()).collect();
    run_block(&mut engine, &input[..n]);
    let second = run_block(&mut engine, &input[n..]);

    assert!(tap.frames.load(Ordering::Relaxed) >= 2, "tap must keep receiving frames");
    for (k, sample) in second.iter().enumerate() {
        assert!((sample - input[k]).abs() < 1e-6, "output must stay dry at {k}");
    }
}

/// Module whose only effect is advancing a shared counter.
struct Counting {
    counter: Arc<AtomicU64>,
}

impl SpectralModule for Counting {
    fn type_id(&self) -> &'static str {
        "counting"
    }
    fn apply(&mut self, _block: &mut SpectrumBlock) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Disabling a lane stops its chain's side effects; re-enabling resumes
/// on the next block without dropping it.
#[test]
fn disabling_a_lane_freezes_its_chain() {
    let mut engine = mono_engine();
    let mut tree = engine.take_tree();
    engine.params().set_overlap(0.0);

    let counter = Arc::new(AtomicU64::new(0));
    let lane = tree.lane_ids()[0];
    let id = tree.stage_module(Box::new(Counting {
        counter: Arc::clone(&counter),
    }));
    tree.insert_module(lane, 0, id).unwrap();

    let n = engine.latency_samples();
    let silence = vec![0.0f32; n];

    run_block(&mut engine, &silence);
    run_block(&mut engine, &silence);
    assert_eq!(counter.load(Ordering::Relaxed), 2);

    tree.set_lane_enabled(lane, false).unwrap();
    run_block(&mut engine, &silence);
    run_block(&mut engine, &silence);
    assert_eq!(
        counter.load(Ordering::Relaxed),
        2,
        "a bypassed lane's chain must not run"
    );

    tree.set_lane_enabled(lane, true).unwrap();
    run_block(&mut engine, &silence);
    assert_eq!(
        counter.load(Ordering::Relaxed),
        3,
        "re-enabling must resume with the next block's frame"
    );
}

/// A spectral gain module audibly shapes the wet path end to end.
#[test]
fn gain_module_attenuates_the_wet_path() {
    let mut engine = mono_engine();
    let mut tree = engine.take_tree();
    engine.params().set_overlap(0.5);

    let lane = tree.lane_ids()[0];
    let id = tree.create_module("spectral_gain").unwrap();
    let record = tree.get(id).unwrap();
    let gain = &record.params[0];
    gain.set_normalised(gain.details().normalize(-20.0));
    tree.insert_module(lane, 0, id).unwrap();

    let n = engine.latency_samples();
    let tone: Vec<f32> = (0..4 * n)
        .map(|i| (std::f32::consts::TAU * 1000.0 * i as f32 / 48000.0).sin())
        .collect();

    let mut processed = Vec::new();
    for chunk in tone.chunks(n) {
        processed.extend(run_block(&mut engine, chunk));
    }

    // Compare steady-state RMS of the last block against the dry tone.
    let tail = &processed[3 * n..];
    let rms = (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt();
    let dry_rms = (0.5f32).sqrt();
    assert!(
        rms < dry_rms * 0.5,
        "a -20 dB spectral gain must clearly attenuate (rms {rms} vs dry {dry_rms})"
    );
}
