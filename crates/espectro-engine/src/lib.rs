//! Espectro Engine - the realtime spectral processing pipeline
//!
//! Ties the parameter system (`espectro-core`) and the frequency-domain
//! toolkit (`espectro-spectral`) into a streaming engine:
//!
//! - [`SoundEngine`] - the per-callback STFT pipeline: window → forward
//!   FFT → effect lanes → inverse FFT → overlap-add, with a
//!   latency-compensated dry path and a mix-zero fast path
//! - [`ProcessorTree`] - the identity registry and edit authority: every
//!   node has a process-wide-unique id, and structural edits publish to
//!   the audio thread without ever blocking it
//! - [`EffectsState`] / [`EffectsLane`] - the fixed lane array the audio
//!   thread executes, with per-lane routing, bypass and gain matching
//!
//! # Threading
//!
//! The engine is built on the edit side, its [`ProcessorTree`] is taken
//! once, and the engine then moves to the render thread. The two sides
//! share only bounded lock-free channels (commands one way, retired
//! module boxes the other) and the atomic parameter values. The render
//! thread applies edits between blocks, so a block only ever observes
//! fully-old or fully-new structure, and nothing is freed while it could
//! still be referenced.

pub mod commands;
pub mod engine;
pub mod lanes;
pub mod tree;

pub use commands::{LaneCommand, RetiredModule};
pub use engine::{
    AnalysisConsumer, EngineConfig, EngineParams, MAX_FFT_ORDER, MAX_FFT_SIZE, MAX_OVERLAP,
    MIN_FFT_ORDER, SoundEngine, effective_hop,
};
pub use lanes::{EffectsLane, EffectsState, LaneSource, MAX_LANE_MODULES, MAX_LANES};
pub use tree::{
    EngineSnapshot, LaneSnapshot, ModuleSnapshot, ProcessorId, ProcessorKind, ProcessorRecord,
    ProcessorState, ProcessorTree, TreeError, next_processor_id,
};
