//! The ownership and identity registry for processing nodes.
//!
//! Every node — the engine, each lane, each effect module — gets a
//! process-wide-unique 64-bit [`ProcessorId`] at creation and is located
//! by id from outside the audio thread, never by address. The
//! [`ProcessorTree`] lives on the UI/message thread and is the single
//! authority for structural edits: it validates them, publishes them to
//! the audio side over the bounded command channel, and reclaims displaced
//! module boxes from the retire channel.
//!
//! # Node lifecycle
//!
//! `Staged` → `Live` → `Unlinked` → `Reclaimed`. A staged module exists in
//! the tree's holding area but is not reachable from the active graph; a
//! live one is processed by the audio thread; an unlinked one has been
//! removed from the graph but its box may still be in flight; a reclaimed
//! one has come back over the retire channel and been destroyed. The last
//! two states are distinct precisely so nothing is freed while the audio
//! thread could still reference it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use espectro_core::{ModulatorHandle, ModulatorId, ParamState, ParameterValue};
use espectro_spectral::{SpectralModule, create_module};

use crate::commands::{LaneCommand, RetiredModule};
use crate::engine::EngineParams;
use crate::lanes::{LaneSource, MAX_LANE_MODULES};

static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide-unique identifier of a processing node. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

impl ProcessorId {
    /// The raw 64-bit value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Mints a fresh node identifier.
pub fn next_processor_id() -> ProcessorId {
    ProcessorId(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed))
}

/// What a tree node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// The engine instance itself.
    Engine,
    /// One effect lane.
    Lane,
    /// An effect module.
    Module {
        /// The module's stable type identifier.
        type_id: &'static str,
    },
}

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Created, held by the tree, not reachable from the graph.
    Staged,
    /// Reachable; the audio thread may be processing it.
    Live,
    /// Removed from the graph; the box may still be in flight.
    Unlinked,
    /// Returned by the audio thread and destroyed.
    Reclaimed,
}

/// The tree's record of one node.
pub struct ProcessorRecord {
    /// The node's identity.
    pub id: ProcessorId,
    /// What the node is.
    pub kind: ProcessorKind,
    /// Lifecycle state.
    pub state: ProcessorState,
    /// For modules: the lane currently holding it.
    pub lane: Option<ProcessorId>,
    /// The node's parameters, shared with the instance wherever it lives.
    pub params: Vec<Arc<ParameterValue>>,
}

/// Errors reported by structural edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// No record exists for the id.
    #[error("unknown processor {0:?}")]
    UnknownProcessor(ProcessorId),
    /// The module factory does not know the type identifier.
    #[error("unknown module type '{0}'")]
    UnknownModuleType(String),
    /// The target of a lane operation is not a lane.
    #[error("processor {0:?} is not a lane")]
    NotALane(ProcessorId),
    /// The module is not in the state the operation requires.
    #[error("processor {0:?} is in state {1:?}")]
    WrongState(ProcessorId, ProcessorState),
    /// The destination lane is at capacity.
    #[error("lane {0:?} is full ({MAX_LANE_MODULES} modules)")]
    LaneFull(ProcessorId),
    /// The command queue is full; retry after the audio thread catches up.
    #[error("edit queue full, engine busy")]
    EngineBusy,
}

/// Per-lane bookkeeping mirrored on the edit side.
struct LaneMirror {
    modules: Vec<ProcessorId>,
    enabled: bool,
    gain_match: bool,
    source: LaneSource,
}

/// Serialized state of one module: type plus parameter states in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    /// Factory type identifier.
    pub type_id: String,
    /// Parameter states in the module's parameter order.
    pub params: Vec<ParamState>,
}

/// Serialized state of one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    /// Whether the lane processes audio.
    pub enabled: bool,
    /// Whether lane output energy is renormalized toward its input.
    pub gain_match: bool,
    /// Input routing.
    pub source: LaneSource,
    /// Module states in chain order.
    pub modules: Vec<ModuleSnapshot>,
}

/// Serialized engine state: engine parameters plus the lane layout.
///
/// The container format around this structure is the consumer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Engine parameter states, in [`EngineParams::all`] order.
    pub params: Vec<ParamState>,
    /// Lane states in lane order.
    pub lanes: Vec<LaneSnapshot>,
}

/// UI-thread authority for node identity and structural edits.
pub struct ProcessorTree {
    records: HashMap<ProcessorId, ProcessorRecord>,
    staged: HashMap<ProcessorId, Box<dyn SpectralModule + Send>>,
    lane_order: Vec<ProcessorId>,
    mirrors: HashMap<ProcessorId, LaneMirror>,
    engine_id: ProcessorId,
    commands_tx: Sender<LaneCommand>,
    retired_rx: Receiver<RetiredModule>,
    sample_rate: f32,
    fft_size: usize,
}

impl ProcessorTree {
    pub(crate) fn new(
        engine_id: ProcessorId,
        engine_params: Vec<Arc<ParameterValue>>,
        lane_ids: &[ProcessorId],
        commands_tx: Sender<LaneCommand>,
        retired_rx: Receiver<RetiredModule>,
        sample_rate: f32,
        fft_size: usize,
    ) -> Self {
        let mut records = HashMap::new();
        records.insert(
            engine_id,
            ProcessorRecord {
                id: engine_id,
                kind: ProcessorKind::Engine,
                state: ProcessorState::Live,
                lane: None,
                params: engine_params,
            },
        );
        let mut mirrors = HashMap::new();
        for (i, &id) in lane_ids.iter().enumerate() {
            records.insert(
                id,
                ProcessorRecord {
                    id,
                    kind: ProcessorKind::Lane,
                    state: ProcessorState::Live,
                    lane: None,
                    params: Vec::new(),
                },
            );
            mirrors.insert(
                id,
                LaneMirror {
                    modules: Vec::new(),
                    enabled: i == 0,
                    gain_match: false,
                    source: LaneSource::Stereo,
                },
            );
        }
        Self {
            records,
            staged: HashMap::new(),
            lane_order: lane_ids.to_vec(),
            mirrors,
            engine_id,
            commands_tx,
            retired_rx,
            sample_rate,
            fft_size,
        }
    }

    /// The engine node's id.
    pub fn engine_id(&self) -> ProcessorId {
        self.engine_id
    }

    /// Lane ids in processing order.
    pub fn lane_ids(&self) -> &[ProcessorId] {
        &self.lane_order
    }

    /// Looks a node up by id. A missing id usually means a concurrent
    /// edit already removed it — callers treat `None` as "gone", not as
    /// a failure.
    pub fn get(&self, id: ProcessorId) -> Option<&ProcessorRecord> {
        self.records.get(&id)
    }

    /// Module ids in a lane, in chain order.
    pub fn modules_in(&self, lane: ProcessorId) -> Option<&[ProcessorId]> {
        self.mirrors.get(&lane).map(|m| m.modules.as_slice())
    }

    // --- Node creation ---

    /// Builds a module through the factory and stages it.
    pub fn create_module(&mut self, type_id: &str) -> Result<ProcessorId, TreeError> {
        let module = create_module(type_id)
            .ok_or_else(|| TreeError::UnknownModuleType(type_id.to_string()))?;
        Ok(self.stage(module))
    }

    /// Stages an externally-constructed module, minting its identity.
    ///
    /// This is the extension point for module sets beyond the built-in
    /// factory.
    pub fn stage_module(&mut self, module: Box<dyn SpectralModule + Send>) -> ProcessorId {
        self.stage(module)
    }

    fn stage(&mut self, mut module: Box<dyn SpectralModule + Send>) -> ProcessorId {
        module.prepare(self.sample_rate, self.fft_size);
        let id = next_processor_id();
        let record = ProcessorRecord {
            id,
            kind: ProcessorKind::Module {
                type_id: module.type_id(),
            },
            state: ProcessorState::Staged,
            lane: None,
            params: module.params().to_vec(),
        };
        tracing::debug!(?id, type_id = module.type_id(), "module staged");
        self.records.insert(id, record);
        self.staged.insert(id, module);
        id
    }

    // --- Structural edits ---

    /// Links a staged module into a lane at `index`, publishing the edit
    /// to the audio thread.
    pub fn insert_module(
        &mut self,
        lane: ProcessorId,
        index: usize,
        id: ProcessorId,
    ) -> Result<(), TreeError> {
        self.require_lane(lane)?;
        match self.records.get(&id) {
            None => return Err(TreeError::UnknownProcessor(id)),
            Some(record) if record.state != ProcessorState::Staged => {
                return Err(TreeError::WrongState(id, record.state));
            }
            Some(_) => {}
        }
        let mirror = &self.mirrors[&lane];
        if mirror.modules.len() >= MAX_LANE_MODULES {
            return Err(TreeError::LaneFull(lane));
        }
        let index = index.min(mirror.modules.len());

        let module = self.staged.remove(&id).expect("staged record without box");
        match self.commands_tx.try_send(LaneCommand::InsertModule {
            lane,
            index,
            id,
            module,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(LaneCommand::InsertModule { module, .. })) => {
                // Put the box back; the edit never happened.
                self.staged.insert(id, module);
                return Err(TreeError::EngineBusy);
            }
            Err(_) => return Err(TreeError::EngineBusy),
        }

        let record = self.records.get_mut(&id).expect("record vanished");
        record.state = ProcessorState::Live;
        record.lane = Some(lane);
        self.mirrors.get_mut(&lane).expect("lane mirror").modules.insert(index, id);
        tracing::debug!(?id, ?lane, index, "module insert published");
        Ok(())
    }

    /// Unlinks a live module; the instance is reclaimed later via
    /// [`collect_retired`](Self::collect_retired).
    pub fn remove_module(&mut self, id: ProcessorId) -> Result<(), TreeError> {
        match self.records.get(&id) {
            None => return Err(TreeError::UnknownProcessor(id)),
            Some(record) if record.state != ProcessorState::Live => {
                return Err(TreeError::WrongState(id, record.state));
            }
            Some(_) => {}
        }
        if self
            .commands_tx
            .try_send(LaneCommand::RemoveModule { id })
            .is_err()
        {
            return Err(TreeError::EngineBusy);
        }

        let record = self.records.get_mut(&id).expect("record vanished");
        let lane = record.lane.take();
        record.state = ProcessorState::Unlinked;
        if let Some(lane) = lane
            && let Some(mirror) = self.mirrors.get_mut(&lane)
        {
            mirror.modules.retain(|m| *m != id);
        }
        tracing::debug!(?id, "module remove published");
        Ok(())
    }

    /// Moves a live module to `index` in `lane` (possibly reordering
    /// within its current lane).
    pub fn move_module(
        &mut self,
        id: ProcessorId,
        lane: ProcessorId,
        index: usize,
    ) -> Result<(), TreeError> {
        self.require_lane(lane)?;
        let current_lane = match self.records.get(&id) {
            None => return Err(TreeError::UnknownProcessor(id)),
            Some(record) if record.state != ProcessorState::Live => {
                return Err(TreeError::WrongState(id, record.state));
            }
            Some(record) => record.lane,
        };
        let headroom = if current_lane == Some(lane) { 1 } else { 0 };
        if self.mirrors[&lane].modules.len() >= MAX_LANE_MODULES + headroom {
            return Err(TreeError::LaneFull(lane));
        }
        if self
            .commands_tx
            .try_send(LaneCommand::MoveModule { id, lane, index })
            .is_err()
        {
            return Err(TreeError::EngineBusy);
        }

        if let Some(old) = current_lane
            && let Some(mirror) = self.mirrors.get_mut(&old)
        {
            mirror.modules.retain(|m| *m != id);
        }
        let mirror = self.mirrors.get_mut(&lane).expect("lane mirror");
        let index = index.min(mirror.modules.len());
        mirror.modules.insert(index, id);
        self.records.get_mut(&id).expect("record vanished").lane = Some(lane);
        Ok(())
    }

    /// Enables or bypasses a lane.
    pub fn set_lane_enabled(&mut self, lane: ProcessorId, enabled: bool) -> Result<(), TreeError> {
        self.require_lane(lane)?;
        if self
            .commands_tx
            .try_send(LaneCommand::SetLaneEnabled { lane, enabled })
            .is_err()
        {
            return Err(TreeError::EngineBusy);
        }
        self.mirrors.get_mut(&lane).expect("lane mirror").enabled = enabled;
        Ok(())
    }

    /// Toggles output energy renormalization for a lane.
    pub fn set_lane_gain_match(
        &mut self,
        lane: ProcessorId,
        enabled: bool,
    ) -> Result<(), TreeError> {
        self.require_lane(lane)?;
        if self
            .commands_tx
            .try_send(LaneCommand::SetLaneGainMatch { lane, enabled })
            .is_err()
        {
            return Err(TreeError::EngineBusy);
        }
        self.mirrors.get_mut(&lane).expect("lane mirror").gain_match = enabled;
        Ok(())
    }

    /// Changes which input channels feed a lane.
    pub fn set_lane_source(
        &mut self,
        lane: ProcessorId,
        source: LaneSource,
    ) -> Result<(), TreeError> {
        self.require_lane(lane)?;
        if self
            .commands_tx
            .try_send(LaneCommand::SetLaneSource { lane, source })
            .is_err()
        {
            return Err(TreeError::EngineBusy);
        }
        self.mirrors.get_mut(&lane).expect("lane mirror").source = source;
        Ok(())
    }

    // --- Deferred reclamation ---

    /// Drains the retire channel, destroys the returned boxes off the
    /// audio thread, and returns them for optional inspection.
    pub fn collect_retired(&mut self) -> Vec<RetiredModule> {
        let mut reclaimed = Vec::new();
        while let Ok(retired) = self.retired_rx.try_recv() {
            if let Some(record) = self.records.get_mut(&retired.id) {
                record.state = ProcessorState::Reclaimed;
            }
            tracing::debug!(id = ?retired.id, "module reclaimed");
            reclaimed.push(retired);
        }
        reclaimed
    }

    // --- Serialization ---

    /// Captures the engine parameters and lane layout.
    pub fn snapshot(&self, params: &EngineParams) -> EngineSnapshot {
        let lanes = self
            .lane_order
            .iter()
            .map(|lane| {
                let mirror = &self.mirrors[lane];
                let modules = mirror
                    .modules
                    .iter()
                    .filter_map(|id| self.records.get(id))
                    .map(|record| ModuleSnapshot {
                        type_id: match record.kind {
                            ProcessorKind::Module { type_id } => type_id.to_string(),
                            _ => String::new(),
                        },
                        params: record.params.iter().map(|p| p.state()).collect(),
                    })
                    .collect();
                LaneSnapshot {
                    enabled: mirror.enabled,
                    gain_match: mirror.gain_match,
                    source: mirror.source,
                    modules,
                }
            })
            .collect();
        EngineSnapshot {
            params: params.all().iter().map(|p| p.state()).collect(),
            lanes,
        }
    }

    /// Rebuilds the lane layout and engine parameters from a snapshot.
    ///
    /// Existing modules are removed first. Modulator bindings resolve
    /// through `resolve`; unresolvable bindings are dropped with a
    /// warning.
    pub fn restore(
        &mut self,
        snapshot: &EngineSnapshot,
        params: &EngineParams,
        resolve: &dyn Fn(ModulatorId) -> Option<ModulatorHandle>,
    ) -> Result<(), TreeError> {
        for (param, state) in params.all().iter().zip(snapshot.params.iter()) {
            param.restore(state, resolve);
        }

        let existing: Vec<ProcessorId> = self
            .lane_order
            .iter()
            .flat_map(|lane| self.mirrors[lane].modules.clone())
            .collect();
        for id in existing {
            self.remove_module(id)?;
        }

        let lane_order = self.lane_order.clone();
        for (lane, lane_snapshot) in lane_order.into_iter().zip(snapshot.lanes.iter()) {
            self.set_lane_enabled(lane, lane_snapshot.enabled)?;
            self.set_lane_gain_match(lane, lane_snapshot.gain_match)?;
            self.set_lane_source(lane, lane_snapshot.source)?;
            for (index, module_snapshot) in lane_snapshot.modules.iter().enumerate() {
                let id = self.create_module(&module_snapshot.type_id)?;
                let record = self.records.get(&id).expect("freshly staged record");
                for (param, state) in record.params.iter().zip(module_snapshot.params.iter()) {
                    param.restore(state, resolve);
                }
                self.insert_module(lane, index, id)?;
            }
        }
        Ok(())
    }

    fn require_lane(&self, lane: ProcessorId) -> Result<(), TreeError> {
        match self.records.get(&lane) {
            None => Err(TreeError::UnknownProcessor(lane)),
            Some(record) if record.kind != ProcessorKind::Lane => Err(TreeError::NotALane(lane)),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, SoundEngine};

    fn engine_and_tree() -> (SoundEngine, ProcessorTree) {
        let mut engine = SoundEngine::new(EngineConfig {
            channels: 1,
            ..EngineConfig::default()
        });
        let tree = engine.take_tree();
        (engine, tree)
    }

    /// Runs one short callback so the audio side applies pending edits.
    fn pump(engine: &mut SoundEngine) {
        let input = vec![0.0f32; 32];
        let mut out = vec![0.0f32; 32];
        engine.process(&[&input], &mut [&mut out]);
    }

    #[test]
    fn ids_are_unique_and_stable() {
        let a = next_processor_id();
        let b = next_processor_id();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn module_lifecycle_reaches_reclaimed() {
        let (mut engine, mut tree) = engine_and_tree();
        let lane = tree.lane_ids()[0];

        let id = tree.create_module("passthrough").unwrap();
        assert_eq!(tree.get(id).unwrap().state, ProcessorState::Staged);

        tree.insert_module(lane, 0, id).unwrap();
        assert_eq!(tree.get(id).unwrap().state, ProcessorState::Live);
        assert_eq!(tree.get(id).unwrap().lane, Some(lane));
        assert_eq!(tree.modules_in(lane).unwrap(), &[id]);

        tree.remove_module(id).unwrap();
        assert_eq!(tree.get(id).unwrap().state, ProcessorState::Unlinked);
        assert!(tree.modules_in(lane).unwrap().is_empty());

        // The box is still in flight until the audio thread hands it back.
        assert!(tree.collect_retired().is_empty());
        pump(&mut engine);
        let retired = tree.collect_retired();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id, id);
        assert_eq!(tree.get(id).unwrap().state, ProcessorState::Reclaimed);
    }

    #[test]
    fn lookups_of_missing_nodes_return_none() {
        let (_engine, tree) = engine_and_tree();
        assert!(tree.get(next_processor_id()).is_none());
    }

    #[test]
    fn validation_errors_are_reported() {
        let (_engine, mut tree) = engine_and_tree();
        let lane = tree.lane_ids()[0];
        let engine_id = tree.engine_id();

        assert!(matches!(
            tree.create_module("does_not_exist"),
            Err(TreeError::UnknownModuleType(_))
        ));

        let id = tree.create_module("passthrough").unwrap();
        assert_eq!(
            tree.insert_module(engine_id, 0, id),
            Err(TreeError::NotALane(engine_id))
        );
        let ghost = next_processor_id();
        assert_eq!(
            tree.insert_module(lane, 0, ghost),
            Err(TreeError::UnknownProcessor(ghost))
        );

        // A staged module can't be removed; it was never linked.
        assert_eq!(
            tree.remove_module(id),
            Err(TreeError::WrongState(id, ProcessorState::Staged))
        );
    }

    #[test]
    fn full_queue_reports_engine_busy_and_keeps_state() {
        let (_engine, mut tree) = engine_and_tree();
        let lane = tree.lane_ids()[0];

        // Fill the command queue without the audio side draining it.
        let mut busy = None;
        for i in 0..200 {
            if let Err(err) = tree.set_lane_enabled(lane, i % 2 == 0) {
                busy = Some(err);
                break;
            }
        }
        assert_eq!(busy, Some(TreeError::EngineBusy));

        // A staged insert that can't publish stays staged.
        let id = tree.create_module("passthrough").unwrap();
        assert_eq!(tree.insert_module(lane, 0, id), Err(TreeError::EngineBusy));
        assert_eq!(tree.get(id).unwrap().state, ProcessorState::Staged);
    }

    #[test]
    fn lane_capacity_is_enforced_on_the_edit_side() {
        let (mut engine, mut tree) = engine_and_tree();
        let lane = tree.lane_ids()[1];

        for i in 0..MAX_LANE_MODULES {
            let id = tree.create_module("passthrough").unwrap();
            tree.insert_module(lane, i, id).unwrap();
            pump(&mut engine);
        }
        let overflow = tree.create_module("passthrough").unwrap();
        assert_eq!(
            tree.insert_module(lane, 0, overflow),
            Err(TreeError::LaneFull(lane))
        );
    }

    #[test]
    fn move_reorders_the_mirror() {
        let (mut engine, mut tree) = engine_and_tree();
        let lane = tree.lane_ids()[0];
        let a = tree.create_module("passthrough").unwrap();
        let b = tree.create_module("spectral_gain").unwrap();
        tree.insert_module(lane, 0, a).unwrap();
        tree.insert_module(lane, 1, b).unwrap();
        pump(&mut engine);

        tree.move_module(a, lane, 1).unwrap();
        assert_eq!(tree.modules_in(lane).unwrap(), &[b, a]);

        let other = tree.lane_ids()[2];
        tree.move_module(a, other, 0).unwrap();
        assert_eq!(tree.modules_in(lane).unwrap(), &[b]);
        assert_eq!(tree.modules_in(other).unwrap(), &[a]);
        assert_eq!(tree.get(a).unwrap().lane, Some(other));
    }
}
