//! The publish/retire channel between the edit side and the audio thread.
//!
//! Structural edits are constructed in full on the UI/message thread and
//! travel as [`LaneCommand`] values over a bounded lock-free channel. The
//! audio thread drains the channel once at the top of each block and
//! applies the batch between blocks, so a rendering block only ever sees
//! fully-old or fully-new structure. Module boxes displaced by an edit go
//! back over the retire channel and are freed on the edit side — the audio
//! thread never blocks, never allocates for an edit, and never frees.

use crossbeam_channel::{Receiver, Sender, bounded};
use espectro_spectral::SpectralModule;

use crate::lanes::LaneSource;
use crate::tree::ProcessorId;

/// Capacity of the edit command channel. A full queue surfaces as
/// [`TreeError::EngineBusy`](crate::tree::TreeError::EngineBusy) on the
/// edit side; it never stalls either thread.
pub(crate) const COMMAND_QUEUE_DEPTH: usize = 64;

/// Capacity of the retire channel. Sized above the command depth so a
/// burst of removals cannot strand boxes.
pub(crate) const RETIRE_QUEUE_DEPTH: usize = 256;

/// One fully-constructed structural edit.
pub enum LaneCommand {
    /// Splice a module into a lane at `index` (clamped to the chain end).
    InsertModule {
        /// Target lane id.
        lane: ProcessorId,
        /// Position within the lane's chain.
        index: usize,
        /// The module's tree identity.
        id: ProcessorId,
        /// The module instance, ownership transferred to the audio side.
        module: Box<dyn SpectralModule + Send>,
    },
    /// Unlink a module wherever it currently sits; the box comes back on
    /// the retire channel.
    RemoveModule {
        /// The module's tree identity.
        id: ProcessorId,
    },
    /// Move a module to `index` in `lane` (possibly its current lane).
    MoveModule {
        /// The module's tree identity.
        id: ProcessorId,
        /// Destination lane id.
        lane: ProcessorId,
        /// Position within the destination chain.
        index: usize,
    },
    /// Enable or bypass a lane.
    SetLaneEnabled {
        /// Target lane id.
        lane: ProcessorId,
        /// New enabled state.
        enabled: bool,
    },
    /// Toggle output energy renormalization for a lane.
    SetLaneGainMatch {
        /// Target lane id.
        lane: ProcessorId,
        /// New gain-match state.
        enabled: bool,
    },
    /// Change which input channels feed a lane.
    SetLaneSource {
        /// Target lane id.
        lane: ProcessorId,
        /// New input routing.
        source: LaneSource,
    },
}

/// A module box handed back by the audio thread after removal.
pub struct RetiredModule {
    /// The module's tree identity.
    pub id: ProcessorId,
    /// The instance, now safe to inspect or drop off the audio thread.
    pub module: Box<dyn SpectralModule + Send>,
}

/// Both ends of the publish/retire pair, split between the tree and the
/// effects state at engine construction.
pub(crate) struct EditChannels {
    pub commands_tx: Sender<LaneCommand>,
    pub commands_rx: Receiver<LaneCommand>,
    pub retired_tx: Sender<RetiredModule>,
    pub retired_rx: Receiver<RetiredModule>,
}

impl EditChannels {
    pub(crate) fn new() -> Self {
        let (commands_tx, commands_rx) = bounded(COMMAND_QUEUE_DEPTH);
        let (retired_tx, retired_rx) = bounded(RETIRE_QUEUE_DEPTH);
        Self {
            commands_tx,
            commands_rx,
            retired_tx,
            retired_rx,
        }
    }
}
