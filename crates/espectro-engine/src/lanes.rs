//! The effect-routing graph executed on the audio thread.
//!
//! A fixed set of lane slots, each an ordered chain of spectral modules
//! over one routing of the input channels. The audio thread owns this
//! structure exclusively; edits arrive as [`LaneCommand`]s applied between
//! blocks, and displaced module boxes leave on the retire channel. Module
//! vectors are preallocated to capacity, so applying an edit never
//! allocates.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use espectro_spectral::{SpectralModule, SpectrumBlock};

use crate::commands::{LaneCommand, RetiredModule};
use crate::tree::ProcessorId;

/// Upper bound on concurrent lanes.
pub const MAX_LANES: usize = 4;

/// Upper bound on modules per lane; lane chains are preallocated to this
/// capacity so splices never allocate on the audio thread.
pub const MAX_LANE_MODULES: usize = 16;

/// Upper bound on stream channels the lane router supports.
pub const MAX_CHANNELS: usize = 8;

/// Energy floor below which gain matching leaves the signal alone.
const GAIN_MATCH_FLOOR: f32 = 1e-12;

/// Which input channels feed a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LaneSource {
    /// All input channels pass through this lane.
    #[default]
    Stereo,
    /// A single input channel.
    Channel(usize),
}

/// One lane: an ordered module chain with routing and per-lane flags.
pub struct EffectsLane {
    id: ProcessorId,
    enabled: bool,
    gain_match: bool,
    source: LaneSource,
    modules: Vec<(ProcessorId, Box<dyn SpectralModule + Send>)>,
}

impl EffectsLane {
    fn new(id: ProcessorId, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            gain_match: false,
            source: LaneSource::Stereo,
            modules: Vec::with_capacity(MAX_LANE_MODULES),
        }
    }

    /// The lane's tree identity.
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Whether the lane currently processes audio.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of modules in the chain.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

/// The full lane array plus the working blocks it processes into.
pub struct EffectsState {
    lanes: Vec<EffectsLane>,
    channels: usize,
    /// Working block for stereo-routed lanes.
    scratch_multi: SpectrumBlock,
    /// Working block for single-channel lanes.
    scratch_mono: SpectrumBlock,
    retired_tx: Sender<RetiredModule>,
}

impl EffectsState {
    /// Builds the lane array. Lane 0 starts enabled with a stereo routing;
    /// the rest start bypassed.
    pub(crate) fn new(
        lane_ids: &[ProcessorId],
        channels: usize,
        fft_size: usize,
        sample_rate: f32,
        retired_tx: Sender<RetiredModule>,
    ) -> Self {
        debug_assert!(channels <= MAX_CHANNELS);
        let lanes = lane_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| EffectsLane::new(id, i == 0))
            .collect();
        Self {
            lanes,
            channels,
            scratch_multi: SpectrumBlock::new(channels, fft_size, sample_rate),
            scratch_mono: SpectrumBlock::new(1, fft_size, sample_rate),
            retired_tx,
        }
    }

    /// Lane views, in processing order.
    pub fn lanes(&self) -> &[EffectsLane] {
        &self.lanes
    }

    /// Applies one structural edit. Runs between blocks on the audio
    /// thread; unknown ids are a normal race with a concurrent edit and
    /// are ignored with a warning — the edit side validated first.
    pub fn apply(&mut self, command: LaneCommand) {
        match command {
            LaneCommand::InsertModule {
                lane,
                index,
                id,
                module,
            } => match self.lanes.iter().position(|l| l.id == lane) {
                None => {
                    tracing::warn!(?lane, "insert into unknown lane, retiring module");
                    self.retire(id, module);
                }
                Some(pos) if self.lanes[pos].modules.len() >= MAX_LANE_MODULES => {
                    tracing::warn!(?id, "lane chain full, retiring module");
                    self.retire(id, module);
                }
                Some(pos) => {
                    let at = index.min(self.lanes[pos].modules.len());
                    self.lanes[pos].modules.insert(at, (id, module));
                    tracing::debug!(?id, at, "module linked");
                }
            },
            LaneCommand::RemoveModule { id } => {
                if let Some(module) = self.take_module(id) {
                    self.retire(id, module);
                    tracing::debug!(?id, "module unlinked");
                } else {
                    tracing::warn!(?id, "remove of unknown module ignored");
                }
            }
            LaneCommand::MoveModule { id, lane, index } => {
                let Some(module) = self.take_module(id) else {
                    tracing::warn!(?id, "move of unknown module ignored");
                    return;
                };
                let Some(lane) = self.lanes.iter_mut().find(|l| l.id == lane) else {
                    tracing::warn!(?lane, "move to unknown lane, retiring module");
                    self.retire(id, module);
                    return;
                };
                if lane.modules.len() >= MAX_LANE_MODULES {
                    self.retire(id, module);
                    return;
                }
                let at = index.min(lane.modules.len());
                lane.modules.insert(at, (id, module));
            }
            LaneCommand::SetLaneEnabled { lane, enabled } => {
                if let Some(lane) = self.lanes.iter_mut().find(|l| l.id == lane) {
                    lane.enabled = enabled;
                }
            }
            LaneCommand::SetLaneGainMatch { lane, enabled } => {
                if let Some(lane) = self.lanes.iter_mut().find(|l| l.id == lane) {
                    lane.gain_match = enabled;
                }
            }
            LaneCommand::SetLaneSource { lane, source } => {
                if let Some(lane) = self.lanes.iter_mut().find(|l| l.id == lane) {
                    lane.source = source;
                }
            }
        }
    }

    fn take_module(&mut self, id: ProcessorId) -> Option<Box<dyn SpectralModule + Send>> {
        for lane in &mut self.lanes {
            if let Some(pos) = lane.modules.iter().position(|(mid, _)| *mid == id) {
                return Some(lane.modules.remove(pos).1);
            }
        }
        None
    }

    /// Hands a box back to the edit side. If the retire queue is full the
    /// box is dropped here — degraded but safe; the edit side is expected
    /// to drain retirements.
    fn retire(&mut self, id: ProcessorId, module: Box<dyn SpectralModule + Send>) {
        if self.retired_tx.try_send(RetiredModule { id, module }).is_err() {
            tracing::warn!(?id, "retire queue full, freeing module on the render side");
        }
    }

    /// Refreshes every active module's parameters at block rate.
    pub fn refresh_params(&mut self, sample_rate: f32, samples: usize) {
        for lane in &self.lanes {
            if !lane.enabled {
                continue;
            }
            for (_, module) in &lane.modules {
                for param in module.params() {
                    param.update_values(sample_rate, samples, None);
                }
            }
        }
    }

    /// Reconfigures working blocks and module state for a new transform
    /// setup. Runs at a block boundary only.
    pub fn prepare(&mut self, sample_rate: f32, fft_size: usize) {
        self.scratch_multi
            .reconfigure(self.channels, fft_size, sample_rate);
        self.scratch_mono.reconfigure(1, fft_size, sample_rate);
        for lane in &mut self.lanes {
            for (_, module) in &mut lane.modules {
                module.prepare(sample_rate, fft_size);
            }
        }
    }

    /// Clears module state without touching structure or parameters.
    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            for (_, module) in &mut lane.modules {
                module.reset();
            }
        }
    }

    /// Runs every enabled lane's chain over one frequency-domain frame.
    ///
    /// Lane order and module order define processing order. Disabled lanes
    /// cost a flag check. Input channels claimed by no enabled lane pass
    /// through unmodified, so an all-lanes-off state degrades to identity
    /// rather than silence.
    pub fn process(&mut self, input: &SpectrumBlock, output: &mut SpectrumBlock) {
        output.clear();
        let mut claimed = [false; MAX_CHANNELS];

        for lane in &mut self.lanes {
            if !lane.enabled {
                continue;
            }
            match lane.source {
                LaneSource::Stereo => {
                    for channel in 0..self.channels {
                        self.scratch_multi.copy_channel_from(channel, input, channel);
                    }
                    let energy_in: f32 = if lane.gain_match {
                        (0..self.channels).map(|c| self.scratch_multi.energy(c)).sum()
                    } else {
                        0.0
                    };
                    for (_, module) in &mut lane.modules {
                        module.apply(&mut self.scratch_multi);
                    }
                    if lane.gain_match {
                        let energy_out: f32 =
                            (0..self.channels).map(|c| self.scratch_multi.energy(c)).sum();
                        rescale(&mut self.scratch_multi, energy_in, energy_out);
                    }
                    for channel in 0..self.channels {
                        output.add_channel_from(channel, &self.scratch_multi, channel);
                        claimed[channel] = true;
                    }
                }
                LaneSource::Channel(channel) => {
                    if channel >= self.channels {
                        continue;
                    }
                    self.scratch_mono.copy_channel_from(0, input, channel);
                    let energy_in = if lane.gain_match {
                        self.scratch_mono.energy(0)
                    } else {
                        0.0
                    };
                    for (_, module) in &mut lane.modules {
                        module.apply(&mut self.scratch_mono);
                    }
                    if lane.gain_match {
                        let energy_out = self.scratch_mono.energy(0);
                        rescale(&mut self.scratch_mono, energy_in, energy_out);
                    }
                    output.add_channel_from(channel, &self.scratch_mono, 0);
                    claimed[channel] = true;
                }
            }
        }

        for channel in 0..self.channels {
            if !claimed[channel] {
                output.copy_channel_from(channel, input, channel);
            }
        }
    }
}

/// Renormalizes a block's energy toward `energy_in`, compensating for
/// level changes introduced by the chain.
fn rescale(block: &mut SpectrumBlock, energy_in: f32, energy_out: f32) {
    if energy_out <= GAIN_MATCH_FLOOR || energy_in <= GAIN_MATCH_FLOOR {
        return;
    }
    let scale = (energy_in / energy_out).sqrt();
    for channel in 0..block.channel_count() {
        for bin in block.channel_mut(channel) {
            *bin *= scale;
        }
    }
}
