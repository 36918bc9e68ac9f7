//! Hand-off between the control thread and the audio callback.
//!
//! [`engine_pair`] splits a [`Session`] into an [`Engine`], which lives in
//! the audio callback, and an [`EngineHandle`], which the control thread
//! drives through [`InstrumentSurface`]. Commands travel over a bounded
//! channel and are drained at the start of every buffer, so they take
//! effect on buffer boundaries. Replaced graphs and voice states travel
//! back over a second channel and are dropped on the control thread.
//!
//! When the command queue is full, note and looper events wait in a
//! backlog on the control thread and go out, in order, before anything
//! else. Parameter changes are not queued behind them; they are sent again
//! on the next call with the same value.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use resono_control::InstrumentSurface;
use resono_core::{
    Envelope, FmGraph, FmInstrument, LoopCommand, Session, VoiceGraphState, VoiceId,
};

use crate::recorder::RecorderTap;

/// Commands queued toward the audio thread.
const COMMAND_CAPACITY: usize = 1024;

/// Graphs sent and not yet collected back. Also the retire queue size, so
/// the audio thread always has room to hand a replaced graph back.
const RETIRE_CAPACITY: usize = 16;

/// A change to the running session.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Install a finished graph. `states` carries voice states sized for a
    /// graph whose shape differs from the running one.
    SetSynth {
        /// Graph to install.
        graph: FmGraph,
        /// Prepared voice states, one per voice.
        states: Option<Vec<VoiceGraphState>>,
    },
    /// Tuning reference in Hz.
    SetTuning(f64),
    /// Replace the envelope.
    SetEnvelope(Envelope),
    /// Instrument volume out of `VOLUME_DENOM`.
    SetVolume(i64),
    /// Start a note under a ticket chosen by the handle.
    Press {
        /// Ticket.
        id: VoiceId,
        /// Semitone offset.
        semitone: i32,
        /// Velocity out of `VOLUME_DENOM`.
        volume: i64,
    },
    /// Release a note.
    Release(VoiceId),
    /// Change a note's velocity.
    VoiceVolume {
        /// Ticket.
        id: VoiceId,
        /// Velocity out of `VOLUME_DENOM`.
        volume: i64,
    },
    /// Release every note.
    ReleaseAll,
    /// Looper command.
    Loop(LoopCommand),
    /// Looper tempo.
    SetBpm(f64),
}

impl EngineCommand {
    /// Parameter changes carry a whole value; a newer one replaces an older
    /// one. Everything else is an event that must arrive.
    fn is_parameter(&self) -> bool {
        matches!(
            self,
            Self::SetSynth { .. } | Self::SetTuning(_) | Self::SetEnvelope(_) | Self::SetVolume(_)
        )
    }
}

/// What the audio thread hands back after installing a graph.
struct Retired {
    _graph: FmGraph,
    _states: Option<Vec<VoiceGraphState>>,
}

/// Audio-thread half: owns the session.
pub struct Engine {
    session: Session,
    commands: Receiver<EngineCommand>,
    retire: Sender<Retired>,
    recorder: Option<RecorderTap>,
}

impl Engine {
    /// Record every rendered buffer through `tap`.
    pub fn with_recorder(mut self, tap: RecorderTap) -> Self {
        self.recorder = Some(tap);
        self
    }

    /// The session as of the last processed buffer.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Apply queued commands, then render `buf`.
    pub fn process(&mut self, buf: &mut [i32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.execute(command);
        }
        self.session.render(buf);
        if let Some(tap) = &self.recorder {
            tap.push(buf);
        }
    }

    fn execute(&mut self, command: EngineCommand) {
        let instrument = self.session.instrument_mut();
        match command {
            EngineCommand::SetSynth { mut graph, states } => {
                let states = match states {
                    Some(mut states) => {
                        instrument.swap_synth_with_states(&mut graph, &mut states);
                        Some(states)
                    }
                    None => {
                        instrument.swap_synth(&mut graph);
                        None
                    }
                };
                // the handle never has more than RETIRE_CAPACITY graphs out
                let _ = self.retire.try_send(Retired {
                    _graph: graph,
                    _states: states,
                });
            }
            EngineCommand::SetTuning(freq) => instrument.set_tuning(freq),
            EngineCommand::SetEnvelope(envelope) => instrument.set_envelope(envelope),
            EngineCommand::SetVolume(volume) => instrument.set_volume(volume),
            EngineCommand::Press {
                id,
                semitone,
                volume,
            } => instrument.press_voice_with_id(id, semitone, volume),
            EngineCommand::Release(id) => {
                instrument.release_voice(id);
            }
            EngineCommand::VoiceVolume { id, volume } => {
                instrument.set_voice_volume(id, volume);
            }
            EngineCommand::ReleaseAll => instrument.release_all(),
            EngineCommand::Loop(command) => self.session.loop_command(command),
            EngineCommand::SetBpm(bpm) => self.session.looper_mut().set_bpm(bpm),
        }
    }
}

/// Control-thread half: forwards instrument changes to the [`Engine`].
///
/// Parameter commands are only sent when the value differs from the last
/// one the engine accepted, so applying an unchanged control state every
/// frame costs nothing on the audio thread.
pub struct EngineHandle {
    commands: Sender<EngineCommand>,
    retired: Receiver<Retired>,
    backlog: VecDeque<EngineCommand>,
    graphs_out: usize,
    next_voice: VoiceId,
    polyphony: usize,
    sample_rate: u32,
    deferred: u64,
    last_graph: Option<FmGraph>,
    last_tuning: Option<f64>,
    last_envelope: Option<Envelope>,
    last_volume: Option<i64>,
}

/// Split `session` into its audio-thread and control-thread halves.
pub fn engine_pair(mut session: Session) -> (Engine, EngineHandle) {
    let (command_tx, command_rx) = bounded(COMMAND_CAPACITY);
    let (retire_tx, retire_rx) = bounded(RETIRE_CAPACITY);
    let next_voice = session.instrument_mut().reserve_voice_id();
    let instrument = session.instrument();
    let handle = EngineHandle {
        commands: command_tx,
        retired: retire_rx,
        backlog: VecDeque::new(),
        graphs_out: 0,
        next_voice,
        polyphony: instrument.polyphony(),
        sample_rate: instrument.sample_rate(),
        deferred: 0,
        last_graph: Some(instrument.graph().clone()),
        last_tuning: Some(instrument.tuning()),
        last_envelope: Some(*instrument.envelope()),
        last_volume: Some(instrument.volume()),
    };
    let engine = Engine {
        session,
        commands: command_rx,
        retire: retire_tx,
        recorder: None,
    };
    (engine, handle)
}

impl EngineHandle {
    /// Sample rate of the session.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Parameter changes that found the queue full. Each is sent again on
    /// the next call that sets the parameter.
    pub fn deferred(&self) -> u64 {
        self.deferred
    }

    /// Events waiting for room in the queue.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Queue a command. Returns false if a parameter change did not fit;
    /// events that do not fit wait in the backlog.
    pub fn send(&mut self, command: EngineCommand) -> bool {
        self.flush();
        if !self.backlog.is_empty() {
            return self.defer(command);
        }
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => self.defer(command),
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("engine gone, command ignored");
                false
            }
        }
    }

    fn defer(&mut self, command: EngineCommand) -> bool {
        if command.is_parameter() {
            self.deferred += 1;
            tracing::debug!(?command, "engine queue full, parameter change deferred");
            false
        } else {
            if self.backlog.is_empty() {
                tracing::warn!("engine queue full, holding events");
            }
            self.backlog.push_back(command);
            true
        }
    }

    /// Move backlogged events into the queue while it has room.
    fn flush(&mut self) {
        while let Some(command) = self.backlog.pop_front() {
            match self.commands.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    self.backlog.push_front(command);
                    return;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.backlog.clear();
                    return;
                }
            }
        }
    }

    /// Release every note.
    pub fn release_all(&mut self) {
        self.send(EngineCommand::ReleaseAll);
    }

    /// Change the looper tempo.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.send(EngineCommand::SetBpm(bpm));
    }

    /// Drop graphs the audio thread has replaced and push out backlogged
    /// events. Returns how many graphs were dropped.
    pub fn collect_garbage(&mut self) -> usize {
        let count = self.retired.try_iter().count();
        self.graphs_out = self.graphs_out.saturating_sub(count);
        self.flush();
        count
    }
}

impl InstrumentSurface for EngineHandle {
    fn set_synth(&mut self, mut graph: FmGraph) {
        self.collect_garbage();
        if graph.needs_finish() {
            graph.finish_changes();
        }
        if self.last_graph.as_ref() == Some(&graph) {
            return;
        }
        if self.graphs_out >= RETIRE_CAPACITY {
            self.deferred += 1;
            tracing::debug!("replaced graphs not collected yet, install deferred");
            return;
        }
        let compatible = self
            .last_graph
            .as_ref()
            .is_some_and(|last| last.is_index_compatible(&graph));
        let states = (!compatible).then(|| FmInstrument::voice_states_for(&graph, self.polyphony));
        let sent = self.send(EngineCommand::SetSynth {
            graph: graph.clone(),
            states,
        });
        if sent {
            self.graphs_out += 1;
            self.last_graph = Some(graph);
        }
    }

    fn set_tuning(&mut self, base_freq: f64) {
        if self.last_tuning != Some(base_freq) && self.send(EngineCommand::SetTuning(base_freq)) {
            self.last_tuning = Some(base_freq);
        }
    }

    fn set_envelope(&mut self, envelope: Envelope) {
        if self.last_envelope != Some(envelope) && self.send(EngineCommand::SetEnvelope(envelope))
        {
            self.last_envelope = Some(envelope);
        }
    }

    fn set_volume(&mut self, volume_num: i64) {
        if self.last_volume != Some(volume_num) && self.send(EngineCommand::SetVolume(volume_num)) {
            self.last_volume = Some(volume_num);
        }
    }

    fn press_voice(&mut self, semitone: i32, volume_num: i64) -> VoiceId {
        let id = self.next_voice;
        self.next_voice += 1;
        self.send(EngineCommand::Press {
            id,
            semitone,
            volume: volume_num,
        });
        id
    }

    fn release_voice(&mut self, id: VoiceId) {
        self.send(EngineCommand::Release(id));
    }

    fn set_voice_volume(&mut self, id: VoiceId, volume_num: i64) {
        self.send(EngineCommand::VoiceVolume {
            id,
            volume: volume_num,
        });
    }

    fn loop_command(&mut self, command: LoopCommand) {
        self.send(EngineCommand::Loop(command));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resono_control::ControlState;
    use resono_core::{
        LoopOp, LoopState, LoopTarget, ModulationMode, Oscillator, Patch, SessionConfig,
        VOLUME_DENOM, Waveform,
    };

    fn pair() -> (Engine, EngineHandle) {
        let patch = Patch::default();
        engine_pair(Session::from_patch(&patch, 44100, SessionConfig::default()))
    }

    fn two_operator() -> FmGraph {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Sine));
        let m = graph.add_oscillator(Oscillator::new(Waveform::Sine).with_amplitude(1, 8));
        graph.add_carrier(c);
        graph.connect(c, m);
        graph.finish_changes();
        graph
    }

    #[test]
    fn test_commands_apply_at_buffer_start() {
        let (mut engine, mut handle) = pair();
        let id = handle.press_voice(0, VOLUME_DENOM);
        assert_eq!(engine.session().instrument().active_voices(), 0);

        let mut buf = vec![0i32; 256];
        engine.process(&mut buf);
        assert_eq!(engine.session().instrument().active_voices(), 1);
        assert!(buf.iter().any(|&s| s != 0));

        handle.release_voice(id);
        engine.process(&mut buf);
        // default envelope has no release tail
        assert_eq!(engine.session().instrument().active_voices(), 0);
    }

    #[test]
    fn test_tickets_are_unique() {
        let (_engine, mut handle) = pair();
        let a = handle.press_voice(0, VOLUME_DENOM);
        let b = handle.press_voice(7, VOLUME_DENOM);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unchanged_parameters_not_resent() {
        let (engine, mut handle) = pair();
        let graph = engine.session().instrument().graph().clone();
        handle.set_synth(graph);
        handle.set_volume(engine.session().instrument().volume());
        handle.set_tuning(engine.session().instrument().tuning());
        assert!(engine.commands.is_empty());

        handle.set_volume(VOLUME_DENOM / 2);
        handle.set_volume(VOLUME_DENOM / 2);
        assert_eq!(engine.commands.len(), 1);
    }

    #[test]
    fn test_replaced_graph_is_retired() {
        let (mut engine, mut handle) = pair();
        let mut graph = engine.session().instrument().graph().clone();
        graph.oscillator_mut(0).unwrap().set_amplitude(1, 2);
        graph.finish_changes();
        handle.set_synth(graph.clone());

        let mut buf = vec![0i32; 64];
        engine.process(&mut buf);
        assert_eq!(engine.session().instrument().graph(), &graph);
        assert_eq!(handle.collect_garbage(), 1);
    }

    #[test]
    fn test_shape_change_ships_voice_states() {
        let (mut engine, mut handle) = pair();
        let id = handle.press_voice(0, VOLUME_DENOM);
        let mut buf = vec![0i32; 64];
        engine.process(&mut buf);

        let graph = two_operator();
        handle.set_synth(graph.clone());
        match engine.commands.try_recv() {
            Ok(EngineCommand::SetSynth { graph: sent, states }) => {
                let states = states.expect("new shape needs prepared states");
                assert_eq!(states.len(), engine.session().instrument().polyphony());
                assert!(states.iter().all(|s| sent.fits_voice_state(s)));
                engine.execute(EngineCommand::SetSynth {
                    graph: sent,
                    states: Some(states),
                });
            }
            other => panic!("expected a graph install, got {other:?}"),
        }
        engine.process(&mut buf);
        assert_eq!(engine.session().instrument().graph(), &graph);
        assert!(buf.iter().any(|&s| s != 0));
        assert_eq!(handle.collect_garbage(), 1);

        // same shape, new amplitude: no states needed
        let mut louder = graph.clone();
        louder.oscillator_mut(1).unwrap().set_amplitude(1, 2);
        louder.finish_changes();
        handle.set_synth(louder);
        assert!(matches!(
            engine.commands.try_recv(),
            Ok(EngineCommand::SetSynth { states: None, .. })
        ));
        handle.release_voice(id);
    }

    #[test]
    fn test_graphs_in_flight_are_bounded() {
        let (mut engine, mut handle) = pair();
        for n in 0..RETIRE_CAPACITY + 4 {
            let mut graph = FmGraph::sine();
            graph.oscillator_mut(0).unwrap().set_amplitude(1, n as i64 + 2);
            graph.finish_changes();
            handle.set_synth(graph);
        }
        assert_eq!(engine.commands.len(), RETIRE_CAPACITY);
        assert_eq!(handle.deferred(), 4);

        let mut buf = vec![0i32; 64];
        engine.process(&mut buf);
        assert_eq!(handle.collect_garbage(), RETIRE_CAPACITY);
    }

    #[test]
    fn test_loop_commands_forwarded() {
        let (mut engine, mut handle) = pair();
        handle.loop_command(LoopCommand {
            target: LoopTarget::Slot(0),
            op: LoopOp::Record,
            value: 1.0,
        });
        let mut buf = vec![0i32; 64];
        engine.process(&mut buf);
        assert_eq!(
            engine.session().looper().slot(0).map(|s| s.state()),
            Some(LoopState::Recording)
        );
    }

    #[test]
    fn test_full_queue_keeps_events() {
        let (mut engine, mut handle) = pair();
        for _ in 0..COMMAND_CAPACITY + 3 {
            handle.release_all();
        }
        assert_eq!(handle.backlog(), 3);
        assert_eq!(engine.commands.len(), COMMAND_CAPACITY);

        let mut buf = vec![0i32; 64];
        engine.process(&mut buf);
        handle.collect_garbage();
        assert_eq!(handle.backlog(), 0);
        assert_eq!(engine.commands.len(), 3);
    }

    #[test]
    fn test_release_survives_stalled_callback() {
        let (mut engine, mut handle) = pair();
        let patch = Patch::default();
        let mut state = ControlState::new();
        let key = resono_control::FullId::new(0, 1);
        state.press_key(key, 0, 1.0);

        // the callback stalls while the control thread keeps applying
        for _ in 0..1100 {
            state.apply(&mut handle, 1.0, &patch).unwrap();
        }
        for _ in 0..COMMAND_CAPACITY {
            handle.set_bpm(100.0);
        }
        state.release_key(key);
        state.apply(&mut handle, 0.5, &patch).unwrap();
        assert!(handle.deferred() > 0);

        let mut buf = vec![0i32; 64];
        while handle.backlog() > 0 || !engine.commands.is_empty() {
            engine.process(&mut buf);
            handle.collect_garbage();
        }
        state.apply(&mut handle, 0.5, &patch).unwrap();
        engine.process(&mut buf);

        let instrument = engine.session().instrument();
        assert_eq!(instrument.active_voices(), 0);
        assert_eq!(instrument.volume(), VOLUME_DENOM / 2);
    }
}
