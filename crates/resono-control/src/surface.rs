//! The instrument surface driven by [`ControlState::apply`](crate::ControlState::apply).

use resono_core::{Envelope, FmGraph, LoopCommand, Session, VoiceId};

/// Everything the control layer may do to a running instrument.
///
/// Implemented directly by [`Session`] for offline rendering and by the
/// real-time engine handle, which forwards each call to the audio thread.
pub trait InstrumentSurface {
    /// Install a finished graph.
    fn set_synth(&mut self, graph: FmGraph);

    /// Set the tuning reference in Hz.
    fn set_tuning(&mut self, base_freq: f64);

    /// Replace the envelope.
    fn set_envelope(&mut self, envelope: Envelope);

    /// Set the instrument volume out of [`resono_core::VOLUME_DENOM`].
    fn set_volume(&mut self, volume_num: i64);

    /// Start a note and return its ticket.
    fn press_voice(&mut self, semitone: i32, volume_num: i64) -> VoiceId;

    /// Release a note. Stale tickets are ignored.
    fn release_voice(&mut self, id: VoiceId);

    /// Change a sounding note's velocity.
    fn set_voice_volume(&mut self, id: VoiceId, volume_num: i64);

    /// Forward a looper command.
    fn loop_command(&mut self, command: LoopCommand);
}

impl InstrumentSurface for Session {
    fn set_synth(&mut self, graph: FmGraph) {
        self.instrument_mut().set_synth(graph);
    }

    fn set_tuning(&mut self, base_freq: f64) {
        self.instrument_mut().set_tuning(base_freq);
    }

    fn set_envelope(&mut self, envelope: Envelope) {
        self.instrument_mut().set_envelope(envelope);
    }

    fn set_volume(&mut self, volume_num: i64) {
        self.instrument_mut().set_volume(volume_num);
    }

    fn press_voice(&mut self, semitone: i32, volume_num: i64) -> VoiceId {
        self.instrument_mut().press_voice(semitone, volume_num)
    }

    fn release_voice(&mut self, id: VoiceId) {
        self.instrument_mut().release_voice(id);
    }

    fn set_voice_volume(&mut self, id: VoiceId, volume_num: i64) {
        self.instrument_mut().set_voice_volume(id, volume_num);
    }

    fn loop_command(&mut self, command: LoopCommand) {
        Session::loop_command(self, command);
    }
}
