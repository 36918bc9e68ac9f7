//! Bind records: which control drives which action, and how.
//!
//! A [`Bind`] pairs a [`Control`] (the physical input it listens to) with an
//! [`Action`] (what it does to the instrument) and a set of [`Modifiers`]
//! that reshape the input before it reaches the action.

use resono_core::{LoopOp, LoopTarget};

use crate::event::ControllerEvent;

/// Physical input a bind listens to.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Control {
    /// Listens to nothing
    #[default]
    Unbound,
    /// A button. With `active_state` set the bind is on only while the
    /// button reports that exact state (hat switches, selectors).
    ButtonPress {
        /// Button index
        index: u32,
        /// Discrete state that counts as pressed
        active_state: Option<i32>,
    },
    /// An axis read as a continuous value with a deadzone around `origin`.
    AxisContinuous {
        /// Axis index
        index: u32,
        /// Flip the axis
        invert: bool,
        /// Deadzone half-width
        threshold: f64,
        /// Rest position
        origin: f64,
    },
    /// An axis read as a two-level switch.
    AxisThreshold {
        /// Axis index
        index: u32,
        /// Flip the axis
        invert: bool,
        /// Switching level
        threshold: f64,
    },
}

impl Control {
    /// The event's value if the event is addressed to this control.
    ///
    /// Buttons with an `active_state` report `1.0` while the button sits in
    /// that state and `0.0` otherwise.
    pub fn raw_value(&self, event: &ControllerEvent) -> Option<f64> {
        match *self {
            Control::Unbound => None,
            Control::ButtonPress {
                index,
                active_state,
            } => {
                if event.button_index != Some(index) {
                    return None;
                }
                Some(match active_state {
                    Some(state) => {
                        if event.value.round() as i64 == i64::from(state) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    None => event.value,
                })
            }
            Control::AxisContinuous { index, .. } | Control::AxisThreshold { index, .. } => {
                (event.axis_index == Some(index)).then_some(event.value)
            }
        }
    }

    /// True for the axis variants.
    pub fn is_axis(&self) -> bool {
        matches!(
            self,
            Control::AxisContinuous { .. } | Control::AxisThreshold { .. }
        )
    }

    /// File-format tag.
    pub fn name(&self) -> &'static str {
        match self {
            Control::Unbound => "UNBOUND",
            Control::ButtonPress { .. } => "BUTTON_PRESS",
            Control::AxisContinuous { .. } => "AXIS_1D_CONTINUOUS",
            Control::AxisThreshold { .. } => "AXIS_1D_THRESHOLD",
        }
    }
}

/// Modifier flags as stored in a binding file.
///
/// Several flags may be set in a file; [`Modifiers::effective`] decides which
/// one actually applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// Press once for on, again for off
    pub toggle: bool,
    /// Input is a speed; the action follows its integral
    pub cumulative: bool,
    /// Each press increments a counter that becomes the value
    pub stacking: bool,
}

/// The single modifier behaviour that applies to a bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModifierMode {
    /// Value passes through
    #[default]
    Plain,
    /// Four-state toggle
    Toggle,
    /// Integrated speed
    Cumulative,
    /// Press counter
    Stacking,
}

impl Modifiers {
    /// Resolve the at-most-one rule: stacking wins over toggle, toggle over
    /// cumulative.
    pub fn effective(&self) -> ModifierMode {
        if self.stacking {
            ModifierMode::Stacking
        } else if self.toggle {
            ModifierMode::Toggle
        } else if self.cumulative {
            ModifierMode::Cumulative
        } else {
            ModifierMode::Plain
        }
    }
}

/// Envelope stage addressed by [`Action::EnvelopeAdjust`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnvelopeStage {
    /// Attack length
    Attack,
    /// Decay length
    Decay,
    /// Sustain level
    Sustain,
    /// Release length
    Release,
}

impl EnvelopeStage {
    /// All stages in file order.
    pub const ALL: [EnvelopeStage; 4] = [
        EnvelopeStage::Attack,
        EnvelopeStage::Decay,
        EnvelopeStage::Sustain,
        EnvelopeStage::Release,
    ];

    /// Position in [`EnvelopeStage::ALL`], also the file-format index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stage for a file-format index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// What a bind does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// Play a note while the value is above zero; the value is the velocity.
    Key {
        /// Offset from the tuning frequency
        semitone: i32,
    },
    /// Transpose by `max_expt · v` semitones.
    FrequencyExpt {
        /// Semitones at full deflection
        max_expt: f64,
    },
    /// Scale the instrument volume.
    VolumeMul {
        /// Multiplier at full deflection
        max_mul: f64,
    },
    /// Detune one oscillator's period.
    PeriodFine {
        /// Oscillator index in the patch graph
        mod_index: usize,
        /// Period offset at full deflection
        max_fine: f64,
    },
    /// Scale one oscillator's amplitude.
    AmplitudeMul {
        /// Oscillator index in the patch graph
        mod_index: usize,
        /// Multiplier at full deflection
        max_mul: f64,
    },
    /// Scale one envelope stage.
    EnvelopeAdjust {
        /// Stage to scale
        which: EnvelopeStage,
        /// Multiplier at full deflection
        max_mul: f64,
    },
    /// Drive the looper.
    LoopControl {
        /// Addressed slot(s)
        target: LoopTarget,
        /// Operation
        op: LoopOp,
    },
}

impl Action {
    /// File-format tag.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Key { .. } => "KEY",
            Action::FrequencyExpt { .. } => "FREQUENCY_EXPT",
            Action::VolumeMul { .. } => "VOLUME_MUL",
            Action::PeriodFine { .. } => "PERIOD_FINE",
            Action::AmplitudeMul { .. } => "AMPLITUDE_MUL",
            Action::EnvelopeAdjust { .. } => "ENVELOPE_ADJUST",
            Action::LoopControl { .. } => "LOOP_CONTROL",
        }
    }

    /// Oscillator this action addresses, if any.
    pub fn oscillator_index(&self) -> Option<usize> {
        match *self {
            Action::PeriodFine { mod_index, .. } | Action::AmplitudeMul { mod_index, .. } => {
                Some(mod_index)
            }
            _ => None,
        }
    }
}

/// One control-to-action mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bind {
    /// Unique within a [`Bindings`](crate::Bindings) set
    pub action_id: u32,
    /// Input listened to
    pub control: Control,
    /// Modifier flags
    pub modifiers: Modifiers,
    /// Effect
    pub action: Action,
}

impl Bind {
    /// Create a bind with its modifiers already sanitized.
    pub fn new(action_id: u32, control: Control, modifiers: Modifiers, action: Action) -> Self {
        let mut bind = Self {
            action_id,
            control,
            modifiers,
            action,
        };
        bind.sanitize();
        bind
    }

    /// Clear the modifier flags this bind cannot use and all but the
    /// effective one.
    ///
    /// Continuous axes never toggle. Loop controls never stack or
    /// accumulate.
    pub fn sanitize(&mut self) {
        if matches!(self.control, Control::AxisContinuous { .. }) {
            self.modifiers.toggle = false;
        }
        if matches!(self.action, Action::LoopControl { .. }) {
            self.modifiers.stacking = false;
            self.modifiers.cumulative = false;
        }
        self.modifiers = match self.modifiers.effective() {
            ModifierMode::Plain => Modifiers::default(),
            ModifierMode::Toggle => Modifiers {
                toggle: true,
                ..Modifiers::default()
            },
            ModifierMode::Cumulative => Modifiers {
                cumulative: true,
                ..Modifiers::default()
            },
            ModifierMode::Stacking => Modifiers {
                stacking: true,
                ..Modifiers::default()
            },
        };
    }

    /// Effective modifier behaviour.
    pub fn mode(&self) -> ModifierMode {
        self.modifiers.effective()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_raw_value() {
        let control = Control::ButtonPress {
            index: 2,
            active_state: None,
        };
        assert_eq!(control.raw_value(&ControllerEvent::button(0, 2, 1.0)), Some(1.0));
        assert_eq!(control.raw_value(&ControllerEvent::button(0, 3, 1.0)), None);
        assert_eq!(control.raw_value(&ControllerEvent::axis(0, 2, 1.0, false)), None);
    }

    #[test]
    fn test_button_active_state() {
        let hat_up = Control::ButtonPress {
            index: 0,
            active_state: Some(3),
        };
        assert_eq!(hat_up.raw_value(&ControllerEvent::button(0, 0, 3.0)), Some(1.0));
        assert_eq!(hat_up.raw_value(&ControllerEvent::button(0, 0, 2.9)), Some(1.0));
        assert_eq!(hat_up.raw_value(&ControllerEvent::button(0, 0, 1.0)), Some(0.0));
    }

    #[test]
    fn test_axis_raw_value() {
        let control = Control::AxisThreshold {
            index: 1,
            invert: false,
            threshold: 0.5,
        };
        assert_eq!(control.raw_value(&ControllerEvent::axis(0, 1, 0.7, true)), Some(0.7));
        assert_eq!(control.raw_value(&ControllerEvent::button(0, 1, 1.0)), None);
        assert_eq!(Control::Unbound.raw_value(&ControllerEvent::button(0, 0, 1.0)), None);
    }

    #[test]
    fn test_modifier_priority() {
        let all = Modifiers {
            toggle: true,
            cumulative: true,
            stacking: true,
        };
        assert_eq!(all.effective(), ModifierMode::Stacking);
        let tc = Modifiers {
            toggle: true,
            cumulative: true,
            stacking: false,
        };
        assert_eq!(tc.effective(), ModifierMode::Toggle);
        assert_eq!(Modifiers::default().effective(), ModifierMode::Plain);
    }

    #[test]
    fn test_sanitize_continuous_axis_drops_toggle() {
        let bind = Bind::new(
            0,
            Control::AxisContinuous {
                index: 0,
                invert: false,
                threshold: 0.1,
                origin: 0.0,
            },
            Modifiers {
                toggle: true,
                cumulative: true,
                stacking: false,
            },
            Action::VolumeMul { max_mul: 2.0 },
        );
        assert_eq!(bind.mode(), ModifierMode::Cumulative);
        assert!(!bind.modifiers.toggle);
    }

    #[test]
    fn test_sanitize_loop_control() {
        let bind = Bind::new(
            0,
            Control::ButtonPress {
                index: 0,
                active_state: None,
            },
            Modifiers {
                toggle: false,
                cumulative: true,
                stacking: true,
            },
            Action::LoopControl {
                target: LoopTarget::Selected,
                op: LoopOp::Record,
            },
        );
        assert_eq!(bind.mode(), ModifierMode::Plain);
        assert_eq!(bind.modifiers, Modifiers::default());
    }

    #[test]
    fn test_envelope_stage_index() {
        for (i, stage) in EnvelopeStage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(EnvelopeStage::from_index(i), Some(*stage));
        }
        assert_eq!(EnvelopeStage::from_index(4), None);
    }
}
