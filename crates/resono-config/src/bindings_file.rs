//! Binding file format.

use std::path::Path;

use resono_control::{Action, Bind, Bindings, Control, EnvelopeStage, Modifiers};
use resono_core::{LoopOp, LoopTarget};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::file::{read_json, write_json};

/// Deadzone used when a continuous axis entry has no `threshold`.
pub const DEFAULT_DEADZONE: f64 = 0.1;

/// Switching level used when a threshold axis entry has no `threshold`.
pub const DEFAULT_AXIS_THRESHOLD: f64 = 0.5;

/// A binding preset as stored on disk.
///
/// Action ids are not stored; they are assigned in file order on load.
///
/// # JSON Format
///
/// ```json
/// {
///   "name": "Keyboard",
///   "locked": true,
///   "controller_type": "KEYBOARD",
///   "device_name": "",
///   "binds": [
///     { "control": { "type": "BUTTON_PRESS", "index": 44 },
///       "action": { "type": "KEY", "semitone": -9 } },
///     { "control": { "type": "AXIS_1D_CONTINUOUS", "index": 1, "threshold": 0.1,
///                    "cumulative": true },
///       "action": { "type": "VOLUME_MUL", "max_mul": 2.0 } },
///     { "control": { "type": "BUTTON_PRESS", "index": 57 },
///       "action": { "type": "LOOP_CONTROL", "index": -1, "op": "RECORD" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingsFile {
    /// Display name.
    pub name: String,

    /// Protected from editing.
    #[serde(default)]
    pub locked: bool,

    /// Kind of controller, e.g. `"KEYBOARD"` or `"JOYSTICK"`.
    #[serde(default)]
    pub controller_type: String,

    /// Device the set was made for.
    #[serde(default)]
    pub device_name: String,

    /// Binds in routing order.
    #[serde(default)]
    pub binds: Vec<BindEntry>,
}

/// One bind of a binding file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindEntry {
    /// Input and modifier flags.
    pub control: ControlEntry,
    /// Effect.
    pub action: ActionEntry,
}

/// Control variant tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ControlKind {
    /// Listens to nothing.
    #[default]
    #[serde(rename = "UNBOUND")]
    Unbound,
    /// A button.
    #[serde(rename = "BUTTON_PRESS")]
    ButtonPress,
    /// A continuous axis.
    #[serde(rename = "AXIS_1D_CONTINUOUS")]
    AxisContinuous,
    /// A thresholded axis.
    #[serde(rename = "AXIS_1D_THRESHOLD")]
    AxisThreshold,
}

/// Control section of a bind entry. Fields a variant does not use are
/// omitted on save and ignored on load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ControlEntry {
    /// Variant tag.
    #[serde(rename = "type", default)]
    pub kind: ControlKind,
    /// Button or axis index.
    #[serde(default)]
    pub index: u32,
    /// Button state that counts as pressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_state: Option<i32>,
    /// Flip the axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    /// Deadzone or switching level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Axis rest position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<f64>,
    /// Toggle modifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<bool>,
    /// Cumulative modifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative: Option<bool>,
    /// Stacking modifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacking: Option<bool>,
}

/// Action section of a bind entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionEntry {
    /// Note on a semitone.
    Key {
        /// Semitone offset.
        semitone: i32,
    },
    /// Transposition.
    FrequencyExpt {
        /// Semitones at full deflection.
        max_expt: f64,
    },
    /// Instrument volume.
    VolumeMul {
        /// Multiplier at full deflection.
        max_mul: f64,
    },
    /// Oscillator detune.
    PeriodFine {
        /// Oscillator index.
        mod_index: usize,
        /// Period offset at full deflection.
        max_fine: f64,
    },
    /// Oscillator amplitude.
    AmplitudeMul {
        /// Oscillator index.
        mod_index: usize,
        /// Multiplier at full deflection.
        max_mul: f64,
    },
    /// Envelope stage scaling.
    EnvelopeAdjust {
        /// 0 attack, 1 decay, 2 sustain, 3 release.
        which: usize,
        /// Multiplier at full deflection.
        max_mul: f64,
    },
    /// Looper control.
    LoopControl {
        /// Slot, `-1` for the selected slot, `-2` for all.
        index: i32,
        /// `"RECORD"`, `"MUTE"`, `"CLEAR"`, `"VOLUME"` or `"SELECT"`.
        op: String,
    },
}

fn flag(value: bool) -> Option<bool> {
    value.then_some(true)
}

impl ControlEntry {
    /// Describe a control and its modifiers.
    pub fn from_control(control: &Control, modifiers: &Modifiers) -> Self {
        let mut entry = ControlEntry {
            toggle: flag(modifiers.toggle),
            cumulative: flag(modifiers.cumulative),
            stacking: flag(modifiers.stacking),
            ..ControlEntry::default()
        };
        match *control {
            Control::Unbound => {}
            Control::ButtonPress {
                index,
                active_state,
            } => {
                entry.kind = ControlKind::ButtonPress;
                entry.index = index;
                entry.active_state = active_state;
            }
            Control::AxisContinuous {
                index,
                invert,
                threshold,
                origin,
            } => {
                entry.kind = ControlKind::AxisContinuous;
                entry.index = index;
                entry.invert = Some(invert);
                entry.threshold = Some(threshold);
                entry.origin = Some(origin);
            }
            Control::AxisThreshold {
                index,
                invert,
                threshold,
            } => {
                entry.kind = ControlKind::AxisThreshold;
                entry.index = index;
                entry.invert = Some(invert);
                entry.threshold = Some(threshold);
            }
        }
        entry
    }

    /// The control this entry describes.
    pub fn to_control(&self) -> Control {
        let invert = self.invert.unwrap_or(false);
        match self.kind {
            ControlKind::Unbound => Control::Unbound,
            ControlKind::ButtonPress => Control::ButtonPress {
                index: self.index,
                active_state: self.active_state,
            },
            ControlKind::AxisContinuous => Control::AxisContinuous {
                index: self.index,
                invert,
                threshold: self.threshold.unwrap_or(DEFAULT_DEADZONE),
                origin: self.origin.unwrap_or(0.0),
            },
            ControlKind::AxisThreshold => Control::AxisThreshold {
                index: self.index,
                invert,
                threshold: self.threshold.unwrap_or(DEFAULT_AXIS_THRESHOLD),
            },
        }
    }

    /// The modifier flags this entry carries.
    pub fn modifiers(&self) -> Modifiers {
        Modifiers {
            toggle: self.toggle.unwrap_or(false),
            cumulative: self.cumulative.unwrap_or(false),
            stacking: self.stacking.unwrap_or(false),
        }
    }
}

impl ActionEntry {
    /// Describe an action.
    pub fn from_action(action: &Action) -> Self {
        match *action {
            Action::Key { semitone } => ActionEntry::Key { semitone },
            Action::FrequencyExpt { max_expt } => ActionEntry::FrequencyExpt { max_expt },
            Action::VolumeMul { max_mul } => ActionEntry::VolumeMul { max_mul },
            Action::PeriodFine {
                mod_index,
                max_fine,
            } => ActionEntry::PeriodFine {
                mod_index,
                max_fine,
            },
            Action::AmplitudeMul { mod_index, max_mul } => {
                ActionEntry::AmplitudeMul { mod_index, max_mul }
            }
            Action::EnvelopeAdjust { which, max_mul } => ActionEntry::EnvelopeAdjust {
                which: which.index(),
                max_mul,
            },
            Action::LoopControl { target, op } => ActionEntry::LoopControl {
                index: target.index(),
                op: op.name().to_string(),
            },
        }
    }

    /// The action this entry describes.
    pub fn to_action(&self) -> Result<Action> {
        Ok(match *self {
            ActionEntry::Key { semitone } => Action::Key { semitone },
            ActionEntry::FrequencyExpt { max_expt } => Action::FrequencyExpt { max_expt },
            ActionEntry::VolumeMul { max_mul } => Action::VolumeMul { max_mul },
            ActionEntry::PeriodFine {
                mod_index,
                max_fine,
            } => Action::PeriodFine {
                mod_index,
                max_fine,
            },
            ActionEntry::AmplitudeMul { mod_index, max_mul } => {
                Action::AmplitudeMul { mod_index, max_mul }
            }
            ActionEntry::EnvelopeAdjust { which, max_mul } => Action::EnvelopeAdjust {
                which: EnvelopeStage::from_index(which).ok_or_else(|| {
                    ConfigError::invalid("envelope stage", format!("index {which}"))
                })?,
                max_mul,
            },
            ActionEntry::LoopControl { index, ref op } => Action::LoopControl {
                target: LoopTarget::from_index(index),
                op: LoopOp::from_name(op)
                    .ok_or_else(|| ConfigError::invalid("loop operation", format!("'{op}'")))?,
            },
        })
    }
}

impl BindingsFile {
    /// Describe a bind set. Action ids are dropped.
    pub fn from_bindings(bindings: &Bindings) -> Self {
        Self {
            name: bindings.name.clone(),
            locked: bindings.locked,
            controller_type: bindings.controller_type.clone(),
            device_name: bindings.device_name.clone(),
            binds: bindings
                .binds()
                .iter()
                .map(|bind: &Bind| BindEntry {
                    control: ControlEntry::from_control(&bind.control, &bind.modifiers),
                    action: ActionEntry::from_action(&bind.action),
                })
                .collect(),
        }
    }

    /// Build a bind set, numbering actions from zero in file order.
    pub fn to_bindings(&self) -> Result<Bindings> {
        let mut bindings = Bindings::new(self.name.clone());
        bindings.locked = self.locked;
        bindings.controller_type = self.controller_type.clone();
        bindings.device_name = self.device_name.clone();
        for entry in &self.binds {
            let action = entry.action.to_action()?;
            bindings.push(entry.control.to_control(), entry.control.modifiers(), action);
        }
        Ok(bindings)
    }

    /// Load a binding file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Parse a binding file from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
