//! The bindings engine: routes controller events through binds into
//! [`ControlState`].

use resono_core::{LoopCommand, Patch};

use crate::bind::{Action, Bind, Control, ModifierMode, Modifiers};
use crate::error::{ControlError, Result};
use crate::event::{ControllerEvent, FullId};
use crate::modifiers::{
    compute_deadzone, invert_value, is_active, multiplier, normalize_unit, toggle_step,
};
use crate::state::ControlState;

/// A named set of binds for one kind of controller.
///
/// ```rust
/// use resono_control::{Action, Bindings, Control, ControlState, ControllerEvent, Modifiers};
///
/// let mut bindings = Bindings::new("Pad");
/// bindings.push(
///     Control::ButtonPress { index: 0, active_state: None },
///     Modifiers::default(),
///     Action::Key { semitone: 0 },
/// );
///
/// let mut state = ControlState::new();
/// bindings.handle_event(0, &ControllerEvent::button(0, 0, 1.0), &mut state);
/// assert_eq!(state.pending_count(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    /// Display name
    pub name: String,
    /// Protected from editing in the UI
    pub locked: bool,
    /// Kind of controller these binds expect
    pub controller_type: String,
    /// Device the set was made for
    pub device_name: String,
    binds: Vec<Bind>,
    next_action_id: u32,
}

impl Bindings {
    /// Empty set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// All binds in routing order.
    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    /// Number of binds.
    pub fn len(&self) -> usize {
        self.binds.len()
    }

    /// True when there are no binds.
    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    /// Action id the next [`push`](Self::push) will use.
    pub fn next_action_id(&self) -> u32 {
        self.next_action_id
    }

    /// Add a bind with a fresh action id and return the id.
    pub fn push(&mut self, control: Control, modifiers: Modifiers, action: Action) -> u32 {
        let id = self.next_action_id;
        self.binds.push(Bind::new(id, control, modifiers, action));
        self.next_action_id = id.wrapping_add(1);
        id
    }

    /// Add a bind with its own action id.
    ///
    /// # Errors
    ///
    /// [`ControlError::DuplicateActionId`] if the id is taken.
    pub fn insert(&mut self, mut bind: Bind) -> Result<()> {
        if self.get(bind.action_id).is_some() {
            return Err(ControlError::DuplicateActionId(bind.action_id));
        }
        bind.sanitize();
        self.next_action_id = self.next_action_id.max(bind.action_id.saturating_add(1));
        self.binds.push(bind);
        Ok(())
    }

    /// Remove a bind by action id.
    ///
    /// # Errors
    ///
    /// [`ControlError::UnknownAction`] if no bind has the id.
    pub fn remove(&mut self, action_id: u32) -> Result<Bind> {
        let pos = self
            .binds
            .iter()
            .position(|b| b.action_id == action_id)
            .ok_or(ControlError::UnknownAction(action_id))?;
        tracing::debug!(action_id, bindings = %self.name, "bind removed");
        Ok(self.binds.remove(pos))
    }

    /// Bind with this action id.
    pub fn get(&self, action_id: u32) -> Option<&Bind> {
        self.binds.iter().find(|b| b.action_id == action_id)
    }

    /// Replace the bind carrying `bind.action_id`.
    ///
    /// # Errors
    ///
    /// [`ControlError::UnknownAction`] if no bind has the id.
    pub fn replace(&mut self, mut bind: Bind) -> Result<Bind> {
        let slot = self
            .binds
            .iter_mut()
            .find(|b| b.action_id == bind.action_id)
            .ok_or(ControlError::UnknownAction(bind.action_id))?;
        bind.sanitize();
        Ok(std::mem::replace(slot, bind))
    }

    /// Check every oscillator-addressing action against `patch`.
    ///
    /// # Errors
    ///
    /// [`ControlError::OscillatorOutOfRange`] for the first bind that
    /// addresses a missing oscillator.
    pub fn validate(&self, patch: &Patch) -> Result<()> {
        let count = patch.graph.len();
        for bind in &self.binds {
            if let Some(index) = bind.action.oscillator_index().filter(|&i| i >= count) {
                tracing::warn!(
                    action_id = bind.action_id,
                    index,
                    count,
                    patch = %patch.name,
                    "bind addresses a missing oscillator"
                );
                return Err(ControlError::OscillatorOutOfRange { index, count });
            }
        }
        Ok(())
    }

    /// Route one event from `controller_id` through every bind. Returns the
    /// number of binds that reacted.
    pub fn handle_event(
        &self,
        controller_id: u32,
        event: &ControllerEvent,
        state: &mut ControlState,
    ) -> usize {
        self.binds
            .iter()
            .filter(|bind| route(controller_id, bind, event, state))
            .count()
    }

    /// Re-dispatch every cumulative bind of `controller_id` with its
    /// accumulated value.
    pub fn cumulative_update(&self, controller_id: u32, state: &mut ControlState) {
        for bind in &self.binds {
            if bind.mode() != ModifierMode::Cumulative {
                continue;
            }
            let id = FullId::new(controller_id, bind.action_id);
            if let Some(accumulated) = state.cumulative(id).map(|c| c.accumulated) {
                dispatch(state, id, &bind.action, accumulated, true);
            }
        }
    }
}

fn route(controller_id: u32, bind: &Bind, event: &ControllerEvent, state: &mut ControlState) -> bool {
    let Some(mut value) = bind.control.raw_value(event) else {
        return false;
    };
    let id = FullId::new(controller_id, bind.action_id);

    match bind.control {
        Control::AxisThreshold {
            invert, threshold, ..
        } => {
            if invert {
                value = invert_value(value, event.is_signed);
            }
            let level = i32::from(value > threshold);
            if state.threshold_state.insert(id, level) == Some(level) {
                return false;
            }
            value = f64::from(level);
        }
        Control::AxisContinuous {
            invert,
            threshold,
            origin,
            ..
        } => {
            if invert {
                value = invert_value(value, event.is_signed);
            }
            value = compute_deadzone(value, origin, threshold);
        }
        Control::ButtonPress { .. } | Control::Unbound => {}
    }

    match bind.mode() {
        ModifierMode::Stacking => {
            let held = is_active(value);
            let was_held = state.stack_held.insert(id, held).unwrap_or(false);
            if !held || was_held {
                return false;
            }
            let count = state.stacking.entry(id).or_insert(0);
            *count += 1;
            value = f64::from(*count);
        }
        ModifierMode::Toggle => {
            let current = state.toggle_state(id);
            let (next, emit) = toggle_step(current, is_active(value));
            state.toggle_state.insert(id, next);
            match emit {
                Some(v) => value = v,
                None => return false,
            }
        }
        ModifierMode::Cumulative => {
            state.cumulative_state.entry(id).or_default().speed = value;
            return true;
        }
        ModifierMode::Plain => {
            let scaled = matches!(
                bind.action,
                Action::VolumeMul { .. } | Action::AmplitudeMul { .. }
            );
            if scaled && bind.control.is_axis() && (event.is_signed || !event.is_limited) {
                value = normalize_unit(value, event.is_signed);
            }
        }
    }

    dispatch(state, id, &bind.action, value, false);
    true
}

fn dispatch(state: &mut ControlState, id: FullId, action: &Action, value: f64, cumulative: bool) {
    match *action {
        Action::Key { semitone } => {
            if value > 0.0 {
                state.press_key(id, semitone, value.min(1.0));
            } else {
                state.release_key(id);
            }
        }
        Action::FrequencyExpt { max_expt } => state.set_freq_expt(id, max_expt * value),
        Action::VolumeMul { max_mul } => {
            state.set_volume_mul(id, multiplier(max_mul, value, cumulative));
        }
        Action::PeriodFine {
            mod_index,
            max_fine,
        } => state.set_period_fine(mod_index, id, max_fine * value),
        Action::AmplitudeMul { mod_index, max_mul } => {
            state.set_amplitude_mul(mod_index, id, multiplier(max_mul, value, cumulative));
        }
        Action::EnvelopeAdjust { which, max_mul } => {
            state.set_envelope_mul(which, id, multiplier(max_mul, value, cumulative));
        }
        Action::LoopControl { target, op } => {
            if !op.is_trigger() || value > 0.0 {
                state.queue_loop(LoopCommand { target, op, value });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::EnvelopeStage;
    use resono_core::{LoopOp, LoopTarget};

    fn button(index: u32) -> Control {
        Control::ButtonPress {
            index,
            active_state: None,
        }
    }

    #[test]
    fn test_push_and_insert_ids() {
        let mut bindings = Bindings::new("t");
        assert_eq!(bindings.push(button(0), Modifiers::default(), Action::Key { semitone: 0 }), 0);
        let bind = Bind::new(10, button(1), Modifiers::default(), Action::Key { semitone: 1 });
        bindings.insert(bind).unwrap();
        assert_eq!(bindings.next_action_id(), 11);
        assert_eq!(
            bindings.insert(bind),
            Err(ControlError::DuplicateActionId(10))
        );
        assert_eq!(bindings.push(button(2), Modifiers::default(), Action::Key { semitone: 2 }), 11);
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut bindings = Bindings::new("t");
        let id = bindings.push(button(0), Modifiers::default(), Action::Key { semitone: 0 });
        let replaced = bindings
            .replace(Bind::new(id, button(5), Modifiers::default(), Action::Key { semitone: 3 }))
            .unwrap();
        assert_eq!(replaced.control, button(0));
        assert_eq!(bindings.get(id).map(|b| b.control), Some(button(5)));
        assert!(bindings.remove(id).is_ok());
        assert_eq!(bindings.remove(id), Err(ControlError::UnknownAction(id)));
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_validate_oscillator_index() {
        let mut bindings = Bindings::new("t");
        bindings.push(
            button(0),
            Modifiers::default(),
            Action::AmplitudeMul {
                mod_index: 1,
                max_mul: 2.0,
            },
        );
        assert_eq!(
            bindings.validate(&Patch::default()),
            Err(ControlError::OscillatorOutOfRange { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_event_for_other_control_is_ignored() {
        let mut bindings = Bindings::new("t");
        bindings.push(button(0), Modifiers::default(), Action::Key { semitone: 0 });
        let mut state = ControlState::new();
        assert_eq!(bindings.handle_event(0, &ControllerEvent::button(0, 1, 1.0), &mut state), 0);
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_stacking_counts_presses() {
        let mut bindings = Bindings::new("t");
        let action = bindings.push(
            button(0),
            Modifiers {
                stacking: true,
                ..Modifiers::default()
            },
            Action::FrequencyExpt { max_expt: 1.0 },
        );
        let mut state = ControlState::new();
        for v in [1.0, 1.0, 0.0, 1.0, 0.0, 1.0] {
            bindings.handle_event(0, &ControllerEvent::button(0, 0, v), &mut state);
        }
        assert_eq!(state.stack_count(FullId::new(0, action)), 3);
        assert_eq!(state.freq_expt_sum(), 3.0);
    }

    #[test]
    fn test_continuous_axis_with_deadzone() {
        let mut bindings = Bindings::new("t");
        bindings.push(
            Control::AxisContinuous {
                index: 0,
                invert: true,
                threshold: 0.1,
                origin: 0.0,
            },
            Modifiers::default(),
            Action::FrequencyExpt { max_expt: 12.0 },
        );
        let mut state = ControlState::new();
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, 0.05, true), &mut state);
        assert_eq!(state.freq_expt_sum(), 0.0);
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, -1.0, true), &mut state);
        assert!((state.freq_expt_sum() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_signed_axis_normalized_for_multipliers() {
        let mut bindings = Bindings::new("t");
        bindings.push(
            Control::AxisContinuous {
                index: 0,
                invert: false,
                threshold: 0.0,
                origin: 0.0,
            },
            Modifiers::default(),
            Action::VolumeMul { max_mul: 3.0 },
        );
        let mut state = ControlState::new();
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, 0.0, true), &mut state);
        assert!((state.volume_mul_product() - 2.0).abs() < 1e-9);
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, -1.0, true), &mut state);
        assert!((state.volume_mul_product() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_integrates_speed() {
        let mut bindings = Bindings::new("t");
        let action = bindings.push(
            Control::AxisContinuous {
                index: 0,
                invert: false,
                threshold: 0.0,
                origin: 0.0,
            },
            Modifiers {
                cumulative: true,
                ..Modifiers::default()
            },
            Action::EnvelopeAdjust {
                which: EnvelopeStage::Release,
                max_mul: 2.0,
            },
        );
        let mut state = ControlState::new();
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, 0.5, true), &mut state);
        assert_eq!(state.envelope_mul_product(EnvelopeStage::Release), 1.0);

        assert!(state.update(0, &bindings, 1.0));
        assert!(state.update(0, &bindings, 1.0));
        let id = FullId::new(0, action);
        assert_eq!(state.cumulative(id).map(|c| c.accumulated), Some(1.0));
        assert!((state.envelope_mul_product(EnvelopeStage::Release) - 2.0).abs() < 1e-9);

        // another controller's integrators are untouched
        assert!(!state.update(1, &bindings, 1.0));
    }

    #[test]
    fn test_loop_trigger_only_on_press() {
        let mut bindings = Bindings::new("t");
        bindings.push(
            button(0),
            Modifiers::default(),
            Action::LoopControl {
                target: LoopTarget::Selected,
                op: LoopOp::Record,
            },
        );
        bindings.push(
            Control::AxisContinuous {
                index: 0,
                invert: false,
                threshold: 0.0,
                origin: 0.0,
            },
            Modifiers::default(),
            Action::LoopControl {
                target: LoopTarget::Slot(0),
                op: LoopOp::Volume,
            },
        );
        let mut state = ControlState::new();
        bindings.handle_event(0, &ControllerEvent::button(0, 0, 1.0), &mut state);
        bindings.handle_event(0, &ControllerEvent::button(0, 0, 0.0), &mut state);
        bindings.handle_event(0, &ControllerEvent::axis(0, 0, 0.0, false), &mut state);
        assert_eq!(state.pending_count(), 2);
    }
}
