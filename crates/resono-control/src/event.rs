//! Device-agnostic controller events.

use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;

/// Dictionary key for per-bind state: a controller id and an action id packed
/// into 64 bits, so two controllers can drive the same action independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullId(u64);

impl FullId {
    /// Pack a controller id and an action id.
    pub const fn new(controller: u32, action: u32) -> Self {
        Self(((controller as u64) << 32) | action as u64)
    }

    /// Controller half.
    pub const fn controller(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Action half.
    pub const fn action(self) -> u32 {
        self.0 as u32
    }

    /// Packed value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.controller(), self.action())
    }
}

/// One input change from any controller.
///
/// Exactly one of `axis_index` and `button_index` is normally set. Buttons
/// report `0.0` or `1.0` (or a hat/selector state); axes report in `[-1, 1]`
/// when signed and `[0, 1]` otherwise, unless `is_limited` is false.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerEvent {
    /// Source device
    pub device: u32,
    /// Axis that moved, if any
    pub axis_index: Option<u32>,
    /// Button that changed, if any
    pub button_index: Option<u32>,
    /// New value
    pub value: f64,
    /// Axis range is `[-1, 1]` rather than `[0, 1]`
    pub is_signed: bool,
    /// Value stays inside its nominal range
    pub is_limited: bool,
}

impl ControllerEvent {
    /// A button event.
    pub fn button(device: u32, index: u32, value: f64) -> Self {
        Self {
            device,
            axis_index: None,
            button_index: Some(index),
            value,
            is_signed: false,
            is_limited: true,
        }
    }

    /// An axis event.
    pub fn axis(device: u32, index: u32, value: f64, is_signed: bool) -> Self {
        Self {
            device,
            axis_index: Some(index),
            button_index: None,
            value,
            is_signed,
            is_limited: true,
        }
    }

    /// Mark the value as possibly leaving its nominal range.
    pub fn unlimited(mut self) -> Self {
        self.is_limited = false;
        self
    }
}

impl FromStr for ControllerEvent {
    type Err = ControlError;

    /// Parse the line format used for scripted input:
    ///
    /// ```text
    /// button <device> <index> <value>
    /// axis <device> <index> <value> [signed] [unlimited]
    /// ```
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let kind = parts
            .next()
            .ok_or_else(|| ControlError::invalid_event(line, "empty line"))?;

        let mut number = |what: &str| -> Result<&str, ControlError> {
            parts
                .next()
                .ok_or_else(|| ControlError::invalid_event(line, format!("missing {what}")))
        };
        let device: u32 = number("device")?
            .parse()
            .map_err(|_| ControlError::invalid_event(line, "device is not an integer"))?;
        let index: u32 = number("index")?
            .parse()
            .map_err(|_| ControlError::invalid_event(line, "index is not an integer"))?;
        let value: f64 = number("value")?
            .parse()
            .map_err(|_| ControlError::invalid_event(line, "value is not a number"))?;

        let mut event = match kind.to_ascii_lowercase().as_str() {
            "button" => ControllerEvent::button(device, index, value),
            "axis" => ControllerEvent::axis(device, index, value, false),
            other => {
                return Err(ControlError::invalid_event(
                    line,
                    format!("unknown event kind '{other}'"),
                ));
            }
        };

        for flag in parts {
            match flag.to_ascii_lowercase().as_str() {
                "signed" if event.axis_index.is_some() => event.is_signed = true,
                "unlimited" => event.is_limited = false,
                other => {
                    return Err(ControlError::invalid_event(
                        line,
                        format!("unexpected flag '{other}'"),
                    ));
                }
            }
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_id_packing() {
        let id = FullId::new(3, 0xdead_beef);
        assert_eq!(id.controller(), 3);
        assert_eq!(id.action(), 0xdead_beef);
        assert_eq!(id.raw(), (3u64 << 32) | 0xdead_beef);
        assert_eq!(id.to_string(), "3:3735928559");
        assert!(FullId::new(0, 9) < FullId::new(1, 0));
    }

    #[test]
    fn test_parse_button() {
        let event: ControllerEvent = "button 1 4 1.0".parse().unwrap();
        assert_eq!(event, ControllerEvent::button(1, 4, 1.0));
    }

    #[test]
    fn test_parse_axis_flags() {
        let event: ControllerEvent = "AXIS 0 2 -0.25 signed unlimited".parse().unwrap();
        assert_eq!(event.axis_index, Some(2));
        assert_eq!(event.value, -0.25);
        assert!(event.is_signed);
        assert!(!event.is_limited);
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<ControllerEvent>().is_err());
        assert!("knob 0 1 0.5".parse::<ControllerEvent>().is_err());
        assert!("button 0".parse::<ControllerEvent>().is_err());
        assert!("button x 1 1".parse::<ControllerEvent>().is_err());
        assert!("button 0 1 1 signed".parse::<ControllerEvent>().is_err());
    }
}
