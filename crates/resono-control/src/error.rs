//! Error types for the control layer.

use thiserror::Error;

/// Errors raised on the UI thread while editing bindings or applying
/// control state. The audio thread never sees these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// A bind or control value addresses an oscillator the patch lacks
    #[error("oscillator index {index} out of range for a graph of {count} oscillators")]
    OscillatorOutOfRange {
        /// Offending oscillator index.
        index: usize,
        /// Oscillators in the patch graph.
        count: usize,
    },

    /// Two binds share an action id
    #[error("duplicate action id {0}")]
    DuplicateActionId(u32),

    /// No bind has this action id
    #[error("unknown action id {0}")]
    UnknownAction(u32),

    /// A textual controller event could not be parsed
    #[error("invalid controller event '{input}': {reason}")]
    InvalidEvent {
        /// The rejected line.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ControlError {
    /// Create an invalid event error.
    pub fn invalid_event(input: impl Into<String>, reason: impl Into<String>) -> Self {
        ControlError::InvalidEvent {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;
