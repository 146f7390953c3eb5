//! Error types for sequence construction and runner misuse.
//!
//! Construction errors are raised by `SequenceBuilder::build()` and never
//! surface while a sequence is running. `RunnerError` only occurs if the
//! runner state machine is driven out of order, which the controller treats
//! as fatal.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("sequence '{sequence}': {field} must be a finite number, got {value}")]
    NonFiniteValue {
        sequence: String,
        field: &'static str,
        value: f64,
    },

    #[error("sequence '{sequence}': {field} duty cycle {value} is outside [-1, 1]")]
    DutyCycleOutOfRange {
        sequence: String,
        field: &'static str,
        value: f64,
    },

    #[error("sequence '{sequence}': delay of {seconds} seconds is not a valid duration")]
    InvalidDelay { sequence: String, seconds: f64 },

    #[error("sequence '{0}' asked for an interrupt state but has no actions to build it from")]
    EmptyInterrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("start called on sequence '{sequence}' in unexpected state {status}")]
    UnexpectedStart { sequence: String, status: String },
}
