//! Defines all public event types broadcast by the sequencer.
//!
//! Listeners subscribe to these streams for dashboards, logging and tests;
//! nothing in the core depends on anyone listening.

use crate::common::RunnerId;
use chrono::{DateTime, Utc};

/// Events related to the lifecycle of the engine and its controller.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's dispatcher begins.
    EngineStarted { timestamp: DateTime<Utc> },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    ControllerEnabled,
    ControllerDisabled,
    /// The controller's tick failed. No further sequences will be advanced.
    ControllerDied { reason: String },
}

/// Why a `run()` request did not produce a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Disabled,
    AlreadyRunning,
    /// The controller has died and no longer accepts work.
    Dead,
}

/// Events describing what happens to each requested sequence.
#[derive(Debug, Clone)]
pub enum SequenceEvent {
    /// A runner was created and appended to the queue.
    Queued {
        id: RunnerId,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// A request was dropped without creating a runner.
    Ignored { name: String, reason: IgnoreReason },
    /// A conflicting request asked this runner to abort.
    AbortRequested { id: RunnerId, name: String },
    /// The runner was promoted from the queue and started.
    Started {
        id: RunnerId,
        name: String,
        aborted: bool,
    },
    /// The runner applied the actions of a new step.
    StepStarted {
        id: RunnerId,
        name: String,
        step: StepIndex,
    },
    /// The runner has nothing left to do and was discarded.
    Finished {
        id: RunnerId,
        name: String,
        aborted: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Which step of a sequence a runner is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepIndex {
    Normal(usize),
    Interrupt,
}
