//! # Sequencer
//!
//! A tick-driven behaviour orchestrator for a competition robot.
//!
//! High level code describes *what* the robot should do as a `Sequence` of
//! steps. The `Controller` decides *when*: it queues requests, aborts running
//! sequences that want the same subsystems, and guarantees that every
//! requested sequence gets the chance to apply its cleanup step, even one
//! that was preempted before doing any real work.
//!
//! ## Core Concepts
//!
//! - **Resource**: a subsystem that only one sequence may use at a time. Two
//!   sequences conflict when their resources intersect.
//! - **Step**: actions applied once, then a wait until the subsystems report
//!   they got there and the step's completion condition holds.
//! - **SequenceRunner**: the per-request state machine, advanced once per tick.
//! - **Controller**: the single arbitrator, driven by `execute(tick)`.
//! - **SequencerEngine**: an async handle that ticks the controller from a
//!   `SystemClock` and broadcasts what happens.
//!
//! The core is single threaded and deterministic. Tests drive it with a
//! `ManualClock`; the engine drives it in real time.
//!
//! ## Example Usage
//!
//! ```rust
//! use sequencer::prelude::*;
//! use std::sync::Arc;
//!
//! let mut builder = Sequence::builder("Start conveyor");
//! builder.then().set_conveyor_duty_cycle(1.0);
//! let sequence = Arc::new(builder.build().unwrap());
//!
//! let mut subsystems = Subsystems::default();
//! let mut controller = Controller::new();
//! controller.enable();
//! controller.run(&sequence);
//!
//! let mut clock = ManualClock::default();
//! controller.execute(&clock.tick(), &mut subsystems);
//! assert_eq!(subsystems.conveyor.duty_cycle(), 1.0);
//! assert!(controller.is_alive());
//! ```

pub const ENGINE_NAME: &str = "RDX Sequencer";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod catalog;
pub mod common;
pub mod components;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod subsystems;
pub mod time;

/// A prelude module for easy importing of the most common sequencer types.
pub mod prelude {
    pub use crate::catalog::Sequences;
    pub use crate::common::{Resource, ResourceSet, RunnerId};
    pub use crate::components::action::{Action, Blocker};
    pub use crate::components::runner::{RunStatus, SequenceRunner};
    pub use crate::components::sequence::{Sequence, SequenceBuilder};
    pub use crate::components::step::{CompletionCondition, Step, StepBuilder};
    pub use crate::config::{ClockResolution, SequencerConfig};
    pub use crate::controller::{Controller, ControllerStatus, Liveness};
    pub use crate::engine::SequencerEngine;
    pub use crate::error::{BuildError, RunnerError};
    pub use crate::events::{IgnoreReason, SequenceEvent, StepIndex, SystemEvent};
    pub use crate::subsystems::{
        DriveRoutine, Drivebase, DutyCycleMotor, Intake, LedColour, LedStrip, Position, Shooter,
        Side, Subsystem, Subsystems,
    };
    pub use crate::time::{ManualClock, TickEvent};
}
