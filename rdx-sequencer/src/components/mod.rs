//! The building blocks of sequences and the state machine that runs them.

pub mod action;
pub mod runner;
pub mod sequence;
pub mod step;
