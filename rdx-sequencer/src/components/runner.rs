//! Drives a single sequence instance, one tick at a time.

use super::action::Blocker;
use super::sequence::Sequence;
use super::step::Step;
use crate::error::RunnerError;
use crate::events::StepIndex;
use crate::subsystems::Subsystems;
use crate::time::TickEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const FIRST_BLOCKED_LOG_AFTER: Duration = Duration::from_millis(250);

/// Where a runner is in its lifecycle. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Created, but not yet allowed to run.
    WaitingToStart,
    /// Applying steps in order.
    Running,
    /// Aborted before it was ever allowed to run.
    WaitingToStartThenAbort,
    /// Started after an early abort: only the interrupt step is applied.
    Aborted,
    /// Nothing left to do.
    Finished,
}

/// The state machine for one execution of a `Sequence`.
///
/// `run()` is called once per tick by the controller. A step's actions are
/// applied on the first tick the runner reaches it; the runner then stays on
/// that step until it is complete. An abort never interrupts a step that has
/// already been applied: the step finishes first, then the interrupt step is
/// applied.
#[derive(Debug)]
pub struct SequenceRunner {
    sequence: Arc<Sequence>,
    status: RunStatus,
    abort_requested: bool,
    cursor: StepIndex,
    applied: bool,
    step_started_at: Duration,
    blocked_by: Option<Blocker>,
    next_log_at: Duration,
    log_backoff: Duration,
    newly_applied: Option<StepIndex>,
}

impl SequenceRunner {
    pub fn new(sequence: Arc<Sequence>) -> Self {
        debug!("Sequence '{}' queued to start", sequence.name());
        Self {
            sequence,
            status: RunStatus::WaitingToStart,
            abort_requested: false,
            cursor: StepIndex::Normal(0),
            applied: false,
            step_started_at: Duration::ZERO,
            blocked_by: None,
            next_log_at: Duration::ZERO,
            log_backoff: FIRST_BLOCKED_LOG_AFTER,
            newly_applied: None,
        }
    }

    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    pub fn name(&self) -> &str {
        self.sequence.name()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_waiting_to_start(&self) -> bool {
        matches!(
            self.status,
            RunStatus::WaitingToStart | RunStatus::WaitingToStartThenAbort
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running | RunStatus::Aborted)
    }

    /// Whether this runner has been told to abort, in any state.
    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested
            || matches!(
                self.status,
                RunStatus::WaitingToStartThenAbort | RunStatus::Aborted
            )
    }

    /// What the current step was waiting on at the end of the last `run()`.
    pub fn blocked_by(&self) -> Option<Blocker> {
        self.blocked_by
    }

    /// The step the runner is on, or `None` if it isn't running.
    pub fn current_step(&self) -> Option<StepIndex> {
        self.is_running().then_some(self.cursor)
    }

    /// Allows the runner to begin work on its next `run()`.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        match self.status {
            RunStatus::WaitingToStart => {
                debug!("Sequence '{}' started", self.name());
                self.status = RunStatus::Running;
                self.move_to(StepIndex::Normal(0));
                Ok(())
            }
            RunStatus::WaitingToStartThenAbort => {
                debug!("Starting aborted sequence '{}'", self.name());
                self.status = RunStatus::Aborted;
                self.move_to(StepIndex::Interrupt);
                Ok(())
            }
            status => Err(RunnerError::UnexpectedStart {
                sequence: self.name().to_string(),
                status: format!("{:?}", status),
            }),
        }
    }

    /// Asks the runner to stop after the step in progress and apply the
    /// interrupt step. Safe to call any number of times in any state.
    pub fn abort(&mut self) {
        match self.status {
            RunStatus::WaitingToStart => {
                debug!("Aborting queued sequence '{}'", self.name());
                self.status = RunStatus::WaitingToStartThenAbort;
            }
            RunStatus::Running if !self.abort_requested => {
                debug!("Aborting sequence '{}'", self.name());
                self.abort_requested = true;
            }
            _ => {}
        }
    }

    /// Advances by one tick. Returns `true` while there is more work to do on
    /// a later call and `false` once the runner can be discarded.
    pub fn run(&mut self, tick: &TickEvent, subsystems: &mut Subsystems) -> bool {
        match self.status {
            RunStatus::WaitingToStart | RunStatus::WaitingToStartThenAbort => true,
            RunStatus::Finished => false,
            RunStatus::Running | RunStatus::Aborted => self.advance(tick, subsystems),
        }
    }

    /// The step whose actions were applied during the last `run()`, if any.
    /// Cleared by the call.
    pub(crate) fn take_newly_applied(&mut self) -> Option<StepIndex> {
        self.newly_applied.take()
    }

    fn advance(&mut self, tick: &TickEvent, subsystems: &mut Subsystems) -> bool {
        let sequence = Arc::clone(&self.sequence);
        let Some(step) = self.step_at(&sequence, self.cursor) else {
            // No normal steps at all, or aborted without an interrupt step.
            return self.after_step_complete(&sequence);
        };

        if !self.applied {
            if self.abort_requested && matches!(self.cursor, StepIndex::Normal(_)) {
                // Nothing of this step has been applied yet, so skip it.
                return self.after_step_complete(&sequence);
            }
            self.apply(step, tick, subsystems);
        }

        self.blocked_by = step.blocked_by(self.step_started_at, tick, subsystems);
        match self.blocked_by {
            Some(blocker) => {
                self.log_blocked(blocker, tick);
                true
            }
            None => self.after_step_complete(&sequence),
        }
    }

    /// Moves past the current step. Returns `false` once the runner is finished.
    fn after_step_complete(&mut self, sequence: &Sequence) -> bool {
        let next = match self.cursor {
            StepIndex::Normal(_) if self.abort_requested => {
                sequence.interrupt_step().map(|_| StepIndex::Interrupt)
            }
            StepIndex::Normal(i) if i + 1 < sequence.steps().len() => Some(StepIndex::Normal(i + 1)),
            StepIndex::Normal(_) | StepIndex::Interrupt => None,
        };
        match next {
            Some(index) => {
                self.move_to(index);
                true
            }
            None => {
                debug!("Sequence '{}' is complete", sequence.name());
                self.status = RunStatus::Finished;
                self.blocked_by = None;
                false
            }
        }
    }

    fn step_at<'a>(&self, sequence: &'a Sequence, index: StepIndex) -> Option<&'a Step> {
        match index {
            StepIndex::Normal(i) => sequence.steps().get(i),
            StepIndex::Interrupt => sequence.interrupt_step(),
        }
    }

    fn move_to(&mut self, index: StepIndex) {
        self.cursor = index;
        self.applied = false;
        self.blocked_by = None;
    }

    fn apply(&mut self, step: &Step, tick: &TickEvent, subsystems: &mut Subsystems) {
        if let Some(message) = step.log_message() {
            info!("{}", message);
        }
        debug!("Sequence '{}' applying {:?}: {}", self.name(), self.cursor, step);
        step.apply(subsystems);
        self.applied = true;
        self.newly_applied = Some(self.cursor);
        self.step_started_at = tick.elapsed;
        self.log_backoff = FIRST_BLOCKED_LOG_AFTER;
        self.next_log_at = tick.elapsed.saturating_add(self.log_backoff);
    }

    fn log_blocked(&mut self, blocker: Blocker, tick: &TickEvent) {
        if tick.elapsed < self.next_log_at {
            return;
        }
        debug!(
            "Sequence '{}' waiting on {} for {:.2}s",
            self.name(),
            blocker,
            tick.elapsed.saturating_sub(self.step_started_at).as_secs_f64()
        );
        self.log_backoff = self.log_backoff.saturating_mul(2);
        self.next_log_at = tick.elapsed.saturating_add(self.log_backoff);
    }
}
