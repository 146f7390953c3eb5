//! Arbitrates sequence requests and drives the active runner.
//!
//! The controller lets high level code ask for the states the robot needs to
//! pass through without caring how it gets there. Every request becomes a
//! `SequenceRunner` in a FIFO queue. A new request aborts every tracked runner
//! whose sequence conflicts with it, but an aborted runner is never dropped:
//! it still gets its turn to apply its interrupt step before anything queued
//! behind it starts.

use crate::common::RunnerId;
use crate::components::action::Blocker;
use crate::components::runner::SequenceRunner;
use crate::components::sequence::Sequence;
use crate::config::ControllerConfig;
use crate::error::RunnerError;
use crate::events::{IgnoreReason, SequenceEvent};
use crate::subsystems::Subsystems;
use crate::time::TickEvent;
use chrono::Utc;
use slotmap::SlotMap;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// A cloneable handle an external watchdog can poll to learn whether the
/// controller is still processing ticks.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A snapshot of what the controller is doing, for dashboards and the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub enabled: bool,
    pub alive: bool,
    pub active: Option<String>,
    pub blocked_by: Option<Blocker>,
    pub queued: Vec<String>,
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.alive, self.enabled) {
            (false, _) => "dead",
            (true, true) => "enabled",
            (true, false) => "disabled",
        };
        write!(f, "controller {}", state)?;
        match &self.active {
            Some(name) => write!(f, ", running '{}'", name)?,
            None => write!(f, ", idle")?,
        }
        if let Some(blocker) = self.blocked_by {
            write!(f, " (blocked by {})", blocker)?;
        }
        if !self.queued.is_empty() {
            write!(f, ", queued: {}", self.queued.join(", "))?;
        }
        Ok(())
    }
}

/// The periodic arbitrator of all requested sequences.
///
/// At most one runner is active at a time. Requests that conflict with
/// nothing still wait their turn in the queue.
pub struct Controller {
    runners: SlotMap<RunnerId, SequenceRunner>,
    active: Option<RunnerId>,
    queue: VecDeque<RunnerId>,
    enabled: bool,
    liveness: Liveness,
    death_reason: Option<String>,
    event_sender: broadcast::Sender<SequenceEvent>,
}

impl Controller {
    /// Creates a controller that ignores requests until `enable()` is called.
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(256);
        Self {
            runners: SlotMap::with_key(),
            active: None,
            queue: VecDeque::new(),
            enabled: false,
            liveness: Liveness::new(),
            death_reason: None,
            event_sender,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        let mut controller = Self::new();
        controller.enabled = config.enabled_on_start;
        controller
    }

    /// Subscribes to the `SequenceEvent` stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SequenceEvent> {
        self.event_sender.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SequenceEvent> {
        self.event_sender.clone()
    }

    /// Requests that `sequence` run as soon as possible.
    ///
    /// Returns the id of the new runner, or `None` if the request was ignored
    /// because the controller is disabled or dead, or because the same
    /// sequence is already tracked and hasn't been told to abort.
    pub fn run(&mut self, sequence: &Arc<Sequence>) -> Option<RunnerId> {
        if let Some(reason) = self.reject_reason(sequence) {
            debug!("Ignoring sequence '{}': {:?}", sequence.name(), reason);
            self.emit(SequenceEvent::Ignored {
                name: sequence.name().to_string(),
                reason,
            });
            return None;
        }

        for (id, existing) in self.runners.iter_mut() {
            if existing.sequence().does_conflict(sequence) && !existing.is_abort_requested() {
                existing.abort();
                self.event_sender
                    .send(SequenceEvent::AbortRequested {
                        id,
                        name: existing.name().to_string(),
                    })
                    .ok();
            }
        }

        let id = self
            .runners
            .insert(SequenceRunner::new(Arc::clone(sequence)));
        self.queue.push_back(id);
        info!("Sequence '{}' queued", sequence.name());
        self.emit(SequenceEvent::Queued {
            id,
            name: sequence.name().to_string(),
            timestamp: Utc::now(),
        });
        Some(id)
    }

    /// Advances the active runner by one tick, promoting queued runners as
    /// earlier ones finish.
    ///
    /// A panic or runner error inside the tick kills the controller: the
    /// liveness flag drops and every later call returns immediately.
    pub fn execute(&mut self, tick: &TickEvent, subsystems: &mut Subsystems) {
        if !self.is_alive() {
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.step(tick, subsystems)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.die(err.to_string()),
            Err(payload) => self.die(panic_message(payload.as_ref())),
        }
    }

    /// Accepts new requests again.
    pub fn enable(&mut self) {
        if !self.enabled {
            info!("Controller enabled");
        }
        self.enabled = true;
    }

    /// Stops accepting requests and aborts everything tracked. Aborted
    /// runners still apply their interrupt steps on later ticks.
    pub fn disable(&mut self) {
        if self.enabled {
            info!("Controller disabled");
        }
        self.enabled = false;
        for (id, runner) in self.runners.iter_mut() {
            if !runner.is_abort_requested() {
                runner.abort();
                self.event_sender
                    .send(SequenceEvent::AbortRequested {
                        id,
                        name: runner.name().to_string(),
                    })
                    .ok();
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Why the controller died, once it has.
    pub fn death_reason(&self) -> Option<&str> {
        self.death_reason.as_deref()
    }

    /// Whether there is anything active or queued.
    pub fn is_idle(&self) -> bool {
        self.runners.is_empty()
    }

    pub fn runner(&self, id: RunnerId) -> Option<&SequenceRunner> {
        self.runners.get(id)
    }

    pub fn status(&self) -> ControllerStatus {
        let active = self.active.and_then(|id| self.runners.get(id));
        ControllerStatus {
            enabled: self.enabled,
            alive: self.is_alive(),
            active: active.map(|runner| runner.name().to_string()),
            blocked_by: active.and_then(SequenceRunner::blocked_by),
            queued: self
                .queue
                .iter()
                .filter_map(|id| self.runners.get(*id))
                .map(|runner| runner.name().to_string())
                .collect(),
        }
    }

    fn reject_reason(&self, sequence: &Arc<Sequence>) -> Option<IgnoreReason> {
        if !self.is_alive() {
            return Some(IgnoreReason::Dead);
        }
        if !self.enabled {
            return Some(IgnoreReason::Disabled);
        }
        let duplicate = self.runners.values().any(|existing| {
            Arc::ptr_eq(existing.sequence(), sequence) && !existing.is_abort_requested()
        });
        duplicate.then_some(IgnoreReason::AlreadyRunning)
    }

    fn step(&mut self, tick: &TickEvent, subsystems: &mut Subsystems) -> Result<(), RunnerError> {
        trace!("Controller tick #{}", tick.tick_count);
        loop {
            let id = match self.active {
                Some(id) => id,
                None => match self.promote()? {
                    Some(id) => id,
                    None => return Ok(()),
                },
            };
            let Some(runner) = self.runners.get_mut(id) else {
                self.active = None;
                continue;
            };

            let more = runner.run(tick, subsystems);
            if let Some(step) = runner.take_newly_applied() {
                self.event_sender
                    .send(SequenceEvent::StepStarted {
                        id,
                        name: runner.name().to_string(),
                        step,
                    })
                    .ok();
            }
            if more {
                return Ok(());
            }

            // Finished: discard it and give the next queued runner this same tick.
            self.active = None;
            if let Some(runner) = self.runners.remove(id) {
                debug!("Sequence '{}' finished", runner.name());
                self.emit(SequenceEvent::Finished {
                    id,
                    name: runner.name().to_string(),
                    aborted: runner.is_abort_requested(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn promote(&mut self) -> Result<Option<RunnerId>, RunnerError> {
        while let Some(id) = self.queue.pop_front() {
            let Some(runner) = self.runners.get_mut(id) else {
                warn!("Queued runner {:?} is no longer tracked", id);
                continue;
            };
            runner.start()?;
            let aborted = runner.is_abort_requested();
            let name = runner.name().to_string();
            self.active = Some(id);
            self.emit(SequenceEvent::Started { id, name, aborted });
            return Ok(Some(id));
        }
        Ok(None)
    }

    fn die(&mut self, reason: String) {
        error!("Controller caught an unhandled error and has died: {}", reason);
        self.liveness.mark_dead();
        self.death_reason = Some(reason);
    }

    fn emit(&self, event: SequenceEvent) {
        self.event_sender.send(event).ok();
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StepIndex;
    use crate::time::ManualClock;

    fn conveyor(name: &str, duty_cycle: f64) -> Arc<Sequence> {
        let mut builder = Sequence::builder(name);
        builder.then().set_conveyor_duty_cycle(duty_cycle);
        Arc::new(builder.build().unwrap())
    }

    fn enabled() -> Controller {
        let mut controller = Controller::new();
        controller.enable();
        controller
    }

    #[test]
    fn starts_disabled() {
        let mut controller = Controller::new();
        assert!(controller.run(&conveyor("a", 1.0)).is_none());
        assert!(controller.is_idle());
    }

    #[test]
    fn conflicting_request_aborts_queued_runner() {
        let mut controller = enabled();
        let a = controller.run(&conveyor("a", 1.0)).unwrap();
        let b = controller.run(&conveyor("b", 0.5)).unwrap();
        assert!(controller.runner(a).unwrap().is_abort_requested());
        assert!(!controller.runner(b).unwrap().is_abort_requested());
        assert_eq!(controller.status().queued, vec!["a", "b"]);
    }

    #[test]
    fn non_conflicting_requests_keep_fifo_order() {
        let mut controller = enabled();
        let mut subsystems = Subsystems::default();
        let mut clock = ManualClock::default();
        let mut led = Sequence::builder("led");
        led.then().set_colour(crate::subsystems::LedColour::Blue);
        let led = Arc::new(led.build().unwrap());

        let mut events = controller.subscribe();
        controller.run(&conveyor("conveyor", 1.0));
        controller.run(&led);
        controller.execute(&clock.tick(), &mut subsystems);
        assert!(controller.is_idle());

        let mut started = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SequenceEvent::StepStarted { name, step, .. } = event {
                assert_eq!(step, StepIndex::Normal(0));
                started.push(name);
            }
        }
        assert_eq!(started, vec!["conveyor", "led"]);
    }

    #[test]
    fn runner_error_kills_controller() {
        let mut controller = enabled();
        let mut subsystems = Subsystems::default();
        let clock = ManualClock::default();
        let id = controller.run(&conveyor("a", 1.0)).unwrap();
        // Starting it behind the controller's back makes promotion fail.
        if let Some(runner) = controller.runners.get_mut(id) {
            runner.start().unwrap();
        }
        let liveness = controller.liveness();
        controller.execute(&clock.now(), &mut subsystems);
        assert!(!liveness.is_alive());
        assert!(controller.run(&conveyor("b", 1.0)).is_none());
    }

    #[test]
    fn status_display() {
        let status = ControllerStatus {
            enabled: true,
            alive: true,
            active: Some("Start intaking".to_string()),
            blocked_by: Some(Blocker::Intake),
            queued: vec!["Stop intaking".to_string()],
        };
        assert_eq!(
            status.to_string(),
            "controller enabled, running 'Start intaking' (blocked by intake), queued: Stop intaking"
        );
    }
}
