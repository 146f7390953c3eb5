//! A single stage of a sequence and the builder used to describe it.

use super::action::{Action, Blocker};
use crate::common::ResourceSet;
use crate::error::BuildError;
use crate::subsystems::{DriveRoutine, LedColour, Position, Side, Subsystems};
use crate::time::TickEvent;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A function closure that decides whether a step may complete.
pub type StepPredicate = Arc<dyn Fn(&Subsystems) -> bool + Send + Sync>;

/// Decides when a runner may move past a step once its actions have settled.
#[derive(Clone, Default)]
pub enum CompletionCondition {
    #[default]
    Immediate,
    /// Wait this long after the step's actions were applied.
    Delay(Duration),
    /// Wait until the clock reaches this absolute time.
    DelayUntil(Duration),
    /// Wait until the predicate returns `true`. There is no timeout.
    Predicate { name: String, check: StepPredicate },
}

impl CompletionCondition {
    pub(crate) fn is_satisfied(
        &self,
        started_at: Duration,
        tick: &TickEvent,
        subsystems: &Subsystems,
    ) -> bool {
        match self {
            CompletionCondition::Immediate => true,
            CompletionCondition::Delay(delay) => started_at
                .checked_add(*delay)
                .is_some_and(|end| tick.elapsed >= end),
            CompletionCondition::DelayUntil(until) => tick.elapsed >= *until,
            CompletionCondition::Predicate { check, .. } => check(subsystems),
        }
    }

    fn blocker(&self) -> Blocker {
        match self {
            CompletionCondition::Predicate { .. } => Blocker::Predicate,
            _ => Blocker::Time,
        }
    }
}

impl fmt::Debug for CompletionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionCondition::Immediate => f.write_str("Immediate"),
            CompletionCondition::Delay(delay) => f.debug_tuple("Delay").field(delay).finish(),
            CompletionCondition::DelayUntil(until) => {
                f.debug_tuple("DelayUntil").field(until).finish()
            }
            CompletionCondition::Predicate { name, .. } => {
                f.debug_tuple("Predicate").field(name).finish()
            }
        }
    }
}

/// One stage of a sequence: actions applied once, then a wait.
///
/// The step is complete when every action that carries a wait has settled and
/// the completion condition is satisfied.
#[derive(Debug, Clone, Default)]
pub struct Step {
    actions: Vec<Action>,
    completion: CompletionCondition,
    log: Option<String>,
}

impl Step {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn completion(&self) -> &CompletionCondition {
        &self.completion
    }

    /// Message logged when the step is applied.
    pub fn log_message(&self) -> Option<&str> {
        self.log.as_deref()
    }

    pub fn resources(&self) -> ResourceSet {
        self.actions.iter().map(Action::resource).collect()
    }

    /// Adds an action, replacing any earlier action for the same setpoint in place.
    pub(crate) fn set_action(&mut self, action: Action) {
        match self.actions.iter_mut().find(|a| a.slot() == action.slot()) {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }

    pub(crate) fn set_completion(&mut self, completion: CompletionCondition) {
        self.completion = completion;
    }

    pub(crate) fn set_log(&mut self, message: Option<String>) {
        self.log = message;
    }

    pub(crate) fn apply(&self, subsystems: &mut Subsystems) {
        for action in &self.actions {
            action.apply(subsystems);
        }
    }

    /// What the step is still waiting on, or `None` once it is complete.
    pub(crate) fn blocked_by(
        &self,
        started_at: Duration,
        tick: &TickEvent,
        subsystems: &Subsystems,
    ) -> Option<Blocker> {
        let waiting_on = self
            .actions
            .iter()
            .filter_map(|action| action.wait(subsystems))
            .filter(|(_, settled)| !settled)
            .map(|(blocker, _)| blocker)
            .min();
        if waiting_on.is_some() {
            return waiting_on;
        }
        // The time/predicate wait is always checked last.
        if self.completion.is_satisfied(started_at, tick, subsystems) {
            None
        } else {
            Some(self.completion.blocker())
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(log) = &self.log {
            parts.push(format!("log={:?}", log));
        }
        parts.extend(self.actions.iter().map(|a| a.to_string()));
        if !matches!(self.completion, CompletionCondition::Immediate) {
            parts.push(format!("until={:?}", self.completion));
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Accumulates the actions of one step while a sequence is being built.
///
/// Returned by `SequenceBuilder::then()`; every setter returns `&mut Self`
/// so calls can be chained.
#[derive(Debug, Default)]
pub struct StepBuilder {
    step: Step,
    invalid_delay: Option<f64>,
}

impl StepBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_step(step: Step) -> Self {
        Self {
            step,
            invalid_delay: None,
        }
    }

    /// Adds an arbitrary action. Later actions for the same setpoint win.
    pub fn push(&mut self, action: Action) -> &mut Self {
        self.step.set_action(action);
        self
    }

    // Time

    /// Wait `seconds` after this step is applied before moving on.
    pub fn set_delay_delta(&mut self, seconds: f64) -> &mut Self {
        match checked_duration(seconds) {
            Some(delay) => self.step.set_completion(CompletionCondition::Delay(delay)),
            None => self.invalid_delay = Some(seconds),
        }
        self
    }

    /// Wait until the clock reads `seconds` before moving on.
    pub fn set_delay_until(&mut self, seconds: f64) -> &mut Self {
        match checked_duration(seconds) {
            Some(until) => self.step.set_completion(CompletionCondition::DelayUntil(until)),
            None => self.invalid_delay = Some(seconds),
        }
        self
    }

    /// Wait until `check` returns `true` before moving on.
    pub fn wait_until<F>(&mut self, name: impl Into<String>, check: F) -> &mut Self
    where
        F: Fn(&Subsystems) -> bool + Send + Sync + 'static,
    {
        self.step.set_completion(CompletionCondition::Predicate {
            name: name.into(),
            check: Arc::new(check),
        });
        self
    }

    pub fn set_log(&mut self, message: impl Into<String>) -> &mut Self {
        self.step.set_log(Some(message.into()));
        self
    }

    // Intake

    pub fn deploy_intake(&mut self) -> &mut Self {
        self.push(Action::IntakePosition(Position::Extended))
    }

    pub fn stow_intake(&mut self) -> &mut Self {
        self.push(Action::IntakePosition(Position::Retracted))
    }

    pub fn set_intake_rps(&mut self, rps: f64) -> &mut Self {
        self.push(Action::IntakeRps(rps))
    }

    pub fn set_velcro_duty_cycle(&mut self, duty_cycle: f64) -> &mut Self {
        self.push(Action::VelcroDutyCycle(duty_cycle))
    }

    // Conveyor and feeders

    pub fn set_conveyor_duty_cycle(&mut self, duty_cycle: f64) -> &mut Self {
        self.push(Action::ConveyorDutyCycle(duty_cycle))
    }

    pub fn set_feeder_duty_cycle(&mut self, side: Side, duty_cycle: f64) -> &mut Self {
        self.push(Action::FeederDutyCycle(side, duty_cycle))
    }

    // Shooter

    pub fn set_shooter_rps(&mut self, rps: f64) -> &mut Self {
        self.push(Action::ShooterRps(rps))
    }

    pub fn set_hood_angle(&mut self, degrees: f64) -> &mut Self {
        self.push(Action::HoodAngle(degrees))
    }

    pub fn wait_for_shooter(&mut self) -> &mut Self {
        self.push(Action::WaitForShooter)
    }

    pub fn wait_for_hood(&mut self) -> &mut Self {
        self.push(Action::WaitForHood)
    }

    // Climber

    pub fn set_climber_duty_cycle(&mut self, side: Side, duty_cycle: f64) -> &mut Self {
        self.push(Action::ClimberDutyCycle(side, duty_cycle))
    }

    // Drivebase

    /// Drive both sides at a fixed power, e.g. to push against the climbing bar.
    pub fn set_drivebase_power(&mut self, power: f64) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::ConstantPower(power)))
    }

    pub fn set_drivebase_speed(&mut self, speed: f64) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::ConstantSpeed(speed)))
    }

    /// Hand the drivebase back to the driver.
    pub fn do_arcade_drive(&mut self) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::ArcadeDutyCycle))
    }

    pub fn do_arcade_velocity_drive(&mut self) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::ArcadeVelocity))
    }

    pub fn do_turn_to_heading(&mut self, degrees: f64) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::TurnToHeading(degrees)))
    }

    pub fn do_vision_aim(&mut self) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::VisionAim))
    }

    pub fn do_vision_assist(&mut self) -> &mut Self {
        self.push(Action::Drive(DriveRoutine::VisionAssist))
    }

    // LED strip

    pub fn set_colour(&mut self, colour: LedColour) -> &mut Self {
        self.push(Action::LedColour(colour))
    }

    /// Validates every recorded value and produces the immutable step.
    pub(crate) fn finish(self, sequence: &str) -> Result<Step, BuildError> {
        if let Some(seconds) = self.invalid_delay {
            return Err(BuildError::InvalidDelay {
                sequence: sequence.to_string(),
                seconds,
            });
        }
        for (field, value, is_duty_cycle) in self.step.actions.iter().filter_map(Action::value) {
            if !value.is_finite() {
                return Err(BuildError::NonFiniteValue {
                    sequence: sequence.to_string(),
                    field,
                    value,
                });
            }
            if is_duty_cycle && !(-1.0..=1.0).contains(&value) {
                return Err(BuildError::DutyCycleOutOfRange {
                    sequence: sequence.to_string(),
                    field,
                    value,
                });
            }
        }
        Ok(self.step)
    }
}

/// Rejects negative, non-finite and unrepresentably large values.
fn checked_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Resource;

    fn subsystems() -> Subsystems {
        Subsystems::default()
    }

    #[test]
    fn later_write_to_same_setpoint_wins() {
        let mut builder = StepBuilder::new();
        builder
            .set_shooter_rps(20.0)
            .set_intake_rps(5.0)
            .set_shooter_rps(40.0);
        let step = builder.finish("test").unwrap();
        assert_eq!(
            step.actions(),
            &[Action::ShooterRps(40.0), Action::IntakeRps(5.0)]
        );
    }

    #[test]
    fn sides_are_separate_setpoints() {
        let mut builder = StepBuilder::new();
        builder
            .set_climber_duty_cycle(Side::Left, 0.3)
            .set_climber_duty_cycle(Side::Right, 0.3);
        let step = builder.finish("test").unwrap();
        assert_eq!(step.actions().len(), 2);
        let resources = step.resources();
        assert!(resources.contains(Resource::ClimberLeft));
        assert!(resources.contains(Resource::ClimberRight));
    }

    #[test]
    fn delay_blocks_until_elapsed() {
        let subsystems = subsystems();
        let mut builder = StepBuilder::new();
        builder.set_shooter_rps(20.0).set_delay_delta(0.5);
        let step = builder.finish("test").unwrap();
        let started = Duration::from_secs(1);
        let early = TickEvent::new(1, Duration::from_millis(1400));
        let late = TickEvent::new(2, Duration::from_millis(1500));
        assert_eq!(step.blocked_by(started, &early, &subsystems), Some(Blocker::Time));
        assert_eq!(step.blocked_by(started, &late, &subsystems), None);
    }

    #[test]
    fn huge_delay_never_elapses() {
        let subsystems = subsystems();
        let mut builder = StepBuilder::new();
        builder.set_delay_delta(u64::MAX as f64 / 2.0);
        let step = builder.finish("test").unwrap();
        // Adding the delay to the start time overflows.
        let started = Duration::MAX - Duration::from_secs(10);
        let tick = TickEvent::new(1, Duration::MAX);
        assert_eq!(step.blocked_by(started, &tick, &subsystems), Some(Blocker::Time));
    }

    #[test]
    fn delay_until_uses_absolute_time() {
        let subsystems = subsystems();
        let mut builder = StepBuilder::new();
        builder.set_delay_until(2.0);
        let step = builder.finish("test").unwrap();
        assert!(matches!(
            step.completion(),
            CompletionCondition::DelayUntil(until) if *until == Duration::from_secs(2)
        ));
        // Applied late, the step is not delayed any further.
        let started = Duration::from_secs(3);
        let early = TickEvent::new(1, Duration::from_millis(1990));
        let late = TickEvent::new(2, Duration::from_millis(3000));
        assert_eq!(
            step.blocked_by(Duration::from_secs(1), &early, &subsystems),
            Some(Blocker::Time)
        );
        assert_eq!(step.blocked_by(started, &late, &subsystems), None);
    }

    #[test]
    fn action_waits_are_reported_before_time() {
        let mut subsystems = subsystems();
        let mut builder = StepBuilder::new();
        builder.deploy_intake().set_delay_delta(0.0);
        let step = builder.finish("test").unwrap();
        step.apply(&mut subsystems);
        let tick = TickEvent::new(0, Duration::ZERO);
        assert_eq!(step.blocked_by(Duration::ZERO, &tick, &subsystems), Some(Blocker::Intake));
    }

    #[test]
    fn predicate_reads_subsystems() {
        let mut subsystems = subsystems();
        let mut builder = StepBuilder::new();
        builder.wait_until("conveyor running", |s| s.conveyor.duty_cycle() > 0.0);
        let step = builder.finish("test").unwrap();
        let tick = TickEvent::new(0, Duration::ZERO);
        assert_eq!(
            step.blocked_by(Duration::ZERO, &tick, &subsystems),
            Some(Blocker::Predicate)
        );
        subsystems.conveyor.set_duty_cycle(0.5);
        assert_eq!(step.blocked_by(Duration::ZERO, &tick, &subsystems), None);
    }

    #[test]
    fn rejects_bad_values() {
        let mut builder = StepBuilder::new();
        builder.set_delay_delta(-1.0);
        assert!(matches!(
            builder.finish("bad"),
            Err(BuildError::InvalidDelay { .. })
        ));

        let mut builder = StepBuilder::new();
        builder.set_delay_delta(1e20);
        assert!(matches!(
            builder.finish("bad"),
            Err(BuildError::InvalidDelay { seconds, .. }) if seconds == 1e20
        ));

        let mut builder = StepBuilder::new();
        builder.set_delay_until(f64::INFINITY);
        assert!(matches!(
            builder.finish("bad"),
            Err(BuildError::InvalidDelay { .. })
        ));

        let mut builder = StepBuilder::new();
        builder.set_conveyor_duty_cycle(1.5);
        assert!(matches!(
            builder.finish("bad"),
            Err(BuildError::DutyCycleOutOfRange { field: "conveyor", .. })
        ));

        let mut builder = StepBuilder::new();
        builder.set_shooter_rps(f64::NAN);
        assert!(matches!(
            builder.finish("bad"),
            Err(BuildError::NonFiniteValue { field: "shooter rps", .. })
        ));
    }

    #[test]
    fn display_lists_actions_and_wait() {
        let mut builder = StepBuilder::new();
        builder.set_log("spin").set_shooter_rps(20.0).set_delay_delta(0.5);
        let step = builder.finish("test").unwrap();
        assert_eq!(
            step.to_string(),
            "[log=\"spin\", shooter_rps=20, until=Delay(500ms)]"
        );
    }
}
