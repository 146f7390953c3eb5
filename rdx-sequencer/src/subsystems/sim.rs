//! Simulated subsystems.
//!
//! Each simulator moves toward its requested state at a configured rate as
//! ticks pass, which is enough to exercise every wait a step can express.

use super::{
    DriveRoutine, Drivebase, DutyCycleMotor, Intake, LedColour, LedStrip, Position, Shooter,
    Subsystem,
};
use crate::time::TickEvent;
use std::time::Duration;
use tracing::{debug, trace};

const SPEED_TOLERANCE_RPS: f64 = 1.0;
const HOOD_TOLERANCE_DEGREES: f64 = 0.5;

/// Tracks time between consecutive `execute()` calls.
#[derive(Debug, Default)]
struct Stepper {
    last: Option<Duration>,
}

impl Stepper {
    /// Seconds since the previous tick. Zero on the first tick.
    fn delta(&mut self, tick: &TickEvent) -> f64 {
        let delta = match self.last {
            Some(last) => tick.elapsed.saturating_sub(last).as_secs_f64(),
            None => 0.0,
        };
        self.last = Some(tick.elapsed);
        delta
    }
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    if (target - current).abs() <= max_step {
        target
    } else if target > current {
        current + max_step
    } else {
        current - max_step
    }
}

/// Intake whose arm takes `deploy_time` to travel between positions.
#[derive(Debug)]
pub struct SimIntake {
    enabled: bool,
    deploy_time: f64,
    target: Position,
    /// 0.0 is fully retracted, 1.0 fully extended.
    arm: f64,
    rps: f64,
    stepper: Stepper,
}

impl SimIntake {
    pub fn new(deploy_time_secs: f64) -> Self {
        Self {
            enabled: true,
            deploy_time: deploy_time_secs,
            target: Position::Retracted,
            arm: 0.0,
            rps: 0.0,
            stepper: Stepper::default(),
        }
    }
}

impl Subsystem for SimIntake {
    fn name(&self) -> &str {
        "intake"
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn execute(&mut self, tick: &TickEvent) {
        let delta = self.stepper.delta(tick);
        if !self.enabled {
            return;
        }
        let goal = match self.target {
            Position::Extended => 1.0,
            Position::Retracted => 0.0,
        };
        let before = self.arm;
        self.arm = if self.deploy_time <= 0.0 {
            goal
        } else {
            approach(self.arm, goal, delta / self.deploy_time)
        };
        if before != goal && self.arm == goal {
            debug!("Simulated intake reached {:?}", self.target);
        }
    }
}

impl Intake for SimIntake {
    fn set_position(&mut self, position: Position) {
        self.target = position;
    }

    fn is_in_position(&self) -> bool {
        match self.target {
            Position::Extended => self.is_extended(),
            Position::Retracted => self.is_retracted(),
        }
    }

    fn is_extended(&self) -> bool {
        self.target == Position::Extended && self.arm >= 1.0
    }

    fn is_retracted(&self) -> bool {
        self.target == Position::Retracted && self.arm <= 0.0
    }

    fn set_target_rps(&mut self, rps: f64) {
        self.rps = rps;
    }

    fn target_rps(&self) -> f64 {
        self.rps
    }
}

#[derive(Debug)]
pub struct SimMotor {
    name: &'static str,
    enabled: bool,
    duty_cycle: f64,
}

impl SimMotor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: true,
            duty_cycle: 0.0,
        }
    }
}

impl Subsystem for SimMotor {
    fn name(&self) -> &str {
        self.name
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn execute(&mut self, _tick: &TickEvent) {}
}

impl DutyCycleMotor for SimMotor {
    fn set_duty_cycle(&mut self, duty_cycle: f64) {
        self.duty_cycle = duty_cycle;
    }

    fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }
}

/// Flywheel that accelerates at a fixed rate and a hood that slews at a fixed rate.
#[derive(Debug)]
pub struct SimShooter {
    enabled: bool,
    spin_up_rate: f64,
    hood_rate: f64,
    target_rps: f64,
    rps: f64,
    hood_target: f64,
    hood: f64,
    stepper: Stepper,
}

impl SimShooter {
    pub fn new(spin_up_rps_per_sec: f64, hood_degrees_per_sec: f64) -> Self {
        Self {
            enabled: true,
            spin_up_rate: spin_up_rps_per_sec,
            hood_rate: hood_degrees_per_sec,
            target_rps: 0.0,
            rps: 0.0,
            hood_target: 0.0,
            hood: 0.0,
            stepper: Stepper::default(),
        }
    }

    /// The simulated flywheel speed.
    pub fn rps(&self) -> f64 {
        self.rps
    }
}

impl Subsystem for SimShooter {
    fn name(&self) -> &str {
        "shooter"
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn execute(&mut self, tick: &TickEvent) {
        let delta = self.stepper.delta(tick);
        if !self.enabled {
            return;
        }
        self.rps = approach(self.rps, self.target_rps, self.spin_up_rate * delta);
        self.hood = approach(self.hood, self.hood_target, self.hood_rate * delta);
    }
}

impl Shooter for SimShooter {
    fn set_target_rps(&mut self, rps: f64) {
        self.target_rps = rps;
    }

    fn target_rps(&self) -> f64 {
        self.target_rps
    }

    fn is_at_target_speed(&self) -> bool {
        (self.rps - self.target_rps).abs() <= SPEED_TOLERANCE_RPS
    }

    fn set_hood_target_angle(&mut self, degrees: f64) {
        self.hood_target = degrees;
    }

    fn hood_target_angle(&self) -> f64 {
        self.hood_target
    }

    fn is_hood_at_target_angle(&self) -> bool {
        (self.hood - self.hood_target).abs() <= HOOD_TOLERANCE_DEGREES
    }
}

/// Drivebase where finite routines complete after `turn_time`.
#[derive(Debug)]
pub struct SimDrivebase {
    enabled: bool,
    turn_time: f64,
    routine: DriveRoutine,
    remaining: f64,
    stepper: Stepper,
}

impl SimDrivebase {
    pub fn new(turn_time_secs: f64) -> Self {
        Self {
            enabled: true,
            turn_time: turn_time_secs,
            routine: DriveRoutine::default(),
            remaining: 0.0,
            stepper: Stepper::default(),
        }
    }
}

impl Subsystem for SimDrivebase {
    fn name(&self) -> &str {
        "drivebase"
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn execute(&mut self, tick: &TickEvent) {
        let delta = self.stepper.delta(tick);
        if self.enabled {
            self.remaining = (self.remaining - delta).max(0.0);
        }
    }
}

impl Drivebase for SimDrivebase {
    /// Every request restarts the routine, even if it is the one already running.
    fn set_drive_routine(&mut self, routine: DriveRoutine) {
        trace!("Simulated drivebase running {:?}", routine);
        self.remaining = if routine.is_finite() {
            self.turn_time
        } else {
            0.0
        };
        self.routine = routine;
    }

    fn drive_routine(&self) -> DriveRoutine {
        self.routine
    }

    fn has_finished(&self) -> bool {
        self.remaining <= 0.0
    }
}

#[derive(Debug)]
pub struct SimLedStrip {
    enabled: bool,
    colour: LedColour,
}

impl SimLedStrip {
    pub fn new() -> Self {
        Self {
            enabled: true,
            colour: LedColour::Off,
        }
    }
}

impl Default for SimLedStrip {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystem for SimLedStrip {
    fn name(&self) -> &str {
        "led_strip"
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn execute(&mut self, _tick: &TickEvent) {}
}

impl LedStrip for SimLedStrip {
    fn set_colour(&mut self, colour: LedColour) {
        self.colour = colour;
    }

    fn colour(&self) -> LedColour {
        self.colour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn intake_takes_deploy_time_to_extend() {
        let mut clock = ManualClock::default();
        let mut intake = SimIntake::new(0.5);
        intake.execute(&clock.now());
        assert!(intake.is_retracted() && intake.is_in_position());

        intake.set_position(Position::Extended);
        intake.execute(&clock.tick());
        assert!(!intake.is_retracted());
        assert!(!intake.is_extended());
        assert!(!intake.is_in_position());

        intake.execute(&clock.advance(Duration::from_secs(1)));
        assert!(intake.is_extended() && intake.is_in_position());
    }

    #[test]
    fn disabled_intake_does_not_move() {
        let mut clock = ManualClock::default();
        let mut intake = SimIntake::new(0.5);
        intake.execute(&clock.now());
        intake.disable();
        intake.set_position(Position::Extended);
        intake.execute(&clock.advance(Duration::from_secs(2)));
        assert!(!intake.is_extended());
        intake.enable();
        intake.execute(&clock.advance(Duration::from_secs(1)));
        assert!(intake.is_extended());
    }

    #[test]
    fn shooter_spins_up_at_configured_rate() {
        let mut clock = ManualClock::default();
        let mut shooter = SimShooter::new(100.0, 60.0);
        shooter.execute(&clock.now());
        shooter.set_target_rps(50.0);
        shooter.execute(&clock.advance(Duration::from_millis(250)));
        assert!((shooter.rps() - 25.0).abs() < 1e-9);
        assert!(!shooter.is_at_target_speed());
        shooter.execute(&clock.advance(Duration::from_millis(250)));
        assert!(shooter.is_at_target_speed());
    }

    #[test]
    fn turn_to_heading_finishes_after_turn_time() {
        let mut clock = ManualClock::default();
        let mut drivebase = SimDrivebase::new(1.0);
        drivebase.execute(&clock.now());
        drivebase.set_drive_routine(DriveRoutine::ConstantPower(0.5));
        assert!(drivebase.has_finished());
        drivebase.set_drive_routine(DriveRoutine::TurnToHeading(90.0));
        assert!(!drivebase.has_finished());
        drivebase.execute(&clock.advance(Duration::from_millis(1100)));
        assert!(drivebase.has_finished());
    }

    #[test]
    fn repeating_a_finished_turn_restarts_it() {
        let mut clock = ManualClock::default();
        let mut drivebase = SimDrivebase::new(1.0);
        drivebase.execute(&clock.now());
        drivebase.set_drive_routine(DriveRoutine::TurnToHeading(90.0));
        drivebase.execute(&clock.advance(Duration::from_millis(1100)));
        assert!(drivebase.has_finished());

        drivebase.set_drive_routine(DriveRoutine::TurnToHeading(90.0));
        assert!(!drivebase.has_finished());
        drivebase.execute(&clock.advance(Duration::from_millis(500)));
        assert!(!drivebase.has_finished());
        drivebase.execute(&clock.advance(Duration::from_millis(600)));
        assert!(drivebase.has_finished());
    }
}
