//! The individual requests a step makes of a subsystem.

use crate::common::Resource;
use crate::subsystems::{DriveRoutine, LedColour, Position, Side, Subsystems};
use std::fmt;

/// A single request to one subsystem, applied once when its step starts.
///
/// Some actions also carry a wait: the step they belong to won't complete
/// until the subsystem reports that the request has been achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    IntakePosition(Position),
    IntakeRps(f64),
    VelcroDutyCycle(f64),
    ConveyorDutyCycle(f64),
    FeederDutyCycle(Side, f64),
    ShooterRps(f64),
    HoodAngle(f64),
    /// Wait until the flywheel has reached its target speed.
    WaitForShooter,
    /// Wait until the hood has reached its target angle.
    WaitForHood,
    ClimberDutyCycle(Side, f64),
    Drive(DriveRoutine),
    LedColour(LedColour),
}

/// Identifies the setpoint an action writes. A step holds at most one action
/// per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ActionSlot {
    IntakePosition,
    IntakeRps,
    Velcro,
    Conveyor,
    Feeder(Side),
    ShooterRps,
    HoodAngle,
    WaitForShooter,
    WaitForHood,
    Climber(Side),
    Drive,
    Led,
}

/// What a step is currently waiting on, in the order waits are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Blocker {
    Intake,
    ShooterWheel,
    ShooterHood,
    Driving,
    Time,
    Predicate,
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Blocker::Intake => "intake",
            Blocker::ShooterWheel => "shooter wheel",
            Blocker::ShooterHood => "shooter hood",
            Blocker::Driving => "driving",
            Blocker::Time => "time",
            Blocker::Predicate => "predicate",
        };
        f.write_str(name)
    }
}

impl Action {
    /// The resource this action claims.
    pub fn resource(&self) -> Resource {
        match self {
            Action::IntakePosition(_) | Action::IntakeRps(_) | Action::VelcroDutyCycle(_) => {
                Resource::Intake
            }
            Action::ConveyorDutyCycle(_) => Resource::Conveyor,
            Action::FeederDutyCycle(..) => Resource::Feeder,
            Action::ShooterRps(_)
            | Action::HoodAngle(_)
            | Action::WaitForShooter
            | Action::WaitForHood => Resource::Shooter,
            Action::ClimberDutyCycle(Side::Left, _) => Resource::ClimberLeft,
            Action::ClimberDutyCycle(Side::Right, _) => Resource::ClimberRight,
            Action::Drive(_) => Resource::Drivebase,
            Action::LedColour(_) => Resource::Led,
        }
    }

    pub(crate) fn slot(&self) -> ActionSlot {
        match self {
            Action::IntakePosition(_) => ActionSlot::IntakePosition,
            Action::IntakeRps(_) => ActionSlot::IntakeRps,
            Action::VelcroDutyCycle(_) => ActionSlot::Velcro,
            Action::ConveyorDutyCycle(_) => ActionSlot::Conveyor,
            Action::FeederDutyCycle(side, _) => ActionSlot::Feeder(*side),
            Action::ShooterRps(_) => ActionSlot::ShooterRps,
            Action::HoodAngle(_) => ActionSlot::HoodAngle,
            Action::WaitForShooter => ActionSlot::WaitForShooter,
            Action::WaitForHood => ActionSlot::WaitForHood,
            Action::ClimberDutyCycle(side, _) => ActionSlot::Climber(*side),
            Action::Drive(_) => ActionSlot::Drive,
            Action::LedColour(_) => ActionSlot::Led,
        }
    }

    /// Setpoints that describe where a mechanism should be left. These are
    /// the actions a synthesized interrupt state is built from.
    pub(crate) fn is_setpoint(&self) -> bool {
        !matches!(
            self,
            Action::WaitForShooter | Action::WaitForHood | Action::Drive(_) | Action::LedColour(_)
        )
    }

    /// Sends the request to the subsystem.
    pub(crate) fn apply(&self, subsystems: &mut Subsystems) {
        match *self {
            Action::IntakePosition(position) => subsystems.intake.set_position(position),
            Action::IntakeRps(rps) => subsystems.intake.set_target_rps(rps),
            Action::VelcroDutyCycle(duty) => subsystems.velcro.set_duty_cycle(duty),
            Action::ConveyorDutyCycle(duty) => subsystems.conveyor.set_duty_cycle(duty),
            Action::FeederDutyCycle(side, duty) => subsystems.feeder_mut(side).set_duty_cycle(duty),
            Action::ShooterRps(rps) => subsystems.shooter.set_target_rps(rps),
            Action::HoodAngle(degrees) => subsystems.shooter.set_hood_target_angle(degrees),
            Action::WaitForShooter | Action::WaitForHood => {}
            Action::ClimberDutyCycle(side, duty) => {
                subsystems.climber_mut(side).set_duty_cycle(duty)
            }
            Action::Drive(routine) => subsystems.drivebase.set_drive_routine(routine),
            Action::LedColour(colour) => subsystems.led_strip.set_colour(colour),
        }
    }

    /// If this action has to be waited on, what to report while waiting and
    /// whether the wait is over.
    pub(crate) fn wait(&self, subsystems: &Subsystems) -> Option<(Blocker, bool)> {
        match self {
            Action::IntakePosition(_) => Some((Blocker::Intake, subsystems.intake.is_in_position())),
            Action::WaitForShooter => Some((
                Blocker::ShooterWheel,
                subsystems.shooter.is_at_target_speed(),
            )),
            Action::WaitForHood => Some((
                Blocker::ShooterHood,
                subsystems.shooter.is_hood_at_target_angle(),
            )),
            Action::Drive(_) => Some((Blocker::Driving, subsystems.drivebase.has_finished())),
            _ => None,
        }
    }

    /// The numeric payload, if any: its name in construction errors, its
    /// value and whether it is a duty cycle bounded to [-1, 1].
    pub(crate) fn value(&self) -> Option<(&'static str, f64, bool)> {
        match *self {
            Action::IntakeRps(v) => Some(("intake rps", v, false)),
            Action::VelcroDutyCycle(v) => Some(("velcro", v, true)),
            Action::ConveyorDutyCycle(v) => Some(("conveyor", v, true)),
            Action::FeederDutyCycle(_, v) => Some(("feeder", v, true)),
            Action::ShooterRps(v) => Some(("shooter rps", v, false)),
            Action::HoodAngle(v) => Some(("hood angle", v, false)),
            Action::ClimberDutyCycle(_, v) => Some(("climber", v, true)),
            Action::Drive(DriveRoutine::ConstantPower(v)) => Some(("drivebase power", v, true)),
            Action::Drive(DriveRoutine::ConstantSpeed(v)) => Some(("drivebase speed", v, false)),
            Action::Drive(DriveRoutine::TurnToHeading(v)) => Some(("heading", v, false)),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::IntakePosition(position) => write!(f, "intake_position={:?}", position),
            Action::IntakeRps(rps) => write!(f, "intake_rps={}", rps),
            Action::VelcroDutyCycle(duty) => write!(f, "velcro={}", duty),
            Action::ConveyorDutyCycle(duty) => write!(f, "conveyor={}", duty),
            Action::FeederDutyCycle(side, duty) => write!(f, "feeder_{}={}", side, duty),
            Action::ShooterRps(rps) => write!(f, "shooter_rps={}", rps),
            Action::HoodAngle(degrees) => write!(f, "hood_angle={}", degrees),
            Action::WaitForShooter => f.write_str("wait_for_shooter"),
            Action::WaitForHood => f.write_str("wait_for_hood"),
            Action::ClimberDutyCycle(side, duty) => write!(f, "climber_{}={}", side, duty),
            Action::Drive(routine) => write!(f, "drive={:?}", routine),
            Action::LedColour(colour) => write!(f, "led={:?}", colour),
        }
    }
}
