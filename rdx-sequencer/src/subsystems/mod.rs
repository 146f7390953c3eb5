//! The capability contract between sequences and the hardware-adjacent code.
//!
//! Steps only ever touch subsystems through these traits: a setter to request a
//! new state and a predicate to ask whether it has been reached. How a
//! subsystem physically gets there is not the sequencer's concern. The `sim`
//! module provides simulated implementations for tests, the demo binary and
//! the shell.

pub mod sim;

use crate::config::SequencerConfig;
use crate::time::TickEvent;
use std::fmt;
use std::str::FromStr;

/// Behaviour shared by every subsystem.
pub trait Subsystem: Send {
    fn name(&self) -> &str;

    /// A disabled subsystem ignores `execute()` until enabled again.
    fn enable(&mut self);
    fn disable(&mut self);
    fn is_enabled(&self) -> bool;

    /// Called once per tick to let the subsystem make progress.
    fn execute(&mut self, tick: &TickEvent);
}

/// Ball intake: rollers on a pneumatically deployed arm.
pub trait Intake: Subsystem {
    fn set_position(&mut self, position: Position);
    /// Whether the arm has finished moving to the requested position.
    fn is_in_position(&self) -> bool;
    fn is_extended(&self) -> bool;
    fn is_retracted(&self) -> bool;
    fn set_target_rps(&mut self, rps: f64);
    fn target_rps(&self) -> f64;
}

/// A single motor driven open loop. Used for the velcro roller, conveyor,
/// feeders and climbers.
pub trait DutyCycleMotor: Subsystem {
    fn set_duty_cycle(&mut self, duty_cycle: f64);
    fn duty_cycle(&self) -> f64;
}

/// Flywheel shooter with an adjustable hood.
pub trait Shooter: Subsystem {
    fn set_target_rps(&mut self, rps: f64);
    fn target_rps(&self) -> f64;
    fn is_at_target_speed(&self) -> bool;
    fn set_hood_target_angle(&mut self, degrees: f64);
    fn hood_target_angle(&self) -> f64;
    fn is_hood_at_target_angle(&self) -> bool;
}

pub trait Drivebase: Subsystem {
    fn set_drive_routine(&mut self, routine: DriveRoutine);
    fn drive_routine(&self) -> DriveRoutine;
    /// Whether the current routine has done what it was asked to do.
    fn has_finished(&self) -> bool;
}

pub trait LedStrip: Subsystem {
    fn set_colour(&mut self, colour: LedColour);
    fn colour(&self) -> LedColour;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Extended,
    Retracted,
}

/// Selects one of a pair of mirrored mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// How the drivebase should be driven.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DriveRoutine {
    /// Driver control, open loop.
    #[default]
    ArcadeDutyCycle,
    /// Driver control, closed loop on wheel velocity.
    ArcadeVelocity,
    /// Both sides at a fixed power. Used to push against the climbing bar.
    ConstantPower(f64),
    ConstantSpeed(f64),
    /// Rotate on the spot to a field-relative heading in degrees.
    TurnToHeading(f64),
    VisionAim,
    VisionAssist,
}

impl DriveRoutine {
    /// Routines that run to completion rather than holding forever.
    pub fn is_finite(&self) -> bool {
        matches!(self, DriveRoutine::TurnToHeading(_) | DriveRoutine::VisionAim)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedColour {
    #[default]
    Off,
    Red,
    Green,
    Blue,
    Yellow,
    Orange,
    Purple,
    Cyan,
    Magenta,
    White,
}

impl FromStr for LedColour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LedColour::Off),
            "red" => Ok(LedColour::Red),
            "green" => Ok(LedColour::Green),
            "blue" => Ok(LedColour::Blue),
            "yellow" => Ok(LedColour::Yellow),
            "orange" => Ok(LedColour::Orange),
            "purple" => Ok(LedColour::Purple),
            "cyan" => Ok(LedColour::Cyan),
            "magenta" => Ok(LedColour::Magenta),
            "white" => Ok(LedColour::White),
            other => Err(format!("unknown colour '{}'", other)),
        }
    }
}

/// The fixed set of subsystem handles that sequences act on.
///
/// Constructed once at startup and handed to the controller by reference on
/// every tick.
pub struct Subsystems {
    pub intake: Box<dyn Intake>,
    pub velcro: Box<dyn DutyCycleMotor>,
    pub conveyor: Box<dyn DutyCycleMotor>,
    pub feeder_left: Box<dyn DutyCycleMotor>,
    pub feeder_right: Box<dyn DutyCycleMotor>,
    pub shooter: Box<dyn Shooter>,
    pub climber_left: Box<dyn DutyCycleMotor>,
    pub climber_right: Box<dyn DutyCycleMotor>,
    pub drivebase: Box<dyn Drivebase>,
    pub led_strip: Box<dyn LedStrip>,
}

macro_rules! for_each_subsystem {
    ($self:ident, $method:ident $(, $arg:expr)*) => {{
        $self.intake.$method($($arg),*);
        $self.velcro.$method($($arg),*);
        $self.conveyor.$method($($arg),*);
        $self.feeder_left.$method($($arg),*);
        $self.feeder_right.$method($($arg),*);
        $self.shooter.$method($($arg),*);
        $self.climber_left.$method($($arg),*);
        $self.climber_right.$method($($arg),*);
        $self.drivebase.$method($($arg),*);
        $self.led_strip.$method($($arg),*);
    }};
}

impl Subsystems {
    /// Builds a registry of simulated subsystems tuned by `config`.
    pub fn simulated(config: &SequencerConfig) -> Self {
        Self {
            intake: Box::new(sim::SimIntake::new(config.intake.deploy_time_secs)),
            velcro: Box::new(sim::SimMotor::new("velcro")),
            conveyor: Box::new(sim::SimMotor::new("conveyor")),
            feeder_left: Box::new(sim::SimMotor::new("feeder_left")),
            feeder_right: Box::new(sim::SimMotor::new("feeder_right")),
            shooter: Box::new(sim::SimShooter::new(
                config.shooter.spin_up_rps_per_sec,
                config.shooter.hood_degrees_per_sec,
            )),
            climber_left: Box::new(sim::SimMotor::new("climber_left")),
            climber_right: Box::new(sim::SimMotor::new("climber_right")),
            drivebase: Box::new(sim::SimDrivebase::new(config.drivebase.turn_time_secs)),
            led_strip: Box::new(sim::SimLedStrip::new()),
        }
    }

    pub fn enable_all(&mut self) {
        for_each_subsystem!(self, enable);
    }

    pub fn disable_all(&mut self) {
        for_each_subsystem!(self, disable);
    }

    /// Lets every enabled subsystem make progress for this tick.
    pub fn execute(&mut self, tick: &TickEvent) {
        for_each_subsystem!(self, execute, tick);
    }

    pub fn feeder_mut(&mut self, side: Side) -> &mut dyn DutyCycleMotor {
        match side {
            Side::Left => self.feeder_left.as_mut(),
            Side::Right => self.feeder_right.as_mut(),
        }
    }

    pub fn feeder(&self, side: Side) -> &dyn DutyCycleMotor {
        match side {
            Side::Left => self.feeder_left.as_ref(),
            Side::Right => self.feeder_right.as_ref(),
        }
    }

    pub fn climber_mut(&mut self, side: Side) -> &mut dyn DutyCycleMotor {
        match side {
            Side::Left => self.climber_left.as_mut(),
            Side::Right => self.climber_right.as_mut(),
        }
    }

    pub fn climber(&self, side: Side) -> &dyn DutyCycleMotor {
        match side {
            Side::Left => self.climber_left.as_ref(),
            Side::Right => self.climber_right.as_ref(),
        }
    }

    /// A one-line summary of every setpoint, for logs and the shell.
    pub fn summary(&self) -> String {
        format!(
            "intake[{} rps={:.1}] velcro={:.2} conveyor={:.2} feeders=({:.2}, {:.2}) \
             shooter[rps={:.1} hood={:.1}] climbers=({:.2}, {:.2}) drive={:?} led={:?}",
            if self.intake.is_extended() {
                "extended"
            } else if self.intake.is_retracted() {
                "retracted"
            } else {
                "moving"
            },
            self.intake.target_rps(),
            self.velcro.duty_cycle(),
            self.conveyor.duty_cycle(),
            self.feeder_left.duty_cycle(),
            self.feeder_right.duty_cycle(),
            self.shooter.target_rps(),
            self.shooter.hood_target_angle(),
            self.climber_left.duty_cycle(),
            self.climber_right.duty_cycle(),
            self.drivebase.drive_routine(),
            self.led_strip.colour(),
        )
    }
}

impl Default for Subsystems {
    fn default() -> Self {
        Self::simulated(&SequencerConfig::default())
    }
}
