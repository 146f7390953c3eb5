//! The standard mission sequences, built once from configuration.
//!
//! Each function returns a freshly built sequence. `Sequences` builds all of
//! the fixed ones up front and hands out shared references by name, so that
//! asking for the same sequence twice yields the same instance and the
//! controller's duplicate suppression applies.

use crate::components::sequence::Sequence;
use crate::config::SequencerConfig;
use crate::error::BuildError;
use crate::subsystems::{LedColour, Side};
use std::sync::Arc;

/// Drive power used to swing off the low bar after climbing.
const UNSTICK_POWER: f64 = 0.22;
/// Long enough to start the swing, short enough not to catch the back wheels.
const UNSTICK_SECS: f64 = 0.5;
/// How long a reversing feeder leads the rest so balls leave out of step.
const REVERSE_FEEDER_LEAD_SECS: f64 = 0.5;

pub fn empty() -> Result<Sequence, BuildError> {
    Sequence::builder("empty").build()
}

/// Hands the drivebase back to the driver.
pub fn reset() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("reset");
    builder.then().do_arcade_drive();
    builder.build()
}

/// Extends the intake, then runs the rollers and conveyor once it is out.
pub fn start_intaking(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Start intaking");
    builder.then().deploy_intake();
    builder
        .then()
        .set_intake_rps(config.intake.target_rps)
        .set_velcro_duty_cycle(config.velcro.duty_cycle)
        .set_conveyor_duty_cycle(config.conveyor.duty_cycle);
    builder.build()
}

pub fn stop_intaking(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Stop intaking");
    builder.then().set_intake_rps(0.0).set_velcro_duty_cycle(0.0);
    builder
        .then()
        .set_conveyor_duty_cycle(config.conveyor.idle_duty_cycle);
    builder.create_interrupt_state();
    builder.build()
}

/// Runs everything backwards to clear a jam. One feeder leads so the balls
/// don't all leave at once.
pub fn reverse_intaking(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Reverse intaking");
    builder.then().deploy_intake();
    builder
        .then()
        .set_conveyor_duty_cycle(0.0)
        .set_feeder_duty_cycle(Side::Left, -config.feeder.duty_cycle);
    builder.then().set_delay_delta(REVERSE_FEEDER_LEAD_SECS);
    builder
        .then()
        .set_intake_rps(-config.intake.target_rps)
        .set_velcro_duty_cycle(-config.velcro.duty_cycle)
        .set_conveyor_duty_cycle(-config.conveyor.duty_cycle)
        .set_feeder_duty_cycle(Side::Right, -config.feeder.duty_cycle);
    builder.build()
}

/// Needed after `reverse_intaking()` since that also runs the feeders.
pub fn stop_intaking_and_feeder(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Stop intaking and feeder");
    builder
        .then()
        .set_intake_rps(0.0)
        .set_velcro_duty_cycle(0.0)
        .set_feeder_duty_cycle(Side::Left, 0.0)
        .set_feeder_duty_cycle(Side::Right, 0.0);
    builder
        .then()
        .set_conveyor_duty_cycle(config.conveyor.idle_duty_cycle);
    builder.create_interrupt_state();
    builder.build()
}

pub fn raise_intake() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Raise intake");
    builder.then().stow_intake();
    builder.build()
}

pub fn start_conveyor(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Start conveyor");
    builder
        .then()
        .set_conveyor_duty_cycle(config.conveyor.duty_cycle);
    builder.build()
}

pub fn reverse_conveyor(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Reverse conveyor");
    builder
        .then()
        .set_conveyor_duty_cycle(-config.conveyor.duty_cycle);
    builder.build()
}

pub fn stop_conveyor() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Stop conveyor");
    builder.then().set_conveyor_duty_cycle(0.0);
    builder.build()
}

/// Gets the shooter ready for a shot. Spin down with `stop_shooting()`.
pub fn spin_up_shooter(hood_angle: f64, rps: f64) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!(
        "Spin up shooter {} rps at {} degrees",
        rps, hood_angle
    ));
    builder
        .then()
        .set_hood_angle(hood_angle)
        .set_shooter_rps(rps);
    builder.then().wait_for_shooter().wait_for_hood();
    builder.build()
}

/// Feeds balls into the shooter at whatever speed and angle are already set.
///
/// Only waits for the hood: the operator decides when the wheel is fast
/// enough. Never finishes if the hood can't reach its angle.
pub fn start_shooting(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Start shooting");
    builder
        .then()
        .set_conveyor_duty_cycle(config.conveyor.duty_cycle);
    builder.then().wait_for_hood();
    builder
        .then()
        .set_feeder_duty_cycle(Side::Left, config.feeder.duty_cycle);
    builder
        .then()
        .set_delay_delta(config.feeder.left_right_delay_secs);
    builder
        .then()
        .set_feeder_duty_cycle(Side::Right, config.feeder.duty_cycle);
    builder.build()
}

pub fn stop_shooting(config: &SequencerConfig) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Stop shooting");
    builder
        .then()
        .set_shooter_rps(0.0)
        .set_feeder_duty_cycle(Side::Left, 0.0)
        .set_feeder_duty_cycle(Side::Right, 0.0)
        .set_conveyor_duty_cycle(config.conveyor.idle_duty_cycle)
        .set_hood_angle(config.shooter.hood_reset_angle);
    builder.create_interrupt_state();
    builder.build()
}

/// Spits a single ball out through the shooter at low speed.
pub fn eject_ball(config: &SequencerConfig, side: Side) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Eject {} ball", side));
    builder
        .then()
        .set_hood_angle(config.shooter.hood_reset_angle)
        .set_shooter_rps(config.shooter.eject_rps);
    builder.then().wait_for_hood().wait_for_shooter();
    builder
        .then()
        .set_conveyor_duty_cycle(config.conveyor.duty_cycle)
        .set_feeder_duty_cycle(side, config.feeder.duty_cycle);
    builder.build()
}

pub fn constant_drive_power(power: f64) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Constant drive power {}", power));
    builder.then().set_drivebase_power(power);
    builder.build()
}

/// On the low bar the hooks engage but the front wheels stop the robot
/// swinging forward. Drives forward briefly to start the swing.
pub fn unstick_wheels() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Unstick wheels after climb");
    builder.then().set_drivebase_power(UNSTICK_POWER);
    builder.then().set_delay_delta(UNSTICK_SECS);
    builder.then().do_arcade_drive();
    builder.build()
}

pub fn extend_climber(config: &SequencerConfig, side: Side) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Extend {} climber", side));
    builder
        .then()
        .set_climber_duty_cycle(side, config.climber.duty_cycle);
    builder.build()
}

pub fn retract_climber(config: &SequencerConfig, side: Side) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Retract {} climber", side));
    builder
        .then()
        .set_climber_duty_cycle(side, -config.climber.duty_cycle);
    builder.build()
}

pub fn stop_climber(side: Side) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Stop {} climber", side));
    builder.then().set_climber_duty_cycle(side, 0.0);
    builder.create_interrupt_state();
    builder.build()
}

/// Turns toward a vision target and finishes once aimed.
pub fn vision_aim() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Vision aim");
    builder.then().do_vision_aim();
    builder.build()
}

/// Takes over steering while a target is visible. Stays in this mode.
pub fn vision_assist() -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder("Vision assist");
    builder.then().do_vision_assist();
    builder.build()
}

pub fn set_led_colour(colour: LedColour) -> Result<Sequence, BuildError> {
    let mut builder = Sequence::builder(format!("Set LEDs to {:?}", colour));
    builder.then().set_colour(colour);
    builder.build()
}

/// The fixed mission sequences, looked up by a short kebab-case key.
#[derive(Debug, Clone)]
pub struct Sequences {
    entries: Vec<(&'static str, Arc<Sequence>)>,
}

impl Sequences {
    /// Builds every fixed sequence with values from `config`.
    pub fn new(config: &SequencerConfig) -> Result<Self, BuildError> {
        let shooter = &config.shooter;
        let built = [
            ("empty", empty()?),
            ("reset", reset()?),
            ("start-intaking", start_intaking(config)?),
            ("stop-intaking", stop_intaking(config)?),
            ("reverse-intaking", reverse_intaking(config)?),
            ("stop-intaking-and-feeder", stop_intaking_and_feeder(config)?),
            ("raise-intake", raise_intake()?),
            ("start-conveyor", start_conveyor(config)?),
            ("reverse-conveyor", reverse_conveyor(config)?),
            ("stop-conveyor", stop_conveyor()?),
            (
                "spin-up-shooter",
                spin_up_shooter(shooter.shot_hood_angle, shooter.shot_rps)?,
            ),
            ("start-shooting", start_shooting(config)?),
            ("stop-shooting", stop_shooting(config)?),
            ("eject-left", eject_ball(config, Side::Left)?),
            ("eject-right", eject_ball(config, Side::Right)?),
            (
                "constant-drive-power",
                constant_drive_power(config.drivebase.constant_power)?,
            ),
            ("unstick-wheels", unstick_wheels()?),
            ("extend-climber-left", extend_climber(config, Side::Left)?),
            ("extend-climber-right", extend_climber(config, Side::Right)?),
            ("retract-climber-left", retract_climber(config, Side::Left)?),
            ("retract-climber-right", retract_climber(config, Side::Right)?),
            ("stop-climber-left", stop_climber(Side::Left)?),
            ("stop-climber-right", stop_climber(Side::Right)?),
            ("vision-aim", vision_aim()?),
            ("vision-assist", vision_assist()?),
            ("leds-off", set_led_colour(LedColour::Off)?),
            ("leds-green", set_led_colour(LedColour::Green)?),
            ("leds-purple", set_led_colour(LedColour::Purple)?),
        ];
        Ok(Self {
            entries: built
                .into_iter()
                .map(|(key, sequence)| (key, Arc::new(sequence)))
                .collect(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Sequence>> {
        self.entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, sequence)| sequence)
    }

    /// Every key, in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<Sequence>> {
        self.entries.iter().map(|(_, sequence)| sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
