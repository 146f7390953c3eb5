//! Defines all configuration structures for the sequencer.
//!
//! These structs are deserialized from a TOML file using `serde` and the
//! `config` crate, with `SEQUENCER_`-prefixed environment variables layered on
//! top (use `__` to reach nested keys, e.g. `SEQUENCER_INTAKE__TARGET_RPS=80`).
//! Every field has a default, so an empty or missing file is valid.

use serde::Deserialize;
use std::path::Path;

/// The top-level configuration for the `SequencerEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// The tick speed of the master `SystemClock`.
    #[serde(default)]
    pub resolution: ClockResolution,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub velcro: DutyCycleConfig,

    #[serde(default)]
    pub conveyor: ConveyorConfig,

    #[serde(default)]
    pub feeder: FeederConfig,

    #[serde(default)]
    pub shooter: ShooterConfig,

    #[serde(default)]
    pub climber: DutyCycleConfig,

    #[serde(default)]
    pub drivebase: DrivebaseConfig,
}

/// Defines the operational speed of the `SystemClock`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// ~60 ticks per second.
    High,
    /// ~30 ticks per second.
    Medium,
    /// ~1 tick per second. Only useful for stepping through a sequence by eye.
    Low,
    /// 100 ticks per second, the rate the robot control loop runs at.
    #[default]
    Control,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Accept sequence requests as soon as the engine starts.
    #[serde(default = "default_true")]
    pub enabled_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_intake_rps")]
    pub target_rps: f64,
    /// How long the simulated intake arm takes to move between positions.
    #[serde(default = "default_deploy_time")]
    pub deploy_time_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DutyCycleConfig {
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConveyorConfig {
    #[serde(default = "default_one")]
    pub duty_cycle: f64,
    /// Duty cycle left running when nothing is being intaken or shot.
    #[serde(default = "default_duty_cycle")]
    pub idle_duty_cycle: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeederConfig {
    #[serde(default = "default_one")]
    pub duty_cycle: f64,
    /// Pause between starting the left and right feeders so balls don't jam.
    #[serde(default = "default_left_right_delay")]
    pub left_right_delay_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShooterConfig {
    /// Flywheel speed used by the spin-up sequence.
    #[serde(default = "default_shot_rps")]
    pub shot_rps: f64,
    /// Hood angle used by the spin-up sequence.
    #[serde(default = "default_shot_hood_angle")]
    pub shot_hood_angle: f64,
    #[serde(default = "default_eject_rps")]
    pub eject_rps: f64,
    #[serde(default = "default_hood_reset_angle")]
    pub hood_reset_angle: f64,
    /// Simulated hood slew rate in degrees per second.
    #[serde(default = "default_hood_slew_rate")]
    pub hood_degrees_per_sec: f64,
    /// Simulated flywheel acceleration in RPS per second.
    #[serde(default = "default_spin_up_rate")]
    pub spin_up_rps_per_sec: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrivebaseConfig {
    /// Power used by the constant drive power sequence.
    #[serde(default = "default_drive_power")]
    pub constant_power: f64,
    /// How long a simulated turn-to-heading takes to settle.
    #[serde(default = "default_turn_time")]
    pub turn_time_secs: f64,
}

impl SequencerConfig {
    /// Loads the configuration from an optional TOML file plus the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SEQUENCER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

// --- Default value functions for serde ---

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_duty_cycle() -> f64 {
    0.3
}

fn default_intake_rps() -> f64 {
    90.0
}

fn default_deploy_time() -> f64 {
    0.5
}

fn default_left_right_delay() -> f64 {
    0.6
}

fn default_shot_rps() -> f64 {
    60.0
}

fn default_shot_hood_angle() -> f64 {
    30.0
}

fn default_eject_rps() -> f64 {
    12.5
}

fn default_hood_reset_angle() -> f64 {
    15.0
}

fn default_hood_slew_rate() -> f64 {
    60.0
}

fn default_spin_up_rate() -> f64 {
    200.0
}

fn default_drive_power() -> f64 {
    0.5
}

fn default_turn_time() -> f64 {
    1.0
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            controller: ControllerConfig::default(),
            intake: IntakeConfig::default(),
            velcro: DutyCycleConfig::default(),
            conveyor: ConveyorConfig::default(),
            feeder: FeederConfig::default(),
            shooter: ShooterConfig::default(),
            climber: DutyCycleConfig::default(),
            drivebase: DrivebaseConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: default_true(),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            target_rps: default_intake_rps(),
            deploy_time_secs: default_deploy_time(),
        }
    }
}

impl Default for DutyCycleConfig {
    fn default() -> Self {
        Self {
            duty_cycle: default_duty_cycle(),
        }
    }
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            duty_cycle: default_one(),
            idle_duty_cycle: default_duty_cycle(),
        }
    }
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            duty_cycle: default_one(),
            left_right_delay_secs: default_left_right_delay(),
        }
    }
}

impl Default for ShooterConfig {
    fn default() -> Self {
        Self {
            shot_rps: default_shot_rps(),
            shot_hood_angle: default_shot_hood_angle(),
            eject_rps: default_eject_rps(),
            hood_reset_angle: default_hood_reset_angle(),
            hood_degrees_per_sec: default_hood_slew_rate(),
            spin_up_rps_per_sec: default_spin_up_rate(),
        }
    }
}

impl Default for DrivebaseConfig {
    fn default() -> Self {
        Self {
            constant_power: default_drive_power(),
            turn_time_secs: default_turn_time(),
        }
    }
}
