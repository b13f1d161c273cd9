//! Robot configuration loader: reads the JSON file with per-robot tuning.
//!
//! Every field has a default, so a partial (or missing) file is fine.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level robot configuration, loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub leg: LegConfig,
    pub gait: GaitConfig,
    pub remote: RemoteConfig,
    pub supervisor: SupervisorConfig,
    pub simulation: SimulationConfig,
    pub ev3dev: Ev3devConfig,
    pub gpio: GpioConfig,
}

/// Leg position loop tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LegConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Error low-pass constant in `(0, 1]`; 1.0 disables filtering.
    pub low_pass: f64,
    pub min_power: i8,
    pub max_power: i8,
    pub period_ms: u64,
    /// Largest believable tacho change between two samples.
    pub max_jump: i32,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            kp: 1.5,
            ki: 0.2,
            kd: 0.0,
            low_pass: 1.0,
            min_power: -50,
            max_power: 50,
            period_ms: 20,
            max_jump: 360,
        }
    }
}

impl LegConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GaitConfig {
    /// Tacho counts added to a setpoint per step.
    pub step: i32,
    /// A new step is issued only when both legs are closer than this.
    pub tolerance: i32,
    pub period_ms: u64,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            step: 180,
            tolerance: 10,
            period_ms: 100,
        }
    }
}

impl GaitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub period_ms: u64,
    /// Beacon distances above this count as a detection.
    pub beacon_floor: i32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            beacon_floor: crate::hardware::BEACON_NOT_DETECTED,
        }
    }
}

impl RemoteConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub period_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { period_ms: 500 }
    }
}

impl SupervisorConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Plant model used by the simulation backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Output shaft speed at 100% power, degrees per second.
    pub max_speed: f64,
    /// First-order lag of the motor speed, seconds.
    pub time_constant: f64,
    pub period_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_speed: 900.0,
            time_constant: 0.08,
            period_ms: 20,
        }
    }
}

impl SimulationConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// sysfs locations on ev3dev (EV3 brick or BrickPi3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ev3devConfig {
    pub left_leg_port: String,
    pub right_leg_port: String,
    pub body_port: String,
    pub infrared_port: String,
    pub use_brick_leds: bool,
}

impl Default for Ev3devConfig {
    fn default() -> Self {
        Self {
            left_leg_port: "outC".to_string(),
            right_leg_port: "outB".to_string(),
            body_port: "outA".to_string(),
            infrared_port: "in4".to_string(),
            use_brick_leds: true,
        }
    }
}

/// BCM pin numbers for GPIO status LEDs and the abort button.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub green_led_pin: Option<u8>,
    pub red_led_pin: Option<u8>,
    pub abort_button_pin: Option<u8>,
}

impl RobotConfig {
    /// Load configuration from a JSON file. Falls back to defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).context("Failed to read robot config file")?;

        let config: RobotConfig =
            serde_json::from_str(&contents).context("Failed to parse robot config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let leg = &self.leg;
        if leg.min_power >= leg.max_power {
            bail!(
                "leg.min_power ({}) must be below leg.max_power ({})",
                leg.min_power,
                leg.max_power
            );
        }
        if leg.min_power < -100 || leg.max_power > 100 {
            bail!("leg power bounds must lie within -100..=100");
        }
        if !(leg.low_pass > 0.0 && leg.low_pass <= 1.0) {
            bail!("leg.low_pass must be in (0, 1], got {}", leg.low_pass);
        }
        if leg.max_jump <= 0 {
            bail!("leg.max_jump must be positive");
        }
        if self.gait.step <= 0 || self.gait.tolerance <= 0 {
            bail!("gait.step and gait.tolerance must be positive");
        }
        for (name, period) in [
            ("leg.period_ms", leg.period_ms),
            ("gait.period_ms", self.gait.period_ms),
            ("remote.period_ms", self.remote.period_ms),
            ("supervisor.period_ms", self.supervisor.period_ms),
            ("simulation.period_ms", self.simulation.period_ms),
        ] {
            if period == 0 {
                bail!("{} must be non-zero", name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_tuning() {
        let config = RobotConfig::default();
        assert_eq!(config.leg.kp, 1.5);
        assert_eq!(config.leg.ki, 0.2);
        assert_eq!(config.leg.kd, 0.0);
        assert_eq!(config.leg.low_pass, 1.0);
        assert_eq!((config.leg.min_power, config.leg.max_power), (-50, 50));
        assert_eq!(config.leg.period(), Duration::from_millis(20));
        assert_eq!(config.gait.step, 180);
        assert_eq!(config.gait.tolerance, 10);
        assert_eq!(config.gait.period(), Duration::from_millis(100));
        assert_eq!(config.remote.period(), Duration::from_millis(100));
        assert_eq!(config.remote.beacon_floor, -100);
        assert_eq!(config.supervisor.period(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "leg": { "kp": 2.0 }, "gait": { "step": 90 } }"#;
        let config: RobotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.leg.kp, 2.0);
        assert_eq!(config.leg.ki, 0.2);
        assert_eq!(config.gait.step, 90);
        assert_eq!(config.gait.tolerance, 10);
        assert_eq!(config.ev3dev.left_leg_port, "outC");
        assert_eq!(config.gpio.green_led_pin, None);
    }

    #[test]
    fn test_rejects_inverted_power_bounds() {
        let mut config = RobotConfig::default();
        config.leg.min_power = 50;
        config.leg.max_power = -50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_period_and_bad_filter() {
        let mut config = RobotConfig::default();
        config.gait.period_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.leg.low_pass = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("sentin3l-config-that-does-not-exist.json");
        let config = RobotConfig::load(&path).unwrap();
        assert_eq!(config.gait.step, 180);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "sentin3l-invalid-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "leg": { "min_power": 10, "max_power": 5 } }"#).unwrap();
        let result = RobotConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
