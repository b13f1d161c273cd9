//! Simulation backend: tacho motors with a first-order plant, a scripted
//! infrared remote and beacon, and a virtual clock.
//!
//! Lets the full runtime run on a development machine and gives the tests a
//! closed loop to exercise.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SimulationConfig;
use crate::hardware::{
    Actuator, BeaconRanger, BeaconReading, RemoteDecoder, ShutdownTrigger,
};
use crate::scheduler::PeriodicTask;

/// Simulated time, advanced by [`SimPlant`].
#[derive(Debug, Clone, Default)]
pub struct SimClock(Arc<AtomicU64>);

impl SimClock {
    pub fn now(&self) -> Duration {
        Duration::from_micros(self.0.load(Ordering::Acquire))
    }

    pub fn advance(&self, dt: Duration) {
        self.0.fetch_add(dt.as_micros() as u64, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
struct MotorState {
    power: i8,
    /// Degrees per second.
    speed: f64,
    /// Absolute shaft angle, degrees.
    angle: f64,
    /// Angle at the last tacho reset.
    zero: f64,
}

/// A motor whose speed lags the commanded power.
#[derive(Debug)]
pub struct SimMotor {
    name: &'static str,
    max_speed: f64,
    time_constant: f64,
    state: Mutex<MotorState>,
}

impl SimMotor {
    pub fn new(name: &'static str, config: &SimulationConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            max_speed: config.max_speed,
            time_constant: config.time_constant,
            state: Mutex::new(MotorState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn power(&self) -> i8 {
        self.state().power
    }

    /// Integrate the plant over `dt`.
    pub fn step(&self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let mut s = self.state();
        let target_speed = s.power as f64 / 100.0 * self.max_speed;
        let alpha = if self.time_constant > 0.0 {
            (dt / self.time_constant).min(1.0)
        } else {
            1.0
        };
        s.speed += (target_speed - s.speed) * alpha;
        s.angle += s.speed * dt;
    }
}

impl Actuator for SimMotor {
    fn set_power(&self, power: i8) -> Result<()> {
        self.state().power = power.clamp(-100, 100);
        Ok(())
    }

    fn reset_position(&self) -> Result<()> {
        let mut s = self.state();
        s.zero = s.angle;
        tracing::debug!(motor = self.name, "Tacho reset");
        Ok(())
    }

    fn position(&self) -> Result<i32> {
        let s = self.state();
        Ok((s.angle - s.zero).round() as i32)
    }
}

/// Advances the motors and the clock once per period.
pub struct SimPlant {
    motors: Vec<Arc<SimMotor>>,
    clock: SimClock,
    period: Duration,
}

impl SimPlant {
    pub fn new(motors: Vec<Arc<SimMotor>>, clock: SimClock, config: &SimulationConfig) -> Self {
        Self {
            motors,
            clock,
            period: config.period(),
        }
    }
}

impl PeriodicTask for SimPlant {
    fn name(&self) -> &str {
        "sim_plant"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run(&mut self) -> Result<()> {
        for motor in &self.motors {
            motor.step(self.period);
        }
        self.clock.advance(self.period);
        Ok(())
    }
}

/// One remote button held for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep {
    pub code: u8,
    pub hold: Duration,
}

/// Parse `code:millis,code:millis,...`.
pub fn parse_script(script: &str) -> Result<Vec<ScriptStep>> {
    script
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let Some((code, millis)) = entry.split_once(':') else {
                bail!("Script entry '{}' is not code:millis", entry);
            };
            let code: u8 = code
                .trim()
                .parse()
                .with_context(|| format!("Bad button code in '{}'", entry))?;
            let millis: u64 = millis
                .trim()
                .parse()
                .with_context(|| format!("Bad duration in '{}'", entry))?;
            Ok(ScriptStep {
                code,
                hold: Duration::from_millis(millis),
            })
        })
        .collect()
}

/// Infrared sensor that plays back a button script against the sim clock.
///
/// While a beacon step (code 9) is being held the beacon is in view.
pub struct ScriptedInfrared {
    script: Vec<ScriptStep>,
    clock: SimClock,
}

impl ScriptedInfrared {
    pub fn new(script: Vec<ScriptStep>, clock: SimClock) -> Self {
        Self { script, clock }
    }

    /// Total length of the script.
    pub fn duration(&self) -> Duration {
        self.script.iter().map(|s| s.hold).sum()
    }

    fn current(&self) -> Option<ScriptStep> {
        let now = self.clock.now();
        let mut end = Duration::ZERO;
        for step in &self.script {
            end += step.hold;
            if now < end {
                return Some(*step);
            }
        }
        None
    }
}

impl RemoteDecoder for ScriptedInfrared {
    fn read_remote_command(&mut self) -> Result<u8> {
        Ok(self.current().map(|s| s.code).unwrap_or(0))
    }
}

impl BeaconRanger for ScriptedInfrared {
    fn read_beacon(&mut self) -> Result<BeaconReading> {
        Ok(match self.current() {
            Some(step) if step.code == 9 => BeaconReading {
                distance: 30,
                bearing: 0,
            },
            _ => BeaconReading::NOT_DETECTED,
        })
    }
}

/// Fires once the sim clock passes `limit`.
pub struct SimDeadline {
    clock: SimClock,
    limit: Duration,
}

impl SimDeadline {
    pub fn new(clock: SimClock, limit: Duration) -> Self {
        Self { clock, limit }
    }
}

impl ShutdownTrigger for SimDeadline {
    fn is_triggered(&mut self) -> bool {
        self.clock.now() >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let steps = parse_script("5:3000, 1:500,0:100").unwrap();
        assert_eq!(
            steps,
            vec![
                ScriptStep {
                    code: 5,
                    hold: Duration::from_millis(3000)
                },
                ScriptStep {
                    code: 1,
                    hold: Duration::from_millis(500)
                },
                ScriptStep {
                    code: 0,
                    hold: Duration::from_millis(100)
                },
            ]
        );
        assert!(parse_script("").unwrap().is_empty());
        assert!(parse_script("5").is_err());
        assert!(parse_script("x:10").is_err());
        assert!(parse_script("5:-1").is_err());
    }

    #[test]
    fn test_motor_moves_with_power_and_resets() {
        let motor = SimMotor::new("leg", &SimulationConfig::default());
        motor.set_power(50).unwrap();
        for _ in 0..100 {
            motor.step(Duration::from_millis(20));
        }
        // Two seconds at half speed, minus the spin-up lag.
        let position = motor.position().unwrap();
        assert!(position > 800 && position < 900, "position {}", position);

        motor.reset_position().unwrap();
        assert_eq!(motor.position().unwrap(), 0);
    }

    #[test]
    fn test_motor_power_clamped() {
        let motor = SimMotor::new("body", &SimulationConfig::default());
        motor.set_power(-128).unwrap();
        assert_eq!(motor.power(), -100);
    }

    #[test]
    fn test_script_follows_clock() {
        let clock = SimClock::default();
        let mut ir = ScriptedInfrared::new(parse_script("5:200,9:200").unwrap(), clock.clone());
        assert_eq!(ir.duration(), Duration::from_millis(400));
        assert_eq!(ir.read_remote_command().unwrap(), 5);
        assert!(!ir.read_beacon().unwrap().is_detected(-100));

        clock.advance(Duration::from_millis(200));
        assert_eq!(ir.read_remote_command().unwrap(), 9);
        assert!(ir.read_beacon().unwrap().is_detected(-100));

        clock.advance(Duration::from_millis(200));
        assert_eq!(ir.read_remote_command().unwrap(), 0);
        assert!(!ir.read_beacon().unwrap().is_detected(-100));
    }

    #[test]
    fn test_deadline() {
        let clock = SimClock::default();
        let mut deadline = SimDeadline::new(clock.clone(), Duration::from_millis(100));
        assert!(!deadline.is_triggered());
        clock.advance(Duration::from_millis(100));
        assert!(deadline.is_triggered());
    }
}
