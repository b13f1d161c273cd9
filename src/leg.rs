//! Closed-loop leg position controller.
//!
//! One instance per leg, run every 20 ms. It tracks the setpoint published by
//! the gait generator and publishes the accepted tacho reading back.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::config::LegConfig;
use crate::hardware::SharedActuator;
use crate::pid::{PidController, PidGains};
use crate::scheduler::PeriodicTask;
use crate::shared::{Reader, Writer};

pub struct LegController {
    name: &'static str,
    motor: SharedActuator,
    pid: PidController,
    setpoint: Reader<i32>,
    measured: Writer<i32>,
    period: Duration,
    max_jump: i32,
    last_position: i32,
    /// A reading that jumped too far, held until the next sample confirms it.
    pending_jump: Option<i32>,
}

impl LegController {
    /// Bind a controller to `motor` and zero the motor's tachometer.
    pub fn new(
        name: &'static str,
        motor: SharedActuator,
        config: &LegConfig,
        setpoint: Reader<i32>,
        measured: Writer<i32>,
    ) -> Result<Self> {
        let gains = PidGains {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            low_pass: config.low_pass,
            min_output: config.min_power as f64,
            max_output: config.max_power as f64,
        };
        let period = config.period();

        tracing::info!(
            leg = name,
            "Leg init: Kp={} Ki={} Kd={} LPC={} power=[{}, {}]",
            gains.kp,
            gains.ki,
            gains.kd,
            gains.low_pass,
            config.min_power,
            config.max_power
        );

        motor
            .reset_position()
            .with_context(|| format!("Failed to reset {} tacho", name))?;

        let mut measured = measured;
        measured.store(0);

        Ok(Self {
            name,
            motor,
            pid: PidController::new(gains, period.as_secs_f64()),
            setpoint,
            measured,
            period,
            max_jump: config.max_jump,
            last_position: 0,
            pending_jump: None,
        })
    }

    pub fn position(&self) -> i32 {
        self.last_position
    }

    pub fn setpoint(&self) -> i32 {
        self.setpoint.value()
    }

    /// Filter one raw reading. `None` means the sample is discarded.
    ///
    /// Distances are unsigned so a corrupt word near `i32::MIN` cannot
    /// overflow or wrap into range.
    fn accept(&mut self, raw: i32) -> Option<i32> {
        let max_jump = self.max_jump.unsigned_abs();
        if raw.abs_diff(self.last_position) <= max_jump {
            self.pending_jump = None;
            return Some(raw);
        }
        match self.pending_jump.take() {
            // Second far reading in a row close to the first: believe it.
            Some(previous) if raw.abs_diff(previous) <= max_jump => Some(raw),
            _ => {
                tracing::warn!(
                    leg = self.name,
                    "Discarding tacho outlier {} (last {})",
                    raw,
                    self.last_position
                );
                self.pending_jump = Some(raw);
                None
            }
        }
    }
}

impl PeriodicTask for LegController {
    fn name(&self) -> &str {
        self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run(&mut self) -> Result<()> {
        let raw = match self.motor.position() {
            Ok(p) => p,
            Err(e) => {
                // Keep the last power applied; the next sample corrects.
                tracing::debug!(leg = self.name, "Tacho read failed: {:#}", e);
                return Ok(());
            }
        };

        let Some(position) = self.accept(raw) else {
            return Ok(());
        };
        self.last_position = position;
        self.measured.store(position);

        let target = self.setpoint.value();
        let output = self.pid.update(target as f64, position as f64);
        let power = output.round() as i8;

        tracing::trace!(leg = self.name, target, position, power);
        self.motor
            .set_power(power)
            .with_context(|| format!("Failed to drive {}", self.name))
    }
}
