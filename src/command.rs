//! Infrared remote command interpreter.
//!
//! Runs every 100 ms. In normal mode it decodes the remote button into a
//! [`Direction`] and publishes it only when it changes. Selecting the beacon
//! latches the sensor in seeking mode until the beacon drops out of view.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::direction::Direction;
use crate::hardware::InfraredSensor;
use crate::scheduler::PeriodicTask;
use crate::shared::Writer;

/// What the interpreter remembers between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDebounce {
    pub accepted: Direction,
    pub beacon_active: bool,
}

impl Default for CommandDebounce {
    fn default() -> Self {
        Self {
            accepted: Direction::Stop,
            beacon_active: false,
        }
    }
}

pub struct CommandInterpreter {
    sensor: Box<dyn InfraredSensor>,
    direction: Writer<Direction>,
    debounce: CommandDebounce,
    beacon_floor: i32,
    period: Duration,
}

impl CommandInterpreter {
    pub fn new(
        sensor: Box<dyn InfraredSensor>,
        direction: Writer<Direction>,
        config: &RemoteConfig,
    ) -> Self {
        let accepted = direction.current().unwrap_or_default();
        Self {
            sensor,
            direction,
            debounce: CommandDebounce {
                accepted,
                beacon_active: false,
            },
            beacon_floor: config.beacon_floor,
            period: config.period(),
        }
    }

    pub fn debounce(&self) -> CommandDebounce {
        self.debounce
    }

    /// One interpreter tick. Returns the new direction when it changed.
    pub fn poll(&mut self) -> Result<Option<Direction>> {
        if self.debounce.beacon_active {
            let reading = self
                .sensor
                .read_beacon()
                .context("Beacon read failed, keeping seek mode")?;
            if reading.is_detected(self.beacon_floor) {
                tracing::trace!(
                    distance = reading.distance,
                    bearing = reading.bearing,
                    "Beacon in view"
                );
                return Ok(None);
            }
            tracing::info!("Beacon lost, back to remote control");
            self.debounce.beacon_active = false;
            return Ok(None);
        }

        let code = self
            .sensor
            .read_remote_command()
            .context("Remote read failed")?;
        let decoded = Direction::from_remote_code(code);

        if decoded == Direction::BeaconOn {
            self.debounce.beacon_active = true;
        }

        if decoded == self.debounce.accepted {
            return Ok(None);
        }

        self.direction.store(decoded);
        self.debounce.accepted = decoded;
        tracing::info!(code, direction = %decoded, "{}", decoded);
        Ok(Some(decoded))
    }
}

impl PeriodicTask for CommandInterpreter {
    fn name(&self) -> &str {
        "remote"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run(&mut self) -> Result<()> {
        self.poll().map(|_| ())
    }
}
