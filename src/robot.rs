//! Robot assembly: wires configuration, shared state, hardware and tasks into
//! a ready-to-run scheduler.

use anyhow::Result;
use std::sync::Arc;

use crate::command::CommandInterpreter;
use crate::config::RobotConfig;
use crate::direction::Direction;
use crate::gait::{GaitGenerator, GaitLinks};
use crate::hardware::{InfraredSensor, SharedActuator, SharedIndicator, ShutdownTrigger};
use crate::leg::LegController;
use crate::lifecycle::{Lifecycle, Supervisor};
use crate::scheduler::{PeriodicTask, TaskScheduler};
use crate::shared::{channel, Reader};
use crate::sim::{SimClock, SimMotor, SimPlant, ScriptStep, ScriptedInfrared};

/// Everything the tasks need from the outside world.
pub struct Hardware {
    pub left_leg: SharedActuator,
    pub right_leg: SharedActuator,
    /// Open-loop; only ever driven to zero on shutdown.
    pub body: SharedActuator,
    pub infrared: Box<dyn InfraredSensor>,
    pub indicator: SharedIndicator,
    pub trigger: Box<dyn ShutdownTrigger>,
    /// Extra tasks that must run before the controllers on every pass.
    pub plant: Option<Box<dyn PeriodicTask>>,
}

impl Hardware {
    /// Simulated motors and a scripted remote.
    ///
    /// The caller still chooses the indicator and trigger; the returned
    /// clock drives the script and can back a [`crate::sim::SimDeadline`].
    pub fn simulated(
        config: &RobotConfig,
        script: Vec<ScriptStep>,
        indicator: SharedIndicator,
        trigger: impl FnOnce(&SimClock) -> Box<dyn ShutdownTrigger>,
    ) -> (Self, SimClock) {
        let clock = SimClock::default();
        let left = SimMotor::new("left_leg", &config.simulation);
        let right = SimMotor::new("right_leg", &config.simulation);
        let body = SimMotor::new("body", &config.simulation);

        let plant = SimPlant::new(
            vec![left.clone(), right.clone(), body.clone()],
            clock.clone(),
            &config.simulation,
        );

        let hardware = Self {
            left_leg: left,
            right_leg: right,
            body,
            infrared: Box::new(ScriptedInfrared::new(script, clock.clone())),
            indicator,
            trigger: trigger(&clock),
            plant: Some(Box::new(plant)),
        };
        (hardware, clock)
    }
}

/// Read-only views of the shared words, for status reporting.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub direction: Reader<Direction>,
    pub left_setpoint: Reader<i32>,
    pub right_setpoint: Reader<i32>,
    pub left_measured: Reader<i32>,
    pub right_measured: Reader<i32>,
}

/// Build the scheduler with every task registered.
///
/// Order within a pass: plant, left leg, right leg, remote, gait,
/// supervisor.
pub fn assemble(config: &RobotConfig, hardware: Hardware) -> Result<(TaskScheduler, Telemetry)> {
    config.validate()?;

    let Hardware {
        left_leg,
        right_leg,
        body,
        infrared,
        indicator,
        trigger,
        plant,
    } = hardware;

    let (direction_tx, direction_rx) = channel(Direction::Stop);
    let (left_setpoint_tx, left_setpoint_rx) = channel(0i32);
    let (right_setpoint_tx, right_setpoint_rx) = channel(0i32);
    let (left_measured_tx, left_measured_rx) = channel(0i32);
    let (right_measured_tx, right_measured_rx) = channel(0i32);

    let telemetry = Telemetry {
        direction: direction_rx.clone(),
        left_setpoint: left_setpoint_rx.clone(),
        right_setpoint: right_setpoint_rx.clone(),
        left_measured: left_measured_rx.clone(),
        right_measured: right_measured_rx.clone(),
    };

    let left = LegController::new(
        "left_leg",
        left_leg.clone(),
        &config.leg,
        left_setpoint_rx,
        left_measured_tx,
    )?;
    let right = LegController::new(
        "right_leg",
        right_leg.clone(),
        &config.leg,
        right_setpoint_rx,
        right_measured_tx,
    )?;

    let remote = CommandInterpreter::new(infrared, direction_tx, &config.remote);

    let gait = GaitGenerator::new(
        GaitLinks {
            direction: direction_rx,
            left_measured: left_measured_rx,
            right_measured: right_measured_rx,
            left_setpoint: left_setpoint_tx,
            right_setpoint: right_setpoint_tx,
        },
        Arc::clone(&indicator),
        &config.gait,
    );

    let lifecycle = Lifecycle::new();
    let mut scheduler = TaskScheduler::new(lifecycle.clone());

    let supervisor = Supervisor::new(
        trigger,
        vec![
            ("left_leg", left_leg),
            ("right_leg", right_leg),
            ("body", body),
        ],
        indicator,
        scheduler.stop_handle(),
        lifecycle,
        config.supervisor.period(),
    );

    if let Some(plant) = plant {
        scheduler.register(plant)?;
    }
    scheduler.register(Box::new(left))?;
    scheduler.register(Box::new(right))?;
    scheduler.register(Box::new(remote))?;
    scheduler.register(Box::new(gait))?;
    scheduler.register(Box::new(supervisor))?;

    tracing::info!("Robot assembled");
    Ok((scheduler, telemetry))
}
