//! SENTIN3L runtime: remote-controlled stepping for a two-legged LEGO walker.
//!
//! Runs the leg controllers, remote interpreter, gait generator and shutdown
//! supervisor on one cooperative scheduler, against either real ev3dev
//! hardware or a simulated plant.
//!
//! Usage:
//!   sentin3l-runtime --backend ev3dev [OPTIONS]
//!   sentin3l-runtime --backend sim --script 5:3000,2:1000 --run-for 6

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sentin3l::config::RobotConfig;
use sentin3l::ev3dev::{BrickLeds, Ev3InfraredSensor, Sysfs, TachoMotor};
use sentin3l::hardware::{SharedIndicator, ShutdownTrigger};
use sentin3l::peripherals::{AnyTrigger, LogIndicator, OperatorConsole};
use sentin3l::robot::{assemble, Hardware};
use sentin3l::sim::{parse_script, SimDeadline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Simulated motors and a scripted remote.
    Sim,
    /// LEGO motors and sensors through ev3dev sysfs.
    Ev3dev,
}

/// SENTIN3L: closed-loop walking controller.
#[derive(Parser, Debug)]
#[command(name = "sentin3l-runtime")]
#[command(about = "Locomotion runtime for the SENTIN3L two-legged walker")]
struct Args {
    /// Path to the robot configuration JSON file.
    #[arg(long, default_value = "~/sentin3l_config.json")]
    config_path: PathBuf,

    /// Hardware backend.
    #[arg(long, value_enum, default_value_t = Backend::Ev3dev)]
    backend: Backend,

    /// Simulated remote presses as `code:millis,...`.
    #[arg(long, default_value = "5:4000,2:2000,9:1500,0:1000")]
    script: String,

    /// Stop the simulation after this many seconds (default: script length
    /// plus two seconds).
    #[arg(long)]
    run_for: Option<f64>,

    /// Start immediately instead of waiting for Enter.
    #[arg(long, default_value_t = false)]
    no_start_gate: bool,

    /// Human-readable logs instead of JSON.
    #[arg(long, default_value_t = false)]
    pretty_logs: bool,

    /// Drive with a gamepad instead of the infrared remote.
    #[cfg(feature = "gamepad")]
    #[arg(long, default_value_t = false)]
    gamepad: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.pretty_logs);

    let config_path = expand_home(&args.config_path);

    tracing::info!("SENTIN3L runtime starting");
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Backend: {:?}", args.backend);

    let config = RobotConfig::load(&config_path).context("Failed to load robot config")?;

    let console = OperatorConsole::spawn();
    if !args.no_start_gate && !console.wait_for_start()? {
        tracing::info!("Operator quit before start");
        return Ok(());
    }

    let mut triggers: Vec<Box<dyn ShutdownTrigger>> = vec![Box::new(console.abort_trigger())];
    add_gpio_abort(&config, &mut triggers)?;

    #[cfg_attr(not(feature = "gamepad"), allow(unused_mut))]
    let mut hardware = match args.backend {
        Backend::Sim => {
            let script = parse_script(&args.script).context("Invalid --script")?;
            let script_length: Duration = script.iter().map(|s| s.hold).sum();
            let run_for = match args.run_for {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid --run-for {}", secs))?,
                None => script_length + Duration::from_secs(2),
            };
            tracing::info!(
                "Simulating {:.1}s of remote input for {:.1}s",
                script_length.as_secs_f64(),
                run_for.as_secs_f64()
            );

            let indicator = status_indicator(&config, None)?;
            let (hardware, _clock) = Hardware::simulated(&config, script, indicator, |clock| {
                triggers.push(Box::new(SimDeadline::new(clock.clone(), run_for)));
                Box::new(AnyTrigger(triggers))
            });
            hardware
        }
        Backend::Ev3dev => {
            let sysfs = Sysfs::default();
            let ports = &config.ev3dev;
            let left_leg = Arc::new(TachoMotor::open(&sysfs, &ports.left_leg_port)?);
            let right_leg = Arc::new(TachoMotor::open(&sysfs, &ports.right_leg_port)?);
            let body = Arc::new(TachoMotor::open(&sysfs, &ports.body_port)?);
            let infrared = Ev3InfraredSensor::open(&sysfs, &ports.infrared_port)?;

            Hardware {
                left_leg,
                right_leg,
                body,
                infrared: Box::new(infrared),
                indicator: status_indicator(&config, Some(&sysfs))?,
                trigger: Box::new(AnyTrigger(triggers)),
                plant: None,
            }
        }
    };

    #[cfg(feature = "gamepad")]
    if args.gamepad {
        let (remote, abort) = sentin3l::gamepad::GamepadRemote::spawn(50);
        hardware.infrared = Box::new(remote);
        let previous = std::mem::replace(&mut hardware.trigger, Box::new(AnyTrigger(Vec::new())));
        hardware.trigger = Box::new(AnyTrigger(vec![previous, Box::new(abort)]));
        tracing::info!("Gamepad replaces the infrared remote");
    }

    let (mut scheduler, telemetry) =
        assemble(&config, hardware).context("Failed to assemble robot")?;

    scheduler.run()?;

    for task in ["left_leg", "right_leg", "remote", "gait", "supervisor"] {
        if let Some(stats) = scheduler.stats(task) {
            tracing::info!(
                task,
                runs = stats.runs,
                failures = stats.failures,
                missed = stats.missed,
                "Task summary"
            );
        }
    }
    tracing::info!(
        direction = ?telemetry.direction.load(),
        left_setpoint = telemetry.left_setpoint.value(),
        right_setpoint = telemetry.right_setpoint.value(),
        left_position = telemetry.left_measured.value(),
        right_position = telemetry.right_measured.value(),
        "Final leg state"
    );
    tracing::info!("SENTIN3L runtime exiting");
    Ok(())
}

fn init_logging(pretty: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if pretty {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}

/// Brick LEDs on ev3dev, else GPIO LEDs when pins are configured, else logs.
fn status_indicator(config: &RobotConfig, sysfs: Option<&Sysfs>) -> Result<SharedIndicator> {
    if let Some(sysfs) = sysfs {
        if config.ev3dev.use_brick_leds {
            return Ok(Arc::new(BrickLeds::open(sysfs)?));
        }
    }

    #[cfg(target_os = "linux")]
    if let (Some(green), Some(red)) = (config.gpio.green_led_pin, config.gpio.red_led_pin) {
        let leds = sentin3l::peripherals::GpioLeds::new(green, red)
            .context("Failed to initialize status LEDs")?;
        return Ok(Arc::new(leds));
    }

    Ok(Arc::new(LogIndicator))
}

#[cfg(target_os = "linux")]
fn add_gpio_abort(config: &RobotConfig, triggers: &mut Vec<Box<dyn ShutdownTrigger>>) -> Result<()> {
    if let Some(pin) = config.gpio.abort_button_pin {
        let button = sentin3l::peripherals::GpioAbortButton::new(pin)
            .context("Failed to initialize abort button")?;
        triggers.push(Box::new(button));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn add_gpio_abort(config: &RobotConfig, _triggers: &mut Vec<Box<dyn ShutdownTrigger>>) -> Result<()> {
    if config.gpio.abort_button_pin.is_some() {
        tracing::warn!("GPIO abort button is only supported on Linux");
    }
    Ok(())
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(rest) = s.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
    }
    path.to_path_buf()
}
