//! ev3dev backend: LEGO tacho motors, the EV3 infrared sensor and the brick
//! status LEDs through the kernel's sysfs classes.
//!
//! Works on an EV3 brick or a BrickPi3 running ev3dev. Devices are located by
//! matching the port name against each device's `address` attribute.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::hardware::{
    Actuator, BeaconRanger, BeaconReading, LedPattern, RemoteDecoder, StatusIndicator,
};

const SYSFS_CLASS: &str = "/sys/class";

/// Proximity the sensor reports when no beacon is on the selected channel.
const SEEK_NO_BEACON: i32 = -128;

const MODE_REMOTE: &str = "IR-REMOTE";
const MODE_SEEK: &str = "IR-SEEK";

/// Root of the sysfs class tree; tests point this at a scratch directory.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new(SYSFS_CLASS)
    }
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Device directory under `class` whose address ends with `port`.
    fn find(&self, class: &str, port: &str) -> Result<PathBuf> {
        let class_dir = self.root.join(class);
        let entries = fs::read_dir(&class_dir)
            .with_context(|| format!("Failed to list {}", class_dir.display()))?;

        for entry in entries {
            let dir = entry?.path();
            let Ok(address) = read_attr(&dir, "address") else {
                continue;
            };
            if address == port || address.ends_with(&format!(":{}", port)) {
                tracing::debug!(class, port, device = %dir.display(), "Found device");
                return Ok(dir);
            }
        }
        bail!("No {} device on port {}", class, port)
    }
}

fn read_attr(dir: &Path, attr: &str) -> Result<String> {
    let path = dir.join(attr);
    let value =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(value.trim().to_string())
}

fn read_int(dir: &Path, attr: &str) -> Result<i32> {
    let value = read_attr(dir, attr)?;
    value
        .parse()
        .with_context(|| format!("{}/{} is not an integer: '{}'", dir.display(), attr, value))
}

fn write_attr(dir: &Path, attr: &str, value: &str) -> Result<()> {
    let path = dir.join(attr);
    fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))
}

/// LEGO large/medium motor driven in `run-direct` mode.
pub struct TachoMotor {
    port: String,
    dir: PathBuf,
    running: AtomicBool,
}

impl TachoMotor {
    pub fn open(sysfs: &Sysfs, port: &str) -> Result<Self> {
        let dir = sysfs
            .find("tacho-motor", port)
            .with_context(|| format!("Failed to open motor on {}", port))?;
        if let Ok(driver) = read_attr(&dir, "driver_name") {
            tracing::info!(port, driver = %driver, "Tacho motor opened");
        }
        Ok(Self {
            port: port.to_string(),
            dir,
            running: AtomicBool::new(false),
        })
    }
}

impl Actuator for TachoMotor {
    fn set_power(&self, power: i8) -> Result<()> {
        let duty = power.clamp(-100, 100);
        write_attr(&self.dir, "duty_cycle_sp", &duty.to_string())?;
        if !self.running.swap(true, Ordering::AcqRel) {
            write_attr(&self.dir, "command", "run-direct")
                .with_context(|| format!("Failed to start motor on {}", self.port))?;
        }
        Ok(())
    }

    /// `reset` also stops the motor and restores its default attributes.
    fn reset_position(&self) -> Result<()> {
        write_attr(&self.dir, "command", "reset")?;
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn position(&self) -> Result<i32> {
        read_int(&self.dir, "position")
    }
}

impl Drop for TachoMotor {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            if let Err(e) = write_attr(&self.dir, "command", "stop") {
                tracing::warn!(port = %self.port, "Failed to stop motor: {:#}", e);
            }
        }
    }
}

/// EV3 infrared sensor. Remote decoding and beacon seeking are separate
/// sensor modes; the mode is only rewritten when it changes.
pub struct Ev3InfraredSensor {
    dir: PathBuf,
    mode: Option<&'static str>,
}

impl Ev3InfraredSensor {
    pub fn open(sysfs: &Sysfs, port: &str) -> Result<Self> {
        let dir = sysfs
            .find("lego-sensor", port)
            .with_context(|| format!("Failed to open infrared sensor on {}", port))?;
        let mode = read_attr(&dir, "mode").ok();
        tracing::info!(port, mode = ?mode, "Infrared sensor opened");
        Ok(Self {
            dir,
            mode: match mode.as_deref() {
                Some(MODE_REMOTE) => Some(MODE_REMOTE),
                Some(MODE_SEEK) => Some(MODE_SEEK),
                _ => None,
            },
        })
    }

    fn select(&mut self, mode: &'static str) -> Result<()> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        write_attr(&self.dir, "mode", mode)?;
        tracing::debug!(mode, "Infrared sensor mode switched");
        self.mode = Some(mode);
        Ok(())
    }
}

impl RemoteDecoder for Ev3InfraredSensor {
    /// Button code on channel 1.
    fn read_remote_command(&mut self) -> Result<u8> {
        self.select(MODE_REMOTE)?;
        let code = read_int(&self.dir, "value0")?;
        u8::try_from(code).with_context(|| format!("Remote code out of range: {}", code))
    }
}

impl BeaconRanger for Ev3InfraredSensor {
    fn read_beacon(&mut self) -> Result<BeaconReading> {
        self.select(MODE_SEEK)?;
        let bearing = read_int(&self.dir, "value0")?;
        let distance = read_int(&self.dir, "value1")?;
        if distance == SEEK_NO_BEACON {
            return Ok(BeaconReading {
                distance: SEEK_NO_BEACON,
                bearing: 0,
            });
        }
        Ok(BeaconReading { distance, bearing })
    }
}

/// The brick's left/right status lights, both driven alike.
pub struct BrickLeds {
    green: Vec<(PathBuf, u32)>,
    red: Vec<(PathBuf, u32)>,
}

impl BrickLeds {
    pub fn open(sysfs: &Sysfs) -> Result<Self> {
        let open = |colour: &str| -> Result<Vec<(PathBuf, u32)>> {
            ["led0", "led1"]
                .iter()
                .map(|side| {
                    let dir = sysfs
                        .root
                        .join("leds")
                        .join(format!("{}:{}:brick-status", side, colour));
                    let max = read_int(&dir, "max_brightness")?;
                    Ok((dir, max.max(0) as u32))
                })
                .collect()
        };
        let leds = Self {
            green: open("green")?,
            red: open("red")?,
        };
        tracing::info!("Brick status LEDs opened");
        Ok(leds)
    }

    fn drive(leds: &[(PathBuf, u32)], on: bool) -> Result<()> {
        for (dir, max) in leds {
            let level = if on { *max } else { 0 };
            write_attr(dir, "brightness", &level.to_string())?;
        }
        Ok(())
    }
}

impl StatusIndicator for BrickLeds {
    fn set_pattern(&self, pattern: LedPattern) -> Result<()> {
        let (green, red) = match pattern {
            LedPattern::Off => (false, false),
            LedPattern::Moving => (true, false),
            LedPattern::Beacon => (false, true),
            LedPattern::Idle => (true, true),
        };
        Self::drive(&self.green, green)?;
        Self::drive(&self.red, red)
    }
}
