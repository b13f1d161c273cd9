//! Hardware seams: motors, infrared sensor, status LEDs and the abort input.
//!
//! The core tasks only talk to these traits. Backends live in `sim`,
//! `ev3dev`, `peripherals` and (behind the `gamepad` feature) `gamepad`.

use anyhow::Result;
use std::sync::Arc;

/// Beacon distance at or below which nothing is in view.
pub const BEACON_NOT_DETECTED: i32 = -100;

/// A motor with a built-in tachometer.
///
/// Handles are shared (`Arc<dyn Actuator>`): a leg controller drives the
/// motor every sample while the supervisor keeps a second handle to cut power
/// on shutdown.
pub trait Actuator: Send + Sync {
    /// Drive power in percent, `-100..=100`.
    fn set_power(&self, power: i8) -> Result<()>;
    fn reset_position(&self) -> Result<()>;
    /// Tachometer count (degrees of output shaft rotation).
    fn position(&self) -> Result<i32>;
}

pub type SharedActuator = Arc<dyn Actuator>;

/// Decoder for the infrared remote.
pub trait RemoteDecoder: Send {
    /// Button code currently pressed on the remote, `0` for none.
    fn read_remote_command(&mut self) -> Result<u8>;
}

/// Heading and proximity of the infrared beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconReading {
    /// Proximity estimate; [`BEACON_NOT_DETECTED`] or lower means no beacon.
    pub distance: i32,
    pub bearing: i32,
}

impl BeaconReading {
    pub const NOT_DETECTED: BeaconReading = BeaconReading {
        distance: BEACON_NOT_DETECTED,
        bearing: 0,
    };

    pub fn is_detected(&self, floor: i32) -> bool {
        self.distance > floor
    }
}

pub trait BeaconRanger: Send {
    fn read_beacon(&mut self) -> Result<BeaconReading>;
}

/// The EV3 infrared sensor decodes the remote and ranges the beacon, but only
/// one mode is active at a time.
pub trait InfraredSensor: RemoteDecoder + BeaconRanger {}

impl<T: RemoteDecoder + BeaconRanger> InfraredSensor for T {}

/// Brick status light pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedPattern {
    Off = 0,
    /// Green: walking.
    Moving = 1,
    /// Red: beacon mode.
    Beacon = 2,
    /// Orange: standing still.
    Idle = 3,
}

impl LedPattern {
    pub fn id(self) -> u8 {
        self as u8
    }
}

pub trait StatusIndicator: Send + Sync {
    fn set_pattern(&self, pattern: LedPattern) -> Result<()>;
}

pub type SharedIndicator = Arc<dyn StatusIndicator>;

/// Operator abort input (escape button, signal, timer).
pub trait ShutdownTrigger: Send {
    fn is_triggered(&mut self) -> bool;
}

/// Recording doubles used by the unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Actuator that records every power write and plays back positions.
    #[derive(Default)]
    pub struct RecordingActuator {
        pub powers: Mutex<Vec<i8>>,
        pub positions: Mutex<VecDeque<Result<i32, String>>>,
        pub last_position: Mutex<i32>,
        pub resets: Mutex<u32>,
        pub fail_power: Mutex<bool>,
    }

    impl RecordingActuator {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_position(&self, position: i32) {
            self.positions.lock().unwrap().push_back(Ok(position));
        }

        pub fn push_failure(&self) {
            self.positions
                .lock()
                .unwrap()
                .push_back(Err("tacho read failed".into()));
        }

        pub fn powers(&self) -> Vec<i8> {
            self.powers.lock().unwrap().clone()
        }

        pub fn zero_writes(&self) -> usize {
            self.powers().iter().filter(|&&p| p == 0).count()
        }
    }

    impl Actuator for RecordingActuator {
        fn set_power(&self, power: i8) -> Result<()> {
            if *self.fail_power.lock().unwrap() {
                anyhow::bail!("motor write failed");
            }
            self.powers.lock().unwrap().push(power);
            Ok(())
        }

        fn reset_position(&self) -> Result<()> {
            *self.resets.lock().unwrap() += 1;
            *self.last_position.lock().unwrap() = 0;
            Ok(())
        }

        // Replays queued readings, then repeats the last one.
        fn position(&self) -> Result<i32> {
            match self.positions.lock().unwrap().pop_front() {
                Some(Ok(p)) => {
                    *self.last_position.lock().unwrap() = p;
                    Ok(p)
                }
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Ok(*self.last_position.lock().unwrap()),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingIndicator {
        pub patterns: Mutex<Vec<LedPattern>>,
    }

    impl RecordingIndicator {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn patterns(&self) -> Vec<LedPattern> {
            self.patterns.lock().unwrap().clone()
        }
    }

    impl StatusIndicator for RecordingIndicator {
        fn set_pattern(&self, pattern: LedPattern) -> Result<()> {
            self.patterns.lock().unwrap().push(pattern);
            Ok(())
        }
    }

    /// Infrared sensor whose next readings are set by the test.
    pub struct FakeInfrared {
        pub code: Arc<Mutex<u8>>,
        pub beacon: Arc<Mutex<Option<BeaconReading>>>,
        pub remote_reads: Arc<Mutex<u32>>,
    }

    impl FakeInfrared {
        pub fn new() -> Self {
            Self {
                code: Arc::new(Mutex::new(0)),
                beacon: Arc::new(Mutex::new(Some(BeaconReading::NOT_DETECTED))),
                remote_reads: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl RemoteDecoder for FakeInfrared {
        fn read_remote_command(&mut self) -> Result<u8> {
            *self.remote_reads.lock().unwrap() += 1;
            Ok(*self.code.lock().unwrap())
        }
    }

    impl BeaconRanger for FakeInfrared {
        fn read_beacon(&mut self) -> Result<BeaconReading> {
            (*self.beacon.lock().unwrap()).ok_or_else(|| anyhow::anyhow!("seek read failed"))
        }
    }

    /// Trigger that fires once the shared flag is set.
    pub struct FlagTrigger(pub Arc<Mutex<bool>>);

    impl ShutdownTrigger for FlagTrigger {
        fn is_triggered(&mut self) -> bool {
            *self.0.lock().unwrap()
        }
    }
}
