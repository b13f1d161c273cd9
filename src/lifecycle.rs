//! Robot lifecycle and the shutdown supervisor.

use anyhow::Result;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::hardware::{LedPattern, SharedActuator, SharedIndicator, ShutdownTrigger};
use crate::scheduler::{PeriodicTask, StopHandle};

/// `Idle → Running → ShuttingDown → Stopped`. Nothing leaves `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Shared lifecycle word. Transitions are compare-and-swap, so each one
/// happens at most once no matter who attempts it.
#[derive(Debug, Clone)]
pub struct Lifecycle(Arc<AtomicU8>);

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LifecycleState::Idle as u8)))
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn start(&self) -> bool {
        self.transition(LifecycleState::Idle, LifecycleState::Running)
    }

    pub fn begin_shutdown(&self) -> bool {
        self.transition(LifecycleState::Running, LifecycleState::ShuttingDown)
    }

    pub fn finish(&self) -> bool {
        self.transition(LifecycleState::ShuttingDown, LifecycleState::Stopped)
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let ok = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if ok {
            tracing::info!("Lifecycle: {:?} -> {:?}", from, to);
        }
        ok
    }
}

/// Polls the abort input and, once, halts everything.
pub struct Supervisor {
    trigger: Box<dyn ShutdownTrigger>,
    actuators: Vec<(&'static str, SharedActuator)>,
    indicator: SharedIndicator,
    stop: StopHandle,
    lifecycle: Lifecycle,
    period: Duration,
}

impl Supervisor {
    pub fn new(
        trigger: Box<dyn ShutdownTrigger>,
        actuators: Vec<(&'static str, SharedActuator)>,
        indicator: SharedIndicator,
        stop: StopHandle,
        lifecycle: Lifecycle,
        period: Duration,
    ) -> Self {
        Self {
            trigger,
            actuators,
            indicator,
            stop,
            lifecycle,
            period,
        }
    }

    /// Stop the scheduler, cut all motors and turn the lights off.
    fn shut_down(&mut self) {
        tracing::info!("Shutdown requested, halting all motors");
        self.stop.request_stop();

        for (name, actuator) in &self.actuators {
            if let Err(e) = actuator.set_power(0) {
                tracing::error!(motor = *name, "Failed to stop motor: {:#}", e);
            }
        }

        if let Err(e) = self.indicator.set_pattern(LedPattern::Off) {
            tracing::warn!("Failed to switch status LEDs off: {:#}", e);
        }
    }
}

impl PeriodicTask for Supervisor {
    fn name(&self) -> &str {
        "supervisor"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run(&mut self) -> Result<()> {
        if !self.trigger.is_triggered() {
            return Ok(());
        }
        if self.lifecycle.begin_shutdown() {
            self.shut_down();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::testing::{FlagTrigger, RecordingActuator, RecordingIndicator};
    use std::sync::Mutex;

    struct Rig {
        flag: Arc<Mutex<bool>>,
        motors: Vec<Arc<RecordingActuator>>,
        indicator: Arc<RecordingIndicator>,
        stop: StopHandle,
        lifecycle: Lifecycle,
        supervisor: Supervisor,
    }

    fn rig() -> Rig {
        let flag = Arc::new(Mutex::new(false));
        let motors: Vec<_> = (0..3).map(|_| RecordingActuator::new()).collect();
        let indicator = RecordingIndicator::new();
        let stop = StopHandle::default();
        let lifecycle = Lifecycle::new();
        lifecycle.start();
        let names = ["left_leg", "right_leg", "body"];
        let actuators = names
            .iter()
            .zip(&motors)
            .map(|(n, m)| (*n, m.clone() as SharedActuator))
            .collect();
        let supervisor = Supervisor::new(
            Box::new(FlagTrigger(flag.clone())),
            actuators,
            indicator.clone(),
            stop.clone(),
            lifecycle.clone(),
            Duration::from_millis(500),
        );
        Rig {
            flag,
            motors,
            indicator,
            stop,
            lifecycle,
            supervisor,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert!(!lifecycle.begin_shutdown());
        assert!(lifecycle.start());
        assert!(!lifecycle.start());
        assert!(lifecycle.begin_shutdown());
        assert!(lifecycle.finish());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!lifecycle.start());
        assert!(!lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_idle_until_triggered() {
        let mut rig = rig();
        for _ in 0..5 {
            rig.supervisor.run().unwrap();
        }
        assert!(!rig.stop.is_stop_requested());
        assert_eq!(rig.lifecycle.state(), LifecycleState::Running);
        assert!(rig.motors.iter().all(|m| m.powers().is_empty()));
    }

    #[test]
    fn test_trigger_zeroes_every_motor_once() {
        let mut rig = rig();
        *rig.flag.lock().unwrap() = true;

        rig.supervisor.run().unwrap();
        rig.supervisor.run().unwrap();
        rig.supervisor.run().unwrap();

        assert!(rig.stop.is_stop_requested());
        assert_eq!(rig.lifecycle.state(), LifecycleState::ShuttingDown);
        for motor in &rig.motors {
            assert_eq!(motor.powers(), vec![0]);
        }
        assert_eq!(rig.indicator.patterns(), vec![LedPattern::Off]);
    }

    #[test]
    fn test_failed_motor_does_not_block_the_others() {
        let mut rig = rig();
        *rig.motors[0].fail_power.lock().unwrap() = true;
        *rig.flag.lock().unwrap() = true;

        rig.supervisor.run().unwrap();

        assert!(rig.motors[0].powers().is_empty());
        assert_eq!(rig.motors[1].powers(), vec![0]);
        assert_eq!(rig.motors[2].powers(), vec![0]);
    }
}
