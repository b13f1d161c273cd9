//! Cooperative periodic task scheduler.
//!
//! All tasks run on the caller's thread, one at a time, each at its own
//! period. A task that returns an error is logged and retried on its next
//! period; it never takes the scheduler down.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::lifecycle::{Lifecycle, LifecycleState};

/// A callback invoked at a fixed period.
pub trait PeriodicTask {
    fn name(&self) -> &str;
    fn period(&self) -> Duration;
    /// One invocation. Must not block.
    fn run(&mut self) -> Result<()>;
}

/// Requests the scheduler loop to stop. Cloneable; any holder may stop it.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub runs: u64,
    pub failures: u64,
    /// Periods skipped because the scheduler fell behind.
    pub missed: u64,
}

struct Slot {
    task: Box<dyn PeriodicTask>,
    period: Duration,
    next_due: Duration,
    stats: TaskStats,
}

pub struct TaskScheduler {
    slots: Vec<Slot>,
    stop: StopHandle,
    lifecycle: Lifecycle,
}

impl TaskScheduler {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            slots: Vec::new(),
            stop: StopHandle::default(),
            lifecycle,
        }
    }

    /// Register a task; it first runs at time zero. Tasks due at the same
    /// instant run in registration order. A zero period is rejected.
    pub fn register(&mut self, task: Box<dyn PeriodicTask>) -> Result<()> {
        let period = task.period();
        if period.is_zero() {
            bail!("Task {} has a zero period", task.name());
        }
        tracing::info!(
            "Registered task {} every {} ms",
            task.name(),
            period.as_millis()
        );
        self.slots.push(Slot {
            task,
            period,
            next_due: Duration::ZERO,
            stats: TaskStats::default(),
        });
        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn stats(&self, name: &str) -> Option<TaskStats> {
        self.slots
            .iter()
            .find(|s| s.task.name() == name)
            .map(|s| s.stats)
    }

    /// Earliest time any task is due.
    pub fn next_due(&self) -> Option<Duration> {
        self.slots.iter().map(|s| s.next_due).min()
    }

    /// Run every task due at `now` (time since start). Returns how many ran.
    ///
    /// Checks the stop flag before every invocation, so a task that stops
    /// the scheduler also suppresses the rest of the pass.
    pub fn poll(&mut self, now: Duration) -> usize {
        let mut ran = 0;
        for slot in &mut self.slots {
            if self.stop.is_stop_requested() {
                break;
            }
            if now < slot.next_due {
                continue;
            }

            slot.stats.runs += 1;
            ran += 1;
            if let Err(e) = slot.task.run() {
                slot.stats.failures += 1;
                tracing::warn!(task = slot.task.name(), "Task tick failed: {:#}", e);
            }

            slot.next_due += slot.period;
            if slot.next_due <= now {
                let behind = (now - slot.next_due).as_nanos() / slot.period.as_nanos() + 1;
                slot.stats.missed += behind as u64;
                slot.next_due += slot.period * behind as u32;
                tracing::warn!(
                    task = slot.task.name(),
                    "Fell behind, skipped {} period(s)",
                    behind
                );
            }
        }
        ran
    }

    /// Drive the scheduler in virtual time up to and including `end`, or until
    /// stopped. Used by the simulation tests.
    pub fn run_until(&mut self, end: Duration) -> Result<()> {
        self.begin()?;
        while !self.stop.is_stop_requested() {
            match self.next_due() {
                Some(due) if due <= end => {
                    self.poll(due);
                }
                _ => break,
            }
        }
        self.end();
        Ok(())
    }

    /// Real-time loop: runs until a task (normally the supervisor) requests
    /// a stop.
    pub fn run(&mut self) -> Result<()> {
        self.begin()?;
        let start = Instant::now();

        while !self.stop.is_stop_requested() {
            let pass_start = start.elapsed();
            self.poll(pass_start);

            let Some(due) = self.next_due() else { break };
            let now = start.elapsed();
            if now < due {
                // High-precision sleep (avoids OS scheduler jitter)
                spin_sleep::sleep(due - now);
            } else if now > due {
                tracing::debug!(
                    "Scheduler pass ran {:.1}ms past the next deadline",
                    (now - due).as_secs_f64() * 1000.0
                );
            }
        }

        self.end();
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.slots.is_empty() {
            bail!("No periodic tasks registered");
        }
        match self.lifecycle.state() {
            LifecycleState::Idle => {
                self.lifecycle.start();
                tracing::info!("Scheduler started with {} tasks", self.slots.len());
            }
            LifecycleState::Running => {}
            state => bail!("Scheduler cannot start from {:?}", state),
        }
        Ok(())
    }

    fn end(&mut self) {
        if !self.stop.is_stop_requested() {
            return;
        }
        if self.lifecycle.state() == LifecycleState::Running {
            tracing::warn!("Scheduler stopped without a shutdown sequence");
            self.lifecycle.begin_shutdown();
        }
        if self.lifecycle.finish() {
            tracing::info!("Scheduler stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Appends its name to a shared log on every run.
    struct Recorder {
        name: &'static str,
        period: Duration,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
        stop_on_run: Option<StopHandle>,
    }

    impl Recorder {
        fn boxed(
            name: &'static str,
            period_ms: u64,
            log: &Arc<Mutex<Vec<&'static str>>>,
        ) -> Box<Self> {
            Box::new(Self {
                name,
                period: Duration::from_millis(period_ms),
                log: log.clone(),
                fail: false,
                stop_on_run: None,
            })
        }
    }

    impl PeriodicTask for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn period(&self) -> Duration {
            self.period
        }

        fn run(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if let Some(stop) = &self.stop_on_run {
                stop.request_stop();
            }
            if self.fail {
                bail!("task failure");
            }
            Ok(())
        }
    }

    fn count(log: &Arc<Mutex<Vec<&'static str>>>, name: &str) -> usize {
        log.lock().unwrap().iter().filter(|&&n| n == name).count()
    }

    #[test]
    fn test_periods_honoured_in_virtual_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        scheduler.register(Recorder::boxed("leg", 20, &log)).unwrap();
        scheduler.register(Recorder::boxed("gait", 100, &log)).unwrap();
        scheduler.register(Recorder::boxed("supervisor", 500, &log)).unwrap();

        scheduler.run_until(Duration::from_millis(999)).unwrap();

        assert_eq!(count(&log, "leg"), 50);
        assert_eq!(count(&log, "gait"), 10);
        assert_eq!(count(&log, "supervisor"), 2);
        assert_eq!(scheduler.lifecycle().state(), LifecycleState::Running);
    }

    #[test]
    fn test_same_instant_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        scheduler.register(Recorder::boxed("a", 100, &log)).unwrap();
        scheduler.register(Recorder::boxed("b", 100, &log)).unwrap();
        scheduler.run_until(Duration::ZERO).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_stop_suppresses_rest_of_pass() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        let mut stopper = Recorder::boxed("stopper", 100, &log);
        stopper.stop_on_run = Some(scheduler.stop_handle());
        scheduler.register(stopper).unwrap();
        scheduler.register(Recorder::boxed("after", 100, &log)).unwrap();

        scheduler.run_until(Duration::from_secs(1)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["stopper"]);
        assert_eq!(scheduler.lifecycle().state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_failing_task_does_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        let mut broken = Recorder::boxed("broken", 100, &log);
        broken.fail = true;
        scheduler.register(broken).unwrap();
        scheduler.register(Recorder::boxed("healthy", 100, &log)).unwrap();

        scheduler.run_until(Duration::from_millis(299)).unwrap();

        assert_eq!(count(&log, "healthy"), 3);
        let stats = scheduler.stats("broken").unwrap();
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failures, 3);
    }

    #[test]
    fn test_late_poll_skips_missed_periods() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        scheduler.register(Recorder::boxed("leg", 20, &log)).unwrap();
        scheduler.poll(Duration::ZERO);
        scheduler.poll(Duration::from_millis(105));
        assert_eq!(count(&log, "leg"), 2);
        assert_eq!(scheduler.stats("leg").unwrap().missed, 4);
        assert_eq!(scheduler.next_due(), Some(Duration::from_millis(120)));
    }

    #[test]
    fn test_empty_scheduler_refuses_to_run() {
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        assert!(scheduler.run_until(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = TaskScheduler::new(Lifecycle::new());
        assert!(scheduler.register(Recorder::boxed("spin", 0, &log)).is_err());
        assert!(scheduler.stats("spin").is_none());
        assert!(scheduler.run_until(Duration::from_millis(100)).is_err());
        assert!(log.lock().unwrap().is_empty());
    }
}
