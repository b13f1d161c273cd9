//! Gait stepping: turns the commanded direction into leg setpoints.
//!
//! The stepping rule is a pure function ([`next_setpoints`]) guarded by the
//! step-complete gate ([`step_allowed`]); [`GaitGenerator`] is the periodic
//! task that feeds it from shared state and writes the result back.

use anyhow::Result;
use std::time::Duration;

use crate::config::GaitConfig;
use crate::direction::Direction;
use crate::hardware::{LedPattern, SharedIndicator};
use crate::scheduler::PeriodicTask;
use crate::shared::{Reader, Writer};

/// A value per leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegPair {
    pub left: i32,
    pub right: i32,
}

impl LegPair {
    pub const ZERO: LegPair = LegPair { left: 0, right: 0 };

    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepParams {
    pub step: i32,
    pub tolerance: i32,
}

impl From<&GaitConfig> for StepParams {
    fn from(config: &GaitConfig) -> Self {
        Self {
            step: config.step,
            tolerance: config.tolerance,
        }
    }
}

impl Default for StepParams {
    fn default() -> Self {
        (&GaitConfig::default()).into()
    }
}

/// Both legs have reached their current setpoints.
pub fn step_allowed(measured: LegPair, setpoints: LegPair, tolerance: i32) -> bool {
    let Ok(tolerance) = u32::try_from(tolerance) else {
        return false;
    };
    measured.left.abs_diff(setpoints.left) < tolerance
        && measured.right.abs_diff(setpoints.right) < tolerance
}

/// Signs of the per-leg increment, or `None` when the direction does not walk.
///
/// Backward turns mirror the forward turn of the same name.
pub fn step_signs(direction: Direction) -> Option<(i32, i32)> {
    match direction {
        Direction::StraightForward => Some((1, 1)),
        Direction::StraightBackward => Some((-1, -1)),
        Direction::LeftForward => Some((1, -1)),
        Direction::RightForward => Some((-1, 1)),
        Direction::LeftBackward => Some((-1, 1)),
        Direction::RightBackward => Some((1, -1)),
        Direction::Stop | Direction::BeaconOn => None,
    }
}

/// Setpoints after one gait tick.
pub fn next_setpoints(
    direction: Direction,
    measured: LegPair,
    setpoints: LegPair,
    params: StepParams,
) -> LegPair {
    match step_signs(direction) {
        Some((left, right)) if step_allowed(measured, setpoints, params.tolerance) => LegPair {
            left: setpoints.left.saturating_add(left.saturating_mul(params.step)),
            right: setpoints.right.saturating_add(right.saturating_mul(params.step)),
        },
        _ => setpoints,
    }
}

/// Status light for a direction.
pub fn pattern_for(direction: Direction) -> LedPattern {
    match direction {
        Direction::Stop => LedPattern::Idle,
        Direction::BeaconOn => LedPattern::Beacon,
        _ => LedPattern::Moving,
    }
}

/// Shared-state endpoints owned by the gait generator.
pub struct GaitLinks {
    pub direction: Reader<Direction>,
    pub left_measured: Reader<i32>,
    pub right_measured: Reader<i32>,
    pub left_setpoint: Writer<i32>,
    pub right_setpoint: Writer<i32>,
}

pub struct GaitGenerator {
    links: GaitLinks,
    indicator: SharedIndicator,
    params: StepParams,
    period: Duration,
    setpoints: LegPair,
    pattern: Option<LedPattern>,
    steps: u64,
}

impl GaitGenerator {
    pub fn new(links: GaitLinks, indicator: SharedIndicator, config: &GaitConfig) -> Self {
        let setpoints = LegPair::new(
            links.left_setpoint.current().unwrap_or(0),
            links.right_setpoint.current().unwrap_or(0),
        );
        Self {
            links,
            indicator,
            params: config.into(),
            period: config.period(),
            setpoints,
            pattern: None,
            steps: 0,
        }
    }

    pub fn setpoints(&self) -> LegPair {
        self.setpoints
    }

    /// Steps issued since start.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn show(&mut self, pattern: LedPattern) -> Result<()> {
        if self.pattern == Some(pattern) {
            return Ok(());
        }
        self.indicator.set_pattern(pattern)?;
        self.pattern = Some(pattern);
        Ok(())
    }
}

impl PeriodicTask for GaitGenerator {
    fn name(&self) -> &str {
        "gait"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run(&mut self) -> Result<()> {
        let measured = LegPair::new(
            self.links.left_measured.value(),
            self.links.right_measured.value(),
        );

        let (next, pattern) = match self.links.direction.load() {
            Some(direction) => (
                next_setpoints(direction, measured, self.setpoints, self.params),
                pattern_for(direction),
            ),
            None => {
                tracing::warn!("Undecodable direction word, zeroing setpoints");
                (LegPair::ZERO, pattern_for(Direction::Stop))
            }
        };

        if next != self.setpoints {
            if is_single_step(self.setpoints, next, self.params.step) {
                self.steps += 1;
            }
            tracing::debug!(
                left = next.left,
                right = next.right,
                "New leg setpoints"
            );
        }
        self.setpoints = next;
        self.links.left_setpoint.store(next.left);
        self.links.right_setpoint.store(next.right);

        self.show(pattern)
    }
}

/// Whether `next` is exactly one step away from `current` on both legs.
fn is_single_step(current: LegPair, next: LegPair, step: i32) -> bool {
    let step = step.unsigned_abs();
    next.left.abs_diff(current.left) == step && next.right.abs_diff(current.right) == step
}
