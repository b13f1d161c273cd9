//! SENTIN3L locomotion runtime.
//!
//! Turns infrared remote commands into closed-loop stepping of a two-legged
//! LEGO walker. A single cooperative scheduler runs the leg controllers, the
//! remote interpreter, the gait generator and the shutdown supervisor, which
//! share state through single-writer atomic words.

pub mod command;
pub mod config;
pub mod direction;
pub mod ev3dev;
pub mod gait;
#[cfg(feature = "gamepad")]
pub mod gamepad;
pub mod hardware;
pub mod leg;
pub mod lifecycle;
pub mod peripherals;
pub mod pid;
pub mod robot;
pub mod scheduler;
pub mod shared;
pub mod sim;
