//! Gamepad stand-in for the EV3 infrared remote.
//!
//! Uses the `gilrs` crate, polling in a background thread. The sticks act as
//! the remote's two paddles: left stick Y is the red pair, right stick Y the
//! blue pair. Holding North selects beacon mode and Start aborts.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use crate::hardware::{BeaconRanger, BeaconReading, RemoteDecoder, ShutdownTrigger};

/// Stick deflection that counts as a pressed paddle.
const PADDLE_THRESHOLD: f32 = 0.5;

/// One remote paddle: up, down or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Paddle {
    #[default]
    Released,
    Up,
    Down,
}

impl Paddle {
    fn from_axis(value: f32) -> Self {
        if value > PADDLE_THRESHOLD {
            Paddle::Up
        } else if value < -PADDLE_THRESHOLD {
            Paddle::Down
        } else {
            Paddle::Released
        }
    }
}

/// Remote button code for a paddle combination, channel 1.
pub fn remote_code(red: Paddle, blue: Paddle, beacon: bool) -> u8 {
    use Paddle::*;
    if beacon {
        return 9;
    }
    match (red, blue) {
        (Released, Released) => 0,
        (Up, Released) => 1,
        (Down, Released) => 2,
        (Released, Up) => 3,
        (Released, Down) => 4,
        (Up, Up) => 5,
        (Up, Down) => 6,
        (Down, Up) => 7,
        (Down, Down) => 8,
    }
}

/// Latest remote code from the gamepad thread.
pub struct GamepadRemote {
    receiver: Receiver<u8>,
    stop_tx: Sender<()>,
    last_code: u8,
}

impl GamepadRemote {
    /// Initialize the gamepad and start the background polling thread.
    /// Returns the remote and an abort trigger fed by the Start button.
    pub fn spawn(poll_hz: u32) -> (Self, GamepadAbort) {
        let (code_tx, code_rx) = bounded::<u8>(1);
        let (abort_tx, abort_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let period = Duration::from_secs_f64(1.0 / poll_hz.max(1) as f64);

        thread::spawn(move || {
            gamepad_worker(code_tx, abort_tx, stop_rx, period);
        });

        (
            Self {
                receiver: code_rx,
                stop_tx,
                last_code: 0,
            },
            GamepadAbort {
                receiver: abort_rx,
                fired: false,
            },
        )
    }
}

impl RemoteDecoder for GamepadRemote {
    fn read_remote_command(&mut self) -> Result<u8> {
        if let Ok(code) = self.receiver.try_recv() {
            self.last_code = code;
        }
        Ok(self.last_code)
    }
}

/// A gamepad has no beacon to range; seek mode ends on the next tick.
impl BeaconRanger for GamepadRemote {
    fn read_beacon(&mut self) -> Result<BeaconReading> {
        Ok(BeaconReading::NOT_DETECTED)
    }
}

impl Drop for GamepadRemote {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
    }
}

pub struct GamepadAbort {
    receiver: Receiver<()>,
    fired: bool,
}

impl ShutdownTrigger for GamepadAbort {
    fn is_triggered(&mut self) -> bool {
        if self.receiver.try_recv().is_ok() {
            self.fired = true;
        }
        self.fired
    }
}

fn gamepad_worker(
    code_tx: Sender<u8>,
    abort_tx: Sender<()>,
    stop_rx: Receiver<()>,
    period: Duration,
) {
    use gilrs::{Axis, Button, EventType, Gilrs};

    let mut gilrs = match Gilrs::new() {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("Failed to initialize gamepad library: {}", e);
            return;
        }
    };

    tracing::info!("Gamepad input thread started");

    let mut red = Paddle::Released;
    let mut blue = Paddle::Released;
    let mut beacon = false;

    loop {
        let tick_start = Instant::now();

        if stop_rx.try_recv().is_ok() {
            break;
        }

        while let Some(event) = gilrs.next_event() {
            match event.event {
                EventType::AxisChanged(Axis::LeftStickY, value, _) => {
                    red = Paddle::from_axis(value)
                }
                EventType::AxisChanged(Axis::RightStickY, value, _) => {
                    blue = Paddle::from_axis(value)
                }
                EventType::ButtonPressed(Button::North, _) => beacon = true,
                EventType::ButtonReleased(Button::North, _) => beacon = false,
                EventType::ButtonPressed(Button::Start, _) => {
                    tracing::info!("Abort pressed on gamepad");
                    let _ = abort_tx.try_send(());
                }
                EventType::Disconnected => {
                    red = Paddle::Released;
                    blue = Paddle::Released;
                    beacon = false;
                }
                _ => {}
            }
        }

        match code_tx.try_send(remote_code(red, blue, beacon)) {
            Ok(()) => {}
            // Remote not read yet; the next tick sends fresh data.
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            spin_sleep::sleep(period - elapsed);
        }
    }

    tracing::info!("Gamepad worker thread exiting");
}
