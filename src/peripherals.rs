//! Operator-facing peripherals: status lights, abort inputs and the start gate.
//!
//! GPIO access goes through the `rppal` crate (Linux-only). The console and
//! log implementations are always available.

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::io::BufRead;
use std::thread;

use crate::hardware::{LedPattern, ShutdownTrigger, StatusIndicator};

// ── Hardware implementations (Linux only, via rppal GPIO) ──

#[cfg(target_os = "linux")]
mod hw {
    use anyhow::{Context, Result};
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use std::sync::Mutex;

    use crate::hardware::{LedPattern, ShutdownTrigger, StatusIndicator};

    /// Two-colour status light on a pair of GPIOs; both lit reads as orange.
    pub struct GpioLeds {
        green: Mutex<OutputPin>,
        red: Mutex<OutputPin>,
    }

    impl GpioLeds {
        pub fn new(green_pin: u8, red_pin: u8) -> Result<Self> {
            let gpio = Gpio::new().context("Failed to initialize GPIO")?;
            let green = gpio
                .get(green_pin)
                .context("Failed to get green LED pin")?
                .into_output_low();
            let red = gpio
                .get(red_pin)
                .context("Failed to get red LED pin")?
                .into_output_low();

            tracing::info!("GPIO status LEDs initialized");
            Ok(Self {
                green: Mutex::new(green),
                red: Mutex::new(red),
            })
        }
    }

    fn drive(pin: &Mutex<OutputPin>, on: bool) {
        let mut pin = pin.lock().unwrap_or_else(|e| e.into_inner());
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }

    impl StatusIndicator for GpioLeds {
        fn set_pattern(&self, pattern: LedPattern) -> Result<()> {
            let (green, red) = match pattern {
                LedPattern::Off => (false, false),
                LedPattern::Moving => (true, false),
                LedPattern::Beacon => (false, true),
                LedPattern::Idle => (true, true),
            };
            drive(&self.green, green);
            drive(&self.red, red);
            Ok(())
        }
    }

    impl Drop for GpioLeds {
        fn drop(&mut self) {
            drive(&self.green, false);
            drive(&self.red, false);
        }
    }

    /// Push button to ground with the internal pull-up enabled.
    pub struct GpioAbortButton {
        pin: InputPin,
    }

    impl GpioAbortButton {
        pub fn new(pin: u8) -> Result<Self> {
            let gpio = Gpio::new().context("Failed to initialize GPIO")?;
            let pin = gpio
                .get(pin)
                .context("Failed to get abort button pin")?
                .into_input_pullup();
            tracing::info!("Abort button initialized");
            Ok(Self { pin })
        }
    }

    impl ShutdownTrigger for GpioAbortButton {
        fn is_triggered(&mut self) -> bool {
            // Active low: pin LOW = pressed
            self.pin.is_low()
        }
    }
}

#[cfg(target_os = "linux")]
pub use hw::{GpioAbortButton, GpioLeds};

// ── Always-available implementations ──

/// Indicator that only logs pattern changes.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn set_pattern(&self, pattern: LedPattern) -> Result<()> {
        tracing::info!(pattern = pattern.id(), "LED pattern {:?}", pattern);
        Ok(())
    }
}

/// Fires when any of its inputs fires.
pub struct AnyTrigger(pub Vec<Box<dyn ShutdownTrigger>>);

impl ShutdownTrigger for AnyTrigger {
    fn is_triggered(&mut self) -> bool {
        // Poll every input so edge-based ones see each tick.
        self.0
            .iter_mut()
            .fold(false, |fired, trigger| trigger.is_triggered() || fired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// Enter on an empty line.
    Start,
    /// `q` or `quit`.
    Quit,
}

fn parse_console_line(line: &str) -> Option<ConsoleEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(ConsoleEvent::Start),
        "q" | "quit" | "escape" => Some(ConsoleEvent::Quit),
        _ => None,
    }
}

/// Operator input read from stdin on a background thread: Enter starts the
/// robot, `q` aborts it.
pub struct OperatorConsole {
    events: Receiver<ConsoleEvent>,
}

impl OperatorConsole {
    pub fn spawn() -> Self {
        let (tx, rx) = bounded::<ConsoleEvent>(4);

        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if let Some(event) = parse_console_line(&line) {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("Operator console thread exiting");
        });

        Self { events: rx }
    }

    /// Block until the operator starts (`true`) or quits (`false`).
    pub fn wait_for_start(&self) -> Result<bool> {
        tracing::info!("Press Enter to start, q + Enter to quit");
        match self.events.recv() {
            Ok(ConsoleEvent::Start) => Ok(true),
            Ok(ConsoleEvent::Quit) => Ok(false),
            Err(_) => bail!("Operator console closed before start"),
        }
    }

    pub fn abort_trigger(&self) -> ConsoleAbort {
        ConsoleAbort {
            events: self.events.clone(),
            fired: false,
        }
    }
}

/// Abort input fed by the operator console.
pub struct ConsoleAbort {
    events: Receiver<ConsoleEvent>,
    fired: bool,
}

impl ShutdownTrigger for ConsoleAbort {
    fn is_triggered(&mut self) -> bool {
        loop {
            match self.events.try_recv() {
                Ok(ConsoleEvent::Quit) => self.fired = true,
                Ok(ConsoleEvent::Start) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.fired
    }
}
