//! GPIO actuators and the door-lock endpoint.

use crate::domain::broadcast::Broadcast;
use crate::domain::endpoint::Endpoint;
use crate::domain::settings::LockSettings;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Could not run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Opaque pin primitive
pub trait Actuator: Send + Sync {
    fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError>;
    fn set_level(&self, pin: u8, high: bool) -> Result<(), GpioError>;
}

/// Drives pins through a wiringPi style `gpio` program (BCM numbering)
pub struct ShellGpio {
    program: String,
}

impl ShellGpio {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), GpioError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("Running {}", command);
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| GpioError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GpioError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Actuator for ShellGpio {
    fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        let mode = match mode {
            PinMode::Input => "in",
            PinMode::Output => "out",
        };
        self.run(&["-g", "mode", &pin.to_string(), mode])
    }

    fn set_level(&self, pin: u8, high: bool) -> Result<(), GpioError> {
        self.run(&["-g", "write", &pin.to_string(), if high { "1" } else { "0" }])
    }
}

/// Door locks wired to two relay lines, one per direction.
///
/// Stateless: each `Locks/State` message pulses the selected line once,
/// synchronously, on the caller's thread.
pub struct LockEndpoint {
    actuator: Arc<dyn Actuator>,
    lock_pin: u8,
    unlock_pin: u8,
    pulse: Duration,
}

impl LockEndpoint {
    pub fn new(actuator: Arc<dyn Actuator>, settings: &LockSettings) -> Self {
        Self {
            actuator,
            lock_pin: settings.lock_pin,
            unlock_pin: settings.unlock_pin,
            pulse: Duration::from_millis(settings.pulse_ms),
        }
    }

    /// `"L"` locks, `"U"` unlocks
    fn pin_for(&self, value: &str) -> Option<u8> {
        match value {
            "L" => Some(self.lock_pin),
            "U" => Some(self.unlock_pin),
            _ => None,
        }
    }

    /// open -> assert -> deassert -> reassert -> deassert
    fn pulse(&self, pin: u8) -> Result<(), GpioError> {
        self.actuator.set_mode(pin, PinMode::Output)?;
        self.actuator.set_level(pin, true)?;
        std::thread::sleep(self.pulse);
        self.actuator.set_level(pin, false)?;
        std::thread::sleep(self.pulse);
        self.actuator.set_level(pin, true)?;
        std::thread::sleep(self.pulse);
        self.actuator.set_level(pin, false)
    }
}

impl Endpoint for LockEndpoint {
    fn name(&self) -> &str {
        "locks"
    }

    fn receive(&self, message: &Broadcast) {
        if !message.is_for("Locks", "State") {
            return;
        }
        let value = message.value().to_string();
        let Some(pin) = self.pin_for(&value) else {
            warn!(%message, "Unknown lock state dropped");
            return;
        };

        info!(state = %value, pin, "Pulsing lock");
        if let Err(e) = self.pulse(pin) {
            error!(pin, error = %e, "Lock pulse failed");
        }
    }
}
