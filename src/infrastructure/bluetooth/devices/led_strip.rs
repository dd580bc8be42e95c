//! LED-strip controller on the Nordic UART service.
//!
//! Acts on `Light:<strip>/Mode` where `<strip>` is the logical id the
//! directory assigns to this controller's address. The value is a mode
//! selector followed by the color as hex text; the strip itself wants raw
//! bytes inside a checksummed frame.

use crate::domain::broadcast::{Broadcast, Outbox};
use crate::domain::capability::CapabilityId;
use crate::domain::directory::Directory;
use crate::infrastructure::bluetooth::link::Notification;
use crate::infrastructure::bluetooth::protocol::{self, FrameError, LedMode};
use crate::infrastructure::bluetooth::worker::{DeviceProtocol, WorkerCommand};
use thiserror::Error;
use tracing::{debug, warn};

pub const LIGHT_PREFIX: &str = "Light:";

#[derive(Debug, Error, PartialEq)]
pub enum LedCommandError {
    #[error("Empty mode value")]
    Empty,
    #[error("Unknown mode selector {0:?}")]
    UnknownMode(char),
    #[error("Color is not hex: {0}")]
    BadColor(#[from] hex::FromHexError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub struct LedStrip {
    /// Logical id of this strip, if the directory knows the address
    strip: Option<char>,
    tx: CapabilityId,
    rx: CapabilityId,
}

impl LedStrip {
    pub fn new(address: &str, directory: &Directory) -> Self {
        let strip = directory.id_for_address(address);
        if strip.is_none() {
            warn!(address, "LED strip has no logical id, it will not take commands");
        }
        Self {
            strip,
            tx: protocol::uart_tx(),
            rx: protocol::uart_rx(),
        }
    }

    pub fn strip(&self) -> Option<char> {
        self.strip
    }

    /// Frame for a `Mode` value such as `Cff0000`
    pub fn frame_for(&self, strip: char, value: &str) -> Result<Vec<u8>, LedCommandError> {
        let mut chars = value.chars();
        let selector = chars.next().ok_or(LedCommandError::Empty)?;
        let mode = u8::try_from(selector)
            .ok()
            .and_then(LedMode::from_selector)
            .ok_or(LedCommandError::UnknownMode(selector))?;
        let color = hex::decode(chars.as_str())?;

        let mut payload = Vec::with_capacity(color.len() + 2);
        payload.push(mode.selector());
        let mut strip_byte = [0u8; 4];
        payload.extend_from_slice(strip.encode_utf8(&mut strip_byte).as_bytes());
        payload.extend_from_slice(&color);
        Ok(protocol::build_frame(&payload)?)
    }
}

/// `Light:1` -> `'1'`
fn light_id(destination: &str) -> Option<char> {
    let mut chars = destination.strip_prefix(LIGHT_PREFIX)?.chars();
    match (chars.next(), chars.next()) {
        (Some(id), None) => Some(id),
        _ => None,
    }
}

impl DeviceProtocol for LedStrip {
    fn subscriptions(&self) -> Vec<CapabilityId> {
        vec![self.rx.clone()]
    }

    fn decode(&self, notification: &Notification, _outbox: &Outbox) {
        // The strips only echo status lines, nothing to publish
        debug!(data = %String::from_utf8_lossy(&notification.data), "LED strip says");
    }

    fn encode(&self, message: &Broadcast) -> Vec<WorkerCommand> {
        let Some(strip) = self.strip else {
            return vec![];
        };
        let Some(destination) = message.destination() else {
            return vec![];
        };
        if light_id(destination) != Some(strip) || message.prop() != "Mode" {
            return vec![];
        }

        let Some(value) = message.value().as_text() else {
            warn!(%message, "Mode value is not text");
            return vec![];
        };
        match self.frame_for(strip, value) {
            Ok(bytes) => vec![WorkerCommand::Write {
                characteristic: self.tx.clone(),
                bytes,
            }],
            Err(e) => {
                warn!(%message, error = %e, "Dropping LED command");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::DeviceTarget;

    fn strip_one() -> LedStrip {
        let directory = Directory::new([
            ('1', DeviceTarget::Address("aa:00:00:00:00:01".into())),
            ('2', DeviceTarget::Address("aa:00:00:00:00:02".into())),
        ]);
        LedStrip::new("aa:00:00:00:00:01", &directory)
    }

    #[test]
    fn test_color_command_is_hex_decoded_and_framed() {
        let led = strip_one();
        let commands = led.encode(&Broadcast::targeted("Light:1", "Mode", "Cff0000"));

        let expected = protocol::build_frame(&[b'C', b'1', 0xFF, 0x00, 0x00]).unwrap();
        assert_eq!(
            commands,
            vec![WorkerCommand::Write {
                characteristic: protocol::uart_tx(),
                bytes: expected,
            }]
        );
    }

    #[test]
    fn test_other_strips_and_props_ignored() {
        let led = strip_one();
        assert!(led
            .encode(&Broadcast::targeted("Light:2", "Mode", "Cff0000"))
            .is_empty());
        assert!(led
            .encode(&Broadcast::targeted("Light:1", "Brightness", "Cff0000"))
            .is_empty());
        assert!(led.encode(&Broadcast::global("Mode", "Cff0000")).is_empty());
        assert!(led
            .encode(&Broadcast::targeted("Light:12", "Mode", "Cff0000"))
            .is_empty());
    }

    #[test]
    fn test_bad_values_dropped() {
        let led = strip_one();
        assert_eq!(led.frame_for('1', "Xff0000"), Err(LedCommandError::UnknownMode('X')));
        assert_eq!(led.frame_for('1', ""), Err(LedCommandError::Empty));
        assert!(matches!(
            led.frame_for('1', "Cfg0000"),
            Err(LedCommandError::BadColor(_))
        ));
        assert!(led
            .encode(&Broadcast::targeted("Light:1", "Mode", "Zff"))
            .is_empty());
    }

    #[test]
    fn test_rainbow_mode() {
        let led = strip_one();
        let frame = led.frame_for('1', "R2814000000").unwrap();
        assert_eq!(&frame[2..4], b"R1");
        assert_eq!(&frame[4..9], &[0x28, 0x14, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_unknown_address_takes_no_commands() {
        let led = LedStrip::new("ff:ff:ff:ff:ff:ff", &Directory::default());
        assert_eq!(led.strip(), None);
        assert!(led
            .encode(&Broadcast::targeted("Light:1", "Mode", "Cff0000"))
            .is_empty());
    }
}
