//! Remote controller (phone app acting as a BLE peripheral).
//!
//! Commands arrive as short ASCII strings on the command characteristic:
//!
//! ```text
//! L<strip><mode><hex color>   e.g. "L1Cff0000"  -> Light:1/Mode = "Cff0000"
//! P<L|U>                      e.g. "PL"         -> Locks/State  = "L"
//! T<on/off><target>           e.g. "T122"       -> Thermostat/Target = "122"
//! ```
//!
//! Hub state goes back on the devices characteristic so the app can show it.

use crate::domain::broadcast::{Broadcast, Outbox};
use crate::domain::capability::CapabilityId;
use crate::infrastructure::bluetooth::devices::led_strip::LIGHT_PREFIX;
use crate::infrastructure::bluetooth::link::Notification;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::worker::{DeviceProtocol, WorkerCommand};
use tracing::{info, warn};

pub struct RemoteController {
    command: CapabilityId,
    devices: CapabilityId,
}

impl RemoteController {
    pub fn new() -> Self {
        Self {
            command: protocol::remote_command(),
            devices: protocol::remote_devices(),
        }
    }

    /// Translate one command string into the broadcast it stands for
    pub fn parse_command(data: &[u8]) -> Option<Broadcast> {
        let text = String::from_utf8_lossy(data);
        let mut chars = text.chars();
        match chars.next()? {
            'L' => {
                let strip = chars.next()?;
                Some(Broadcast::targeted(
                    format!("{}{}", LIGHT_PREFIX, strip),
                    "Mode",
                    chars.as_str(),
                ))
            }
            'P' => Some(Broadcast::targeted("Locks", "State", chars.as_str())),
            'T' => Some(Broadcast::targeted("Thermostat", "Target", chars.as_str())),
            _ => None,
        }
    }

    /// Text shown on the remote for a global state fact
    pub fn display_text(message: &Broadcast) -> Option<String> {
        if !message.is_global() {
            return None;
        }
        let value = message.value();
        match message.prop() {
            "Devices" => Some(value.to_string()),
            "Temperature" => Some(format!("Tt{}", value)),
            "Humidity" => Some(format!("Th{}", value)),
            "ThermostatState" => Some(format!("Ts{}", value)),
            _ => None,
        }
    }
}

impl Default for RemoteController {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProtocol for RemoteController {
    fn subscriptions(&self) -> Vec<CapabilityId> {
        vec![self.command.clone()]
    }

    fn decode(&self, notification: &Notification, outbox: &Outbox) {
        match Self::parse_command(&notification.data) {
            Some(message) => {
                info!(%message, "Remote command");
                outbox.push(message);
            }
            None => warn!(
                data = %String::from_utf8_lossy(&notification.data),
                "Unknown remote command dropped"
            ),
        }
    }

    fn encode(&self, message: &Broadcast) -> Vec<WorkerCommand> {
        Self::display_text(message)
            .map(|text| WorkerCommand::Write {
                characteristic: self.devices.clone(),
                bytes: text.into_bytes(),
            })
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::broadcast::Value;

    fn decode(data: &[u8]) -> Vec<Broadcast> {
        let outbox = Outbox::new();
        RemoteController::new().decode(
            &Notification {
                characteristic: protocol::remote_command(),
                data: data.to_vec(),
            },
            &outbox,
        );
        outbox.drain()
    }

    #[test]
    fn test_light_command() {
        assert_eq!(
            decode(b"L1Cff0000"),
            vec![Broadcast::targeted("Light:1", "Mode", "Cff0000")]
        );
    }

    #[test]
    fn test_lock_and_thermostat_commands() {
        assert_eq!(decode(b"PL"), vec![Broadcast::targeted("Locks", "State", "L")]);
        assert_eq!(
            decode(b"T121"),
            vec![Broadcast::targeted("Thermostat", "Target", "121")]
        );
    }

    #[test]
    fn test_unknown_and_truncated_dropped() {
        assert!(decode(b"Wssid,pass").is_empty());
        assert!(decode(b"").is_empty());
        assert!(decode(b"L").is_empty());
    }

    #[test]
    fn test_state_written_back() {
        let remote = RemoteController::new();
        let write = |message: Broadcast| match remote.encode(&message).as_slice() {
            [WorkerCommand::Write {
                characteristic,
                bytes,
            }] => {
                assert_eq!(*characteristic, protocol::remote_devices());
                Some(String::from_utf8(bytes.clone()).unwrap())
            }
            [] => None,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(write(Broadcast::global("Devices", "IOT")).as_deref(), Some("IOT"));
        assert_eq!(
            write(Broadcast::global("Temperature", 21.7)).as_deref(),
            Some("Tt21.7")
        );
        assert_eq!(
            write(Broadcast::global("ThermostatState", "121")).as_deref(),
            Some("Ts121")
        );
        assert_eq!(write(Broadcast::global("Speed", Value::Number(55.0))), None);
        assert_eq!(write(Broadcast::targeted("Locks", "State", "L")), None);
    }
}
