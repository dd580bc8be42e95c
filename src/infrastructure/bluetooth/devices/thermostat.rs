use crate::domain::broadcast::{Broadcast, Outbox};
use crate::domain::capability::CapabilityId;
use crate::infrastructure::bluetooth::link::Notification;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::worker::{DeviceProtocol, WorkerCommand};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("Expected <on/off digit><target>, got {0:?}")]
    Malformed(String),
}

/// Last on/off and target values seen, combined into `ThermostatState`
#[derive(Debug, Default, Clone, Copy)]
struct Readings {
    on_off: i16,
    target: i16,
}

/// Thermostat sensor/actuator.
///
/// Every characteristic carries one little-endian `i16`. Temperature and
/// humidity are scaled by 10.
pub struct Thermostat {
    temperature: CapabilityId,
    humidity: CapabilityId,
    on_off: CapabilityId,
    target: CapabilityId,
    readings: Mutex<Readings>,
}

impl Thermostat {
    pub fn new() -> Self {
        Self {
            temperature: protocol::thermostat_temperature(),
            humidity: protocol::thermostat_humidity(),
            on_off: protocol::thermostat_on_off(),
            target: protocol::thermostat_target(),
            readings: Mutex::new(Readings::default()),
        }
    }

    /// `"122"` -> (on, 22)
    pub fn parse_target(value: &str) -> Result<(i16, i16), TargetError> {
        let malformed = || TargetError::Malformed(value.to_string());
        let mut chars = value.chars();
        let on_off = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(malformed)?;
        let target = chars.as_str().trim().parse::<i16>().map_err(|_| malformed())?;
        Ok((on_off as i16, target))
    }

    fn state_message(readings: Readings) -> Broadcast {
        Broadcast::global(
            "ThermostatState",
            format!("{}{}", readings.on_off, readings.target),
        )
    }
}

impl Default for Thermostat {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProtocol for Thermostat {
    fn subscriptions(&self) -> Vec<CapabilityId> {
        vec![
            self.temperature.clone(),
            self.humidity.clone(),
            self.on_off.clone(),
            self.target.clone(),
        ]
    }

    fn decode(&self, notification: &Notification, outbox: &Outbox) {
        let raw = match notification.data.as_slice() {
            [lo, hi, ..] => i16::from_le_bytes([*lo, *hi]),
            _ => {
                warn!(
                    characteristic = %notification.characteristic,
                    len = notification.data.len(),
                    "Short thermostat notification dropped"
                );
                return;
            }
        };

        let characteristic = &notification.characteristic;
        if *characteristic == self.temperature {
            outbox.push(Broadcast::global("Temperature", raw as f64 / 10.0));
        } else if *characteristic == self.humidity {
            outbox.push(Broadcast::global("Humidity", raw as f64 / 10.0));
        } else if *characteristic == self.on_off || *characteristic == self.target {
            let readings = {
                let mut readings = self.readings.lock().unwrap_or_else(PoisonError::into_inner);
                if *characteristic == self.on_off {
                    readings.on_off = raw;
                } else {
                    readings.target = raw;
                }
                *readings
            };
            outbox.push(Self::state_message(readings));
        } else {
            debug!(%characteristic, "Notification from unexpected characteristic");
        }
    }

    fn encode(&self, message: &Broadcast) -> Vec<WorkerCommand> {
        if !message.is_for("Thermostat", "Target") {
            return vec![];
        }
        let parsed = message
            .value()
            .as_text()
            .ok_or_else(|| TargetError::Malformed(message.value().to_string()))
            .and_then(Self::parse_target);

        match parsed {
            Ok((on_off, target)) => vec![
                WorkerCommand::Write {
                    characteristic: self.target.clone(),
                    bytes: target.to_le_bytes().to_vec(),
                },
                WorkerCommand::Write {
                    characteristic: self.on_off.clone(),
                    bytes: on_off.to_le_bytes().to_vec(),
                },
            ],
            Err(e) => {
                warn!(%message, error = %e, "Dropping thermostat command");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(characteristic: CapabilityId, raw: i16) -> Notification {
        Notification {
            characteristic,
            data: raw.to_le_bytes().to_vec(),
        }
    }

    #[test]
    fn test_temperature_and_humidity_scaled() {
        let t = Thermostat::new();
        let outbox = Outbox::new();

        t.decode(&notification(protocol::thermostat_temperature(), 217), &outbox);
        t.decode(&notification(protocol::thermostat_humidity(), 455), &outbox);
        t.decode(&notification(protocol::thermostat_temperature(), -35), &outbox);

        assert_eq!(
            outbox.drain(),
            vec![
                Broadcast::global("Temperature", 21.7),
                Broadcast::global("Humidity", 45.5),
                Broadcast::global("Temperature", -3.5),
            ]
        );
    }

    #[test]
    fn test_state_combines_last_on_off_and_target() {
        let t = Thermostat::new();
        let outbox = Outbox::new();

        t.decode(&notification(protocol::thermostat_target(), 21), &outbox);
        t.decode(&notification(protocol::thermostat_on_off(), 1), &outbox);
        t.decode(&notification(protocol::thermostat_target(), 19), &outbox);

        let values: Vec<String> = outbox
            .drain()
            .iter()
            .map(|b| {
                assert_eq!(b.prop(), "ThermostatState");
                b.value().to_string()
            })
            .collect();
        assert_eq!(values, ["021", "121", "119"]);
    }

    #[test]
    fn test_short_notification_dropped() {
        let t = Thermostat::new();
        let outbox = Outbox::new();
        t.decode(
            &Notification {
                characteristic: protocol::thermostat_temperature(),
                data: vec![0x01],
            },
            &outbox,
        );
        assert!(outbox.drain().is_empty());
    }

    #[test]
    fn test_target_writes_target_then_on_off() {
        let t = Thermostat::new();
        let commands = t.encode(&Broadcast::targeted("Thermostat", "Target", "122"));
        assert_eq!(
            commands,
            vec![
                WorkerCommand::Write {
                    characteristic: protocol::thermostat_target(),
                    bytes: vec![22, 0],
                },
                WorkerCommand::Write {
                    characteristic: protocol::thermostat_on_off(),
                    bytes: vec![1, 0],
                },
            ]
        );
    }

    #[test]
    fn test_bad_target_dropped() {
        let t = Thermostat::new();
        assert!(t
            .encode(&Broadcast::targeted("Thermostat", "Target", "x22"))
            .is_empty());
        assert!(t
            .encode(&Broadcast::targeted("Thermostat", "Target", "1"))
            .is_empty());
        assert!(t
            .encode(&Broadcast::targeted("Thermostat", "Mode", "122"))
            .is_empty());
        assert_eq!(Thermostat::parse_target("018"), Ok((0, 18)));
    }
}
