//! Lower BLE primitives the hub is built on.
//!
//! Scanning, connecting and characteristic I/O are delegated to a backend
//! implementing [`BleCentral`] / [`BleLink`]. The rest of the crate never
//! touches a platform BLE API directly.

use crate::domain::capability::CapabilityId;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BleError {
    /// The peripheral went away. Expected end of life for a worker.
    #[error("Device disconnected")]
    Disconnected,

    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,

    #[error("Device {0} was not seen in the last scan")]
    DeviceUnknown(String),

    #[error("Service {0} not found")]
    ServiceNotFound(CapabilityId),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(CapabilityId),

    #[error("BLE fault: {0}")]
    Fault(String),
}

impl BleError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, BleError::Disconnected)
    }
}

/// One advertisement seen during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    /// Advertised service ids, byte order as received over the air
    pub capability_ids: Vec<Vec<u8>>,
}

impl Advertisement {
    /// Advertised name, or the address when the device did not send one
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// A value pushed by the peripheral on a subscribed characteristic
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub characteristic: CapabilityId,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait BleCentral: Send + Sync {
    /// Scan for `duration` and return everything seen
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>, BleError>;

    /// Connect and resolve `characteristics` inside `service`
    async fn connect(
        &self,
        advertisement: &Advertisement,
        service: &CapabilityId,
        characteristics: &[CapabilityId],
    ) -> Result<Box<dyn BleLink>, BleError>;
}

/// An open connection to one peripheral. Owned by exactly one worker.
#[async_trait]
pub trait BleLink: Send {
    async fn subscribe(&mut self, characteristic: &CapabilityId) -> Result<(), BleError>;

    /// Wait up to `timeout` for a notification; `Ok(None)` on timeout
    async fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Notification>, BleError>;

    async fn write(&mut self, characteristic: &CapabilityId, bytes: &[u8]) -> Result<(), BleError>;

    /// Force the connection closed. Never fails.
    async fn close(&mut self);
}
