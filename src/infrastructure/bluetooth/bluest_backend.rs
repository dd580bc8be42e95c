//! BLE backend on top of `bluest` (BlueZ, CoreBluetooth, WinRT).

use crate::domain::capability::CapabilityId;
use crate::infrastructure::bluetooth::link::{
    Advertisement, BleCentral, BleError, BleLink, Notification,
};
use async_trait::async_trait;
use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

impl From<bluest::Error> for BleError {
    fn from(e: bluest::Error) -> Self {
        match e.kind() {
            ErrorKind::NotConnected => BleError::Disconnected,
            ErrorKind::AdapterUnavailable => BleError::AdapterUnavailable,
            _ => BleError::Fault(e.to_string()),
        }
    }
}

/// Pull a `AA:BB:CC:DD:EE:FF` address out of a platform device id.
/// Platforms without MAC addresses (macOS) keep their own id text.
pub fn address_from_id(id: &str) -> String {
    let bytes = id.as_bytes();
    let is_mac = |w: &[u8]| {
        w.iter().enumerate().all(|(i, b)| {
            if i % 3 == 2 {
                *b == b':'
            } else {
                b.is_ascii_hexdigit()
            }
        })
    };
    bytes
        .windows(17)
        .find(|w| is_mac(w))
        .map(|w| String::from_utf8_lossy(w).to_ascii_lowercase())
        .unwrap_or_else(|| id.to_string())
}

pub struct BluestCentral {
    adapter: Adapter,
    /// Devices from the most recent scan, by address
    seen: Mutex<HashMap<String, Device>>,
}

impl BluestCentral {
    pub async fn new() -> Result<Self, BleError> {
        let adapter = Adapter::default()
            .await
            .ok_or(BleError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter available");
        Ok(Self {
            adapter,
            seen: Mutex::default(),
        })
    }
}

#[async_trait]
impl BleCentral for BluestCentral {
    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>, BleError> {
        let deadline = tokio::time::Instant::now() + duration;
        let mut found: HashMap<String, (Device, Advertisement)> = HashMap::new();
        {
            let mut events = self.adapter.scan(&[]).await?;
            while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
                let address = address_from_id(&format!("{:?}", event.device.id()));
                let advertisement = Advertisement {
                    address: address.clone(),
                    name: event.adv_data.local_name.clone(),
                    capability_ids: event
                        .adv_data
                        .services
                        .iter()
                        .map(|uuid| CapabilityId::from_uuid(*uuid).to_wire())
                        .collect(),
                };
                found.insert(address, (event.device, advertisement));
            }
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.clear();
        let mut advertisements = Vec::with_capacity(found.len());
        for (address, (device, advertisement)) in found {
            seen.insert(address, device);
            advertisements.push(advertisement);
        }
        Ok(advertisements)
    }

    async fn connect(
        &self,
        advertisement: &Advertisement,
        service: &CapabilityId,
        characteristics: &[CapabilityId],
    ) -> Result<Box<dyn BleLink>, BleError> {
        let device = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&advertisement.address)
            .cloned()
            .ok_or_else(|| BleError::DeviceUnknown(advertisement.address.clone()))?;

        self.adapter.connect_device(&device).await?;

        let gatt_service = device
            .discover_services_with_uuid(service.to_uuid())
            .await?
            .first()
            .cloned()
            .ok_or_else(|| BleError::ServiceNotFound(service.clone()))?;

        let mut resolved = HashMap::new();
        for id in characteristics {
            let characteristic = gatt_service
                .discover_characteristics_with_uuid(id.to_uuid())
                .await?
                .first()
                .cloned()
                .ok_or_else(|| BleError::CharacteristicNotFound(id.clone()))?;
            resolved.insert(id.clone(), characteristic);
        }
        debug!(address = %advertisement.address, count = resolved.len(), "Characteristics resolved");

        let (events, rx) = mpsc::unbounded_channel();
        Ok(Box::new(BluestLink {
            adapter: self.adapter.clone(),
            device,
            characteristics: resolved,
            events,
            rx,
            pumps: Vec::new(),
        }))
    }
}

struct BluestLink {
    adapter: Adapter,
    device: Device,
    characteristics: HashMap<CapabilityId, Characteristic>,
    events: mpsc::UnboundedSender<Result<Notification, BleError>>,
    rx: mpsc::UnboundedReceiver<Result<Notification, BleError>>,
    pumps: Vec<JoinHandle<()>>,
}

impl BluestLink {
    fn characteristic(&self, id: &CapabilityId) -> Result<Characteristic, BleError> {
        self.characteristics
            .get(id)
            .cloned()
            .ok_or_else(|| BleError::CharacteristicNotFound(id.clone()))
    }
}

#[async_trait]
impl BleLink for BluestLink {
    async fn subscribe(&mut self, id: &CapabilityId) -> Result<(), BleError> {
        let characteristic = self.characteristic(id)?;
        let events = self.events.clone();
        let id = id.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        // The notification stream borrows the characteristic, so it lives in its own task
        let pump = tokio::spawn(async move {
            let mut stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(BleError::from(e)));
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                let event = item.map_err(BleError::from).map(|data| Notification {
                    characteristic: id.clone(),
                    data,
                });
                let failed = event.is_err();
                if events.send(event).is_err() || failed {
                    return;
                }
            }
            let _ = events.send(Err(BleError::Disconnected));
        });
        self.pumps.push(pump);

        ready_rx
            .await
            .unwrap_or_else(|_| Err(BleError::Fault("notification task ended".to_string())))
    }

    async fn next_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Notification>, BleError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(event)) => event.map(Some),
            Ok(None) => Err(BleError::Disconnected),
        }
    }

    async fn write(&mut self, id: &CapabilityId, bytes: &[u8]) -> Result<(), BleError> {
        let characteristic = self.characteristic(id)?;
        characteristic.write(bytes).await?;
        Ok(())
    }

    async fn close(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        if let Err(e) = self.adapter.disconnect_device(&self.device).await {
            warn!(error = %e, "Disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_extracted_from_debug_id() {
        assert_eq!(
            address_from_id("DeviceId(Address(AA:BB:CC:0D:0E:0F))"),
            "aa:bb:cc:0d:0e:0f"
        );
        assert_eq!(
            address_from_id("7B1A9E0C-0000-4000-8000-000000000000"),
            "7B1A9E0C-0000-4000-8000-000000000000"
        );
    }
}
