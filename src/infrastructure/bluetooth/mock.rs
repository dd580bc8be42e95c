//! In-memory BLE backend used by the tests.

use crate::domain::capability::CapabilityId;
use crate::infrastructure::bluetooth::link::{
    Advertisement, BleCentral, BleError, BleLink, Notification,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Writes = Arc<Mutex<Vec<(CapabilityId, Vec<u8>)>>>;

/// Test-side handle of a connected mock peripheral
#[derive(Clone)]
pub struct MockDevice {
    events: mpsc::UnboundedSender<Result<Notification, BleError>>,
    writes: Writes,
    subscriptions: Arc<Mutex<Vec<CapabilityId>>>,
}

impl MockDevice {
    pub fn notify(&self, characteristic: &CapabilityId, data: &[u8]) {
        let _ = self.events.send(Ok(Notification {
            characteristic: characteristic.clone(),
            data: data.to_vec(),
        }));
    }

    pub fn disconnect(&self) {
        let _ = self.events.send(Err(BleError::Disconnected));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(Err(BleError::Fault(reason.to_string())));
    }

    pub fn writes(&self) -> Vec<(CapabilityId, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<CapabilityId> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct MockCentral {
    advertisements: Mutex<Vec<Advertisement>>,
    refuse: Mutex<HashSet<String>>,
    devices: Mutex<HashMap<String, MockDevice>>,
    connects: AtomicUsize,
}

impl MockCentral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertise(&self, advertisement: Advertisement) {
        self.advertisements.lock().unwrap().push(advertisement);
    }

    /// Make connection attempts to `address` fail
    pub fn refuse(&self, address: &str) {
        self.refuse.lock().unwrap().insert(address.to_string());
    }

    pub fn accept(&self, address: &str) {
        self.refuse.lock().unwrap().remove(address);
    }

    /// Latest connection made to `address`
    pub fn device(&self, address: &str) -> Option<MockDevice> {
        self.devices.lock().unwrap().get(address).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleCentral for MockCentral {
    async fn scan(&self, _duration: Duration) -> Result<Vec<Advertisement>, BleError> {
        Ok(self.advertisements.lock().unwrap().clone())
    }

    async fn connect(
        &self,
        advertisement: &Advertisement,
        _service: &CapabilityId,
        _characteristics: &[CapabilityId],
    ) -> Result<Box<dyn BleLink>, BleError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.lock().unwrap().contains(&advertisement.address) {
            return Err(BleError::Fault("connection refused".to_string()));
        }

        let (events, rx) = mpsc::unbounded_channel();
        let device = MockDevice {
            events,
            writes: Arc::default(),
            subscriptions: Arc::default(),
        };
        self.devices
            .lock()
            .unwrap()
            .insert(advertisement.address.clone(), device.clone());

        Ok(Box::new(MockLink { rx, device }))
    }
}

struct MockLink {
    rx: mpsc::UnboundedReceiver<Result<Notification, BleError>>,
    device: MockDevice,
}

#[async_trait]
impl BleLink for MockLink {
    async fn subscribe(&mut self, characteristic: &CapabilityId) -> Result<(), BleError> {
        self.device
            .subscriptions
            .lock()
            .unwrap()
            .push(characteristic.clone());
        Ok(())
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

    async fn write(&mut self, characteristic: &CapabilityId, bytes: &[u8]) -> Result<(), BleError> {
        self.device
            .writes
            .lock()
            .unwrap()
            .push((characteristic.clone(), bytes.to_vec()));
        Ok(())
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Advertisement carrying `services` (canonical ids) in wire byte order
pub fn advertisement(address: &str, name: &str, services: &[&CapabilityId]) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        name: Some(name.to_string()),
        capability_ids: services.iter().map(|s| s.to_wire()).collect(),
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
