//! Device manager: discovery-to-connection for one device class.

use crate::domain::capability::CapabilityId;
use crate::infrastructure::bluetooth::link::{Advertisement, BleCentral, BleError};
use crate::infrastructure::bluetooth::worker::{DeviceProtocol, DeviceWorker};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives worker lifecycle events (implemented by the coordinator)
pub trait LifecycleObserver: Send + Sync {
    fn device_connected(&self, worker: &Arc<DeviceWorker>);
    fn device_disconnected(&self, worker: &Arc<DeviceWorker>);
}

/// Builds the protocol for a freshly connected device
type ProtocolFactory = Box<dyn Fn(&Advertisement) -> Arc<dyn DeviceProtocol> + Send + Sync>;

type WorkerTable = Mutex<HashMap<String, Arc<DeviceWorker>>>;

pub struct DeviceManager {
    kind: &'static str,
    central: Arc<dyn BleCentral>,
    service: CapabilityId,
    characteristics: Vec<CapabilityId>,
    /// Required advertised ids, pre-converted to wire byte order
    required: BTreeSet<Vec<u8>>,
    factory: ProtocolFactory,
    poll_timeout: Duration,
    by_address: WorkerTable,
    by_name: WorkerTable,
    observer: Mutex<Option<Weak<dyn LifecycleObserver>>>,
}

impl DeviceManager {
    pub fn new(
        kind: &'static str,
        central: Arc<dyn BleCentral>,
        service: CapabilityId,
        characteristics: Vec<CapabilityId>,
        factory: impl Fn(&Advertisement) -> Arc<dyn DeviceProtocol> + Send + Sync + 'static,
        poll_timeout: Duration,
    ) -> Self {
        let required = std::iter::once(service.to_wire()).collect();
        Self {
            kind,
            central,
            service,
            characteristics,
            required,
            factory: Box::new(factory),
            poll_timeout,
            by_address: Mutex::default(),
            by_name: Mutex::default(),
            observer: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Report connects/disconnects to `observer` from now on
    pub fn attach(&self, observer: Weak<dyn LifecycleObserver>) {
        *lock(&self.observer) = Some(observer);
    }

    fn observer(&self) -> Option<Arc<dyn LifecycleObserver>> {
        lock(&self.observer).as_ref().and_then(Weak::upgrade)
    }

    /// True when every required id is among the advertised ones
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        let advertised: BTreeSet<&[u8]> = advertisement
            .capability_ids
            .iter()
            .map(Vec::as_slice)
            .collect();
        self.required
            .iter()
            .all(|id| advertised.contains(id.as_slice()))
    }

    /// Reap dead workers, then connect to new matching devices
    pub async fn found_devices(&self, advertisements: &[Advertisement]) {
        self.sweep();

        for advertisement in advertisements {
            if !self.matches(advertisement) || self.is_tracked(advertisement) {
                continue;
            }

            info!(kind = self.kind, address = %advertisement.address, "Found device");
            match self.connect(advertisement).await {
                Ok(worker) => {
                    info!(
                        kind = self.kind,
                        address = %advertisement.address,
                        name = advertisement.display_name(),
                        "Connected"
                    );
                    lock(&self.by_address).insert(advertisement.address.clone(), worker.clone());
                    lock(&self.by_name)
                        .insert(advertisement.display_name().to_string(), worker.clone());
                    if let Some(observer) = self.observer() {
                        observer.device_connected(&worker);
                    }
                }
                Err(e) => {
                    warn!(
                        kind = self.kind,
                        address = %advertisement.address,
                        error = %e,
                        "Could not connect, will retry on next scan"
                    );
                }
            }
        }
    }

    fn is_tracked(&self, advertisement: &Advertisement) -> bool {
        if lock(&self.by_address).contains_key(&advertisement.address) {
            return true;
        }
        if lock(&self.by_name).contains_key(advertisement.display_name()) {
            debug!(
                kind = self.kind,
                address = %advertisement.address,
                name = advertisement.display_name(),
                "Name already connected under another address"
            );
            return true;
        }
        false
    }

    /// Remove terminated workers from both tables, reporting each once
    fn sweep(&self) {
        let dead: Vec<Arc<DeviceWorker>> = {
            let mut by_address = lock(&self.by_address);
            let addresses: Vec<String> = by_address
                .iter()
                .filter(|(_, worker)| !worker.is_alive())
                .map(|(address, _)| address.clone())
                .collect();
            addresses
                .iter()
                .filter_map(|address| by_address.remove(address))
                .collect()
        };

        if dead.is_empty() {
            return;
        }

        let mut by_name = lock(&self.by_name);
        by_name.retain(|_, worker| !dead.iter().any(|d| Arc::ptr_eq(d, worker)));
        drop(by_name);

        let observer = self.observer();
        for worker in &dead {
            info!(kind = self.kind, address = worker.address(), "Worker terminated");
            if let Some(observer) = &observer {
                observer.device_disconnected(worker);
            }
        }
    }

    async fn connect(&self, advertisement: &Advertisement) -> Result<Arc<DeviceWorker>, BleError> {
        let link = self
            .central
            .connect(advertisement, &self.service, &self.characteristics)
            .await?;
        let protocol = (self.factory)(advertisement);
        DeviceWorker::start(link, advertisement, protocol, self.poll_timeout).await
    }

    pub fn worker_by_address(&self, address: &str) -> Option<Arc<DeviceWorker>> {
        lock(&self.by_address).get(address).cloned()
    }

    pub fn worker_by_name(&self, name: &str) -> Option<Arc<DeviceWorker>> {
        lock(&self.by_name).get(name).cloned()
    }

    /// Snapshot of the live workers
    pub fn workers(&self) -> Vec<Arc<DeviceWorker>> {
        lock(&self.by_address).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.by_address).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
