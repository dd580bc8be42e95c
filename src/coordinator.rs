//! Broadcast router.
//!
//! The coordinator is the single owner of the hub's shared state: the live
//! device set and the snapshot. Every other component talks to it only by
//! pushing broadcasts into its own outbox. A drain cycle empties every outbox
//! (its own first, then fixed endpoints, then device workers), records global
//! messages into the snapshot and hands each message to every endpoint.
//!
//! Ordering is FIFO within one outbox only. Across outboxes the cycle goes
//! round-robin, so no total order exists and none is relied on.

use crate::domain::broadcast::{Broadcast, Outbox};
use crate::domain::directory::Directory;
use crate::domain::endpoint::Endpoint;
use crate::domain::snapshot::SharedSnapshot;
use crate::infrastructure::bluetooth::manager::LifecycleObserver;
use crate::infrastructure::bluetooth::worker::DeviceWorker;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace};

pub struct Coordinator {
    directory: Arc<Directory>,
    /// Connected workers by address
    live: Mutex<BTreeMap<String, Arc<DeviceWorker>>>,
    snapshot: SharedSnapshot,
    outbox: Outbox,
    endpoints: Vec<Arc<dyn Endpoint>>,
}

impl Coordinator {
    /// `endpoints` are the local ones (locks, telemetry, persistence); BLE
    /// workers join and leave through [`LifecycleObserver`].
    pub fn new(
        directory: Arc<Directory>,
        snapshot: SharedSnapshot,
        endpoints: Vec<Arc<dyn Endpoint>>,
    ) -> Self {
        Self {
            directory,
            live: Mutex::default(),
            snapshot,
            outbox: Outbox::new(),
            endpoints,
        }
    }

    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    /// Logical ids of the connected devices, e.g. `"1T"`
    pub fn connected_summary(&self) -> String {
        self.directory.summarize(self.live().keys())
    }

    fn live(&self) -> MutexGuard<'_, BTreeMap<String, Arc<DeviceWorker>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_devices(&self) {
        let summary = self.connected_summary();
        info!(devices = %summary, "Connected devices changed");
        self.outbox.push(Broadcast::global("Devices", summary));
    }

    /// Empty every outbox once and route what came out.
    /// Returns the number of messages routed.
    pub fn drain_cycle(&self) -> usize {
        let workers: Vec<Arc<DeviceWorker>> = self.live().values().cloned().collect();

        let mut messages = self.outbox.drain();
        for endpoint in &self.endpoints {
            if let Some(outbox) = endpoint.outbox() {
                messages.extend(outbox.drain());
            }
        }
        for worker in &workers {
            if let Some(outbox) = worker.outbox() {
                messages.extend(outbox.drain());
            }
        }

        for message in &messages {
            trace!(%message, "Routing");
            if message.is_global() {
                self.snapshot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(message);
            }
            for endpoint in &self.endpoints {
                endpoint.receive(message);
            }
            for worker in &workers {
                worker.receive(message);
            }
        }

        if !messages.is_empty() {
            debug!(count = messages.len(), "Drain cycle");
        }
        messages.len()
    }

    /// Drain every `period` on a dedicated thread, forever
    pub fn run(self: Arc<Self>, period: Duration) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("coordinator".into())
            .spawn(move || {
                info!(period_ms = period.as_millis() as u64, "Coordinator running");
                loop {
                    self.drain_cycle();
                    std::thread::sleep(period);
                }
            })
    }
}

impl LifecycleObserver for Coordinator {
    fn device_connected(&self, worker: &Arc<DeviceWorker>) {
        self.live()
            .insert(worker.address().to_string(), worker.clone());
        self.publish_devices();
    }

    fn device_disconnected(&self, worker: &Arc<DeviceWorker>) {
        let removed = {
            let mut live = self.live();
            match live.get(worker.address()) {
                Some(current) if Arc::ptr_eq(current, worker) => {
                    live.remove(worker.address());
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.publish_devices();
        }
    }
}
