//! Device worker: the single owner of one live BLE connection.
//!
//! ```text
//!   start()            run loop                      exit
//! Connecting ──────▶ Running ──(fault / disconnect)──▶ Terminated
//!  subscribe          wait <= poll_timeout for a notification, decode it
//!                     pop at most one queued command, execute it
//! ```
//!
//! Callers never touch the link. They enqueue [`WorkerCommand`]s through
//! [`Endpoint::receive`] and the loop executes them, so a link is only ever
//! driven from one task. A terminated worker is never restarted; the device
//! manager reaps it and builds a new one on the next matching advertisement.

use crate::domain::broadcast::{Broadcast, Outbox};
use crate::domain::capability::CapabilityId;
use crate::domain::endpoint::Endpoint;
use crate::infrastructure::bluetooth::link::{Advertisement, BleError, BleLink, Notification};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, trace, warn};

/// Deferred action executed inside the worker loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Write {
        characteristic: CapabilityId,
        bytes: Vec<u8>,
    },
}

/// Device-class specific behavior, chosen by the device manager at construction
pub trait DeviceProtocol: Send + Sync {
    /// Characteristics to enable notifications on before the loop starts
    fn subscriptions(&self) -> Vec<CapabilityId>;

    /// Turn a notification into broadcasts. Runs on the worker task.
    fn decode(&self, notification: &Notification, outbox: &Outbox);

    /// Commands this device should execute for `message`. Runs on the
    /// coordinator thread; must not block.
    fn encode(&self, message: &Broadcast) -> Vec<WorkerCommand>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Terminated,
}

/// Clears the liveness flag however the loop ends, panics included
struct TerminationGuard(Arc<AtomicBool>);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DeviceWorker {
    address: String,
    name: String,
    protocol: Arc<dyn DeviceProtocol>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    outbox: Arc<Outbox>,
    alive: Arc<AtomicBool>,
}

impl DeviceWorker {
    /// Open the notifications the protocol needs and spawn the loop.
    ///
    /// On failure the link is closed and the error returned; nothing is spawned.
    pub async fn start(
        mut link: Box<dyn BleLink>,
        advertisement: &Advertisement,
        protocol: Arc<dyn DeviceProtocol>,
        poll_timeout: Duration,
    ) -> Result<Arc<Self>, BleError> {
        for characteristic in protocol.subscriptions() {
            if let Err(e) = link.subscribe(&characteristic).await {
                link.close().await;
                return Err(e);
            }
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let outbox = Arc::new(Outbox::new());
        let alive = Arc::new(AtomicBool::new(true));

        let worker = Arc::new(Self {
            address: advertisement.address.clone(),
            name: advertisement.display_name().to_string(),
            protocol: protocol.clone(),
            commands,
            outbox: outbox.clone(),
            alive: alive.clone(),
        });

        let address = worker.address.clone();
        tokio::spawn(async move {
            let _guard = TerminationGuard(alive);
            run(link, rx, protocol, outbox, poll_timeout, &address).await;
        });

        Ok(worker)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        if self.is_alive() {
            WorkerState::Running
        } else {
            WorkerState::Terminated
        }
    }

    /// Queue a command for the loop. Dropped silently once terminated.
    pub fn enqueue(&self, command: WorkerCommand) {
        if self.commands.send(command).is_err() {
            debug!(address = %self.address, "Worker gone, command dropped");
        }
    }
}

impl Endpoint for DeviceWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, message: &Broadcast) {
        if !self.is_alive() {
            return;
        }
        for command in self.protocol.encode(message) {
            trace!(address = %self.address, ?command, "Queueing command");
            self.enqueue(command);
        }
    }

    fn outbox(&self) -> Option<&Outbox> {
        Some(self.outbox.as_ref())
    }
}

async fn run(
    mut link: Box<dyn BleLink>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    protocol: Arc<dyn DeviceProtocol>,
    outbox: Arc<Outbox>,
    poll_timeout: Duration,
    address: &str,
) {
    debug!(address, "Worker loop started");
    loop {
        match link.next_notification(poll_timeout).await {
            Ok(Some(notification)) => {
                trace!(
                    address,
                    characteristic = %notification.characteristic,
                    data = %hex::encode(&notification.data),
                    "Notification"
                );
                protocol.decode(&notification, &outbox);
            }
            Ok(None) => {}
            Err(e) => return terminate(&mut link, e, address).await,
        }

        match commands.try_recv() {
            Ok(WorkerCommand::Write {
                characteristic,
                bytes,
            }) => {
                debug!(address, %characteristic, bytes = %hex::encode(&bytes), "Write");
                if let Err(e) = link.write(&characteristic, &bytes).await {
                    return terminate(&mut link, e, address).await;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                warn!(address, "Worker handle dropped, closing link");
                link.close().await;
                return;
            }
        }
    }
}

async fn terminate(link: &mut Box<dyn BleLink>, e: BleError, address: &str) {
    if e.is_disconnect() {
        info!(address, "Device disconnected");
    } else {
        error!(address, error = %e, "Connection fault, closing link");
        link.close().await;
    }
}
