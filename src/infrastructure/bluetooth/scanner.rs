//! Discovery loop
//!
//! Scans periodically and hands every result to each device manager. Runs
//! on a single task so the managers' tables are only mutated from here.

use crate::infrastructure::bluetooth::link::BleCentral;
use crate::infrastructure::bluetooth::manager::DeviceManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause after a failed scan before trying again
const SCAN_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct DiscoveryLoop {
    central: Arc<dyn BleCentral>,
    managers: Vec<Arc<DeviceManager>>,
    scan_duration: Duration,
}

impl DiscoveryLoop {
    pub fn new(
        central: Arc<dyn BleCentral>,
        managers: Vec<Arc<DeviceManager>>,
        scan_duration: Duration,
    ) -> Self {
        Self {
            central,
            managers,
            scan_duration,
        }
    }

    /// One scan, fed to every manager
    pub async fn cycle(&self) {
        match self.central.scan(self.scan_duration).await {
            Ok(advertisements) => {
                debug!(count = advertisements.len(), "Scan complete");
                for manager in &self.managers {
                    manager.found_devices(&advertisements).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Scan failed");
                tokio::time::sleep(SCAN_RETRY_DELAY).await;
            }
        }
    }

    pub async fn run(self) {
        info!(
            managers = self.managers.len(),
            scan_seconds = self.scan_duration.as_secs_f64(),
            "Starting discovery"
        );
        loop {
            self.cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::{advertisement, MockCentral};
    use crate::infrastructure::bluetooth::protocol;
    use crate::infrastructure::bluetooth::worker::{DeviceProtocol, WorkerCommand};
    use crate::domain::broadcast::{Broadcast, Outbox};
    use crate::domain::capability::CapabilityId;
    use crate::infrastructure::bluetooth::link::Notification;

    struct Silent;

    impl DeviceProtocol for Silent {
        fn subscriptions(&self) -> Vec<CapabilityId> {
            vec![]
        }
        fn decode(&self, _: &Notification, _: &Outbox) {}
        fn encode(&self, _: &Broadcast) -> Vec<WorkerCommand> {
            vec![]
        }
    }

    fn manager(central: Arc<MockCentral>, service: CapabilityId) -> Arc<DeviceManager> {
        Arc::new(DeviceManager::new(
            "test",
            central,
            service,
            vec![],
            |_| Arc::new(Silent),
            Duration::from_millis(10),
        ))
    }

    #[tokio::test]
    async fn test_each_manager_picks_its_own_class() {
        let central = Arc::new(MockCentral::new());
        central.advertise(advertisement("aa:01", "strip", &[&protocol::uart_service()]));
        central.advertise(advertisement("aa:02", "remote", &[&protocol::remote_service()]));
        central.advertise(advertisement("aa:03", "speaker", &[]));

        let uart = manager(central.clone(), protocol::uart_service());
        let remote = manager(central.clone(), protocol::remote_service());
        let discovery = DiscoveryLoop::new(
            central.clone(),
            vec![uart.clone(), remote.clone()],
            Duration::from_millis(1),
        );

        discovery.cycle().await;

        assert!(uart.worker_by_address("aa:01").is_some());
        assert!(remote.worker_by_address("aa:02").is_some());
        assert_eq!(uart.len() + remote.len(), 2);
    }
}
