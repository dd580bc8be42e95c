use crate::domain::broadcast::{Broadcast, Outbox};

/// Minimal capability of every participant on the broadcast bus.
///
/// BLE workers and local endpoints (locks, telemetry socket, persistence) all
/// implement it. The coordinator calls `receive` for every message it drains,
/// so implementations must decide relevance themselves and return quickly.
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    /// React to a broadcast. Most endpoints ignore most messages.
    fn receive(&self, _message: &Broadcast) {}

    /// Outbound queue drained by the coordinator, if this endpoint produces any
    fn outbox(&self) -> Option<&Outbox> {
        None
    }
}
