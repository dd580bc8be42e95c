//! Bluetooth Module
//!
//! Keeps live connections to the hub's BLE peripherals.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   advertisements   ┌───────────────┐  connect  ┌──────────────┐
//! │ DiscoveryLoop│ ─────────────────▶ │ DeviceManager │ ────────▶ │ DeviceWorker │
//! │  (scanner)   │                    │ (one / class) │           │ (one / link) │
//! └──────────────┘                    └───────┬───────┘           └──────┬───────┘
//!                                             │ connected /              │ broadcasts
//!                                             │ disconnected             ▼
//!                                             └──────────────▶   Coordinator
//! ```
//!
//! ## Modules
//!
//! - [`link`] - the lower BLE primitives (scan, connect, characteristic I/O)
//! - [`protocol`] - service/characteristic ids and the LED-strip framing
//! - [`worker`] - per-connection loop and the device protocol seam
//! - [`manager`] - advertisement matching and worker lifecycle
//! - [`scanner`] - periodic discovery feeding the managers
//! - [`devices`] - LED strip, thermostat and remote controller protocols

pub mod devices;
pub mod link;
pub mod manager;
pub mod protocol;
pub mod scanner;
pub mod worker;

#[cfg(feature = "ble")]
pub mod bluest_backend;

#[cfg(test)]
pub mod mock;

pub use link::{Advertisement, BleCentral, BleError, BleLink, Notification};
pub use manager::{DeviceManager, LifecycleObserver};
pub use scanner::DiscoveryLoop;
pub use worker::{DeviceProtocol, DeviceWorker, WorkerCommand, WorkerState};
