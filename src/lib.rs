//! Van automation hub.
//!
//! Connects to BLE peripherals (LED strips, a thermostat, phone remotes),
//! local GPIO locks and a telemetry socket, and routes broadcasts between
//! them through a single [`coordinator::Coordinator`].

pub mod coordinator;
pub mod domain;
pub mod infrastructure;
