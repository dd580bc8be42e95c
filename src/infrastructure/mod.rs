pub mod bluetooth;
pub mod gpio;
pub mod logging;
pub mod persistence;
pub mod telemetry;
