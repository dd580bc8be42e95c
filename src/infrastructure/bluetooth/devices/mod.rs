//! Device classes the hub knows how to drive.
//!
//! - [`led_strip`] - LED strips behind a Nordic UART bridge
//! - [`thermostat`] - temperature/humidity sensor with heating control
//! - [`remote`] - the phone remote control

pub mod led_strip;
pub mod remote;
pub mod thermostat;

use crate::domain::directory::Directory;
use crate::infrastructure::bluetooth::link::BleCentral;
use crate::infrastructure::bluetooth::manager::DeviceManager;
use crate::infrastructure::bluetooth::protocol;
use std::sync::Arc;
use std::time::Duration;

pub use led_strip::LedStrip;
pub use remote::RemoteController;
pub use thermostat::Thermostat;

/// One manager per device class, all sharing `central`
pub fn managers(
    central: Arc<dyn BleCentral>,
    directory: Arc<Directory>,
    poll_timeout: Duration,
) -> Vec<Arc<DeviceManager>> {
    let led = DeviceManager::new(
        "led_strip",
        central.clone(),
        protocol::uart_service(),
        vec![protocol::uart_tx(), protocol::uart_rx()],
        move |ad| Arc::new(LedStrip::new(&ad.address, &directory)),
        poll_timeout,
    );

    let thermostat = DeviceManager::new(
        "thermostat",
        central.clone(),
        protocol::thermostat_service(),
        vec![
            protocol::thermostat_temperature(),
            protocol::thermostat_humidity(),
            protocol::thermostat_on_off(),
            protocol::thermostat_target(),
        ],
        |_| Arc::new(Thermostat::new()),
        poll_timeout,
    );

    let remote = DeviceManager::new(
        "remote",
        central,
        protocol::remote_service(),
        vec![protocol::remote_command(), protocol::remote_devices()],
        |_| Arc::new(RemoteController::new()),
        poll_timeout,
    );

    vec![Arc::new(led), Arc::new(thermostat), Arc::new(remote)]
}
