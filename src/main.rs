use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use van_automation_hub::coordinator::Coordinator;
use van_automation_hub::domain::directory::Directory;
use van_automation_hub::domain::endpoint::Endpoint;
use van_automation_hub::domain::settings::{Settings, SettingsService};
use van_automation_hub::domain::snapshot::{SharedSnapshot, Snapshot};
use van_automation_hub::infrastructure::gpio::{LockEndpoint, ShellGpio};
use van_automation_hub::infrastructure::logging::init_logger;
use van_automation_hub::infrastructure::persistence::SnapshotPersister;
use van_automation_hub::infrastructure::telemetry::TelemetryEndpoint;

#[derive(Debug, Parser)]
#[command(version, about = "BLE and GPIO automation hub for a camper van")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the default settings as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        println!("{}", serde_json::to_string_pretty(&Settings::default())?);
        return Ok(());
    }

    let settings_service = match cli.config {
        Some(path) => SettingsService::open(path)?,
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let _logging_guard = init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!(config = %settings_service.path().display(), "Starting van automation hub");

    let directory = Arc::new(settings.directory());
    let snapshot: SharedSnapshot = Arc::new(Mutex::new(Snapshot::new()));

    let mut endpoints: Vec<Arc<dyn Endpoint>> = vec![
        Arc::new(SnapshotPersister::new(
            snapshot.clone(),
            settings.snapshot_path.clone(),
        )),
        Arc::new(LockEndpoint::new(
            Arc::new(ShellGpio::new(settings.locks.gpio_command.clone())),
            &settings.locks,
        )),
    ];
    match TelemetryEndpoint::spawn(&settings.telemetry_socket) {
        Ok(telemetry) => endpoints.push(telemetry),
        Err(e) => warn!("Telemetry socket disabled: {:#}", e),
    }

    let coordinator = Arc::new(Coordinator::new(directory.clone(), snapshot, endpoints));
    let drain = coordinator
        .clone()
        .run(Duration::from_millis(settings.drain_period_ms))
        .context("Starting coordinator thread")?;

    if settings.enable_bluetooth {
        start_discovery(&settings, directory, coordinator)?;
    } else {
        info!("Bluetooth disabled in settings");
    }

    if drain.join().is_err() {
        error!("Coordinator thread panicked");
        anyhow::bail!("coordinator stopped");
    }
    Ok(())
}

/// BLE discovery on its own thread with a single-threaded runtime; device
/// workers are tasks on that runtime
#[cfg(feature = "ble")]
fn start_discovery(
    settings: &Settings,
    directory: Arc<Directory>,
    coordinator: Arc<Coordinator>,
) -> Result<()> {
    use van_automation_hub::infrastructure::bluetooth::bluest_backend::BluestCentral;
    use van_automation_hub::infrastructure::bluetooth::{
        devices, BleCentral, DiscoveryLoop, LifecycleObserver,
    };

    let scan = Duration::from_secs(settings.scan_seconds);
    let poll_timeout = Duration::from_millis(settings.worker_poll_timeout_ms);

    std::thread::Builder::new()
        .name("bluetooth".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime for Bluetooth: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let central: Arc<dyn BleCentral> = match BluestCentral::new().await {
                    Ok(central) => Arc::new(central),
                    Err(e) => {
                        error!(error = %e, "Bluetooth unavailable, discovery disabled");
                        return;
                    }
                };

                let managers = devices::managers(central.clone(), directory, poll_timeout);
                let observer: Arc<dyn LifecycleObserver> = coordinator;
                for manager in &managers {
                    manager.attach(Arc::downgrade(&observer));
                }

                DiscoveryLoop::new(central, managers, scan).run().await;
            });
        })
        .context("Starting Bluetooth thread")?;
    Ok(())
}

#[cfg(not(feature = "ble"))]
fn start_discovery(
    _settings: &Settings,
    _directory: Arc<Directory>,
    _coordinator: Arc<Coordinator>,
) -> Result<()> {
    warn!("Built without the `ble` feature, device discovery is off");
    Ok(())
}
