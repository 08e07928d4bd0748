//! sensord - sensor node daemon
//!
//! Boots the device lifecycle controller: loads the persisted
//! configuration, brings the network up with recovery-mode fallback,
//! follows up on a firmware update that restarted the node, then runs
//! the sampling loop, the system tick and the configuration API.
//!
//! Usage:
//!   sensord [settings.toml]
//!
//! Without a settings file the daemon runs against the mock WiFi
//! adapter and the mock sensor probe, storing its state under
//! ./sensor-data.

mod settings;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_api::{create_router, AppState};
use sensor_core::{
    ByteStore, ConfigHandle, ConfigLedger, FileStore, MemStore, ReadingsCell, Restarter,
    UpdateJournal, VersionStore,
};
use sensor_net::link::ConnectivityManager;
use sensor_net::sensor::{self, SensorProbe};
use sensor_net::update::{FileSlot, UpdateCoordinator};
use sensor_net::wifi::create_adapter;
use sensor_net::{MqttPublisher, TelemetryReporter};

use settings::{Settings, CONFIG_MEDIUM_CAPACITY, JOURNAL_CAPACITY};

const COMPILED_VERSION: &str = env!("CARGO_PKG_VERSION");

struct Args {
    settings_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args {
        settings_path: None,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => result.settings_path = Some(arg.to_string()),
            other => warn!("ignoring unknown argument: {other}"),
        }
    }
    result
}

fn print_help() {
    eprintln!(
        r#"sensord - sensor node daemon

Usage: sensord [settings.toml]

Options:
  -h, --help    Print this help message

Without a settings file the daemon runs with mock hardware and stores
its state under ./sensor-data. See the [storage], [wifi], [sensor],
[link], [update] and [power] tables of the settings file for tuning.
"#
    );
}

/// [`Restarter`] that ends the process after a grace period, so the
/// supervisor respawns the node. The delay lets the HTTP response that
/// requested the restart reach its caller first.
struct ProcessRestarter;

impl Restarter for ProcessRestarter {
    fn request_restart(&self, delay: Duration) {
        info!(delay_secs = delay.as_secs(), "restart scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("restarting");
            std::process::exit(0);
        });
    }
}

/// Opens a file-backed region, degrading to an unavailable in-memory
/// region when the medium cannot be opened. The node keeps running on
/// defaults and the failure shows up on the status endpoint.
fn open_region(path: std::path::PathBuf, capacity: usize) -> Box<dyn ByteStore> {
    match FileStore::open(&path, capacity) {
        Ok(store) => Box::new(store),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "storage medium unavailable");
            let fallback = MemStore::new(capacity);
            fallback.set_unavailable(true);
            Box::new(fallback)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sensord=info,sensor_api=info,sensor_net=info,sensor_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args();
    let settings = match args.settings_path {
        Some(ref path) => {
            info!(path, "loading settings");
            Settings::load(std::path::Path::new(path))?
        }
        None => {
            info!("no settings file provided, running with mock hardware");
            Settings::default()
        }
    };

    if let Err(err) = std::fs::create_dir_all(&settings.storage.data_dir) {
        warn!(
            dir = %settings.storage.data_dir.display(),
            error = %err,
            "data directory could not be created"
        );
    }

    let version = settings
        .firmware_version
        .as_deref()
        .unwrap_or(COMPILED_VERSION);
    info!(version, "starting sensord");

    // Boot order: config first, then the network, then the follow-up
    // on whatever update restarted us.
    let config = Arc::new(ConfigHandle::open(ConfigLedger::new(open_region(
        settings.storage.config_medium(),
        CONFIG_MEDIUM_CAPACITY,
    ))));

    let adapter = create_adapter(&settings.wifi)?;
    let hardware_id = adapter.hardware_id();
    let link = Arc::new(ConnectivityManager::new(
        adapter,
        Arc::clone(&config),
        settings.link.clone(),
    ));

    let restarter: Arc<dyn Restarter> = Arc::new(ProcessRestarter);
    let updates = Arc::new(UpdateCoordinator::new(
        Arc::clone(&config),
        Arc::clone(&link),
        VersionStore::open(settings.storage.version_file(), version),
        UpdateJournal::new(open_region(settings.storage.journal(), JOURNAL_CAPACITY)),
        Box::new(FileSlot::new(
            settings.storage.staging_image(),
            settings.storage.active_image(),
            settings.storage.slot_capacity,
        )),
        Arc::clone(&restarter),
        settings.update.clone(),
    ));

    let state = link.connect().await;
    info!(state = %state, "network negotiation settled");
    updates.report_pending_outcome().await;

    let probe = sensor::create_probe(&settings.sensor);
    let readings = Arc::new(ReadingsCell::default());
    let mqtt = Arc::new(MqttPublisher::new(Arc::clone(&config), hardware_id));
    let telemetry = Arc::new(TelemetryReporter::new(
        Arc::clone(&config),
        Arc::clone(&link),
    ));

    if settings.one_shot {
        return one_shot_cycle(&settings, &config, &probe, &readings, &mqtt, &telemetry).await;
    }

    tokio::spawn(sensor_task(
        Arc::clone(&config),
        Arc::clone(&link),
        Arc::clone(&probe),
        Arc::clone(&readings),
        Arc::clone(&mqtt),
        Arc::clone(&telemetry),
    ));
    tokio::spawn(system_task(
        Arc::clone(&link),
        Arc::clone(&updates),
        settings.clone(),
    ));

    let app = create_router(AppState::new(config, link, updates, readings, restarter));
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.listen_port));
    info!("configuration API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Samples and publishes on the configured interval while the node is
/// on the network.
async fn sensor_task(
    config: Arc<ConfigHandle>,
    link: Arc<ConnectivityManager>,
    probe: Arc<dyn SensorProbe>,
    readings: Arc<ReadingsCell>,
    mqtt: Arc<MqttPublisher>,
    telemetry: Arc<TelemetryReporter>,
) {
    loop {
        // Interval changes take effect on the next wakeup; a floor
        // keeps a zeroed record from spinning the loop.
        let interval = config.with(|record| record.publishing_interval).max(1000);
        tokio::time::sleep(Duration::from_millis(u64::from(interval))).await;

        if link.state() != sensor_core::ConnectivityState::Associated {
            continue;
        }
        let sample = probe.sample().await;
        let offset = config.with(|record| record.temp_offset);
        let current = sensor::validate(sample, offset);
        readings.set(current);

        if let Err(err) = mqtt.publish(&current) {
            warn!(error = %err, "mqtt publish failed");
        }
        if let Err(err) = telemetry.send(current.vcc).await {
            warn!(error = %err, "telemetry report failed");
        }
    }
}

/// Link health and the periodic update check, on a 10 s tick.
async fn system_task(
    link: Arc<ConnectivityManager>,
    updates: Arc<UpdateCoordinator>,
    settings: Settings,
) {
    let mut last_check: Option<tokio::time::Instant> = None;
    loop {
        tokio::time::sleep(settings.link.health_poll()).await;
        link.maintain().await;

        let due = last_check.map_or(true, |at| at.elapsed() >= settings.update.check_interval());
        if due && link.state() == sensor_core::ConnectivityState::Associated {
            last_check = Some(tokio::time::Instant::now());
            match updates.check_and_apply().await {
                Ok(Some(version)) => info!(version, "firmware update applied"),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "periodic update check failed"),
            }
        }
    }
}

/// Battery duty cycle: one sample and publish, then sleep for as long
/// as the supply voltage dictates and exit so the supervisor respawns
/// the node, the daemon's stand-in for a deep-sleep reset.
async fn one_shot_cycle(
    settings: &Settings,
    config: &Arc<ConfigHandle>,
    probe: &Arc<dyn SensorProbe>,
    readings: &Arc<ReadingsCell>,
    mqtt: &Arc<MqttPublisher>,
    telemetry: &Arc<TelemetryReporter>,
) -> anyhow::Result<()> {
    let sample = probe.sample().await;
    let offset = config.with(|record| record.temp_offset);
    let current = sensor::validate(sample, offset);
    readings.set(current);

    if let Err(err) = mqtt.publish(&current) {
        warn!(error = %err, "mqtt publish failed");
    }
    if let Err(err) = telemetry.send(current.vcc).await {
        warn!(error = %err, "telemetry report failed");
    }

    let nap = settings.power.duration_for(current.vcc);
    info!(
        vcc = current.vcc,
        sleep_secs = nap.as_secs(),
        "duty cycle complete, sleeping"
    );
    tokio::time::sleep(nap).await;
    Ok(())
}
