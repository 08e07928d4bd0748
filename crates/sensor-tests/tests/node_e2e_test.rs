//! Reconfiguration through the REST API and the reboot that follows.
//!
//! The full stack runs in-process behind a real TCP listener and is
//! exercised with a plain HTTP client, then "rebooted" onto the same
//! storage region to show the saved settings drive the next boot.

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use sensor_api::{create_router, AppState};
use sensor_core::{
    ConfigHandle, ConfigLedger, ConnectivityState, MemStore, ReadingsCell, RecordingRestarter,
    Restarter, UpdateJournal, VersionStore,
};
use sensor_net::config::{LinkConfig, MockWifiConfig, UpdateSettings, WifiConfig};
use sensor_net::link::ConnectivityManager;
use sensor_net::update::{MockSlot, UpdateCoordinator};
use sensor_net::wifi::create_adapter;

struct RunningNode {
    base_url: String,
    link: Arc<ConnectivityManager>,
    restarter: Arc<RecordingRestarter>,
    _dir: tempfile::TempDir,
}

/// Boots the node over `config_region` and serves its API on an
/// ephemeral port.
async fn boot_node(config_region: MemStore) -> RunningNode {
    let config = Arc::new(ConfigHandle::open(ConfigLedger::new(Box::new(
        config_region,
    ))));
    let adapter = create_adapter(&WifiConfig::Mock(MockWifiConfig::default())).unwrap();
    let link = Arc::new(ConnectivityManager::new(
        adapter,
        Arc::clone(&config),
        LinkConfig::default(),
    ));
    link.connect().await;

    let dir = tempfile::tempdir().unwrap();
    let restarter = Arc::new(RecordingRestarter::default());
    let updates = Arc::new(UpdateCoordinator::new(
        Arc::clone(&config),
        Arc::clone(&link),
        VersionStore::open(dir.path().join("version"), "1.2.0"),
        UpdateJournal::new(Box::new(MemStore::new(256))),
        Box::new(MockSlot::new()),
        Arc::clone(&restarter) as Arc<dyn Restarter>,
        UpdateSettings::default(),
    ));
    updates.report_pending_outcome().await;

    let state = AppState::new(
        config,
        Arc::clone(&link),
        updates,
        Arc::new(ReadingsCell::default()),
        Arc::clone(&restarter) as Arc<dyn Restarter>,
    );
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RunningNode {
        base_url: format!("http://{addr}"),
        link,
        restarter,
        _dir: dir,
    }
}

#[tokio::test]
async fn recovery_node_is_reconfigured_and_joins_after_the_reboot() {
    let region = MemStore::new(1024);
    let client = reqwest::Client::new();

    // First boot: nothing configured, the node sits in recovery mode
    // hosting its configuration interface.
    let node = boot_node(region.clone()).await;
    assert_eq!(node.link.state(), ConnectivityState::RecoveryMode);

    // Unauthenticated requests are challenged.
    let response = client
        .get(format!("{}/api/status", node.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some("Basic realm=\"Secure Area\"")
    );

    let status: Value = client
        .get(format!("{}/api/status", node.base_url))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], "recovery_mode");
    assert_eq!(status["version"], "1.2.0");

    // An administrator on the recovery network saves credentials.
    let outcome: Value = client
        .post(format!("{}/api/config/wifi", node.base_url))
        .basic_auth("admin", Some("admin"))
        .json(&json!({"ssid": "Home", "password": "secret1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["saved"], json!(["ssid", "password"]));
    assert_eq!(outcome["rejected"], json!([]));
    assert_eq!(outcome["restarting"], json!(true));
    assert_eq!(node.restarter.count(), 1);

    // The reboot the save scheduled: the same region drives a fresh
    // stack, which now joins the infrastructure network.
    region.power_loss();
    let node = boot_node(region.clone()).await;
    assert_eq!(node.link.state(), ConnectivityState::Associated);

    let status: Value = client
        .get(format!("{}/api/status", node.base_url))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], "associated");
    assert_eq!(status["storage"]["layer_faults"], json!([]));
}

#[tokio::test]
async fn node_settings_save_round_trips_over_the_wire() {
    let region = MemStore::new(1024);
    let client = reqwest::Client::new();

    let node = boot_node(region.clone()).await;
    let outcome: Value = client
        .post(format!("{}/api/config/node", node.base_url))
        .basic_auth("admin", Some("admin"))
        .json(&json!({
            "uid": "node-7",
            "ota_url": "http://ota.example.net/fw",
            "publishingInterval": 30_000,
            "temp_offset": -1.5,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["rejected"], json!([]));

    region.power_loss();
    let node = boot_node(region).await;
    let config: Value = client
        .get(format!("{}/api/config", node.base_url))
        .basic_auth("admin", Some("admin"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(config["uid"], "node-7");
    assert_eq!(config["ota_url"], "http://ota.example.net/fw");
    assert_eq!(config["publishingInterval"], 30_000);
    assert_eq!(config["temp_offset"], -1.5);
}
