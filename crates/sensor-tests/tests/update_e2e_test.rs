//! The firmware update protocol against stubbed OTA endpoints.
//!
//! One in-process axum server plays the manifest, image and result
//! endpoints on an ephemeral loopback port. Reboots are simulated by
//! building a fresh stack over the same journal region and version
//! file.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::Value;

use sensor_core::{
    ConfigHandle, ConfigLedger, ConnectivityState, JournalEntry, MemStore, RecordingRestarter,
    Restarter, UpdateJournal, VersionStore,
};
use sensor_net::config::{LinkConfig, MockWifiConfig, UpdateSettings, WifiConfig};
use sensor_net::link::ConnectivityManager;
use sensor_net::update::{MockSlot, UpdateCoordinator, UpdateError};
use sensor_net::wifi::create_adapter;

#[derive(Default)]
struct StubState {
    advertised_version: Mutex<String>,
    image: Mutex<Vec<u8>>,
    /// Serve the image without a Content-Length header.
    stream_image: Mutex<bool>,
    fail_manifest: Mutex<bool>,
    manifest_requests: Mutex<usize>,
    image_requests: Mutex<usize>,
    reports: Mutex<Vec<Value>>,
}

/// In-process OTA server: `GET /fw` answers manifest and image
/// requests apart by the `check_version` parameter, `POST /result`
/// collects outcome reports.
struct OtaStub {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl OtaStub {
    async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/fw", get(firmware))
            .route("/result", post(result))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    fn fw_url(&self) -> String {
        format!("http://{}/fw", self.addr)
    }

    fn result_url(&self) -> String {
        format!("http://{}/result", self.addr)
    }
}

async fn firmware(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("check_version").map(String::as_str) == Some("true") {
        *state.manifest_requests.lock() += 1;
        if *state.fail_manifest.lock() {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let version = state.advertised_version.lock().clone();
        return Json(serde_json::json!({ "version": version })).into_response();
    }

    *state.image_requests.lock() += 1;
    let image = state.image.lock().clone();
    if *state.stream_image.lock() {
        // Chunked transfer: the client never learns the total size.
        let chunks = image
            .chunks(256)
            .map(|chunk| Ok::<_, std::convert::Infallible>(chunk.to_vec()))
            .collect::<Vec<_>>();
        Body::from_stream(stream::iter(chunks)).into_response()
    } else {
        image.into_response()
    }
}

async fn result(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> StatusCode {
    state.reports.lock().push(body);
    StatusCode::OK
}

struct Node {
    coordinator: UpdateCoordinator,
    slot: MockSlot,
    restarter: Arc<RecordingRestarter>,
    journal_region: MemStore,
}

/// Builds an associated node wired against the stub. Reusing
/// `journal_region` and `version_path` across calls simulates a
/// reboot.
async fn boot_node(
    stub: &OtaStub,
    journal_region: MemStore,
    version_path: PathBuf,
) -> Node {
    let config = Arc::new(ConfigHandle::open(ConfigLedger::new(Box::new(
        MemStore::new(1024),
    ))));
    config
        .transact(|record| {
            record.set_field("uid", "node-7");
            record.set_field("ota_url", &stub.fw_url());
            record.set_field("ota_result_url", &stub.result_url());
            record.set_field("ssid", "Home");
            record.set_field("password", "secret1");
        })
        .unwrap();

    let adapter = create_adapter(&WifiConfig::Mock(MockWifiConfig::default())).unwrap();
    let link = Arc::new(ConnectivityManager::new(
        adapter,
        Arc::clone(&config),
        LinkConfig::default(),
    ));
    link.connect().await;
    assert_eq!(link.state(), ConnectivityState::Associated);

    let slot = MockSlot::new();
    let restarter = Arc::new(RecordingRestarter::default());
    let coordinator = UpdateCoordinator::new(
        config,
        link,
        VersionStore::open(&version_path, "1.2.0"),
        UpdateJournal::new(Box::new(journal_region.clone())),
        Box::new(slot.clone()),
        Arc::clone(&restarter) as Arc<dyn Restarter>,
        UpdateSettings::default(),
    );
    Node {
        coordinator,
        slot,
        restarter,
        journal_region,
    }
}

fn journal_entry(region: &MemStore) -> Option<JournalEntry> {
    UpdateJournal::new(Box::new(region.clone())).read()
}

#[tokio::test]
async fn matching_version_means_no_action() {
    let stub = OtaStub::start().await;
    *stub.state.advertised_version.lock() = "1.2.0".to_string();
    let dir = tempfile::tempdir().unwrap();
    let node = boot_node(&stub, MemStore::new(256), dir.path().join("version")).await;

    assert_eq!(node.coordinator.check_and_apply().await.unwrap(), None);
    assert_eq!(*stub.state.manifest_requests.lock(), 1);
    assert_eq!(*stub.state.image_requests.lock(), 0);
    assert_eq!(node.restarter.count(), 0);
}

#[tokio::test]
async fn refused_manifest_reads_as_no_update() {
    let stub = OtaStub::start().await;
    *stub.state.fail_manifest.lock() = true;
    let dir = tempfile::tempdir().unwrap();
    let node = boot_node(&stub, MemStore::new(256), dir.path().join("version")).await;

    assert_eq!(node.coordinator.check_for_update().await, None);
    assert_eq!(*stub.state.image_requests.lock(), 0);
}

#[tokio::test]
async fn newer_version_runs_the_whole_protocol_once() {
    let stub = OtaStub::start().await;
    *stub.state.advertised_version.lock() = "1.3.0".to_string();
    *stub.state.image.lock() = vec![0x42; 2048];
    let dir = tempfile::tempdir().unwrap();
    let version_path = dir.path().join("version");
    let journal_region = MemStore::new(256);

    let node = boot_node(&stub, journal_region.clone(), version_path.clone()).await;
    assert_eq!(
        node.coordinator.check_and_apply().await.unwrap(),
        Some("1.3.0".to_string())
    );

    // Exactly one image fetch, fully staged and activated.
    assert_eq!(*stub.state.image_requests.lock(), 1);
    assert_eq!(node.slot.bytes(), vec![0x42; 2048]);
    assert!(node.slot.activated());
    assert_eq!(node.restarter.count(), 1);
    assert_eq!(node.coordinator.running_version(), "1.3.0");

    // The durability boundary: the journal entry is committed before
    // the restart request.
    let entry = journal_entry(&node.journal_region).expect("journal entry");
    assert_eq!(entry.previous, "1.2.0");
    assert_eq!(entry.target, "1.3.0");

    // "Reboot": a fresh stack over the same journal and version file.
    let rebooted = boot_node(&stub, journal_region.clone(), version_path).await;
    assert_eq!(rebooted.coordinator.running_version(), "1.3.0");
    rebooted.coordinator.report_pending_outcome().await;

    let reports = stub.state.reports.lock().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["status"], "success");
    assert_eq!(reports[0]["uid"], "node-7");
    assert_eq!(reports[0]["old_version"], "1.2.0");
    assert_eq!(reports[0]["new_version"], "1.3.0");
    assert!(journal_entry(&journal_region).is_none());

    // A second boot has nothing left to report.
    rebooted.coordinator.report_pending_outcome().await;
    assert_eq!(stub.state.reports.lock().len(), 1);
}

#[tokio::test]
async fn undeclared_image_size_aborts_before_the_first_byte() {
    let stub = OtaStub::start().await;
    *stub.state.advertised_version.lock() = "1.3.0".to_string();
    *stub.state.image.lock() = vec![0x42; 2048];
    *stub.state.stream_image.lock() = true;
    let dir = tempfile::tempdir().unwrap();
    let node = boot_node(&stub, MemStore::new(256), dir.path().join("version")).await;

    assert!(matches!(
        node.coordinator.apply_update("1.3.0").await,
        Err(UpdateError::SizeUnknown)
    ));
    assert_eq!(node.slot.bytes(), Vec::<u8>::new());
    assert!(journal_entry(&node.journal_region).is_none());
    assert_eq!(node.restarter.count(), 0);
    assert_eq!(node.coordinator.running_version(), "1.2.0");

    // The failure after a found update was reported.
    let reports = stub.state.reports.lock().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["status"], "error");
    assert!(reports[0]["error_code"].is_u64());
}

#[tokio::test]
async fn interruption_before_the_journal_commit_leaves_no_trace() {
    let stub = OtaStub::start().await;
    *stub.state.advertised_version.lock() = "1.3.0".to_string();
    *stub.state.image.lock() = vec![0x42; 2048];
    let dir = tempfile::tempdir().unwrap();
    let version_path = dir.path().join("version");
    let journal_region = MemStore::new(256);

    let node = boot_node(&stub, journal_region.clone(), version_path.clone()).await;
    node.slot.set_fail_finalize();
    assert!(node.coordinator.apply_update("1.3.0").await.is_err());

    assert!(journal_entry(&journal_region).is_none());
    assert!(!node.slot.activated());
    assert_eq!(node.restarter.count(), 0);
    assert_eq!(node.coordinator.running_version(), "1.2.0");

    // The next boot runs the old firmware and sends no success report.
    let error_reports = stub.state.reports.lock().len();
    let rebooted = boot_node(&stub, journal_region, version_path).await;
    assert_eq!(rebooted.coordinator.running_version(), "1.2.0");
    rebooted.coordinator.report_pending_outcome().await;
    assert_eq!(stub.state.reports.lock().len(), error_reports);
}

#[tokio::test]
async fn power_loss_after_the_journal_commit_still_reports_once() {
    let stub = OtaStub::start().await;
    let dir = tempfile::tempdir().unwrap();
    let journal_region = MemStore::new(256);

    // Power was lost between the journal commit and the reboot: the
    // entry exists, the new image may or may not be active.
    UpdateJournal::new(Box::new(journal_region.clone()))
        .write(&JournalEntry {
            previous: "1.2.0".to_string(),
            target: "1.3.0".to_string(),
        })
        .unwrap();

    let node = boot_node(&stub, journal_region.clone(), dir.path().join("version")).await;
    node.coordinator.report_pending_outcome().await;

    let reports = stub.state.reports.lock().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["status"], "success");
    assert!(journal_entry(&journal_region).is_none());
}
