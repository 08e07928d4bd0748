//! Firmware update orchestration.
//!
//! The coordinator downloads a staged image, journals the pending
//! outcome, activates the image and asks for a restart. The journal
//! commit is the durability boundary: everything before it leaves the
//! running firmware untouched, and the entry it writes is what lets
//! the next boot report the outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use url::Url;

use sensor_core::journal::{JournalEntry, UpdateJournal};
use sensor_core::ledger::ConfigHandle;
use sensor_core::models::{ConnectivityState, Restarter};
use sensor_core::version::VersionStore;

use crate::config::UpdateSettings;
use crate::endpoint::service_url;
use crate::link::ConnectivityManager;
use crate::update::slot::{FirmwareSlot, SlotError};

/// Pause between a successful activation and the restart request,
/// long enough for the HTTP response that triggered the update to
/// reach the caller.
const RESTART_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update endpoint or device uid not configured")]
    NotConfigured,

    #[error("not associated with a network")]
    NotAssociated,

    #[error("firmware fetch failed: {0}")]
    FetchFailure(String),

    #[error("firmware size not declared by the server")]
    SizeUnknown,

    #[error("received {written} bytes of a declared {declared}")]
    WriteShortfall { written: u64, declared: u64 },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("update journal write failed: {0}")]
    Journal(#[source] sensor_core::error::StoreError),

    #[error("outcome report delivery failed: {0}")]
    ReportDelivery(String),
}

impl UpdateError {
    /// Stable wire code used in error reports.
    pub fn error_code(&self) -> u8 {
        match self {
            UpdateError::NotConfigured => 1,
            UpdateError::NotAssociated => 2,
            UpdateError::FetchFailure(_) => 3,
            UpdateError::SizeUnknown => 4,
            UpdateError::WriteShortfall { .. } => 5,
            UpdateError::Slot(_) => 6,
            UpdateError::Journal(_) => 7,
            UpdateError::ReportDelivery(_) => 8,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    version: String,
}

pub struct UpdateCoordinator {
    http: Client,
    config: Arc<ConfigHandle>,
    link: Arc<ConnectivityManager>,
    version: Mutex<VersionStore>,
    journal: Mutex<UpdateJournal>,
    slot: AsyncMutex<Box<dyn FirmwareSlot>>,
    restarter: Arc<dyn Restarter>,
    timings: UpdateSettings,
}

impl UpdateCoordinator {
    pub fn new(
        config: Arc<ConfigHandle>,
        link: Arc<ConnectivityManager>,
        version: VersionStore,
        journal: UpdateJournal,
        slot: Box<dyn FirmwareSlot>,
        restarter: Arc<dyn Restarter>,
        timings: UpdateSettings,
    ) -> Self {
        Self {
            http: Client::new(),
            config,
            link,
            version: Mutex::new(version),
            journal: Mutex::new(journal),
            slot: AsyncMutex::new(slot),
            restarter,
            timings,
        }
    }

    pub fn running_version(&self) -> String {
        self.version.lock().current().to_string()
    }

    /// Asks the update endpoint whether a different firmware version is
    /// available. Every failure mode reads as "no update": routine
    /// polling must not alarm anyone over a flaky manifest server.
    pub async fn check_for_update(&self) -> Option<String> {
        if self.link.state() != ConnectivityState::Associated {
            return None;
        }
        let (uid, ota_url) = self
            .config
            .with(|record| (record.uid.clone(), record.ota_url.clone()));
        if uid.is_empty() || ota_url.is_empty() {
            return None;
        }
        let url = match manifest_url(&ota_url, &uid) {
            Ok(url) => url,
            Err(err) => {
                debug!(error = %err, "unusable update endpoint");
                return None;
            }
        };

        let response = match self
            .http
            .get(url)
            .timeout(self.timings.manifest_timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "version check failed");
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            debug!(status = %response.status(), "version check refused");
            return None;
        }
        let manifest: Manifest = match response.json().await {
            Ok(manifest) => manifest,
            Err(err) => {
                debug!(error = %err, "version check returned an unexpected body");
                return None;
            }
        };

        let target = manifest.version.trim().to_string();
        if target.is_empty() || target == self.running_version() {
            return None;
        }
        Some(target)
    }

    /// Downloads and activates `target`, then requests a restart.
    ///
    /// On any failure the running firmware is left untouched and a
    /// best-effort error report goes out.
    pub async fn apply_update(&self, target: &str) -> Result<(), UpdateError> {
        match self.perform(target).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(version = target, error = %err, "firmware update failed");
                if let Err(report_err) = self.send_error_report(&err).await {
                    warn!(error = %report_err, "update error report not delivered");
                }
                Err(err)
            }
        }
    }

    /// One periodic tick: check, and apply when something newer exists.
    /// Silent when there is nothing to do.
    pub async fn check_and_apply(&self) -> Result<Option<String>, UpdateError> {
        let Some(target) = self.check_for_update().await else {
            return Ok(None);
        };
        info!(version = %target, "firmware update available");
        self.apply_update(&target).await?;
        Ok(Some(target))
    }

    /// Boot-time follow-up for an update that restarted the device: if
    /// the journal holds an entry, report it once and clear it. The
    /// entry is cleared even when the report cannot be delivered, so a
    /// dead report endpoint cannot wedge the device into re-reporting.
    pub async fn report_pending_outcome(&self) {
        let Some(entry) = self.journal.lock().read() else {
            return;
        };
        info!(
            previous = %entry.previous,
            target = %entry.target,
            "reporting the outcome of the last update"
        );

        if !self.link.ensure_associated(self.timings.join_timeout()).await {
            warn!("no association, update outcome stays unreported");
        } else if let Err(err) = self.send_success_report(&entry).await {
            warn!(error = %err, "update outcome report not delivered");
        }

        if let Err(err) = self.journal.lock().clear() {
            warn!(error = %err, "update journal could not be cleared");
        }
    }

    async fn perform(&self, target: &str) -> Result<(), UpdateError> {
        let (uid, ota_url) = self
            .config
            .with(|record| (record.uid.clone(), record.ota_url.clone()));
        if uid.is_empty() || ota_url.is_empty() {
            return Err(UpdateError::NotConfigured);
        }
        if self.link.state() != ConnectivityState::Associated {
            return Err(UpdateError::NotAssociated);
        }
        let running = self.running_version();

        let url = image_url(&ota_url, &uid, &running)
            .map_err(|err| UpdateError::FetchFailure(err.to_string()))?;
        info!(version = target, url = %url, "downloading firmware image");
        let response = self
            .http
            .get(url)
            .timeout(self.timings.image_timeout())
            .send()
            .await
            .map_err(|err| UpdateError::FetchFailure(err.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(UpdateError::FetchFailure(format!(
                "image request returned {}",
                response.status()
            )));
        }
        let declared = match response.content_length() {
            Some(len) if len > 0 => len,
            _ => return Err(UpdateError::SizeUnknown),
        };

        let mut slot = self.slot.lock().await;
        slot.begin(declared)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    slot.abort();
                    return Err(UpdateError::FetchFailure(err.to_string()));
                }
            };
            if let Err(err) = slot.write(&chunk) {
                slot.abort();
                return Err(err.into());
            }
        }
        let written = slot.written();
        if written != declared {
            slot.abort();
            return Err(UpdateError::WriteShortfall { written, declared });
        }
        if let Err(err) = slot.finalize() {
            slot.abort();
            return Err(err.into());
        }
        debug!(bytes = declared, "firmware image staged");

        // Durability boundary: once this entry is committed, the next
        // boot will report the outcome.
        let entry = JournalEntry {
            previous: running.clone(),
            target: target.to_string(),
        };
        if let Err(err) = self.journal.lock().write(&entry) {
            slot.abort();
            return Err(UpdateError::Journal(err));
        }

        if let Err(err) = self.version.lock().save(target) {
            warn!(error = %err, "running version could not be persisted");
        }

        if let Err(err) = slot.activate() {
            if let Err(journal_err) = self.journal.lock().clear() {
                warn!(error = %journal_err, "stale update journal entry left behind");
            }
            if let Err(version_err) = self.version.lock().save(&running) {
                warn!(error = %version_err, "running version left pointing at {target}");
            }
            return Err(err.into());
        }

        info!(
            previous = %running,
            version = target,
            "firmware update applied, restarting"
        );
        self.restarter.request_restart(RESTART_DELAY);
        Ok(())
    }

    async fn send_success_report(&self, entry: &JournalEntry) -> Result<(), UpdateError> {
        let body = json!({
            "uid": self.config.with(|record| record.uid.clone()),
            "status": "success",
            "old_version": entry.previous,
            "new_version": entry.target,
        });
        self.post_report(body).await
    }

    async fn send_error_report(&self, failure: &UpdateError) -> Result<(), UpdateError> {
        if self.link.state() != ConnectivityState::Associated {
            debug!("not associated, skipping the update error report");
            return Ok(());
        }
        let body = json!({
            "uid": self.config.with(|record| record.uid.clone()),
            "status": "error",
            "error_code": failure.error_code(),
            "error_message": failure.to_string(),
        });
        self.post_report(body).await
    }

    async fn post_report(&self, body: serde_json::Value) -> Result<(), UpdateError> {
        let (uid, report_url) = self
            .config
            .with(|record| (record.uid.clone(), record.ota_result_url.clone()));
        if uid.is_empty() || report_url.is_empty() {
            debug!("no result endpoint configured, skipping the update report");
            return Ok(());
        }
        let url = service_url(&report_url)
            .map_err(|err| UpdateError::ReportDelivery(err.to_string()))?;
        self.http
            .post(url)
            .timeout(self.timings.report_timeout())
            .json(&body)
            .send()
            .await
            .map_err(|err| UpdateError::ReportDelivery(err.to_string()))?;
        Ok(())
    }
}

fn manifest_url(ota_url: &str, uid: &str) -> Result<Url, url::ParseError> {
    let mut url = service_url(ota_url)?;
    url.query_pairs_mut()
        .append_pair("uid", uid)
        .append_pair("check_version", "true");
    Ok(url)
}

fn image_url(ota_url: &str, uid: &str, running: &str) -> Result<Url, url::ParseError> {
    let mut url = service_url(ota_url)?;
    url.query_pairs_mut()
        .append_pair("uid", uid)
        .append_pair("current_version", running)
        .append_pair("check_version", "false");
    Ok(url)
}
