//! WiFi control through wpa_supplicant's control interface.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{WifiAdapter, WifiError};
use crate::config::WpaConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Adapter driving one interface via the `wpa_cli` front end.
///
/// Infrastructure joins use a regular network block; recovery mode
/// uses a mode=2 block, which wpa_supplicant brings up as an access
/// point on the same interface.
pub struct WpaCliAdapter {
    config: WpaConfig,
    hardware_id: String,
}

impl WpaCliAdapter {
    pub fn new(config: WpaConfig) -> Result<Self, WifiError> {
        let address_path = format!("/sys/class/net/{}/address", config.interface);
        let raw = std::fs::read_to_string(&address_path)
            .map_err(|err| WifiError::CommandFailed(format!("{address_path}: {err}")))?;
        let hardware_id = raw.trim().replace(':', "").to_ascii_uppercase();
        Ok(Self {
            config,
            hardware_id,
        })
    }

    async fn wpa_cli(&self, args: &[&str]) -> Result<String, WifiError> {
        let output = Command::new(&self.config.wpa_cli)
            .arg("-i")
            .arg(&self.config.interface)
            .args(args)
            .output()
            .await
            .map_err(|err| {
                WifiError::CommandFailed(format!("{}: {err}", self.config.wpa_cli))
            })?;
        if !output.status.success() {
            return Err(WifiError::CommandFailed(format!(
                "wpa_cli {} exited with {}",
                args.join(" "),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn expect_ok(&self, args: &[&str]) -> Result<(), WifiError> {
        let reply = self.wpa_cli(args).await?;
        if reply != "OK" {
            return Err(WifiError::CommandFailed(format!(
                "wpa_cli {}: {reply}",
                args.join(" ")
            )));
        }
        Ok(())
    }

    /// Replaces all known networks with one new block and returns its
    /// id.
    async fn configure_network(&self, entries: &[(&str, String)]) -> Result<String, WifiError> {
        self.wpa_cli(&["remove_network", "all"]).await?;
        let id = self.wpa_cli(&["add_network"]).await?;
        for (key, value) in entries {
            self.expect_ok(&["set_network", &id, key, value.as_str()])
                .await?;
        }
        Ok(id)
    }

    async fn wpa_state(&self) -> Result<String, WifiError> {
        let status = self.wpa_cli(&["status"]).await?;
        Ok(status
            .lines()
            .find_map(|line| line.strip_prefix("wpa_state="))
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl WifiAdapter for WpaCliAdapter {
    async fn join(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError> {
        let id = self
            .configure_network(&[
                ("ssid", format!("\"{ssid}\"")),
                ("psk", format!("\"{passphrase}\"")),
            ])
            .await?;
        self.expect_ok(&["select_network", &id]).await?;
        loop {
            match self.wpa_state().await?.as_str() {
                "COMPLETED" => {
                    debug!(ssid, "association completed");
                    return Ok(());
                }
                state => debug!(state, "waiting for association"),
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn start_access_point(
        &self,
        ssid: &str,
        passphrase: Option<&str>,
    ) -> Result<(), WifiError> {
        let mut entries = vec![("ssid", format!("\"{ssid}\"")), ("mode", "2".to_string())];
        match passphrase {
            Some(psk) => entries.push(("psk", format!("\"{psk}\""))),
            None => entries.push(("key_mgmt", "NONE".to_string())),
        }
        let id = self
            .configure_network(&entries)
            .await
            .map_err(|err| WifiError::AccessPointFailed(err.to_string()))?;
        self.expect_ok(&["select_network", &id])
            .await
            .map_err(|err| WifiError::AccessPointFailed(err.to_string()))
    }

    async fn disconnect(&self) {
        if let Err(err) = self.expect_ok(&["disconnect"]).await {
            warn!(error = %err, "disconnect failed");
        }
    }

    async fn link_up(&self) -> bool {
        matches!(self.wpa_state().await.as_deref(), Ok("COMPLETED"))
    }

    async fn signal_strength(&self) -> Option<i32> {
        let reply = self.wpa_cli(&["signal_poll"]).await.ok()?;
        reply
            .lines()
            .find_map(|line| line.strip_prefix("RSSI="))?
            .trim()
            .parse()
            .ok()
    }

    fn hardware_id(&self) -> String {
        self.hardware_id.clone()
    }
}
