//! Host adapters for the platform collaborator traits.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use devicelock_core::checkin::{BuildInfo, DeviceId, ProvisioningConfiguration};
use devicelock_core::platform::{
    DeviceIdentity, DevicePolicyController, NotificationSink, PolicySnapshot, ProcessControl,
    ProvisioningUi, WipeReason,
};
use devicelock_core::{Error, Result};

use crate::config::IdentityConfig;

pub const POLICY_FILE_NAME: &str = "policy.json";

/// Identity taken from configuration.
pub struct ConfiguredIdentity {
    config: IdentityConfig,
}

impl ConfiguredIdentity {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceIdentity for ConfiguredIdentity {
    async fn device_ids(&self) -> Result<Vec<DeviceId>> {
        Ok(self
            .config
            .imeis
            .iter()
            .map(DeviceId::imei)
            .chain(self.config.meids.iter().map(DeviceId::meid))
            .collect())
    }

    async fn carrier_mccmnc(&self) -> Result<Option<String>> {
        Ok(self.config.carrier_mccmnc.clone())
    }

    fn build_info(&self) -> BuildInfo {
        BuildInfo {
            manufacturer: self.config.manufacturer.clone(),
            model: self.config.model.clone(),
            fingerprint: self.config.build_fingerprint.clone(),
        }
    }
}

/// Notifications are surfaced as log events for the host shell to pick up.
#[derive(Debug, Default)]
pub struct LogNotifications;

#[async_trait]
impl NotificationSink for LogNotifications {
    async fn show_reset_countdown(&self, days_left: i32, ongoing: bool) -> Result<()> {
        info!(
            target: "devicelock::notification",
            days_left, ongoing, "Device will be reset unless provisioning completes"
        );
        Ok(())
    }

    async fn show_deferred_provisioning(&self, resume_at: DateTime<Utc>) -> Result<()> {
        info!(
            target: "devicelock::notification",
            resume_at = %resume_at.to_rfc3339(),
            "Provisioning deferred"
        );
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        info!(target: "devicelock::notification", "Notification cancelled");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogProvisioningUi;

#[async_trait]
impl ProvisioningUi for LogProvisioningUi {
    async fn start_provisioning(&self, configuration: &ProvisioningConfiguration) -> Result<()> {
        info!(
            target: "devicelock::provisioning",
            kiosk = %configuration.kiosk_app_package,
            provider = %configuration.provider_name,
            "Provisioning flow started"
        );
        Ok(())
    }
}

/// Writes the active policy to a JSON file and wipes via a shell command.
pub struct HostPolicyController {
    policy_path: PathBuf,
    wipe_command: Option<String>,
}

impl HostPolicyController {
    pub fn new(data_dir: PathBuf, wipe_command: Option<String>) -> Self {
        Self {
            policy_path: data_dir.join(POLICY_FILE_NAME),
            wipe_command,
        }
    }
}

#[async_trait]
impl DevicePolicyController for HostPolicyController {
    async fn enforce(&self, policy: PolicySnapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(&policy)?;
        let tmp_path = self.policy_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, body)
            .await
            .map_err(|e| Error::platform(format!("Failed to write policy: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.policy_path)
            .await
            .map_err(|e| Error::platform(format!("Failed to publish policy: {}", e)))?;
        info!(device_state = %policy.device_state, "Policy enforced");
        Ok(())
    }

    async fn wipe_device(&self, reason: WipeReason) -> Result<()> {
        let Some(command) = self.wipe_command.as_deref() else {
            error!(?reason, "Wipe requested but no wipe command is configured");
            return Err(Error::platform("No wipe command configured"));
        };
        warn!(?reason, command, "Wiping device");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("DEVICELOCK_WIPE_REASON", format!("{:?}", reason))
            .status()
            .await
            .map_err(|e| Error::platform(format!("Failed to run wipe command: {}", e)))?;
        if !status.success() {
            return Err(Error::platform(format!("Wipe command exited with {}", status)));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ExitProcess;

impl ProcessControl for ExitProcess {
    fn terminate_quietly(&self) {
        info!("Terminating controller quietly");
        std::process::exit(0);
    }
}
