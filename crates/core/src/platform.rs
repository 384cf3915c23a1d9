//! Platform collaborator contracts.
//!
//! Everything the controller needs from the host OS (clock, identity, UI,
//! policy enforcement, process lifecycle) is reached through these traits so
//! the provisioning logic never touches the platform directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkin::{BuildInfo, DeviceId, ProvisioningConfiguration};
use crate::device_state::DeviceState;
use crate::errors::Result;

/// Wall clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hardware and build identity of the device.
#[async_trait]
pub trait DeviceIdentity: Send + Sync {
    /// Every IMEI/MEID the device exposes. May be empty.
    async fn device_ids(&self) -> Result<Vec<DeviceId>>;
    async fn carrier_mccmnc(&self) -> Result<Option<String>>;
    fn build_info(&self) -> BuildInfo;
}

/// User-facing notifications driven by provisioning outputs.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `ongoing` notifications cannot be dismissed by the user.
    async fn show_reset_countdown(&self, days_left: i32, ongoing: bool) -> Result<()>;
    async fn show_deferred_provisioning(&self, resume_at: DateTime<Utc>) -> Result<()>;
    async fn cancel(&self) -> Result<()>;
}

/// Launches the kiosk install / provisioning flow.
#[async_trait]
pub trait ProvisioningUi: Send + Sync {
    async fn start_provisioning(&self, configuration: &ProvisioningConfiguration) -> Result<()>;
}

/// Why a device wipe was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WipeReason {
    /// Server-directed reset after the countdown elapsed.
    ProvisioningDeadline,
    /// Last-resort reset after an unrecoverable internal failure.
    UnrecoverableFailure,
}

/// Restrictions the device should currently enforce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySnapshot {
    pub device_state: DeviceState,
    pub kiosk_package: Option<String>,
    pub allowlisted_packages: Vec<String>,
    pub disable_outgoing_calls: bool,
}

/// Device policy enforcement (lock task, restrictions, wipe).
#[async_trait]
pub trait DevicePolicyController: Send + Sync {
    async fn enforce(&self, policy: PolicySnapshot) -> Result<()>;
    async fn wipe_device(&self, reason: WipeReason) -> Result<()>;
}

/// Controller process lifecycle.
pub trait ProcessControl: Send + Sync {
    fn terminate_quietly(&self);
}
