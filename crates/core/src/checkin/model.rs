//! Domain shapes exchanged with the device lock backend.
//!
//! These are transport-agnostic; the HTTP wire mapping lives in the check-in
//! client crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provision::{DeviceProvisionState, ProvisionFailureReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceIdType {
    Imei,
    Meid,
}

/// Hardware identifier exposed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceId {
    pub id_type: DeviceIdType,
    pub value: String,
}

impl DeviceId {
    pub fn imei(value: impl Into<String>) -> Self {
        Self {
            id_type: DeviceIdType::Imei,
            value: value.into(),
        }
    }

    pub fn meid(value: impl Into<String>) -> Self {
        Self {
            id_type: DeviceIdType::Meid,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub manufacturer: String,
    pub model: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// Deduplicated, never empty.
    pub device_ids: Vec<DeviceId>,
    pub carrier_mccmnc: Option<String>,
    pub fcm_token: Option<String>,
    pub build_info: BuildInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningType {
    #[default]
    Financed,
    Subsidy,
}

/// Kiosk/provisioning configuration pushed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfiguration {
    pub kiosk_app_package: String,
    pub kiosk_app_download_url: String,
    pub kiosk_app_signature_checksum: String,
    pub provider_name: String,
    pub terms_and_conditions_url: Option<String>,
    pub support_url: Option<String>,
    pub allowlisted_packages: Vec<String>,
    pub disable_outgoing_calls: bool,
    pub enable_notifications_in_lock_task: bool,
    pub provisioning_type: ProvisioningType,
    pub enrollment_token: Option<String>,
}

/// Payload of a `READY_FOR_PROVISION` check-in outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningInformation {
    pub configuration: ProvisioningConfiguration,
    pub is_provisioning_mandatory: bool,
    pub is_device_in_approved_country: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status")]
pub enum CheckInStatus {
    RetryCheckIn { next_check_in_time: DateTime<Utc> },
    ReadyForProvision(ProvisioningInformation),
    /// Terminal: the device is not enrolled and must never check in again.
    StopCheckIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub registered_device_id: Option<String>,
    pub status: CheckInStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReportRequest {
    /// Last directive received from the server, `UNSPECIFIED` on the first report.
    pub previous_state: DeviceProvisionState,
    pub is_successful: bool,
    pub failure_reason: Option<ProvisionFailureReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionReportResponse {
    pub next_state: DeviceProvisionState,
    pub days_left_until_reset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FcmTokenResult {
    Success,
    Failure,
}

/// Outcome of one RPC: exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcResponse<T> {
    Success(T),
    /// Transport or availability failure; the call may be retried.
    RecoverableError(String),
    /// Definitive rejection; retrying the same call will not help.
    FatalError(String),
}

impl<T> RpcResponse<T> {
    pub fn is_successful(&self) -> bool {
        matches!(self, RpcResponse::Success(_))
    }

    pub fn has_recoverable_error(&self) -> bool {
        matches!(self, RpcResponse::RecoverableError(_))
    }

    pub fn has_fatal_error(&self) -> bool {
        matches!(self, RpcResponse::FatalError(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RpcResponse<U> {
        match self {
            RpcResponse::Success(value) => RpcResponse::Success(f(value)),
            RpcResponse::RecoverableError(message) => RpcResponse::RecoverableError(message),
            RpcResponse::FatalError(message) => RpcResponse::FatalError(message),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RpcResponse::Success(_) => None,
            RpcResponse::RecoverableError(message) | RpcResponse::FatalError(message) => {
                Some(message)
            }
        }
    }
}
