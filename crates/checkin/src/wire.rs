//! JSON wire model for the device lock RPCs.
//!
//! Every enum carries an explicit `*_UNSPECIFIED` value. Mapping onto the
//! domain is an exhaustive match; a value with no domain counterpart where one
//! is required is a protocol error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use devicelock_core::checkin::{
    CheckInRequest, CheckInResponse, CheckInStatus, DeviceId, DeviceIdType, FcmTokenResult,
    ProvisionReportResponse, ProvisioningConfiguration, ProvisioningInformation, ProvisioningType,
};
use devicelock_core::provision::{DeviceProvisionState, PauseReason, ProvisionFailureReason};

use crate::error::{CheckInError, Result};

pub const RPC_GET_DEVICE_CHECKIN_STATUS: &str = "checkin-status";
pub const RPC_IS_DEVICE_IN_APPROVED_COUNTRY: &str = "approved-country";
pub const RPC_PAUSE_DEVICE_PROVISIONING: &str = "pause-provisioning";
pub const RPC_REPORT_DEVICE_PROVISION_STATE: &str = "provision-state";
pub const RPC_UPDATE_FCM_TOKEN: &str = "fcm-token";
pub const RPC_REPORT_DEVICE_PROGRAM_COMPLETE: &str = "program-complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceIdentifierType {
    #[serde(rename = "DEVICE_IDENTIFIER_TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "DEVICE_IDENTIFIER_TYPE_IMEI")]
    Imei,
    #[serde(rename = "DEVICE_IDENTIFIER_TYPE_MEID")]
    Meid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    #[serde(rename = "type")]
    pub id_type: DeviceIdentifierType,
    pub value: String,
}

impl From<&DeviceId> for DeviceIdentifier {
    fn from(id: &DeviceId) -> Self {
        let id_type = match id.id_type {
            DeviceIdType::Imei => DeviceIdentifierType::Imei,
            DeviceIdType::Meid => DeviceIdentifierType::Meid,
        };
        Self {
            id_type,
            value: id.value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCheckinStatus {
    #[serde(rename = "DEVICE_CHECKIN_STATUS_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "DEVICE_CHECKIN_STATUS_RETRY_CHECKIN")]
    RetryCheckin,
    #[serde(rename = "DEVICE_CHECKIN_STATUS_READY_FOR_PROVISION")]
    ReadyForProvision,
    #[serde(rename = "DEVICE_CHECKIN_STATUS_STOP_CHECKIN")]
    StopCheckin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireProvisioningType {
    #[serde(rename = "PROVISIONING_TYPE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "PROVISIONING_TYPE_FINANCED")]
    Financed,
    #[serde(rename = "PROVISIONING_TYPE_SUBSIDY")]
    Subsidy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WirePauseReason {
    #[serde(rename = "PAUSE_DEVICE_PROVISIONING_REASON_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "PAUSE_DEVICE_PROVISIONING_REASON_USER_DEFERRED_DEVICE_PROVISIONING")]
    UserDeferredDeviceProvisioning,
}

impl From<PauseReason> for WirePauseReason {
    fn from(reason: PauseReason) -> Self {
        match reason {
            PauseReason::UserDeferredDeviceProvisioning => {
                WirePauseReason::UserDeferredDeviceProvisioning
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientProvisionFailureReason {
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_PLAY_TASK_UNAVAILABLE")]
    PlayTaskUnavailable,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_PLAY_INSTALLATION_FAILED")]
    PlayInstallationFailed,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_COUNTRY_INFO_UNAVAILABLE")]
    CountryInfoUnavailable,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_NOT_IN_ELIGIBLE_COUNTRY")]
    NotInEligibleCountry,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_POLICY_ENFORCEMENT_FAILED")]
    PolicyEnforcementFailed,
    #[serde(rename = "CLIENT_PROVISION_FAILURE_REASON_DEADLINE_PASSED")]
    DeadlinePassed,
}

impl From<Option<ProvisionFailureReason>> for ClientProvisionFailureReason {
    fn from(reason: Option<ProvisionFailureReason>) -> Self {
        match reason {
            None | Some(ProvisionFailureReason::UnknownReason) => Self::Unspecified,
            Some(ProvisionFailureReason::PlayTaskUnavailable) => Self::PlayTaskUnavailable,
            Some(ProvisionFailureReason::PlayInstallationFailed) => Self::PlayInstallationFailed,
            Some(ProvisionFailureReason::CountryInfoUnavailable) => Self::CountryInfoUnavailable,
            Some(ProvisionFailureReason::NotInEligibleCountry) => Self::NotInEligibleCountry,
            Some(ProvisionFailureReason::PolicyEnforcementFailed) => {
                Self::PolicyEnforcementFailed
            }
            Some(ProvisionFailureReason::DeadlinePassed) => Self::DeadlinePassed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientProvisionState {
    #[serde(rename = "CLIENT_PROVISION_STATE_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "CLIENT_PROVISION_STATE_RETRY")]
    Retry,
    #[serde(rename = "CLIENT_PROVISION_STATE_DISMISSIBLE_UI")]
    DismissibleUi,
    #[serde(rename = "CLIENT_PROVISION_STATE_PERSISTENT_UI")]
    PersistentUi,
    #[serde(rename = "CLIENT_PROVISION_STATE_FACTORY_RESET")]
    FactoryReset,
    #[serde(rename = "CLIENT_PROVISION_STATE_SUCCESS")]
    Success,
}

impl From<DeviceProvisionState> for ClientProvisionState {
    fn from(state: DeviceProvisionState) -> Self {
        match state {
            DeviceProvisionState::Unspecified => Self::Unspecified,
            DeviceProvisionState::Retry => Self::Retry,
            DeviceProvisionState::DismissibleUi => Self::DismissibleUi,
            DeviceProvisionState::PersistentUi => Self::PersistentUi,
            DeviceProvisionState::FactoryReset => Self::FactoryReset,
            DeviceProvisionState::Success => Self::Success,
        }
    }
}

impl From<ClientProvisionState> for DeviceProvisionState {
    fn from(state: ClientProvisionState) -> Self {
        match state {
            ClientProvisionState::Unspecified => Self::Unspecified,
            ClientProvisionState::Retry => Self::Retry,
            ClientProvisionState::DismissibleUi => Self::DismissibleUi,
            ClientProvisionState::PersistentUi => Self::PersistentUi,
            ClientProvisionState::FactoryReset => Self::FactoryReset,
            ClientProvisionState::Success => Self::Success,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateFcmTokenResult {
    #[serde(rename = "UPDATE_FCM_TOKEN_RESULT_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "UPDATE_FCM_TOKEN_RESULT_SUCCESS")]
    Success,
    #[serde(rename = "UPDATE_FCM_TOKEN_RESULT_FAILURE")]
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetDeviceCheckinStatusRequest {
    pub device_identifiers: Vec<DeviceIdentifier>,
    pub carrier_mccmnc: Option<String>,
    pub fcm_registration_token: Option<String>,
    pub device_manufacturer: String,
    pub device_model: String,
    pub device_build_fingerprint: String,
}

impl From<&CheckInRequest> for GetDeviceCheckinStatusRequest {
    fn from(request: &CheckInRequest) -> Self {
        Self {
            device_identifiers: request.device_ids.iter().map(DeviceIdentifier::from).collect(),
            carrier_mccmnc: request.carrier_mccmnc.clone(),
            fcm_registration_token: request.fcm_token.clone(),
            device_manufacturer: request.build_info.manufacturer.clone(),
            device_model: request.build_info.model.clone(),
            device_build_fingerprint: request.build_info.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireConfiguration {
    pub kiosk_app_package_name: String,
    #[serde(default)]
    pub kiosk_app_download_url: String,
    #[serde(default)]
    pub kiosk_app_signature_checksum: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub terms_and_conditions_url: Option<String>,
    #[serde(default)]
    pub support_url: Option<String>,
    #[serde(default)]
    pub allowlisted_packages: Vec<String>,
    #[serde(default)]
    pub disable_outgoing_calls: bool,
    #[serde(default)]
    pub enable_notifications_in_lock_task: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireProvisioningInformation {
    pub configuration: WireConfiguration,
    #[serde(default)]
    pub enrollment_token: Option<String>,
    pub provisioning_type: WireProvisioningType,
    #[serde(default)]
    pub is_provisioning_mandatory: bool,
    #[serde(default)]
    pub is_device_in_approved_country: bool,
}

impl WireProvisioningInformation {
    fn into_domain(self) -> Result<ProvisioningInformation> {
        let provisioning_type = match self.provisioning_type {
            WireProvisioningType::Financed => ProvisioningType::Financed,
            WireProvisioningType::Subsidy => ProvisioningType::Subsidy,
            WireProvisioningType::Unspecified => {
                return Err(CheckInError::protocol(
                    "PROVISIONING_TYPE_UNSPECIFIED in provisioning information",
                ))
            }
        };
        let config = self.configuration;
        if config.kiosk_app_package_name.is_empty() {
            return Err(CheckInError::protocol("Empty kiosk app package name"));
        }
        Ok(ProvisioningInformation {
            configuration: ProvisioningConfiguration {
                kiosk_app_package: config.kiosk_app_package_name,
                kiosk_app_download_url: config.kiosk_app_download_url,
                kiosk_app_signature_checksum: config.kiosk_app_signature_checksum,
                provider_name: config.provider_name,
                terms_and_conditions_url: config.terms_and_conditions_url,
                support_url: config.support_url,
                allowlisted_packages: config.allowlisted_packages,
                disable_outgoing_calls: config.disable_outgoing_calls,
                enable_notifications_in_lock_task: config.enable_notifications_in_lock_task,
                provisioning_type,
                enrollment_token: self.enrollment_token,
            },
            is_provisioning_mandatory: self.is_provisioning_mandatory,
            is_device_in_approved_country: self.is_device_in_approved_country,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDeviceCheckinStatusResponse {
    pub device_checkin_status: DeviceCheckinStatus,
    #[serde(default)]
    pub registered_device_identifier: Option<String>,
    #[serde(default)]
    pub next_checkin_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provisioning_information: Option<WireProvisioningInformation>,
}

impl GetDeviceCheckinStatusResponse {
    pub fn into_domain(self) -> Result<CheckInResponse> {
        let status = match self.device_checkin_status {
            DeviceCheckinStatus::RetryCheckin => CheckInStatus::RetryCheckIn {
                next_check_in_time: self.next_checkin_time.ok_or_else(|| {
                    CheckInError::protocol("RETRY_CHECKIN without next_checkin_time")
                })?,
            },
            DeviceCheckinStatus::ReadyForProvision => CheckInStatus::ReadyForProvision(
                self.provisioning_information
                    .ok_or_else(|| {
                        CheckInError::protocol("READY_FOR_PROVISION without provisioning_information")
                    })?
                    .into_domain()?,
            ),
            DeviceCheckinStatus::StopCheckin => CheckInStatus::StopCheckIn,
            DeviceCheckinStatus::Unspecified => {
                return Err(CheckInError::protocol("DEVICE_CHECKIN_STATUS_UNSPECIFIED"))
            }
        };
        Ok(CheckInResponse {
            registered_device_id: self
                .registered_device_identifier
                .filter(|id| !id.is_empty()),
            status,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IsDeviceInApprovedCountryRequest {
    pub registered_device_identifier: String,
    pub carrier_mccmnc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsDeviceInApprovedCountryResponse {
    #[serde(default)]
    pub is_device_in_approved_country: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PauseDeviceProvisioningRequest {
    pub registered_device_identifier: String,
    pub pause_reason: WirePauseReason,
}

/// Body of RPCs with no response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDeviceProvisionStateRequest {
    pub registered_device_identifier: String,
    pub previous_device_provision_state: ClientProvisionState,
    pub is_provisioning_successful: bool,
    pub provisioning_failure_reason: ClientProvisionFailureReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDeviceProvisionStateResponse {
    pub next_client_provision_state: ClientProvisionState,
    #[serde(default)]
    pub days_left_until_reset: i32,
}

impl From<ReportDeviceProvisionStateResponse> for ProvisionReportResponse {
    fn from(response: ReportDeviceProvisionStateResponse) -> Self {
        Self {
            next_state: response.next_client_provision_state.into(),
            days_left_until_reset: response.days_left_until_reset,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateFcmTokenRequest {
    pub registered_device_identifier: String,
    pub fcm_registration_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFcmTokenResponse {
    pub result: UpdateFcmTokenResult,
}

impl UpdateFcmTokenResponse {
    pub fn into_domain(self) -> Result<FcmTokenResult> {
        match self.result {
            UpdateFcmTokenResult::Success => Ok(FcmTokenResult::Success),
            UpdateFcmTokenResult::Failure => Ok(FcmTokenResult::Failure),
            UpdateFcmTokenResult::Unspecified => {
                Err(CheckInError::protocol("UPDATE_FCM_TOKEN_RESULT_UNSPECIFIED"))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDeviceProgramCompleteRequest {
    pub registered_device_identifier: String,
}
