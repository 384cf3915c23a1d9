//! Compiled-in transport for debug builds and bench testing.
//!
//! Answers every RPC locally according to a fixed scenario so a device can be
//! walked through provisioning without a backend.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;

use devicelock_core::checkin::{
    CheckInRequest, CheckInResponse, CheckInStatus, CheckInTransport, FcmTokenResult,
    FinalizationReporter, ProvisionReportRequest, ProvisionReportResponse,
    ProvisioningConfiguration, ProvisioningInformation, ProvisioningReporter, ProvisioningType,
    RpcResponse,
};
use devicelock_core::provision::{DeviceProvisionState, PauseReason};

use crate::error::CheckInError;

pub const DEBUG_REGISTERED_ID: &str = "debug-registered-device";
const DEBUG_KIOSK_PACKAGE: &str = "com.example.devicelock.kiosk";
const DEBUG_RETRY_AFTER_HOURS: i64 = 1;
const DEBUG_DAYS_LEFT_UNTIL_RESET: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugScenario {
    /// Check-in answers READY_FOR_PROVISION with a mandatory financed config.
    #[default]
    Ready,
    RetryCheckIn,
    StopCheckIn,
    /// Every RPC fails as if the backend were unavailable.
    Unreachable,
}

impl DebugScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugScenario::Ready => "ready",
            DebugScenario::RetryCheckIn => "retry",
            DebugScenario::StopCheckIn => "stop",
            DebugScenario::Unreachable => "unreachable",
        }
    }
}

impl FromStr for DebugScenario {
    type Err = CheckInError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(DebugScenario::Ready),
            "retry" => Ok(DebugScenario::RetryCheckIn),
            "stop" => Ok(DebugScenario::StopCheckIn),
            "unreachable" => Ok(DebugScenario::Unreachable),
            other => Err(CheckInError::invalid_request(format!(
                "Unknown debug scenario: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugTransport {
    scenario: DebugScenario,
}

impl DebugTransport {
    pub fn new(scenario: DebugScenario) -> Self {
        Self { scenario }
    }

    pub fn scenario(&self) -> DebugScenario {
        self.scenario
    }

    fn respond<T>(&self, rpc: &str, value: impl FnOnce() -> T) -> RpcResponse<T> {
        debug!("[CheckIn] Debug transport answering {} ({})", rpc, self.scenario.as_str());
        match self.scenario {
            DebugScenario::Unreachable => {
                RpcResponse::RecoverableError("debug backend unreachable".to_string())
            }
            _ => RpcResponse::Success(value()),
        }
    }

    fn configuration() -> ProvisioningConfiguration {
        ProvisioningConfiguration {
            kiosk_app_package: DEBUG_KIOSK_PACKAGE.to_string(),
            provider_name: "Debug Provider".to_string(),
            allowlisted_packages: vec!["com.android.dialer".to_string()],
            provisioning_type: ProvisioningType::Financed,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CheckInTransport for DebugTransport {
    async fn get_check_in_status(
        &self,
        _request: &CheckInRequest,
    ) -> devicelock_core::Result<RpcResponse<CheckInResponse>> {
        let scenario = self.scenario;
        Ok(self.respond("checkin-status", || CheckInResponse {
            registered_device_id: Some(DEBUG_REGISTERED_ID.to_string()),
            status: match scenario {
                DebugScenario::RetryCheckIn => CheckInStatus::RetryCheckIn {
                    next_check_in_time: Utc::now() + Duration::hours(DEBUG_RETRY_AFTER_HOURS),
                },
                DebugScenario::StopCheckIn => CheckInStatus::StopCheckIn,
                _ => CheckInStatus::ReadyForProvision(ProvisioningInformation {
                    configuration: Self::configuration(),
                    is_provisioning_mandatory: true,
                    is_device_in_approved_country: true,
                }),
            },
        }))
    }

    async fn is_device_in_approved_country(
        &self,
        _carrier_mccmnc: Option<&str>,
    ) -> devicelock_core::Result<RpcResponse<bool>> {
        Ok(self.respond("approved-country", || true))
    }

    async fn pause_provisioning(
        &self,
        _reason: PauseReason,
    ) -> devicelock_core::Result<RpcResponse<()>> {
        Ok(self.respond("pause-provisioning", || ()))
    }

    async fn update_fcm_token(
        &self,
        _token: &str,
    ) -> devicelock_core::Result<RpcResponse<FcmTokenResult>> {
        Ok(self.respond("fcm-token", || FcmTokenResult::Success))
    }
}

#[async_trait]
impl ProvisioningReporter for DebugTransport {
    async fn report_provision_state(
        &self,
        request: &ProvisionReportRequest,
    ) -> devicelock_core::Result<RpcResponse<ProvisionReportResponse>> {
        let is_successful = request.is_successful;
        Ok(self.respond("provision-state", || ProvisionReportResponse {
            next_state: if is_successful {
                DeviceProvisionState::Success
            } else {
                DeviceProvisionState::DismissibleUi
            },
            days_left_until_reset: DEBUG_DAYS_LEFT_UNTIL_RESET,
        }))
    }
}

#[async_trait]
impl FinalizationReporter for DebugTransport {
    async fn report_program_complete(&self) -> devicelock_core::Result<RpcResponse<()>> {
        Ok(self.respond("program-complete", || ()))
    }
}
