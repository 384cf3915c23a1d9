//! Provisioning domain enums shared by the state machine, workers and wire layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local provisioning progress of the device. Persisted; mutated only by the
/// provisioning state controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionState {
    #[default]
    Unprovisioned,
    ProvisionInProgress,
    ProvisionPaused,
    ProvisionFailed,
    ProvisionSucceeded,
    KioskProvisioned,
}

impl ProvisionState {
    pub const ALL: [ProvisionState; 6] = [
        ProvisionState::Unprovisioned,
        ProvisionState::ProvisionInProgress,
        ProvisionState::ProvisionPaused,
        ProvisionState::ProvisionFailed,
        ProvisionState::ProvisionSucceeded,
        ProvisionState::KioskProvisioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionState::Unprovisioned => "UNPROVISIONED",
            ProvisionState::ProvisionInProgress => "PROVISION_IN_PROGRESS",
            ProvisionState::ProvisionPaused => "PROVISION_PAUSED",
            ProvisionState::ProvisionFailed => "PROVISION_FAILED",
            ProvisionState::ProvisionSucceeded => "PROVISION_SUCCEEDED",
            ProvisionState::KioskProvisioned => "KIOSK_PROVISIONED",
        }
    }

    /// `KIOSK_PROVISIONED` is only reachable through `PROVISION_SUCCEEDED`.
    pub fn is_succeeded(&self) -> bool {
        matches!(
            self,
            ProvisionState::ProvisionSucceeded | ProvisionState::KioskProvisioned
        )
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a provisioning failure, reported to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionFailureReason {
    UnknownReason,
    PlayTaskUnavailable,
    PlayInstallationFailed,
    CountryInfoUnavailable,
    NotInEligibleCountry,
    PolicyEnforcementFailed,
    DeadlinePassed,
}

impl ProvisionFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionFailureReason::UnknownReason => "UNKNOWN_REASON",
            ProvisionFailureReason::PlayTaskUnavailable => "PLAY_TASK_UNAVAILABLE",
            ProvisionFailureReason::PlayInstallationFailed => "PLAY_INSTALLATION_FAILED",
            ProvisionFailureReason::CountryInfoUnavailable => "COUNTRY_INFO_UNAVAILABLE",
            ProvisionFailureReason::NotInEligibleCountry => "NOT_IN_ELIGIBLE_COUNTRY",
            ProvisionFailureReason::PolicyEnforcementFailed => "POLICY_ENFORCEMENT_FAILED",
            ProvisionFailureReason::DeadlinePassed => "DEADLINE_PASSED",
        }
    }
}

impl fmt::Display for ProvisionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why provisioning was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseReason {
    UserDeferredDeviceProvisioning,
}

/// Trigger consumed by the transition function. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionEvent {
    ProvisionReady,
    ProvisionPause,
    ProvisionResume,
    ProvisionSuccess,
    ProvisionKiosk,
    ProvisionFailure(ProvisionFailureReason),
    ProvisionRetry,
}

impl fmt::Display for ProvisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionEvent::ProvisionReady => f.write_str("PROVISION_READY"),
            ProvisionEvent::ProvisionPause => f.write_str("PROVISION_PAUSE"),
            ProvisionEvent::ProvisionResume => f.write_str("PROVISION_RESUME"),
            ProvisionEvent::ProvisionSuccess => f.write_str("PROVISION_SUCCESS"),
            ProvisionEvent::ProvisionKiosk => f.write_str("PROVISION_KIOSK"),
            ProvisionEvent::ProvisionFailure(reason) => {
                write!(f, "PROVISION_FAILURE({})", reason)
            }
            ProvisionEvent::ProvisionRetry => f.write_str("PROVISION_RETRY"),
        }
    }
}

/// Backend directive returned after a provisioning-state report. The last one
/// received is persisted so an interrupted flow resumes from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceProvisionState {
    #[default]
    Unspecified,
    Retry,
    DismissibleUi,
    PersistentUi,
    FactoryReset,
    Success,
}

impl DeviceProvisionState {
    pub const ALL: [DeviceProvisionState; 6] = [
        DeviceProvisionState::Unspecified,
        DeviceProvisionState::Retry,
        DeviceProvisionState::DismissibleUi,
        DeviceProvisionState::PersistentUi,
        DeviceProvisionState::FactoryReset,
        DeviceProvisionState::Success,
    ];
}
