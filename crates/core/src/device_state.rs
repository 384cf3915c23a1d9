//! Device restriction state and program finalization.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::parameters::{GlobalParameters, SetupParameters};
use crate::platform::{DevicePolicyController, PolicySnapshot};
use crate::scheduler::DeviceLockScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    #[default]
    Undefined,
    Locked,
    Unlocked,
    /// Restrictions permanently released.
    Cleared,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Undefined => "UNDEFINED",
            DeviceState::Locked => "LOCKED",
            DeviceState::Unlocked => "UNLOCKED",
            DeviceState::Cleared => "CLEARED",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizationState {
    #[default]
    Unfinalized,
    /// Cleared locally, `ReportDeviceProgramComplete` still pending.
    FinalizedUnreported,
    Finalized,
}

/// Owns lock/unlock/clear transitions and keeps the policy collaborator in
/// sync with the persisted device state.
#[derive(Clone)]
pub struct DeviceStateController {
    params: GlobalParameters,
    setup: SetupParameters,
    policy: Arc<dyn DevicePolicyController>,
    scheduler: DeviceLockScheduler,
}

impl DeviceStateController {
    pub fn new(
        params: GlobalParameters,
        setup: SetupParameters,
        policy: Arc<dyn DevicePolicyController>,
        scheduler: DeviceLockScheduler,
    ) -> Self {
        Self {
            params,
            setup,
            policy,
            scheduler,
        }
    }

    pub async fn device_state(&self) -> Result<DeviceState> {
        self.params.device_state().await
    }

    pub async fn is_cleared(&self) -> Result<bool> {
        Ok(self.params.device_state().await? == DeviceState::Cleared)
    }

    /// Policy matching the persisted state and setup configuration.
    pub async fn policy_snapshot(&self) -> Result<PolicySnapshot> {
        let device_state = self.params.device_state().await?;
        let configuration = self.setup.configuration().await?;
        Ok(match configuration {
            Some(config) if device_state != DeviceState::Cleared => PolicySnapshot {
                device_state,
                kiosk_package: Some(config.kiosk_app_package),
                allowlisted_packages: config.allowlisted_packages,
                disable_outgoing_calls: config.disable_outgoing_calls,
            },
            _ => PolicySnapshot {
                device_state,
                kiosk_package: None,
                allowlisted_packages: Vec::new(),
                disable_outgoing_calls: false,
            },
        })
    }

    pub async fn enforce_current(&self) -> Result<()> {
        let snapshot = self.policy_snapshot().await?;
        debug!("[DeviceState] Enforcing {}", snapshot.device_state);
        self.policy.enforce(snapshot).await
    }

    /// Provisioning finished: an undefined device starts out unlocked.
    pub async fn on_provisioned(&self) -> Result<()> {
        if self.params.device_state().await? == DeviceState::Undefined {
            self.params.set_device_state(DeviceState::Unlocked).await?;
        }
        self.enforce_current().await
    }

    async fn transition(&self, target: DeviceState) -> Result<bool> {
        let current = self.params.device_state().await?;
        if current == DeviceState::Cleared {
            info!("[DeviceState] Ignoring {} on cleared device", target);
            return Ok(false);
        }
        if current != target {
            self.params.set_device_state(target).await?;
            info!("[DeviceState] {} -> {}", current, target);
        }
        self.enforce_current().await?;
        Ok(true)
    }

    /// Returns `false` when the device is already cleared.
    pub async fn lock(&self) -> Result<bool> {
        self.transition(DeviceState::Locked).await
    }

    pub async fn unlock(&self) -> Result<bool> {
        self.transition(DeviceState::Unlocked).await
    }

    /// Releases restrictions for good and reports program completion once.
    pub async fn clear(&self) -> Result<()> {
        if self.params.device_state().await? != DeviceState::Cleared {
            self.params.set_device_state(DeviceState::Cleared).await?;
            info!("[DeviceState] Device cleared");
        }
        self.enforce_current().await?;

        match self.params.finalization_state().await? {
            FinalizationState::Unfinalized => {
                self.params
                    .set_finalization_state(FinalizationState::FinalizedUnreported)
                    .await?;
                self.scheduler.schedule_program_complete_report().await
            }
            FinalizationState::FinalizedUnreported => {
                self.scheduler.schedule_program_complete_report().await
            }
            FinalizationState::Finalized => Ok(()),
        }
    }

    /// The server stopped check-in: the device was never enrolled, so there is
    /// nothing to report.
    pub async fn finalize_not_enrolled_device(&self) -> Result<()> {
        self.params
            .set_finalization_state(FinalizationState::Finalized)
            .await?;
        self.params.set_device_state(DeviceState::Cleared).await?;
        info!("[DeviceState] Not enrolled, device finalized");
        self.enforce_current().await
    }

    pub async fn mark_program_complete_reported(&self) -> Result<()> {
        self.params
            .set_finalization_state(FinalizationState::Finalized)
            .await
    }
}
