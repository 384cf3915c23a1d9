//! Last line of defence when durable work fails outside its retry path.

use std::sync::Arc;

use log::{error, info, warn};

use crate::device_state::DeviceState;
use crate::errors::Error;
use crate::parameters::GlobalParameters;
use crate::platform::{DevicePolicyController, ProcessControl, WipeReason};
use crate::provision::ProvisionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDecision {
    /// Restrictions were already released; nothing left to protect.
    Ignore,
    /// Nothing was provisioned yet; exit without touching the device.
    TerminateQuietly,
    /// Wipe rather than leave the device half configured.
    WipeDevice,
}

pub struct FailureSupervisor {
    params: GlobalParameters,
    policy: Arc<dyn DevicePolicyController>,
    process: Arc<dyn ProcessControl>,
}

impl FailureSupervisor {
    pub fn new(
        params: GlobalParameters,
        policy: Arc<dyn DevicePolicyController>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            params,
            policy,
            process,
        }
    }

    /// `state` is `None` when the persisted state could not be read; `started`
    /// then tells a device that never began provisioning from one mid-flow.
    pub fn decide(
        &self,
        state: Option<ProvisionState>,
        started: bool,
        cleared: bool,
    ) -> SupervisorDecision {
        if cleared {
            return SupervisorDecision::Ignore;
        }
        match state {
            Some(ProvisionState::Unprovisioned) => SupervisorDecision::TerminateQuietly,
            Some(_) => SupervisorDecision::WipeDevice,
            None if started => SupervisorDecision::WipeDevice,
            None => SupervisorDecision::TerminateQuietly,
        }
    }

    /// Whether provisioning ever began. An unreadable start time counts as
    /// started so an unknown device is never left half configured.
    async fn provisioning_started(&self) -> bool {
        match self.params.provisioning_start_time().await {
            Ok(started) => started.is_some(),
            Err(read_err) => {
                warn!("[Supervisor] Cannot read provisioning start time: {}", read_err);
                true
            }
        }
    }

    pub async fn on_unrecoverable_failure(&self, err: &Error) -> SupervisorDecision {
        error!("[Supervisor] Unrecoverable failure: {}", err);

        let state = match self.params.provision_state().await {
            Ok(state) => Some(state),
            Err(read_err) => {
                warn!("[Supervisor] Cannot read provision state: {}", read_err);
                None
            }
        };
        let cleared = match self.params.device_state().await {
            Ok(device_state) => device_state == DeviceState::Cleared,
            Err(read_err) => {
                warn!("[Supervisor] Cannot read device state: {}", read_err);
                false
            }
        };

        let started = match state {
            Some(_) => true,
            None => self.provisioning_started().await,
        };

        let decision = self.decide(state, started, cleared);
        match decision {
            SupervisorDecision::Ignore => {
                info!("[Supervisor] Device already cleared, ignoring failure");
            }
            SupervisorDecision::TerminateQuietly => {
                info!("[Supervisor] Device not provisioned, terminating quietly");
                self.process.terminate_quietly();
            }
            SupervisorDecision::WipeDevice => {
                warn!(
                    "[Supervisor] Wiping device in state {}",
                    state.map(|s| s.as_str()).unwrap_or("UNKNOWN")
                );
                if let Err(wipe_err) = self
                    .policy
                    .wipe_device(WipeReason::UnrecoverableFailure)
                    .await
                {
                    error!("[Supervisor] Wipe failed: {}", wipe_err);
                }
            }
        }
        decision
    }
}
