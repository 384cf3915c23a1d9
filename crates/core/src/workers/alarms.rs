use async_trait::async_trait;
use log::{info, warn};

use super::WorkerContext;
use crate::errors::Result;
use crate::platform::WipeReason;
use crate::provision::{
    DeviceProvisionState, ProvisionEvent, ProvisionFailureReason, ProvisionState,
};
use crate::scheduler::{WorkItem, WorkResult, Worker};

/// Fires when the reset countdown elapses.
pub struct ResetDeviceWorker {
    ctx: WorkerContext,
}

impl ResetDeviceWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for ResetDeviceWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        let directive = self.ctx.params.last_received_provision_state().await?;
        if directive != Some(DeviceProvisionState::FactoryReset) {
            info!("[Provision] Reset alarm fired but directive is {:?}, skipping", directive);
            return Ok(WorkResult::Success);
        }
        if self.ctx.device_state.is_cleared().await? {
            info!("[Provision] Reset alarm fired on a cleared device, skipping");
            return Ok(WorkResult::Success);
        }
        let state = self.ctx.params.provision_state().await?;
        if state.is_succeeded() {
            info!("[Provision] Reset alarm fired after success, skipping");
            return Ok(WorkResult::Success);
        }

        warn!("[Provision] Reset countdown elapsed in {}, wiping device", state);
        self.ctx
            .policy
            .wipe_device(WipeReason::ProvisioningDeadline)
            .await?;
        Ok(WorkResult::Success)
    }
}

/// Re-reports the stored failure so the server can issue its next directive.
pub struct NextFailedStepWorker {
    ctx: WorkerContext,
}

impl NextFailedStepWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for NextFailedStepWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        if self.ctx.params.provision_state().await? != ProvisionState::ProvisionFailed {
            return Ok(WorkResult::Success);
        }
        let reason = self
            .ctx
            .params
            .last_failure_reason()
            .await?
            .unwrap_or(ProvisionFailureReason::UnknownReason);
        self.ctx
            .scheduler
            .schedule_report_provision_state(false, Some(reason))
            .await?;
        Ok(WorkResult::Success)
    }
}

pub struct ResumeProvisionWorker {
    ctx: WorkerContext,
}

impl ResumeProvisionWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for ResumeProvisionWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        self.ctx
            .provision
            .post_event_when(
                ProvisionEvent::ProvisionResume,
                ProvisionState::ProvisionPaused,
            )
            .await?;
        Ok(WorkResult::Success)
    }
}

/// Provisioning must not wait forever on the out-of-box setup flow.
pub struct SetupWizardTimeoutWorker {
    ctx: WorkerContext,
}

impl SetupWizardTimeoutWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for SetupWizardTimeoutWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        info!("[Provision] Setup wizard timed out");
        self.ctx.params.set_setup_wizard_timed_out(true).await?;
        self.ctx.provision.try_begin_provisioning().await?;
        Ok(WorkResult::Success)
    }
}
