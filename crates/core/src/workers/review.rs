use async_trait::async_trait;
use log::{debug, info};

use super::WorkerContext;
use crate::errors::Result;
use crate::provision::{ProvisionEvent, ProvisionFailureReason, ProvisionState};
use crate::scheduler::{ExistingWorkPolicy, WorkItem, WorkResult, Worker};

/// Daily watchdog: fails a provisioning that outlived its deadline when no
/// recovery alarm is left to move it forward.
pub struct ReviewProvisionStateWorker {
    ctx: WorkerContext,
}

impl ReviewProvisionStateWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    async fn review(&self) -> Result<()> {
        let state = self.ctx.params.provision_state().await?;
        let Some(started) = self.ctx.params.provisioning_start_time().await? else {
            debug!("[Provision] Review: provisioning never started");
            return Ok(());
        };

        let elapsed = self.ctx.clock.now() - started;
        if elapsed <= self.ctx.scheduler.config().provisioning_deadline {
            return Ok(());
        }
        if self.ctx.scheduler.has_recovery_alarms().await? {
            debug!("[Provision] Review: recovery alarms pending");
            return Ok(());
        }

        let deadline = ProvisionEvent::ProvisionFailure(ProvisionFailureReason::DeadlinePassed);
        match state {
            ProvisionState::ProvisionInProgress | ProvisionState::ProvisionPaused => {
                info!("[Provision] Review: deadline passed in {}", state);
                self.ctx.provision.post_event_when(deadline, state).await?;
            }
            ProvisionState::ProvisionFailed => {
                info!("[Provision] Review: re-reporting stalled failure");
                self.ctx
                    .scheduler
                    .schedule_report_provision_state(
                        false,
                        Some(ProvisionFailureReason::DeadlinePassed),
                    )
                    .await?;
                self.ctx.scheduler.schedule_next_failed_step().await?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for ReviewProvisionStateWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        if self.ctx.params.provision_state().await?.is_succeeded() {
            return Ok(WorkResult::Success);
        }
        self.review().await?;
        self.ctx
            .scheduler
            .schedule_review_provision_state(ExistingWorkPolicy::Replace)
            .await?;
        Ok(WorkResult::Success)
    }
}
