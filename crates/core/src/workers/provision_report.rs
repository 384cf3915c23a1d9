use async_trait::async_trait;
use log::{info, warn};

use super::WorkerContext;
use crate::checkin::{ProvisionReportRequest, ProvisionReportResponse, RpcResponse};
use crate::errors::{Error, Result};
use crate::provision::DeviceProvisionState;
use crate::scheduler::{WorkItem, WorkPayload, WorkResult, Worker};

/// Reports provisioning progress and applies the server's directive.
pub struct ReportProvisionStateWorker {
    ctx: WorkerContext,
}

impl ReportProvisionStateWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// The directive is persisted before any alarm it implies is armed.
    pub async fn apply_directive(&self, response: ProvisionReportResponse) -> Result<()> {
        let next_state = response.next_state;
        if next_state == DeviceProvisionState::Unspecified {
            return Err(Error::protocol(
                "Provision report returned DEVICE_PROVISION_STATE_UNSPECIFIED",
            ));
        }
        let days_left = response.days_left_until_reset;

        self.ctx
            .params
            .set_last_received_provision_state(next_state)
            .await?;
        self.ctx.params.set_days_left_until_reset(days_left).await?;
        info!(
            "[Provision] Server directive {:?}, {} day(s) left until reset",
            next_state, days_left
        );

        let scheduler = &self.ctx.scheduler;
        match next_state {
            DeviceProvisionState::Unspecified => {}
            DeviceProvisionState::Retry => {
                scheduler.schedule_next_failed_step().await?;
            }
            DeviceProvisionState::DismissibleUi => {
                self.ctx
                    .notifications
                    .show_reset_countdown(days_left, false)
                    .await?;
                scheduler.schedule_next_failed_step().await?;
            }
            DeviceProvisionState::PersistentUi => {
                self.ctx
                    .notifications
                    .show_reset_countdown(days_left, true)
                    .await?;
                scheduler.schedule_next_failed_step().await?;
            }
            DeviceProvisionState::FactoryReset => {
                let countdown = scheduler.config().reset_countdown(days_left);
                scheduler.schedule_reset_device(countdown).await?;
                self.ctx
                    .notifications
                    .show_reset_countdown(days_left, false)
                    .await?;
            }
            DeviceProvisionState::Success => {
                self.ctx.notifications.cancel().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Worker for ReportProvisionStateWorker {
    async fn run(&self, item: &WorkItem) -> Result<WorkResult> {
        let WorkPayload::ProvisionReport {
            is_successful,
            failure_reason,
        } = item.payload
        else {
            return Err(Error::invalid_state(format!(
                "Unexpected payload for {}: {:?}",
                item.name, item.payload
            )));
        };

        let request = ProvisionReportRequest {
            previous_state: self
                .ctx
                .params
                .last_received_provision_state()
                .await?
                .unwrap_or_default(),
            is_successful,
            failure_reason,
        };
        let reporter = self.ctx.transports.reporter().await?;
        match reporter.report_provision_state(&request).await? {
            RpcResponse::Success(response) => {
                self.apply_directive(response).await?;
                Ok(WorkResult::Success)
            }
            RpcResponse::RecoverableError(message) => {
                warn!("[Provision] Report failed, will retry: {}", message);
                Ok(WorkResult::Retry)
            }
            RpcResponse::FatalError(message) => {
                warn!("[Provision] Report rejected: {}", message);
                if !is_successful {
                    self.ctx.scheduler.schedule_next_failed_step().await?;
                }
                Ok(WorkResult::Failure)
            }
        }
    }
}
