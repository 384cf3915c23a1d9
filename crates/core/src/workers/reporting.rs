//! Fire-and-forget reports: pause, push token, program completion.

use async_trait::async_trait;
use log::{debug, info, warn};

use super::{result_for, WorkerContext};
use crate::checkin::{FcmTokenResult, RpcResponse};
use crate::errors::{Error, Result};
use crate::scheduler::{WorkItem, WorkPayload, WorkResult, Worker};

pub struct PauseProvisionWorker {
    ctx: WorkerContext,
}

impl PauseProvisionWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for PauseProvisionWorker {
    async fn run(&self, item: &WorkItem) -> Result<WorkResult> {
        let WorkPayload::Pause { reason } = item.payload else {
            return Err(Error::invalid_state(format!(
                "Unexpected payload for {}: {:?}",
                item.name, item.payload
            )));
        };
        let transport = self.ctx.transports.check_in().await?;
        let response = transport.pause_provisioning(reason).await?;
        if let Some(message) = response.error_message() {
            warn!("[CheckIn] Pause report failed: {}", message);
        }
        Ok(result_for(&response))
    }
}

pub struct UpdateFcmTokenWorker {
    ctx: WorkerContext,
}

impl UpdateFcmTokenWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for UpdateFcmTokenWorker {
    async fn run(&self, item: &WorkItem) -> Result<WorkResult> {
        let WorkPayload::FcmToken { token } = &item.payload else {
            return Err(Error::invalid_state(format!(
                "Unexpected payload for {}: {:?}",
                item.name, item.payload
            )));
        };
        if self.ctx.params.registered_device_id().await?.is_none() {
            debug!("[CheckIn] Not registered yet, token goes out with the next check-in");
            return Ok(WorkResult::Success);
        }

        let transport = self.ctx.transports.check_in().await?;
        Ok(match transport.update_fcm_token(token).await? {
            RpcResponse::Success(FcmTokenResult::Success) => WorkResult::Success,
            RpcResponse::Success(FcmTokenResult::Failure) => {
                warn!("[CheckIn] Server refused the push token update");
                WorkResult::Retry
            }
            other => {
                warn!(
                    "[CheckIn] Push token update failed: {}",
                    other.error_message().unwrap_or_default()
                );
                result_for(&other)
            }
        })
    }
}

/// Tells the finalize service that the program is complete.
pub struct ReportProgramCompleteWorker {
    ctx: WorkerContext,
}

impl ReportProgramCompleteWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Worker for ReportProgramCompleteWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        let finalizer = self.ctx.transports.finalizer().await?;
        match finalizer.report_program_complete().await? {
            RpcResponse::Success(()) => {
                self.ctx.device_state.mark_program_complete_reported().await?;
                info!("[Finalize] Program completion reported");
                Ok(WorkResult::Success)
            }
            // Completion must eventually reach the server; both error kinds back off.
            RpcResponse::RecoverableError(message) | RpcResponse::FatalError(message) => {
                warn!("[Finalize] Report failed, will retry: {}", message);
                Ok(WorkResult::Retry)
            }
        }
    }
}
