use async_trait::async_trait;
use log::{info, warn};

use super::WorkerContext;
use crate::checkin::{
    build_check_in_request, CheckInResponse, CheckInStatus, ProvisioningInformation, RpcResponse,
};
use crate::errors::{Error, Result};
use crate::parameters::RegistrationOutcome;
use crate::provision::ProvisionState;
use crate::scheduler::{WorkItem, WorkResult, Worker};

/// Runs `GetDeviceCheckinStatus` and acts on the outcome.
pub struct CheckInWorker {
    ctx: WorkerContext,
}

impl CheckInWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    async fn handle_response(&self, response: CheckInResponse) -> Result<WorkResult> {
        if let Some(id) = response.registered_device_id.as_deref() {
            if let RegistrationOutcome::Conflict { existing } =
                self.ctx.params.set_registered_device_id(id).await?
            {
                warn!(
                    "[CheckIn] Server returned {} but device is registered as {}",
                    id, existing
                );
            }
        }

        match response.status {
            CheckInStatus::RetryCheckIn { next_check_in_time } => {
                let delay = next_check_in_time - self.ctx.clock.now();
                info!(
                    "[CheckIn] Server asked to retry at {}",
                    next_check_in_time.to_rfc3339()
                );
                self.ctx.scheduler.schedule_retry_check_in(delay).await?;
                Ok(WorkResult::Success)
            }
            CheckInStatus::ReadyForProvision(info) => self.handle_ready(info).await,
            CheckInStatus::StopCheckIn => {
                info!("[CheckIn] Server stopped check-in, device is not enrolled");
                self.ctx.params.disable_check_in().await?;
                self.ctx.scheduler.cancel_check_in().await?;
                self.ctx.device_state.finalize_not_enrolled_device().await?;
                Ok(WorkResult::Success)
            }
        }
    }

    async fn handle_ready(&self, info: ProvisioningInformation) -> Result<WorkResult> {
        if self.ctx.params.registered_device_id().await?.is_none() {
            return Err(Error::protocol(
                "READY_FOR_PROVISION without a registered device id",
            ));
        }

        self.ctx.setup.store_configuration(&info.configuration).await?;
        self.ctx
            .params
            .set_provision_forced(info.is_provisioning_mandatory)
            .await?;
        self.ctx
            .params
            .set_device_in_approved_country(info.is_device_in_approved_country)
            .await?;
        self.ctx.params.set_provision_ready(true).await?;
        info!(
            "[CheckIn] Ready for provision (mandatory: {})",
            info.is_provisioning_mandatory
        );

        if self.ctx.provision.try_begin_provisioning().await?.is_none()
            && self.ctx.params.provision_state().await? == ProvisionState::Unprovisioned
        {
            self.ctx.scheduler.schedule_setup_wizard_timeout().await?;
        }
        Ok(WorkResult::Success)
    }
}

#[async_trait]
impl Worker for CheckInWorker {
    async fn run(&self, _item: &WorkItem) -> Result<WorkResult> {
        if self.ctx.params.check_in_disabled().await? {
            info!("[CheckIn] Check-in disabled, nothing to do");
            return Ok(WorkResult::Success);
        }

        let fcm_token = self.ctx.params.fcm_token().await?;
        let Some(request) =
            build_check_in_request(self.ctx.identity.as_ref(), fcm_token).await?
        else {
            self.ctx.params.disable_check_in().await?;
            return Ok(WorkResult::Failure);
        };

        let transport = self.ctx.transports.check_in().await?;
        match transport.get_check_in_status(&request).await? {
            RpcResponse::Success(response) => self.handle_response(response).await,
            RpcResponse::RecoverableError(message) => {
                warn!("[CheckIn] Recoverable error: {}", message);
                Ok(WorkResult::Retry)
            }
            RpcResponse::FatalError(message) => {
                warn!("[CheckIn] Fatal error: {}, re-arming check-in", message);
                let delay = self.ctx.scheduler.config().check_in_backoff;
                self.ctx.scheduler.schedule_retry_check_in(delay).await?;
                Ok(WorkResult::Failure)
            }
        }
    }
}
