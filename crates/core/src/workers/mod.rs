//! Durable work handlers.

mod alarms;
mod check_in;
mod provision_report;
mod reporting;
mod review;

use std::sync::Arc;

pub use alarms::*;
pub use check_in::*;
pub use provision_report::*;
pub use reporting::*;
pub use review::*;

use crate::checkin::{RpcResponse, TransportProvider};
use crate::device_state::DeviceStateController;
use crate::parameters::{GlobalParameters, SetupParameters};
use crate::platform::{Clock, DeviceIdentity, DevicePolicyController, NotificationSink};
use crate::provision::ProvisionStateController;
use crate::scheduler::{DeviceLockScheduler, WorkDispatcher, WorkName, WorkResult};

/// Services shared by every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub params: GlobalParameters,
    pub setup: SetupParameters,
    pub scheduler: DeviceLockScheduler,
    pub provision: Arc<ProvisionStateController>,
    pub device_state: DeviceStateController,
    pub transports: Arc<dyn TransportProvider>,
    pub identity: Arc<dyn DeviceIdentity>,
    pub notifications: Arc<dyn NotificationSink>,
    pub policy: Arc<dyn DevicePolicyController>,
    pub clock: Arc<dyn Clock>,
}

/// Registers a worker for every [`WorkName`].
pub fn register_workers(dispatcher: &mut WorkDispatcher, ctx: &WorkerContext) {
    dispatcher
        .register(WorkName::CheckIn, Arc::new(CheckInWorker::new(ctx.clone())))
        .register(
            WorkName::ReportProvisionState,
            Arc::new(ReportProvisionStateWorker::new(ctx.clone())),
        )
        .register(
            WorkName::ReviewProvisionState,
            Arc::new(ReviewProvisionStateWorker::new(ctx.clone())),
        )
        .register(
            WorkName::ResetDevice,
            Arc::new(ResetDeviceWorker::new(ctx.clone())),
        )
        .register(
            WorkName::NextFailedStep,
            Arc::new(NextFailedStepWorker::new(ctx.clone())),
        )
        .register(
            WorkName::ResumeProvision,
            Arc::new(ResumeProvisionWorker::new(ctx.clone())),
        )
        .register(
            WorkName::SetupWizardTimeout,
            Arc::new(SetupWizardTimeoutWorker::new(ctx.clone())),
        )
        .register(
            WorkName::PauseProvision,
            Arc::new(PauseProvisionWorker::new(ctx.clone())),
        )
        .register(
            WorkName::UpdateFcmToken,
            Arc::new(UpdateFcmTokenWorker::new(ctx.clone())),
        )
        .register(
            WorkName::ReportProgramComplete,
            Arc::new(ReportProgramCompleteWorker::new(ctx.clone())),
        );
}

/// Recoverable errors retry with backoff, fatal ones give up.
pub(crate) fn result_for<T>(response: &RpcResponse<T>) -> WorkResult {
    match response {
        RpcResponse::Success(_) => WorkResult::Success,
        RpcResponse::RecoverableError(_) => WorkResult::Retry,
        RpcResponse::FatalError(_) => WorkResult::Failure,
    }
}
