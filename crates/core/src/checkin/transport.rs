//! Transport seams between the provisioning logic and the backend.

use std::sync::Arc;

use async_trait::async_trait;

use super::model::{
    CheckInRequest, CheckInResponse, FcmTokenResult, ProvisionReportRequest,
    ProvisionReportResponse, RpcResponse,
};
use crate::errors::Result;
use crate::provision::PauseReason;

/// Check-in service RPCs.
///
/// `Err` is reserved for protocol drift (a reply that cannot be mapped onto the
/// domain); every network or server outcome is expressed in [`RpcResponse`].
#[async_trait]
pub trait CheckInTransport: Send + Sync {
    async fn get_check_in_status(
        &self,
        request: &CheckInRequest,
    ) -> Result<RpcResponse<CheckInResponse>>;

    async fn is_device_in_approved_country(
        &self,
        carrier_mccmnc: Option<&str>,
    ) -> Result<RpcResponse<bool>>;

    async fn pause_provisioning(&self, reason: PauseReason) -> Result<RpcResponse<()>>;

    async fn update_fcm_token(&self, token: &str) -> Result<RpcResponse<FcmTokenResult>>;
}

#[async_trait]
pub trait ProvisioningReporter: Send + Sync {
    async fn report_provision_state(
        &self,
        request: &ProvisionReportRequest,
    ) -> Result<RpcResponse<ProvisionReportResponse>>;
}

/// Finalize service.
#[async_trait]
pub trait FinalizationReporter: Send + Sync {
    async fn report_program_complete(&self) -> Result<RpcResponse<()>>;
}

/// Hands out the transport matching the current persisted parameters (host,
/// registered id, debug mode). Implementations rebuild the underlying client
/// when those change.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn check_in(&self) -> Result<Arc<dyn CheckInTransport>>;
    async fn reporter(&self) -> Result<Arc<dyn ProvisioningReporter>>;
    async fn finalizer(&self) -> Result<Arc<dyn FinalizationReporter>>;
}
