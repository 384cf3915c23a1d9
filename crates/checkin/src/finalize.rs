//! Finalize service client.

use async_trait::async_trait;
use log::info;

use devicelock_core::checkin::{FinalizationReporter, RpcResponse};

use crate::channel::{ChannelConfig, CheckInChannel};
use crate::client::classify;
use crate::error::{CheckInError, Result};
use crate::wire::{self, EmptyResponse};

#[derive(Debug)]
pub struct FinalizeClient {
    channel: CheckInChannel,
}

impl FinalizeClient {
    pub fn new(config: ChannelConfig) -> Result<Self> {
        Ok(Self {
            channel: CheckInChannel::new(config)?,
        })
    }

    async fn report(&self) -> Result<()> {
        let registered_device_identifier = self
            .channel
            .config()
            .registered_id
            .clone()
            .ok_or_else(|| CheckInError::invalid_request("Device is not registered yet"))?;
        let body = wire::ReportDeviceProgramCompleteRequest {
            registered_device_identifier,
        };
        self.channel
            .post::<_, EmptyResponse>(wire::RPC_REPORT_DEVICE_PROGRAM_COMPLETE, &body)
            .await?;
        info!("[Finalize] Program completion reported");
        Ok(())
    }
}

#[async_trait]
impl FinalizationReporter for FinalizeClient {
    async fn report_program_complete(&self) -> devicelock_core::Result<RpcResponse<()>> {
        classify(self.report().await)
    }
}
