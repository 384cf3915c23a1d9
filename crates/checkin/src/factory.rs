//! Process-wide check-in client, rebuilt when its parameters change.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::info;

use devicelock_core::checkin::{
    CheckInTransport, FinalizationReporter, ProvisioningReporter, TransportProvider,
};
use devicelock_core::parameters::GlobalParameters;

use crate::channel::ChannelConfig;
use crate::client::CheckInClient;
use crate::debug::{DebugScenario, DebugTransport};
use crate::error::{CheckInError, Result};
use crate::finalize::FinalizeClient;
use crate::network::NetworkMonitor;

/// Which backend a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Remote,
    Debug(DebugScenario),
}

/// Inputs that identify one client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientParams {
    pub host: String,
    pub registered_id: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub enum LiveTransport {
    Remote {
        checkin: Arc<CheckInClient>,
        finalize: Arc<FinalizeClient>,
    },
    Debug(Arc<DebugTransport>),
}

impl LiveTransport {
    fn shutdown(&self) {
        if let LiveTransport::Remote { checkin, .. } = self {
            checkin.shutdown();
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            LiveTransport::Remote { .. } => TransportMode::Remote,
            LiveTransport::Debug(transport) => TransportMode::Debug(transport.scenario()),
        }
    }
}

struct LiveSlot {
    params: ClientParams,
    transport: LiveTransport,
}

pub struct CheckInClientFactory {
    params: GlobalParameters,
    default_host: String,
    default_debug: bool,
    api_token: String,
    debug_scenario: DebugScenario,
    monitor: Option<Arc<NetworkMonitor>>,
    live: Mutex<Option<LiveSlot>>,
}

impl CheckInClientFactory {
    pub fn new(
        params: GlobalParameters,
        default_host: &str,
        api_token: &str,
        monitor: Option<Arc<NetworkMonitor>>,
    ) -> Self {
        Self {
            params,
            default_host: default_host.trim_end_matches('/').to_string(),
            default_debug: false,
            api_token: api_token.to_string(),
            debug_scenario: DebugScenario::default(),
            monitor,
            live: Mutex::new(None),
        }
    }

    /// Debug transport settings; the persisted debug flag can still turn
    /// debug mode on when `enabled` is false.
    pub fn with_debug(mut self, enabled: bool, scenario: DebugScenario) -> Self {
        self.default_debug = enabled;
        self.debug_scenario = scenario;
        self
    }

    /// Reads host, registration and debug flag from the parameter store.
    pub async fn current_params(&self) -> devicelock_core::Result<ClientParams> {
        let host = self
            .params
            .host_override()
            .await?
            .unwrap_or_else(|| self.default_host.clone());
        Ok(ClientParams {
            host,
            registered_id: self.params.registered_device_id().await?,
            debug: self.default_debug || self.params.debug_mode().await?,
        })
    }

    fn build(&self, params: &ClientParams) -> Result<LiveTransport> {
        if params.debug {
            return Ok(LiveTransport::Debug(Arc::new(DebugTransport::new(
                self.debug_scenario,
            ))));
        }
        let config = ChannelConfig::new(&params.host, &self.api_token)
            .with_registered_id(params.registered_id.clone());
        Ok(LiveTransport::Remote {
            checkin: Arc::new(CheckInClient::new(config.clone(), self.monitor.as_deref())?),
            finalize: Arc::new(FinalizeClient::new(config)?),
        })
    }

    /// Returns the live transport for `params`, replacing the previous one when
    /// its parameters differ. The whole check-and-swap runs under one lock.
    pub fn get(&self, params: &ClientParams) -> Result<LiveTransport> {
        let mut live = self
            .live
            .lock()
            .map_err(|_| CheckInError::invalid_request("Client factory lock poisoned"))?;

        if let Some(slot) = live.as_ref() {
            if slot.params == *params {
                return Ok(slot.transport.clone());
            }
        }

        let transport = self.build(params)?;
        if let Some(previous) = live.replace(LiveSlot {
            params: params.clone(),
            transport: transport.clone(),
        }) {
            info!(
                "[CheckIn] Client parameters changed (host {} -> {}); rebuilding",
                previous.params.host, params.host
            );
            previous.transport.shutdown();
        }
        Ok(transport)
    }

    /// Tears down the live client, if any.
    pub fn shutdown(&self) {
        let previous = match self.live.lock() {
            Ok(mut live) => live.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(slot) = previous {
            slot.transport.shutdown();
        }
    }

    async fn live(&self) -> devicelock_core::Result<LiveTransport> {
        let params = self.current_params().await?;
        Ok(self.get(&params)?)
    }
}

#[async_trait]
impl TransportProvider for CheckInClientFactory {
    async fn check_in(&self) -> devicelock_core::Result<Arc<dyn CheckInTransport>> {
        let transport: Arc<dyn CheckInTransport> = match self.live().await? {
            LiveTransport::Remote { checkin, .. } => checkin,
            LiveTransport::Debug(transport) => transport,
        };
        Ok(transport)
    }

    async fn reporter(&self) -> devicelock_core::Result<Arc<dyn ProvisioningReporter>> {
        let transport: Arc<dyn ProvisioningReporter> = match self.live().await? {
            LiveTransport::Remote { checkin, .. } => checkin,
            LiveTransport::Debug(transport) => transport,
        };
        Ok(transport)
    }

    async fn finalizer(&self) -> devicelock_core::Result<Arc<dyn FinalizationReporter>> {
        let transport: Arc<dyn FinalizationReporter> = match self.live().await? {
            LiveTransport::Remote { finalize, .. } => finalize,
            LiveTransport::Debug(transport) => transport,
        };
        Ok(transport)
    }
}
