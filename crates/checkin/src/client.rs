//! Dual-path check-in client.
//!
//! Every RPC goes out on the primary channel first. When that fails with a
//! recoverable error and a non-VPN network is known, the call is repeated
//! exactly once on a channel bound to that network and its outcome wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use devicelock_core::checkin::{
    CheckInRequest, CheckInResponse, CheckInTransport, FcmTokenResult, ProvisionReportRequest,
    ProvisionReportResponse, ProvisioningReporter, RpcResponse,
};
use devicelock_core::provision::PauseReason;

use crate::channel::{ChannelConfig, CheckInChannel};
use crate::error::{CheckInError, Result, RpcRetryClass};
use crate::network::{NetworkMonitor, NetworkSnapshot};
use crate::wire::{self, EmptyResponse};

type ChannelSlot = Arc<RwLock<Option<Arc<CheckInChannel>>>>;

/// Maps a client result onto the core response wrapper. Protocol drift stays
/// an `Err` so callers treat it as unrecoverable.
pub(crate) fn classify<T>(result: Result<T>) -> devicelock_core::Result<RpcResponse<T>> {
    match result {
        Ok(value) => Ok(RpcResponse::Success(value)),
        Err(CheckInError::Protocol(message)) => Err(devicelock_core::Error::Protocol(message)),
        Err(err) => match err.retry_class() {
            RpcRetryClass::Recoverable => Ok(RpcResponse::RecoverableError(err.to_string())),
            RpcRetryClass::Fatal => Ok(RpcResponse::FatalError(err.to_string())),
        },
    }
}

fn build_non_vpn_channel(
    config: &ChannelConfig,
    snapshot: &NetworkSnapshot,
) -> Option<Arc<CheckInChannel>> {
    let address = snapshot.fallback_address()?;
    match CheckInChannel::new(config.bound_to(address)) {
        Ok(channel) => Some(Arc::new(channel)),
        Err(e) => {
            warn!("[CheckIn] Failed to build non-VPN channel on {}: {}", address, e);
            None
        }
    }
}

fn install_non_vpn_channel(slot: &ChannelSlot, config: &ChannelConfig, snapshot: &NetworkSnapshot) {
    let next = build_non_vpn_channel(config, snapshot);
    let mut guard = match slot.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match &next {
        Some(channel) => debug!(
            "[CheckIn] Non-VPN channel bound to {:?}",
            channel.local_address()
        ),
        None if guard.is_some() => debug!("[CheckIn] Non-VPN channel dropped"),
        None => {}
    }
    *guard = next;
}

pub struct CheckInClient {
    primary: CheckInChannel,
    non_vpn: ChannelSlot,
    config: ChannelConfig,
    watcher: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for CheckInClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInClient")
            .field("base_url", &self.config.base_url)
            .field("registered_id", &self.config.registered_id)
            .field("has_non_vpn_channel", &self.has_non_vpn_channel())
            .finish()
    }
}

impl CheckInClient {
    /// Builds the client and, when a monitor is given, starts tracking the
    /// best non-VPN network. The current snapshot is applied before returning.
    pub fn new(config: ChannelConfig, monitor: Option<&NetworkMonitor>) -> Result<Self> {
        let primary = CheckInChannel::new(config.clone())?;
        let non_vpn: ChannelSlot = Arc::new(RwLock::new(None));
        let mut watcher = None;

        if let Some(monitor) = monitor {
            let mut receiver = monitor.subscribe();
            let snapshot = receiver.borrow_and_update().clone();
            install_non_vpn_channel(&non_vpn, &config, &snapshot);

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    watcher = Some(handle.spawn(Self::watch_networks(
                        receiver,
                        Arc::clone(&non_vpn),
                        config.clone(),
                    )));
                }
                Err(_) => warn!("[CheckIn] No runtime; non-VPN channel will not follow network changes"),
            }
        }

        Ok(Self {
            primary,
            non_vpn,
            config,
            watcher: Mutex::new(watcher),
            shut_down: AtomicBool::new(false),
        })
    }

    async fn watch_networks(
        mut receiver: watch::Receiver<NetworkSnapshot>,
        slot: ChannelSlot,
        config: ChannelConfig,
    ) {
        while receiver.changed().await.is_ok() {
            let snapshot = receiver.borrow_and_update().clone();
            install_non_vpn_channel(&slot, &config, &snapshot);
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn has_non_vpn_channel(&self) -> bool {
        self.non_vpn_channel().is_some()
    }

    fn non_vpn_channel(&self) -> Option<Arc<CheckInChannel>> {
        match self.non_vpn.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stops following network changes and drops the non-VPN channel.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = match self.watcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        match self.non_vpn.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        info!("[CheckIn] Client for {} shut down", self.config.base_url);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn registered_id(&self) -> Result<String> {
        self.config
            .registered_id
            .clone()
            .ok_or_else(|| CheckInError::invalid_request("Device is not registered yet"))
    }

    async fn call<B, R>(&self, rpc: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        if self.is_shut_down() {
            return Err(CheckInError::invalid_request("Check-in client is shut down"));
        }

        match self.primary.post(rpc, body).await {
            Err(err) if err.retry_class() == RpcRetryClass::Recoverable => {
                let Some(fallback) = self.non_vpn_channel() else {
                    return Err(err);
                };
                warn!(
                    "[CheckIn] {} failed on default network ({}); retrying over non-VPN network",
                    rpc, err
                );
                fallback.post(rpc, body).await
            }
            other => other,
        }
    }
}

impl Drop for CheckInClient {
    fn drop(&mut self) {
        let handle = match self.watcher.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl CheckInTransport for CheckInClient {
    async fn get_check_in_status(
        &self,
        request: &CheckInRequest,
    ) -> devicelock_core::Result<RpcResponse<CheckInResponse>> {
        let body = wire::GetDeviceCheckinStatusRequest::from(request);
        let result = self
            .call::<_, wire::GetDeviceCheckinStatusResponse>(
                wire::RPC_GET_DEVICE_CHECKIN_STATUS,
                &body,
            )
            .await
            .and_then(|response| response.into_domain());
        classify(result)
    }

    async fn is_device_in_approved_country(
        &self,
        carrier_mccmnc: Option<&str>,
    ) -> devicelock_core::Result<RpcResponse<bool>> {
        let result = match self.registered_id() {
            Ok(registered_device_identifier) => {
                let body = wire::IsDeviceInApprovedCountryRequest {
                    registered_device_identifier,
                    carrier_mccmnc: carrier_mccmnc.map(str::to_string),
                };
                self.call::<_, wire::IsDeviceInApprovedCountryResponse>(
                    wire::RPC_IS_DEVICE_IN_APPROVED_COUNTRY,
                    &body,
                )
                .await
                .map(|response| response.is_device_in_approved_country)
            }
            Err(e) => Err(e),
        };
        classify(result)
    }

    async fn pause_provisioning(
        &self,
        reason: PauseReason,
    ) -> devicelock_core::Result<RpcResponse<()>> {
        let result = match self.registered_id() {
            Ok(registered_device_identifier) => {
                let body = wire::PauseDeviceProvisioningRequest {
                    registered_device_identifier,
                    pause_reason: reason.into(),
                };
                self.call::<_, EmptyResponse>(wire::RPC_PAUSE_DEVICE_PROVISIONING, &body)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        };
        classify(result)
    }

    async fn update_fcm_token(
        &self,
        token: &str,
    ) -> devicelock_core::Result<RpcResponse<FcmTokenResult>> {
        let result = match self.registered_id() {
            Ok(registered_device_identifier) => {
                let body = wire::UpdateFcmTokenRequest {
                    registered_device_identifier,
                    fcm_registration_token: token.to_string(),
                };
                self.call::<_, wire::UpdateFcmTokenResponse>(wire::RPC_UPDATE_FCM_TOKEN, &body)
                    .await
                    .and_then(|response| response.into_domain())
            }
            Err(e) => Err(e),
        };
        classify(result)
    }
}

#[async_trait]
impl ProvisioningReporter for CheckInClient {
    async fn report_provision_state(
        &self,
        request: &ProvisionReportRequest,
    ) -> devicelock_core::Result<RpcResponse<ProvisionReportResponse>> {
        let result = match self.registered_id() {
            Ok(registered_device_identifier) => {
                let body = wire::ReportDeviceProvisionStateRequest {
                    registered_device_identifier,
                    previous_device_provision_state: request.previous_state.into(),
                    is_provisioning_successful: request.is_successful,
                    provisioning_failure_reason: request.failure_reason.into(),
                };
                self.call::<_, wire::ReportDeviceProvisionStateResponse>(
                    wire::RPC_REPORT_DEVICE_PROVISION_STATE,
                    &body,
                )
                .await
                .map(ProvisionReportResponse::from)
            }
            Err(e) => Err(e),
        };
        classify(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkInfo;
    use crate::test_server::{start_mock_server, MockReply};
    use devicelock_core::checkin::{BuildInfo, CheckInStatus, DeviceId};
    use devicelock_core::provision::{DeviceProvisionState, ProvisionFailureReason};
    use serde_json::json;
    use std::net::IpAddr;
    use std::time::Duration;

    fn request() -> CheckInRequest {
        CheckInRequest {
            device_ids: vec![DeviceId::imei("490154203237518")],
            carrier_mccmnc: Some("310260".to_string()),
            fcm_token: Some("fcm-1".to_string()),
            build_info: BuildInfo {
                manufacturer: "Acme".to_string(),
                model: "P1".to_string(),
                fingerprint: "acme/p1/1".to_string(),
            },
        }
    }

    fn config(base_url: &str) -> ChannelConfig {
        ChannelConfig::new(base_url, "token").with_registered_id(Some("reg-1".to_string()))
    }

    fn loopback_network(vpn: bool, validated: bool) -> NetworkInfo {
        NetworkInfo {
            id: "wlan0".to_string(),
            local_address: Some("127.0.0.2".parse().unwrap()),
            validated,
            vpn,
        }
    }

    fn retry_body() -> serde_json::Value {
        json!({
            "device_checkin_status": "DEVICE_CHECKIN_STATUS_RETRY_CHECKIN",
            "registered_device_identifier": "reg-1",
            "next_checkin_time": "2026-03-02T09:00:00Z"
        })
    }

    fn unavailable() -> MockReply {
        MockReply::json(503, json!({"code": "UNAVAILABLE", "message": "try later"}))
    }

    #[tokio::test]
    async fn check_in_success_maps_status() {
        let (base_url, captured, server) =
            start_mock_server(vec![MockReply::json(200, retry_body())]).await;

        let client = CheckInClient::new(config(&base_url), None).unwrap();
        let response = client.get_check_in_status(&request()).await.unwrap();

        let RpcResponse::Success(response) = response else {
            panic!("expected success, got {:?}", response);
        };
        assert_eq!(response.registered_device_id.as_deref(), Some("reg-1"));
        assert!(matches!(response.status, CheckInStatus::RetryCheckIn { .. }));

        let requests = captured.lock().await.clone();
        assert_eq!(requests[0].path, "/api/v1/devicelock/checkin-status");
        assert_eq!(
            requests[0].body["device_identifiers"][0]["type"],
            json!("DEVICE_IDENTIFIER_TYPE_IMEI")
        );
        server.abort();
    }

    #[tokio::test]
    async fn unavailable_without_fallback_is_recoverable() {
        let (base_url, captured, server) = start_mock_server(vec![unavailable()]).await;

        let client = CheckInClient::new(config(&base_url), None).unwrap();
        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.has_recoverable_error());
        assert_eq!(captured.lock().await.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn rejected_request_is_fatal_and_not_retried() {
        let (base_url, captured, server) = start_mock_server(vec![MockReply::json(
            400,
            json!({"code": "INVALID_ARGUMENT", "message": "bad imei"}),
        )])
        .await;

        let monitor = NetworkMonitor::new();
        monitor.update_networks(&[loopback_network(false, true)]);
        let client = CheckInClient::new(config(&base_url), Some(&monitor)).unwrap();
        assert!(client.has_non_vpn_channel());

        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.has_fatal_error());
        assert_eq!(captured.lock().await.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn recoverable_error_retries_once_over_non_vpn_network() {
        let (base_url, captured, server) =
            start_mock_server(vec![unavailable(), MockReply::json(200, retry_body())]).await;

        let monitor = NetworkMonitor::new();
        monitor.update_networks(&[loopback_network(false, true)]);
        let client = CheckInClient::new(config(&base_url), Some(&monitor)).unwrap();

        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.is_successful());
        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 2);
        let fallback: IpAddr = "127.0.0.2".parse().unwrap();
        assert_ne!(requests[0].peer, fallback);
        assert_eq!(requests[1].peer, fallback);
        server.abort();
    }

    #[tokio::test]
    async fn fallback_result_is_returned_even_when_it_fails() {
        let (base_url, captured, server) = start_mock_server(vec![
            unavailable(),
            MockReply::json(403, json!({"code": "PERMISSION_DENIED", "message": "no"})),
            MockReply::json(200, retry_body()),
        ])
        .await;

        let monitor = NetworkMonitor::new();
        monitor.update_networks(&[loopback_network(false, true)]);
        let client = CheckInClient::new(config(&base_url), Some(&monitor)).unwrap();

        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.has_fatal_error());
        assert_eq!(captured.lock().await.len(), 2);
        server.abort();
    }

    #[tokio::test]
    async fn vpn_or_unvalidated_networks_give_no_fallback() {
        let (base_url, captured, server) =
            start_mock_server(vec![unavailable(), unavailable()]).await;

        let monitor = NetworkMonitor::new();
        monitor.update_networks(&[loopback_network(true, true), loopback_network(false, false)]);
        let client = CheckInClient::new(config(&base_url), Some(&monitor)).unwrap();
        assert!(!client.has_non_vpn_channel());

        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.has_recoverable_error());
        assert_eq!(captured.lock().await.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn deadline_exceeded_is_recoverable() {
        let (base_url, _captured, server) =
            start_mock_server(vec![MockReply::json(200, retry_body()).delayed(1_000)]).await;

        let mut config = config(&base_url);
        config.timeout = Duration::from_millis(100);
        let client = CheckInClient::new(config, None).unwrap();

        let response = client.get_check_in_status(&request()).await.unwrap();

        assert!(response.has_recoverable_error());
        server.abort();
    }

    #[tokio::test]
    async fn unspecified_status_is_protocol_error() {
        let (base_url, _captured, server) = start_mock_server(vec![MockReply::json(
            200,
            json!({"device_checkin_status": "DEVICE_CHECKIN_STATUS_UNSPECIFIED"}),
        )])
        .await;

        let client = CheckInClient::new(config(&base_url), None).unwrap();
        let err = client.get_check_in_status(&request()).await.unwrap_err();

        assert!(err.is_unrecoverable());
        server.abort();
    }

    #[tokio::test]
    async fn report_requires_registration() {
        let (base_url, captured, server) = start_mock_server(vec![]).await;

        let client = CheckInClient::new(ChannelConfig::new(&base_url, "token"), None).unwrap();
        let response = client
            .report_provision_state(&ProvisionReportRequest {
                previous_state: DeviceProvisionState::Unspecified,
                is_successful: false,
                failure_reason: Some(ProvisionFailureReason::DeadlinePassed),
            })
            .await
            .unwrap();

        assert!(response.has_fatal_error());
        assert!(captured.lock().await.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn report_maps_wire_fields() {
        let (base_url, captured, server) = start_mock_server(vec![MockReply::json(
            200,
            json!({
                "next_client_provision_state": "CLIENT_PROVISION_STATE_FACTORY_RESET",
                "days_left_until_reset": 3
            }),
        )])
        .await;

        let client = CheckInClient::new(config(&base_url), None).unwrap();
        let response = client
            .report_provision_state(&ProvisionReportRequest {
                previous_state: DeviceProvisionState::PersistentUi,
                is_successful: false,
                failure_reason: Some(ProvisionFailureReason::PlayInstallationFailed),
            })
            .await
            .unwrap();

        assert_eq!(
            response,
            RpcResponse::Success(ProvisionReportResponse {
                next_state: DeviceProvisionState::FactoryReset,
                days_left_until_reset: 3,
            })
        );
        let body = captured.lock().await[0].body.clone();
        assert_eq!(body["registered_device_identifier"], json!("reg-1"));
        assert_eq!(
            body["previous_device_provision_state"],
            json!("CLIENT_PROVISION_STATE_PERSISTENT_UI")
        );
        assert_eq!(
            body["provisioning_failure_reason"],
            json!("CLIENT_PROVISION_FAILURE_REASON_PLAY_INSTALLATION_FAILED")
        );
        server.abort();
    }

    #[tokio::test]
    async fn non_vpn_channel_follows_network_changes_until_shutdown() {
        let monitor = NetworkMonitor::new();
        let client = CheckInClient::new(config("http://127.0.0.1:9"), Some(&monitor)).unwrap();
        assert!(!client.has_non_vpn_channel());

        monitor.update_networks(&[loopback_network(false, true)]);
        for _ in 0..50 {
            if client.has_non_vpn_channel() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.has_non_vpn_channel());

        client.shutdown();
        assert!(client.is_shut_down());
        assert!(!client.has_non_vpn_channel());

        monitor.update_networks(&[]);
        monitor.update_networks(&[loopback_network(false, true)]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!client.has_non_vpn_channel());

        let response = client.get_check_in_status(&request()).await.unwrap();
        assert!(response.has_fatal_error());
    }
}
