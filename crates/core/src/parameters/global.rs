use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::{decode_bool, decode_enum, encode_enum, ParameterScope, ParameterStore};
use crate::device_state::{DeviceState, FinalizationState};
use crate::errors::{Error, Result};
use crate::provision::{DeviceProvisionState, ProvisionFailureReason, ProvisionState};

const REGISTERED_DEVICE_ID: &str = "registered_device_id";
const HOST_OVERRIDE: &str = "host_override";
const DEBUG_MODE: &str = "debug_mode";
const PROVISION_FORCED: &str = "provision_forced";
const PROVISION_READY: &str = "provision_ready";
const DEVICE_IN_APPROVED_COUNTRY: &str = "device_in_approved_country";
const LAST_RECEIVED_PROVISION_STATE: &str = "last_received_provision_state";
const DAYS_LEFT_UNTIL_RESET: &str = "days_left_until_reset";
const PROVISIONING_START_TIME: &str = "provisioning_start_time";
const SETUP_WIZARD_TIMED_OUT: &str = "setup_wizard_timed_out";
const SETUP_WIZARD_COMPLETED: &str = "setup_wizard_completed";
const NOTIFICATION_CHANNEL_SUFFIX: &str = "notification_channel_suffix";
const PROVISION_STATE: &str = "provision_state";
const CHECK_IN_DISABLED: &str = "check_in_disabled";
const DEVICE_STATE: &str = "device_state";
const FINALIZATION_STATE: &str = "finalization_state";
const LAST_FAILURE_REASON: &str = "last_failure_reason";
const FCM_TOKEN: &str = "fcm_token";

/// Result of storing the server-assigned registration id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Stored,
    Unchanged,
    /// A different id is already registered; the stored value was kept.
    Conflict { existing: String },
}

/// Typed access to device-wide parameters.
#[derive(Clone)]
pub struct GlobalParameters {
    store: Arc<dyn ParameterStore>,
}

impl GlobalParameters {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(ParameterScope::Global, key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.store.set(ParameterScope::Global, key, value).await
    }

    async fn set_or_remove(&self, key: &str, value: Option<String>) -> Result<()> {
        match value {
            Some(value) => self.set(key, value).await,
            None => self.store.remove(ParameterScope::Global, key).await,
        }
    }

    async fn get_flag(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .await?
            .map(|value| decode_bool(key, &value))
            .transpose()
    }

    async fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, value.to_string()).await
    }

    async fn get_enum<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .await?
            .map(|value| decode_enum(&value))
            .transpose()
    }

    async fn set_enum<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, encode_enum(value)?).await
    }

    pub async fn registered_device_id(&self) -> Result<Option<String>> {
        self.get(REGISTERED_DEVICE_ID).await
    }

    /// Stores the canonical device id once; it is immutable for the life of
    /// the enrollment.
    pub async fn set_registered_device_id(&self, id: &str) -> Result<RegistrationOutcome> {
        if id.is_empty() {
            return Err(Error::protocol("Server returned an empty registered device id"));
        }
        let existing = self
            .store
            .set_if_absent(ParameterScope::Global, REGISTERED_DEVICE_ID, id.to_string())
            .await?;
        Ok(match existing {
            None => RegistrationOutcome::Stored,
            Some(existing) if existing == id => RegistrationOutcome::Unchanged,
            Some(existing) => {
                warn!(
                    "[Parameters] Ignoring registered id change {} -> {}",
                    existing, id
                );
                RegistrationOutcome::Conflict { existing }
            }
        })
    }

    pub async fn host_override(&self) -> Result<Option<String>> {
        Ok(self.get(HOST_OVERRIDE).await?.filter(|host| !host.is_empty()))
    }

    pub async fn set_host_override(&self, host: Option<&str>) -> Result<()> {
        self.set_or_remove(HOST_OVERRIDE, host.map(str::to_string))
            .await
    }

    pub async fn debug_mode(&self) -> Result<bool> {
        Ok(self.get_flag(DEBUG_MODE).await?.unwrap_or(false))
    }

    pub async fn set_debug_mode(&self, enabled: bool) -> Result<()> {
        self.set_flag(DEBUG_MODE, enabled).await
    }

    pub async fn provision_forced(&self) -> Result<Option<bool>> {
        self.get_flag(PROVISION_FORCED).await
    }

    pub async fn set_provision_forced(&self, forced: bool) -> Result<()> {
        self.set_flag(PROVISION_FORCED, forced).await
    }

    /// `None` means the device never received a provisioning payload, which
    /// is distinct from `Some(false)`.
    pub async fn provision_ready(&self) -> Result<Option<bool>> {
        self.get_flag(PROVISION_READY).await
    }

    pub async fn set_provision_ready(&self, ready: bool) -> Result<()> {
        self.set_flag(PROVISION_READY, ready).await
    }

    pub async fn device_in_approved_country(&self) -> Result<Option<bool>> {
        self.get_flag(DEVICE_IN_APPROVED_COUNTRY).await
    }

    pub async fn set_device_in_approved_country(&self, approved: bool) -> Result<()> {
        self.set_flag(DEVICE_IN_APPROVED_COUNTRY, approved).await
    }

    pub async fn last_received_provision_state(&self) -> Result<Option<DeviceProvisionState>> {
        self.get_enum(LAST_RECEIVED_PROVISION_STATE).await
    }

    pub async fn set_last_received_provision_state(
        &self,
        state: DeviceProvisionState,
    ) -> Result<()> {
        self.set_enum(LAST_RECEIVED_PROVISION_STATE, &state).await
    }

    pub async fn days_left_until_reset(&self) -> Result<Option<i32>> {
        self.get(DAYS_LEFT_UNTIL_RESET)
            .await?
            .map(|value| {
                value.parse::<i32>().map_err(|_| {
                    Error::invalid_state(format!("Invalid days_left_until_reset: {}", value))
                })
            })
            .transpose()
    }

    pub async fn set_days_left_until_reset(&self, days: i32) -> Result<()> {
        self.set(DAYS_LEFT_UNTIL_RESET, days.to_string()).await
    }

    pub async fn provisioning_start_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.get(PROVISIONING_START_TIME)
            .await?
            .map(|value| {
                DateTime::parse_from_rfc3339(&value)
                    .map(|time| time.with_timezone(&Utc))
                    .map_err(|e| {
                        Error::invalid_state(format!("Invalid provisioning_start_time: {}", e))
                    })
            })
            .transpose()
    }

    pub async fn set_provisioning_start_time(&self, time: DateTime<Utc>) -> Result<()> {
        self.set(PROVISIONING_START_TIME, time.to_rfc3339()).await
    }

    pub async fn setup_wizard_timed_out(&self) -> Result<bool> {
        Ok(self.get_flag(SETUP_WIZARD_TIMED_OUT).await?.unwrap_or(false))
    }

    pub async fn set_setup_wizard_timed_out(&self, timed_out: bool) -> Result<()> {
        self.set_flag(SETUP_WIZARD_TIMED_OUT, timed_out).await
    }

    pub async fn setup_wizard_completed(&self) -> Result<bool> {
        Ok(self.get_flag(SETUP_WIZARD_COMPLETED).await?.unwrap_or(false))
    }

    pub async fn set_setup_wizard_completed(&self, completed: bool) -> Result<()> {
        self.set_flag(SETUP_WIZARD_COMPLETED, completed).await
    }

    /// Suffix appended to the notification channel id, created on first use.
    pub async fn notification_channel_suffix(&self) -> Result<String> {
        let candidate = uuid::Uuid::new_v4().simple().to_string();
        let existing = self
            .store
            .set_if_absent(
                ParameterScope::Global,
                NOTIFICATION_CHANNEL_SUFFIX,
                candidate.clone(),
            )
            .await?;
        Ok(existing.unwrap_or(candidate))
    }

    pub async fn provision_state(&self) -> Result<ProvisionState> {
        Ok(self.get_enum(PROVISION_STATE).await?.unwrap_or_default())
    }

    pub async fn set_provision_state(&self, state: ProvisionState) -> Result<()> {
        self.set_enum(PROVISION_STATE, &state).await
    }

    /// Sticky once set: nothing re-enables check-in.
    pub async fn check_in_disabled(&self) -> Result<bool> {
        Ok(self.get_flag(CHECK_IN_DISABLED).await?.unwrap_or(false))
    }

    pub async fn disable_check_in(&self) -> Result<()> {
        self.set_flag(CHECK_IN_DISABLED, true).await
    }

    pub async fn device_state(&self) -> Result<DeviceState> {
        Ok(self.get_enum(DEVICE_STATE).await?.unwrap_or_default())
    }

    pub async fn set_device_state(&self, state: DeviceState) -> Result<()> {
        self.set_enum(DEVICE_STATE, &state).await
    }

    pub async fn finalization_state(&self) -> Result<FinalizationState> {
        Ok(self.get_enum(FINALIZATION_STATE).await?.unwrap_or_default())
    }

    pub async fn set_finalization_state(&self, state: FinalizationState) -> Result<()> {
        self.set_enum(FINALIZATION_STATE, &state).await
    }

    pub async fn last_failure_reason(&self) -> Result<Option<ProvisionFailureReason>> {
        self.get_enum(LAST_FAILURE_REASON).await
    }

    pub async fn set_last_failure_reason(&self, reason: ProvisionFailureReason) -> Result<()> {
        self.set_enum(LAST_FAILURE_REASON, &reason).await
    }

    pub async fn fcm_token(&self) -> Result<Option<String>> {
        self.get(FCM_TOKEN).await
    }

    pub async fn set_fcm_token(&self, token: &str) -> Result<()> {
        self.set(FCM_TOKEN, token.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryParameterStore;

    fn params() -> GlobalParameters {
        GlobalParameters::new(Arc::new(MemoryParameterStore::default()))
    }

    #[tokio::test]
    async fn unset_flags_are_distinct_from_false() {
        let params = params();
        assert_eq!(params.provision_ready().await.unwrap(), None);
        params.set_provision_ready(false).await.unwrap();
        assert_eq!(params.provision_ready().await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn registered_id_is_immutable_once_set() {
        let params = params();
        assert_eq!(
            params.set_registered_device_id("dev-1").await.unwrap(),
            RegistrationOutcome::Stored
        );
        assert_eq!(
            params.set_registered_device_id("dev-1").await.unwrap(),
            RegistrationOutcome::Unchanged
        );
        assert_eq!(
            params.set_registered_device_id("dev-2").await.unwrap(),
            RegistrationOutcome::Conflict {
                existing: "dev-1".to_string()
            }
        );
        assert_eq!(
            params.registered_device_id().await.unwrap().as_deref(),
            Some("dev-1")
        );
    }

    #[tokio::test]
    async fn last_received_state_reads_back_every_value() {
        let params = params();
        for state in DeviceProvisionState::ALL {
            params.set_last_received_provision_state(state).await.unwrap();
            assert_eq!(
                params.last_received_provision_state().await.unwrap(),
                Some(state)
            );
        }
    }

    #[tokio::test]
    async fn provision_state_defaults_to_unprovisioned() {
        let params = params();
        assert_eq!(
            params.provision_state().await.unwrap(),
            ProvisionState::Unprovisioned
        );
        params
            .set_provision_state(ProvisionState::ProvisionPaused)
            .await
            .unwrap();
        assert_eq!(
            params.provision_state().await.unwrap(),
            ProvisionState::ProvisionPaused
        );
    }

    #[tokio::test]
    async fn channel_suffix_is_stable() {
        let params = params();
        let first = params.notification_channel_suffix().await.unwrap();
        let second = params.notification_channel_suffix().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn start_time_keeps_second_precision() {
        let params = params();
        let start = DateTime::parse_from_rfc3339("2026-03-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        params.set_provisioning_start_time(start).await.unwrap();
        assert_eq!(params.provisioning_start_time().await.unwrap(), Some(start));
    }
}
