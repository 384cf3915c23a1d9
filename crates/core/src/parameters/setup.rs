use std::sync::Arc;

use super::store::{decode_bool, decode_enum, encode_enum, ParameterScope, ParameterStore};
use crate::checkin::{ProvisioningConfiguration, ProvisioningType};
use crate::errors::Result;

const KIOSK_APP_PACKAGE: &str = "kiosk_app_package";
const KIOSK_APP_DOWNLOAD_URL: &str = "kiosk_app_download_url";
const KIOSK_APP_SIGNATURE_CHECKSUM: &str = "kiosk_app_signature_checksum";
const PROVIDER_NAME: &str = "provider_name";
const TERMS_AND_CONDITIONS_URL: &str = "terms_and_conditions_url";
const SUPPORT_URL: &str = "support_url";
const ALLOWLISTED_PACKAGES: &str = "allowlisted_packages";
const DISABLE_OUTGOING_CALLS: &str = "disable_outgoing_calls";
const ENABLE_NOTIFICATIONS_IN_LOCK_TASK: &str = "enable_notifications_in_lock_task";
const PROVISIONING_TYPE: &str = "provisioning_type";
const ENROLLMENT_TOKEN: &str = "enrollment_token";

const ALL_KEYS: [&str; 11] = [
    KIOSK_APP_PACKAGE,
    KIOSK_APP_DOWNLOAD_URL,
    KIOSK_APP_SIGNATURE_CHECKSUM,
    PROVIDER_NAME,
    TERMS_AND_CONDITIONS_URL,
    SUPPORT_URL,
    ALLOWLISTED_PACKAGES,
    DISABLE_OUTGOING_CALLS,
    ENABLE_NOTIFICATIONS_IN_LOCK_TASK,
    PROVISIONING_TYPE,
    ENROLLMENT_TOKEN,
];

/// Provisioning configuration pushed by the server.
///
/// The kiosk package is written last, so its presence marks a complete
/// configuration.
#[derive(Clone)]
pub struct SetupParameters {
    store: Arc<dyn ParameterStore>,
}

impl SetupParameters {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(ParameterScope::Setup, key).await
    }

    async fn put(&self, key: &str, value: Option<String>) -> Result<()> {
        match value {
            Some(value) => self.store.set(ParameterScope::Setup, key, value).await,
            None => self.store.remove(ParameterScope::Setup, key).await,
        }
    }

    pub async fn store_configuration(&self, config: &ProvisioningConfiguration) -> Result<()> {
        self.store.remove(ParameterScope::Setup, KIOSK_APP_PACKAGE).await?;

        self.put(
            KIOSK_APP_DOWNLOAD_URL,
            Some(config.kiosk_app_download_url.clone()),
        )
        .await?;
        self.put(
            KIOSK_APP_SIGNATURE_CHECKSUM,
            Some(config.kiosk_app_signature_checksum.clone()),
        )
        .await?;
        self.put(PROVIDER_NAME, Some(config.provider_name.clone()))
            .await?;
        self.put(
            TERMS_AND_CONDITIONS_URL,
            config.terms_and_conditions_url.clone(),
        )
        .await?;
        self.put(SUPPORT_URL, config.support_url.clone()).await?;
        self.put(
            ALLOWLISTED_PACKAGES,
            Some(serde_json::to_string(&config.allowlisted_packages)?),
        )
        .await?;
        self.put(
            DISABLE_OUTGOING_CALLS,
            Some(config.disable_outgoing_calls.to_string()),
        )
        .await?;
        self.put(
            ENABLE_NOTIFICATIONS_IN_LOCK_TASK,
            Some(config.enable_notifications_in_lock_task.to_string()),
        )
        .await?;
        self.put(
            PROVISIONING_TYPE,
            Some(encode_enum(&config.provisioning_type)?),
        )
        .await?;
        self.put(ENROLLMENT_TOKEN, config.enrollment_token.clone())
            .await?;

        self.put(KIOSK_APP_PACKAGE, Some(config.kiosk_app_package.clone()))
            .await
    }

    pub async fn configuration(&self) -> Result<Option<ProvisioningConfiguration>> {
        let Some(kiosk_app_package) = self.get(KIOSK_APP_PACKAGE).await? else {
            return Ok(None);
        };

        let allowlisted_packages = match self.get(ALLOWLISTED_PACKAGES).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let provisioning_type = match self.get(PROVISIONING_TYPE).await? {
            Some(raw) => decode_enum(&raw)?,
            None => ProvisioningType::default(),
        };
        let flag = |key: &'static str, raw: Option<String>| -> Result<bool> {
            raw.map(|value| decode_bool(key, &value))
                .transpose()
                .map(|value| value.unwrap_or(false))
        };

        Ok(Some(ProvisioningConfiguration {
            kiosk_app_package,
            kiosk_app_download_url: self.get(KIOSK_APP_DOWNLOAD_URL).await?.unwrap_or_default(),
            kiosk_app_signature_checksum: self
                .get(KIOSK_APP_SIGNATURE_CHECKSUM)
                .await?
                .unwrap_or_default(),
            provider_name: self.get(PROVIDER_NAME).await?.unwrap_or_default(),
            terms_and_conditions_url: self.get(TERMS_AND_CONDITIONS_URL).await?,
            support_url: self.get(SUPPORT_URL).await?,
            allowlisted_packages,
            disable_outgoing_calls: flag(
                DISABLE_OUTGOING_CALLS,
                self.get(DISABLE_OUTGOING_CALLS).await?,
            )?,
            enable_notifications_in_lock_task: flag(
                ENABLE_NOTIFICATIONS_IN_LOCK_TASK,
                self.get(ENABLE_NOTIFICATIONS_IN_LOCK_TASK).await?,
            )?,
            provisioning_type,
            enrollment_token: self.get(ENROLLMENT_TOKEN).await?,
        }))
    }

    pub async fn clear(&self) -> Result<()> {
        for key in ALL_KEYS {
            self.store.remove(ParameterScope::Setup, key).await?;
        }
        Ok(())
    }
}
