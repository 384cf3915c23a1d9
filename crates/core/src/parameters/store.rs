use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Parameter namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    /// Device-wide values (registration, provisioning progress, flags).
    Global,
    /// Configuration pushed by the server at provisioning time.
    Setup,
}

impl ParameterScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterScope::Global => "global",
            ParameterScope::Setup => "setup",
        }
    }
}

/// Durable key/value storage.
///
/// Writes resolve only once the value is committed, so callers may arm
/// dependent work immediately afterwards. A missing key is `None`, never a
/// default.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get(&self, scope: ParameterScope, key: &str) -> Result<Option<String>>;

    async fn set(&self, scope: ParameterScope, key: &str, value: String) -> Result<()>;

    async fn remove(&self, scope: ParameterScope, key: &str) -> Result<()>;

    /// Atomically stores `value` when the key is absent. Returns the value that
    /// was already present otherwise.
    async fn set_if_absent(
        &self,
        scope: ParameterScope,
        key: &str,
        value: String,
    ) -> Result<Option<String>>;
}

pub(crate) fn encode_enum<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn decode_enum<T: DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

pub(crate) fn decode_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .map_err(|_| Error::invalid_state(format!("Parameter '{}' is not a flag: {}", key, value)))
}
