//! One HTTP channel to the device lock backend.
//!
//! A channel is pinned to a base URL and, optionally, a local source address
//! so requests leave through a specific network.

use std::net::IpAddr;
use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use devicelock_core::config::RPC_DEADLINE_SECS;

use crate::error::{CheckInError, Result};

const MAX_LOG_BODY_CHARS: usize = 512;
const REGISTERED_ID_HEADER: &str = "x-devicelock-registered-id";

/// Error body returned by the backend on non-2xx replies.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub base_url: String,
    pub api_token: String,
    pub registered_id: Option<String>,
    /// Source address to bind; `None` uses the default route.
    pub local_address: Option<IpAddr>,
    pub timeout: Duration,
}

impl ChannelConfig {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            registered_id: None,
            local_address: None,
            timeout: Duration::from_secs(RPC_DEADLINE_SECS),
        }
    }

    pub fn with_registered_id(mut self, registered_id: Option<String>) -> Self {
        self.registered_id = registered_id;
        self
    }

    pub fn bound_to(&self, local_address: IpAddr) -> Self {
        Self {
            local_address: Some(local_address),
            ..self.clone()
        }
    }
}

#[derive(Debug)]
pub struct CheckInChannel {
    client: reqwest::Client,
    config: ChannelConfig,
}

impl CheckInChannel {
    pub fn new(config: ChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .local_address(config.local_address)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn local_address(&self) -> Option<IpAddr> {
        self.config.local_address
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[CheckIn] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[CheckIn] API response error ({}): {}", status, preview);
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.config.api_token))
            .map_err(|_| CheckInError::invalid_request("Invalid API token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(registered_id) = self.config.registered_id.as_deref() {
            let value = HeaderValue::from_str(registered_id)
                .map_err(|_| CheckInError::invalid_request("Invalid registered device id"))?;
            headers.insert(REGISTERED_ID_HEADER, value);
        }

        Ok(headers)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(CheckInError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(CheckInError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            log::error!(
                "[CheckIn] Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            CheckInError::protocol(format!("Failed to parse response: {}", e))
        })
    }

    /// POST {base}/api/v1/devicelock/{rpc}
    pub async fn post<B, R>(&self, rpc: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/api/v1/devicelock/{}", self.config.base_url, rpc);
        debug!(
            "[CheckIn] POST {} (via {})",
            url,
            self.config
                .local_address
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "default network".to_string())
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
