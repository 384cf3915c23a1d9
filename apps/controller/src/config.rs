//! Process configuration, read once from the environment at startup.
//!
//! Host override and debug mode may also be persisted in the global parameter
//! store; the check-in client factory lets those win over the values here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use devicelock_checkin::DebugScenario;
use devicelock_core::config::WORK_LOOP_POLL_INTERVAL_SECS;

pub const DEFAULT_API_URL: &str = "https://devicelock.example.com";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7420";

/// Hardware identity reported at check-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityConfig {
    pub imeis: Vec<String>,
    pub meids: Vec<String>,
    pub carrier_mccmnc: Option<String>,
    pub manufacturer: String,
    pub model: String,
    pub build_fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub api_url: String,
    pub api_token: String,
    pub data_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub debug: bool,
    pub debug_scenario: DebugScenario,
    /// Shell command run to factory-reset the device.
    pub wipe_command: Option<String>,
    pub identity: IdentityConfig,
    pub poll_interval: Duration,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list(value: Option<String>) -> Vec<String> {
    non_empty(value)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn flag(value: Option<String>) -> bool {
    matches!(
        non_empty(value).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = non_empty(lookup("DEVICELOCK_API_URL"))
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let listen_addr = non_empty(lookup("DEVICELOCK_LISTEN_ADDR"))
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid DEVICELOCK_LISTEN_ADDR '{}'", listen_addr))?;
        let debug_scenario = match non_empty(lookup("DEVICELOCK_DEBUG_SCENARIO")) {
            Some(value) => value
                .parse::<DebugScenario>()
                .map_err(|e| anyhow::anyhow!("Invalid DEVICELOCK_DEBUG_SCENARIO: {}", e))?,
            None => DebugScenario::default(),
        };

        Ok(Self {
            api_url,
            api_token: non_empty(lookup("DEVICELOCK_API_TOKEN")).unwrap_or_default(),
            data_dir: PathBuf::from(
                non_empty(lookup("DEVICELOCK_DATA_DIR"))
                    .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            listen_addr,
            debug: flag(lookup("DEVICELOCK_DEBUG")),
            debug_scenario,
            wipe_command: non_empty(lookup("DEVICELOCK_WIPE_COMMAND")),
            identity: IdentityConfig {
                imeis: list(lookup("DEVICELOCK_IMEI")),
                meids: list(lookup("DEVICELOCK_MEID")),
                carrier_mccmnc: non_empty(lookup("DEVICELOCK_CARRIER_MCCMNC")),
                manufacturer: non_empty(lookup("DEVICELOCK_MANUFACTURER")).unwrap_or_default(),
                model: non_empty(lookup("DEVICELOCK_MODEL")).unwrap_or_default(),
                build_fingerprint: non_empty(lookup("DEVICELOCK_BUILD_FINGERPRINT"))
                    .unwrap_or_default(),
            },
            poll_interval: Duration::from_secs(WORK_LOOP_POLL_INTERVAL_SECS),
        })
    }
}
