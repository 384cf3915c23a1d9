//! Network capability tracking for the non-VPN fallback path.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One network as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub id: String,
    /// Source address to bind when routing through this network.
    pub local_address: Option<IpAddr>,
    pub validated: bool,
    pub vpn: bool,
}

impl NetworkInfo {
    fn is_fallback_candidate(&self) -> bool {
        self.validated && !self.vpn && self.local_address.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub best_non_vpn: Option<NetworkInfo>,
}

impl NetworkSnapshot {
    /// First validated, non-VPN network with a bindable address.
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        Self {
            best_non_vpn: networks
                .iter()
                .find(|network| network.is_fallback_candidate())
                .cloned(),
        }
    }

    pub fn fallback_address(&self) -> Option<IpAddr> {
        self.best_non_vpn
            .as_ref()
            .and_then(|network| network.local_address)
    }
}

/// Publishes the best non-VPN network to every subscribed client.
#[derive(Debug)]
pub struct NetworkMonitor {
    sender: watch::Sender<NetworkSnapshot>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(NetworkSnapshot::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkSnapshot> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> NetworkSnapshot {
        self.sender.borrow().clone()
    }

    /// Replaces the known network set. Subscribers are only woken when the
    /// selected fallback network actually changes. Returns whether it did.
    pub fn update_networks(&self, networks: &[NetworkInfo]) -> bool {
        let next = NetworkSnapshot::from_networks(networks);
        let changed = self.sender.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            log::info!(
                "[CheckIn] Non-VPN network changed: {}",
                next.best_non_vpn
                    .as_ref()
                    .map(|network| network.id.as_str())
                    .unwrap_or("none")
            );
        }
        changed
    }
}
