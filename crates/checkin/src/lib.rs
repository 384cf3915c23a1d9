//! Check-in and finalize service clients for the device lock backend.
//!
//! The crate maps the core transport traits onto JSON-over-HTTP RPCs. Each
//! call runs under a hard deadline and is classified into success,
//! recoverable error or fatal error. Recoverable failures on the default
//! network are retried once over the best non-VPN network when one is known.

pub mod channel;
pub mod client;
pub mod debug;
pub mod error;
pub mod factory;
pub mod finalize;
pub mod network;
pub mod wire;

#[cfg(test)]
mod test_server;

pub use channel::{ChannelConfig, CheckInChannel};
pub use client::CheckInClient;
pub use debug::{DebugScenario, DebugTransport};
pub use error::{CheckInError, Result, RpcRetryClass};
pub use factory::{CheckInClientFactory, ClientParams, LiveTransport, TransportMode};
pub use finalize::FinalizeClient;
pub use network::{NetworkInfo, NetworkMonitor, NetworkSnapshot};
