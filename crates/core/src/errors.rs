//! Error types for the device lock core.

use thiserror::Error;

use crate::provision::{ProvisionEvent, ProvisionState};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the provisioning core.
#[derive(Debug, Error)]
pub enum Error {
    /// Durable storage failed to read or commit.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level failure that could not be classified into an RPC outcome.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The backend sent a value that has no mapping on this side of the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A (state, event) pair with no defined transition.
    #[error("Invalid transition: {event} is not defined for state {state}")]
    InvalidTransition {
        state: ProvisionState,
        event: ProvisionEvent,
    },

    /// Durable work could not be enqueued or updated.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// A platform collaborator (notifications, policy, UI) failed.
    #[error("Platform error: {0}")]
    Platform(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted or in-memory state contradicts an invariant.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Protocol drift and state machine contract violations are programming
    /// faults. Work items failing with one of these are never retried and are
    /// handed to the failure supervisor instead.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::InvalidTransition { .. } | Self::InvalidState(_)
        )
    }
}
