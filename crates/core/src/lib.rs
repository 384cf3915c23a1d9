//! Core domain models and provisioning logic for the device lock controller.
//!
//! This crate owns the provisioning state machine, the durable scheduler contract,
//! the workers that drive check-in and provisioning reports, and the failure
//! supervisor. Network transport and storage are injected through traits so the
//! same logic runs against SQLite/HTTP in production and in-memory fakes in tests.

pub mod checkin;
pub mod config;
pub mod device_state;
pub mod errors;
pub mod parameters;
pub mod platform;
pub mod provision;
pub mod scheduler;
pub mod supervisor;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};
