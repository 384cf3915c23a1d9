//! Durable key/value parameters, split into device-wide and setup scopes.

mod global;
mod setup;
mod store;

pub use global::*;
pub use setup::*;
pub use store::*;
