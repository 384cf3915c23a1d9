//! Provisioning state model, transition function and controller.

mod controller;
mod model;
mod state_machine;

pub use controller::*;
pub use model::*;
pub use state_machine::*;
