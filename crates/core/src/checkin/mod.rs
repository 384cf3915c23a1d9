//! Check-in domain: request/response models and transport contracts.

mod helper;
mod model;
mod transport;

pub use helper::*;
pub use model::*;
pub use transport::*;
