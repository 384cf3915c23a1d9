//! Durable, named, de-duplicated work.

mod device_lock_scheduler;
mod dispatcher;
mod model;
mod queue;

pub use device_lock_scheduler::*;
pub use dispatcher::*;
pub use model::*;
pub use queue::*;
