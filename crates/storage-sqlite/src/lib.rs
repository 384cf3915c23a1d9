//! SQLite persistence for the device lock controller.
//!
//! Reads go through an r2d2 pool; every write is funnelled through a single
//! writer thread and committed in an immediate transaction before the caller
//! is resumed.

pub mod db;
pub mod errors;
pub mod parameters;
pub mod schema;
pub mod work;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use parameters::ParameterRepository;
pub use work::WorkQueueRepository;
