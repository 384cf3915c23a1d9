//! Database location, pool construction and migrations.

pub mod write_actor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use devicelock_core::Result;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

/// Embed all diesel migrations at compile time
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const DB_FILE_NAME: &str = "devicelock.db";
const POOL_MAX_SIZE: u32 = 4;
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = FULL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Ensures the data directory exists and returns the database path.
pub fn init(app_data_dir: &str) -> Result<String> {
    std::fs::create_dir_all(app_data_dir).map_err(StorageError::from)?;
    let db_path = Path::new(app_data_dir).join(DB_FILE_NAME);
    Ok(db_path.to_string_lossy().to_string())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

/// Applies pending migrations on a dedicated connection.
pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    ConnectionOptions
        .on_acquire(&mut conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("[Storage] Running database migrations...");
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    info!("[Storage] Applied {} migration(s)", applied.len());
    Ok(())
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}
