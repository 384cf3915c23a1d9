//! Single writer thread. Every mutation runs here, one job at a time, inside
//! `BEGIN IMMEDIATE`.

use std::sync::mpsc;
use std::thread;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{debug, error};
use tokio::sync::oneshot;

use devicelock_core::{Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

enum TxError {
    Diesel(diesel::result::Error),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

#[derive(Clone, Debug)]
pub struct WriteHandle {
    sender: mpsc::Sender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside an immediate transaction and
    /// resolves once it has committed or rolled back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let boxed: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, TxError, _>(|tx| job(tx).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Diesel(e) => Error::from(StorageError::from(e)),
                    TxError::Job(e) => e,
                });
            let _ = reply.send(result);
        });

        self.sender
            .send(boxed)
            .map_err(|_| StorageError::WriterUnavailable("writer thread stopped".to_string()))?;
        receiver
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer dropped the job".to_string()))?
    }
}

/// Starts the writer thread. It exits once every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, receiver) = mpsc::channel::<Job>();
    thread::Builder::new()
        .name("devicelock-db-writer".to_string())
        .spawn(move || {
            for job in receiver {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    // Dropping the job drops its reply sender; the caller sees
                    // WriterUnavailable.
                    Err(e) => error!("[Storage] Writer could not get a connection: {}", e),
                }
            }
            debug!("[Storage] Writer thread exiting");
        })
        .map(|_| ())
        .unwrap_or_else(|e| error!("[Storage] Failed to start writer thread: {}", e));
    WriteHandle { sender }
}
