use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;

use devicelock_core::parameters::{ParameterScope, ParameterStore};
use devicelock_core::Result;

use super::model::ParameterDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::parameters;
use crate::schema::parameters::dsl::*;

pub struct ParameterRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ParameterRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        ParameterRepository { pool, writer }
    }

    fn row(param_scope: ParameterScope, key: &str, new_value: String) -> ParameterDB {
        ParameterDB {
            scope: param_scope.as_str().to_string(),
            param_key: key.to_string(),
            value: new_value,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    fn find(
        conn: &mut SqliteConnection,
        param_scope: ParameterScope,
        key: &str,
    ) -> Result<Option<String>> {
        Ok(parameters
            .filter(scope.eq(param_scope.as_str()))
            .filter(param_key.eq(key))
            .select(value)
            .first::<String>(conn)
            .optional()
            .map_err(StorageError::from)?)
    }

    /// Every parameter of one scope, keyed by name.
    pub fn load_scope(&self, param_scope: ParameterScope) -> Result<Vec<(String, String)>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = parameters
            .filter(scope.eq(param_scope.as_str()))
            .order(param_key.asc())
            .select(ParameterDB::as_select())
            .load::<ParameterDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.param_key, row.value))
            .collect())
    }
}

#[async_trait]
impl ParameterStore for ParameterRepository {
    async fn get(&self, param_scope: ParameterScope, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        Self::find(&mut conn, param_scope, key)
    }

    async fn set(&self, param_scope: ParameterScope, key: &str, new_value: String) -> Result<()> {
        let row = Self::row(param_scope, key, new_value);
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(parameters::table)
                    .values(&row)
                    .on_conflict((scope, param_key))
                    .do_update()
                    .set((value.eq(&row.value), updated_at.eq(&row.updated_at)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, param_scope: ParameterScope, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(
                    parameters
                        .filter(scope.eq(param_scope.as_str()))
                        .filter(param_key.eq(&key)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn set_if_absent(
        &self,
        param_scope: ParameterScope,
        key: &str,
        new_value: String,
    ) -> Result<Option<String>> {
        let row = Self::row(param_scope, key, new_value);
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<String>> {
                if let Some(existing) = Self::find(conn, param_scope, &row.param_key)? {
                    return Ok(Some(existing));
                }
                diesel::insert_into(parameters::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(None)
            })
            .await
    }
}
