use chrono::{DateTime, Utc};
use diesel::prelude::*;

use devicelock_core::scheduler::{BackoffPolicy, WorkItem, WorkName, WorkPayload};
use devicelock_core::Result;

use crate::errors::StorageError;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::work_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkItemDB {
    pub name: String,
    pub id: String,
    pub payload: String,
    pub run_at_ms: i64,
    pub backoff_kind: String,
    pub backoff_base_secs: i64,
    pub attempts: i32,
    pub created_at: String,
}

impl WorkItemDB {
    pub fn from_domain(item: &WorkItem) -> Result<Self> {
        Ok(Self {
            name: item.name.as_str().to_string(),
            id: item.id.clone(),
            payload: serde_json::to_string(&item.payload)?,
            run_at_ms: item.run_at.timestamp_millis(),
            backoff_kind: item.backoff.kind().to_string(),
            backoff_base_secs: item.backoff.base_secs(),
            attempts: item.attempts,
            created_at: item.created_at.to_rfc3339(),
        })
    }

    pub fn into_domain(self) -> Result<WorkItem> {
        let name = WorkName::parse(&self.name)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown work name '{}'", self.name)))?;
        let backoff = BackoffPolicy::from_parts(&self.backoff_kind, self.backoff_base_secs)
            .ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "unknown backoff '{}' for {}",
                    self.backoff_kind, self.name
                ))
            })?;
        let run_at = DateTime::<Utc>::from_timestamp_millis(self.run_at_ms).ok_or_else(|| {
            StorageError::Corrupt(format!("run_at out of range for {}", self.name))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StorageError::Corrupt(format!("created_at for {}: {}", self.name, e)))?
            .with_timezone(&Utc);
        let payload: WorkPayload = serde_json::from_str(&self.payload)?;

        Ok(WorkItem {
            id: self.id,
            name,
            payload,
            run_at,
            backoff,
            attempts: self.attempts,
            created_at,
        })
    }
}
