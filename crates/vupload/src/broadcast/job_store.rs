//! Job store with persistent database storage.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec;
use crate::db::job_repo::{self, UploadJobRow};
use crate::db::{Database, DatabaseError};
use crate::error::CodecError;
use crate::job::UploadJob;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to encode job {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: CodecError,
    },

    #[error("Persisted job {id} is corrupt: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: CodecError,
    },
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Row metadata of a persisted job, without decoding the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredJob {
    pub job_id: String,
    /// Phase tag at the time of the last save.
    pub phase: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredJob {
    fn from_row(row: &UploadJobRow) -> Self {
        Self {
            job_id: row.id.clone(),
            phase: row.phase.clone(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

/// Result of loading every persisted job. A corrupt record never prevents
/// the others from loading.
#[derive(Debug, Default)]
pub struct LoadedJobs {
    pub jobs: Vec<UploadJob>,
    pub corrupt: Vec<(String, CodecError)>,
}

/// Persists encoded upload jobs keyed by job id.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Writes the current state of `job`, replacing any earlier record.
    pub fn save(&self, job: &UploadJob) -> Result<(), StoreError> {
        let record = codec::encode(job).map_err(|source| StoreError::Encode {
            id: job.id().to_string(),
            source,
        })?;
        let now = format_timestamp(Utc::now());

        job_repo::upsert(
            &self.db,
            &UploadJobRow {
                id: job.id().to_string(),
                phase: job.phase().as_str().to_string(),
                record,
                created_at: now.clone(),
                updated_at: now,
            },
        )?;

        log::debug!("Saved job {} ({})", job.id(), job.phase().as_str());
        Ok(())
    }

    /// Deletes the record of a job. Missing records are not an error.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        if job_repo::delete(&self.db, id)? {
            log::debug!("Removed persisted job {}", id);
        }
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<UploadJob>, StoreError> {
        match job_repo::find_by_id(&self.db, id)? {
            Some(row) => codec::decode(&row.record)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    id: row.id,
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Decodes every persisted job, oldest first.
    pub fn load_all(&self) -> Result<LoadedJobs, StoreError> {
        let mut loaded = LoadedJobs::default();

        for row in job_repo::list_all(&self.db)? {
            match codec::decode(&row.record) {
                Ok(job) if job.id() == row.id => loaded.jobs.push(job),
                Ok(job) => {
                    log::warn!(
                        "Persisted job {} carries mismatched id {}",
                        row.id,
                        job.id()
                    );
                    loaded
                        .corrupt
                        .push((row.id, CodecError::MissingField("id")));
                }
                Err(e) => {
                    log::warn!("Persisted job {} is corrupt: {}", row.id, e);
                    loaded.corrupt.push((row.id, e));
                }
            }
        }

        Ok(loaded)
    }

    pub fn list(&self) -> Result<Vec<StoredJob>, StoreError> {
        Ok(job_repo::list_all(&self.db)?
            .iter()
            .map(StoredJob::from_row)
            .collect())
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        Ok(job_repo::count(&self.db)?)
    }
}
