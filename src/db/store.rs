use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use super::models::{DeliveryRecord, JobStatus, NewVideo, VideoRow};

/// Errors raised by job store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The row is missing or already terminal, so the update was refused
    #[error("job {id} cannot move to '{to}': it is not processing")]
    InvalidTransition { id: i32, to: JobStatus },

    #[error("job {id} has unrecognised status '{status}'")]
    UnknownStatus { id: i32, status: String },
}

/// Durable table of encode jobs.
///
/// Each job lives in exactly one row, so every mutation is a single-row
/// update and relies on the database's row-level atomicity. Status updates
/// only apply to rows that are still `processing`; a terminal row never changes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a row with `status = processing` and return its id.
    async fn create(&self, video: &NewVideo) -> Result<i32, StoreError>;

    async fn get(&self, id: i32) -> Result<Option<VideoRow>, StoreError>;

    async fn set_status(&self, id: i32, status: JobStatus) -> Result<(), StoreError>;

    /// Record the finished artifact together with the new status.
    async fn set_status_and_artifact(
        &self,
        id: i32,
        status: JobStatus,
        artifact_path: &Path,
    ) -> Result<(), StoreError>;

    async fn get_delivery(&self, id: i32) -> Result<Option<DeliveryRecord>, StoreError>;

    /// Mark every job still `processing` as `failed` and return their ids.
    ///
    /// Only valid at startup, before any worker runs: such rows belong to a
    /// runner that died with a previous process.
    async fn fail_orphaned(&self) -> Result<Vec<i32>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
