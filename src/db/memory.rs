//! In-memory job store used by tests in place of PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::models::{DeliveryRecord, JobStatus, NewVideo, VideoRow};
use super::store::{JobStore, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    rows: Mutex<HashMap<i32, VideoRow>>,
    /// Simulates a database outage for updates (creates and reads still work).
    fail_updates: AtomicBool,
    /// Simulates a database outage for inserts.
    fail_creates: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn status(&self, id: i32) -> Option<JobStatus> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|row| row.status.parse().unwrap())
    }

    fn update(
        &self,
        id: i32,
        status: JobStatus,
        artifact_path: Option<&Path>,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row) if row.status == JobStatus::Processing.as_str() => {
                row.status = status.as_str().to_string();
                if let Some(path) = artifact_path {
                    row.encoded_path = Some(path.to_string_lossy().into_owned());
                }
                Ok(())
            }
            _ => Err(StoreError::InvalidTransition { id, to: status }),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, video: &NewVideo) -> Result<i32, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i32 + 1;
        rows.insert(
            id,
            VideoRow {
                id,
                title: video.title.clone(),
                description: video.description.clone(),
                keywords: video.keywords.clone(),
                privacy: video.privacy.clone(),
                original_name: video.original_name.clone(),
                encoded_path: None,
                status: JobStatus::Processing.as_str().to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: i32) -> Result<Option<VideoRow>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn set_status(&self, id: i32, status: JobStatus) -> Result<(), StoreError> {
        self.update(id, status, None)
    }

    async fn set_status_and_artifact(
        &self,
        id: i32,
        status: JobStatus,
        artifact_path: &Path,
    ) -> Result<(), StoreError> {
        self.update(id, status, Some(artifact_path))
    }

    async fn get_delivery(&self, id: i32) -> Result<Option<DeliveryRecord>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).map(|row| DeliveryRecord {
            status: row.status.parse().unwrap(),
            artifact_path: row.encoded_path.as_ref().map(PathBuf::from),
        }))
    }

    async fn fail_orphaned(&self) -> Result<Vec<i32>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut failed = Vec::new();
        for row in rows.values_mut() {
            if row.status == JobStatus::Processing.as_str() {
                row.status = JobStatus::Failed.as_str().to_string();
                row.encoded_path = None;
                failed.push(row.id);
            }
        }
        failed.sort_unstable();
        Ok(failed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Minimal valid metadata for a test job.
pub fn new_video(title: &str) -> NewVideo {
    NewVideo {
        title: title.to_string(),
        description: None,
        keywords: None,
        privacy: "public".to_string(),
        original_name: "clip.mp4".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_rows_start_processing_with_distinct_ids() {
        let store = MemoryJobStore::new();
        let a = store.create(&new_video("a")).await.unwrap();
        let b = store.create(&new_video("b")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.status(a), Some(JobStatus::Processing));
        let delivery = store.get_delivery(b).await.unwrap().unwrap();
        assert_eq!(delivery.artifact_path, None);
    }

    #[tokio::test]
    async fn terminal_rows_refuse_further_transitions() {
        let store = MemoryJobStore::new();
        let id = store.create(&new_video("a")).await.unwrap();

        store.set_status(id, JobStatus::Failed).await.unwrap();
        let err = store
            .set_status_and_artifact(id, JobStatus::Encoded, Path::new("encoded/1.webm"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.status(id), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn fail_orphaned_only_touches_processing_rows() {
        let store = MemoryJobStore::new();
        let done = store.create(&new_video("done")).await.unwrap();
        let stuck = store.create(&new_video("stuck")).await.unwrap();
        store
            .set_status_and_artifact(done, JobStatus::Encoded, Path::new("encoded/1.webm"))
            .await
            .unwrap();

        assert_eq!(store.fail_orphaned().await.unwrap(), vec![stuck]);
        assert_eq!(store.status(done), Some(JobStatus::Encoded));
        assert_eq!(store.status(stuck), Some(JobStatus::Failed));
    }
}
