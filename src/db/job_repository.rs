use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::models::{DeliveryRecord, JobStatus, NewVideo, VideoRow};
use super::store::{JobStore, StoreError};

/// PostgreSQL-backed job store over the `videos` table
#[derive(Clone)]
pub struct JobRepository {
    pool: Pool<Postgres>,
}

impl JobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_status(id: i32, status: String) -> Result<JobStatus, StoreError> {
        status
            .parse()
            .map_err(|status| StoreError::UnknownStatus { id, status })
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, video: &NewVideo) -> Result<i32, StoreError> {
        debug!("Creating video job: title={}, privacy={}", video.title, video.privacy);

        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO videos (title, description, keywords, privacy, original_name, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.keywords)
        .bind(&video.privacy)
        .bind(&video.original_name)
        .bind(JobStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await?;

        debug!("Video job created with id={}", id);
        Ok(id)
    }

    async fn get(&self, id: i32) -> Result<Option<VideoRow>, StoreError> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, title, description, keywords, privacy, original_name,
                   encoded_path, status, created_at
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn set_status(&self, id: i32, status: JobStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE videos SET status = $2 WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition { id, to: status });
        }
        debug!("Job {} status set to {}", id, status);
        Ok(())
    }

    async fn set_status_and_artifact(
        &self,
        id: i32,
        status: JobStatus,
        artifact_path: &Path,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE videos SET status = $2, encoded_path = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(artifact_path.to_string_lossy().into_owned())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition { id, to: status });
        }
        debug!("Job {} status set to {} with artifact {}", id, status, artifact_path.display());
        Ok(())
    }

    async fn get_delivery(&self, id: i32) -> Result<Option<DeliveryRecord>, StoreError> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT status, encoded_path FROM videos WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(status, path)| {
            Ok(DeliveryRecord {
                status: Self::parse_status(id, status)?,
                artifact_path: path.filter(|p| !p.is_empty()).map(PathBuf::from),
            })
        })
        .transpose()
    }

    async fn fail_orphaned(&self) -> Result<Vec<i32>, StoreError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            r#"
            UPDATE videos SET status = 'failed', encoded_path = NULL
            WHERE status = 'processing'
            RETURNING id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
