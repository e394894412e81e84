use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{JobStatus, VideoRow};

pub fn stream_url(id: i32) -> String {
    format!("/stream/{}", id)
}

/// Response for an accepted upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub id: i32,
    pub status: JobStatus,
    pub stream_url: String,
}

impl UploadResponse {
    pub fn accepted(id: i32) -> Self {
        Self {
            message: "Video accepted for encoding".to_string(),
            id,
            status: JobStatus::Processing,
            stream_url: stream_url(id),
        }
    }
}

/// Public view of a job; never exposes filesystem paths
#[derive(Serialize)]
pub struct VideoResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub privacy: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub stream_url: String,
}

impl From<VideoRow> for VideoResponse {
    fn from(row: VideoRow) -> Self {
        Self {
            stream_url: stream_url(row.id),
            id: row.id,
            title: row.title,
            description: row.description,
            keywords: row.keywords,
            privacy: row.privacy,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Body returned by `/stream/{id}` when there is nothing to stream yet
#[derive(Serialize)]
pub struct NotReadyResponse {
    pub id: i32,
    pub status: JobStatus,
    pub message: String,
}
