use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle of a video encode job.
///
/// A row is created as `Processing` and moves exactly once to either
/// `Encoded` or `Failed`; both are terminal.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Encoded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Encoded => "encoded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "encoded" => Ok(JobStatus::Encoded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Metadata for a row about to be inserted
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub privacy: String,
    pub original_name: String,
}

/// Database representation of a video with all fields
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VideoRow {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub privacy: String,
    pub original_name: String,
    pub encoded_path: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The two columns the delivery path needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub status: JobStatus,
    pub artifact_path: Option<PathBuf>,
}
