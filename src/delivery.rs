use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use crate::db::{DeliveryRecord, JobStatus, JobStore, StoreError};

/// What the read path may do with a job id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The artifact is complete and may be streamed from `path`.
    Ready { path: PathBuf },
    /// The job exists but has no deliverable artifact (processing or failed).
    NotReady { status: JobStatus },
    /// No job was ever created with this id.
    Unknown,
}

/// Decides whether a job's artifact may be served. Read-only.
#[derive(Clone)]
pub struct DeliveryGate {
    store: Arc<dyn JobStore>,
}

impl DeliveryGate {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, id: i32) -> Result<Delivery, StoreError> {
        let delivery = match self.store.get_delivery(id).await? {
            None => Delivery::Unknown,
            Some(DeliveryRecord {
                status: JobStatus::Encoded,
                artifact_path: Some(path),
            }) => Delivery::Ready { path },
            Some(DeliveryRecord { status, artifact_path }) => {
                if status == JobStatus::Encoded {
                    error!("Job {} is encoded but has no artifact path", id);
                } else if artifact_path.is_some() {
                    error!("Job {} is {} but has an artifact path", id, status);
                }
                Delivery::NotReady { status }
            }
        };
        Ok(delivery)
    }
}
