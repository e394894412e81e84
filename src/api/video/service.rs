use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use std::future::{ready, Ready};
use std::io;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationErrors};

use super::models::UploadMetadata;
use crate::api::validation::{field_errors, ErrorResponse};
use crate::db::{JobStore, StoreError, VideoRow};
use crate::storage::{ArtifactStager, StageError};
use crate::worker::{EncodeJob, JobQueue, QueueFull, QueueSlot};

/// Seconds a client should wait before retrying a rejected upload
const QUEUE_RETRY_AFTER_SECS: u32 = 30;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error(transparent)]
    QueueFull(#[from] QueueFull),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("video not found: {0}")]
    NotFound(i32),

    #[error("artifact of video {id} cannot be opened: {source}")]
    ArtifactUnavailable {
        id: i32,
        #[source]
        source: io::Error,
    },
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::EmptyUpload => StatusCode::BAD_REQUEST,
            ServiceError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Stage(_) | ServiceError::Store(_) | ServiceError::ArtifactUnavailable { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());

        let body = match self {
            ServiceError::Validation(errors) => {
                warn!("Validation error: {}", errors);
                ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: field_errors(errors),
                }
            }
            ServiceError::EmptyUpload => {
                warn!("Rejected empty upload");
                ErrorResponse::message("Validation failed", "Uploaded file is empty")
            }
            ServiceError::QueueFull(_) => {
                warn!("Rejected upload: encode queue is full");
                response.insert_header((header::RETRY_AFTER, QUEUE_RETRY_AFTER_SECS.to_string()));
                ErrorResponse::message("Service busy", "Too many videos are waiting to be encoded, try again later")
            }
            ServiceError::Stage(e) => {
                error!("Staging error: {}", e);
                ErrorResponse::message("Failed to process request", "Upload could not be stored")
            }
            ServiceError::Store(e) => {
                error!("Database error: {}", e);
                ErrorResponse::message("Failed to process request", "Database error occurred")
            }
            ServiceError::NotFound(id) => {
                warn!("Video not found: {}", id);
                ErrorResponse::message("Not found", format!("Video with id {} not found", id))
            }
            ServiceError::ArtifactUnavailable { id, source } => {
                error!("Artifact of video {} cannot be opened: {}", id, source);
                ErrorResponse::message("Failed to process request", "Video is temporarily unavailable")
            }
        };

        response.json(body)
    }
}

/// Reserves room in the encode queue from the request head alone.
///
/// Place it before the multipart extractor: a busy service then answers 503
/// without reading the body.
impl FromRequest for QueueSlot {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let slot: Result<QueueSlot, Self::Error> = match req.app_data::<web::Data<VideoService>>() {
            Some(service) => service.reserve().map_err(|e| ServiceError::from(e).into()),
            None => {
                error!("VideoService is not registered as app data");
                Err(actix_web::error::ErrorInternalServerError("Service not configured"))
            }
        };
        ready(slot)
    }
}

/// An upload as spooled by the multipart extractor
pub struct IncomingFile {
    pub file: NamedTempFile,
    /// Declared by the client; diagnostics only
    pub original_name: String,
    pub size: u64,
}

/// Accepts uploads and turns them into queued encode jobs
pub struct VideoService {
    store: Arc<dyn JobStore>,
    stager: Arc<ArtifactStager>,
    queue: JobQueue,
}

impl VideoService {
    pub fn new(store: Arc<dyn JobStore>, stager: Arc<ArtifactStager>, queue: JobQueue) -> Self {
        Self { store, stager, queue }
    }

    pub fn reserve(&self) -> Result<QueueSlot, QueueFull> {
        self.queue.try_reserve()
    }

    /// Accept an upload and schedule its encode
    ///
    /// # Business Logic
    /// - The caller holds a queue slot, so a busy service rejected the
    ///   request before the body was read
    /// - Validates metadata before touching the database
    /// - Moves the file into scratch storage, then creates the row (status `processing`)
    /// - Hands the job to the worker pool and returns without waiting
    ///
    /// # Returns
    /// - `Ok(id)` - Job created and queued
    /// - `Err(ServiceError)` - Nothing was created; the upload and slot are given back
    pub async fn submit(
        &self,
        metadata: UploadMetadata,
        file: IncomingFile,
        slot: QueueSlot,
    ) -> Result<i32, ServiceError> {
        info!(
            "Service: Accepting upload title={:?}, file={:?}, size={}",
            metadata.title, file.original_name, file.size
        );

        metadata.validate()?;
        if file.size == 0 {
            return Err(ServiceError::EmptyUpload);
        }

        let input = self.stager.adopt_input(file.file, &file.original_name).await?;

        let video = metadata.into_new_video(&file.original_name);
        let id = match self.store.create(&video).await {
            Ok(id) => id,
            Err(e) => {
                self.stager.release_input(input);
                return Err(e.into());
            }
        };

        slot.submit(EncodeJob { id, input });
        info!("Service: Video {} created and queued for encoding", id);
        Ok(id)
    }

    pub async fn get(&self, id: i32) -> Result<VideoRow, ServiceError> {
        self.store.get(id).await?.ok_or(ServiceError::NotFound(id))
    }
}
