use actix_files::NamedFile;
use actix_multipart::form::MultipartForm;
use actix_web::{
    get,
    http::header,
    post,
    web::{Data, Path, ServiceConfig},
    HttpRequest, HttpResponse,
};
use tracing::debug;

use super::dto::{NotReadyResponse, UploadResponse, VideoResponse};
use super::models::UploadForm;
use super::service::{IncomingFile, ServiceError, VideoService};
use crate::db::JobStatus;
use crate::delivery::{Delivery, DeliveryGate};
use crate::worker::QueueSlot;

/// Seconds a client should wait before polling a processing video again
const POLL_RETRY_AFTER_SECS: u32 = 5;

/// Accept a video for encoding.
///
/// Extractors run in order: the queue slot is reserved from the request head,
/// so a busy service rejects the upload before its body is read.
#[post("/upload")]
async fn upload_video(
    service: Data<VideoService>,
    slot: QueueSlot,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> Result<HttpResponse, ServiceError> {
    let (metadata, upload) = form.into_parts();
    let incoming = IncomingFile {
        original_name: upload.file_name.unwrap_or_default(),
        size: upload.size as u64,
        file: upload.file,
    };

    let id = service.submit(metadata, incoming, slot).await?;
    Ok(HttpResponse::Accepted().json(UploadResponse::accepted(id)))
}

#[get("/videos/{id}")]
async fn get_video(service: Data<VideoService>, id: Path<i32>) -> Result<HttpResponse, ServiceError> {
    let video = service.get(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(VideoResponse::from(video)))
}

/// Stream a finished video. Byte-range requests are answered with 206.
#[get("/stream/{id}")]
async fn stream_video(
    req: HttpRequest,
    gate: Data<DeliveryGate>,
    id: Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let id = id.into_inner();

    match gate.resolve(id).await? {
        Delivery::Ready { path } => {
            debug!("Streaming video {} from {}", id, path.display());
            let file = NamedFile::open_async(&path)
                .await
                .map_err(|source| ServiceError::ArtifactUnavailable { id, source })?;
            Ok(file.into_response(&req))
        }
        Delivery::NotReady { status } => Ok(not_ready(id, status)),
        Delivery::Unknown => Err(ServiceError::NotFound(id)),
    }
}

fn not_ready(id: i32, status: JobStatus) -> HttpResponse {
    match status {
        JobStatus::Processing => HttpResponse::Accepted()
            .insert_header((header::RETRY_AFTER, POLL_RETRY_AFTER_SECS.to_string()))
            .json(NotReadyResponse {
                id,
                status,
                message: "Video is still being encoded".to_string(),
            }),
        JobStatus::Failed | JobStatus::Encoded => HttpResponse::Gone().json(NotReadyResponse {
            id,
            status,
            message: "Video could not be encoded, please upload it again".to_string(),
        }),
    }
}

pub fn video_config(config: &mut ServiceConfig) {
    config
        .service(upload_video)
        .service(get_video)
        .service(stream_video);
}
