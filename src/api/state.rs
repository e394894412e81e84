use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

use crate::worker::JobQueue;

/// Process-wide facts shown on the status page
pub struct AppState {
    app_name: String,
    encoder_available: bool,
    workers: usize,
    queue: JobQueue,
}

impl AppState {
    pub fn new(name: &str, encoder_available: bool, workers: usize, queue: JobQueue) -> Self {
        AppState {
            app_name: name.into(),
            encoder_available,
            workers,
            queue,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    service: &'a str,
    version: &'static str,
    encoder: &'static str,
    workers: usize,
    queue_slots_free: usize,
}

#[get("/")]
async fn get_state(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(StatusResponse {
        service: &data.app_name,
        version: env!("CARGO_PKG_VERSION"),
        encoder: if data.encoder_available { "available" } else { "missing" },
        workers: data.workers,
        queue_slots_free: data.queue.available(),
    })
}

pub fn state_config(config: &mut web::ServiceConfig) {
    config.service(get_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn status_page_reports_encoder_and_queue() {
        let (queue, _receiver) = JobQueue::bounded(3);
        let _slot = queue.try_reserve().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new("video-encoder", false, 2, queue.clone())))
                .configure(state_config),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["service"], "video-encoder");
        assert_eq!(json["encoder"], "missing");
        assert_eq!(json["workers"], 2);
        assert_eq!(json["queue_slots_free"], 2);
    }
}
