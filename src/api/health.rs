use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use tracing::error;

use crate::db::JobStore;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    database: String,
}

impl HealthResponse {
    fn new(status: &str, database: &str) -> Self {
        Self {
            status: status.to_string(),
            database: database.to_string(),
        }
    }
}

/// Health check endpoint
///
/// General health check including database connectivity.
/// Use for load balancers and uptime monitors.
#[get("/health")]
async fn health_check(store: web::Data<dyn JobStore>) -> impl Responder {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse::new("healthy", "connected")),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse::new("unhealthy", "disconnected"))
        }
    }
}

/// Readiness check endpoint
///
/// Returns 503 while the database is unreachable; encodes already running
/// are unaffected and the service recovers when the database returns.
#[get("/ready")]
async fn readiness_check(store: web::Data<dyn JobStore>) -> impl Responder {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse::new("ready", "connected")),
        Err(e) => {
            error!("Readiness check failed: database unavailable: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse::new("not_ready", "disconnected"))
        }
    }
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse::new("alive", "not_checked"))
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
