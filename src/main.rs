use actix_multipart::form::tempfile::TempFileConfig;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod delivery;
mod encoder;
mod logging;
mod shutdown;
mod storage;
mod worker;

use crate::api::{state::AppState, validation, video::VideoService};
use crate::config::{Command, Config};
use crate::db::{JobRepository, JobStore};
use crate::delivery::DeliveryGate;
use crate::encoder::{EncodeProfile, Encoder, FfmpegEncoder};
use crate::shutdown::ShutdownCoordinator;
use crate::storage::ArtifactStager;
use crate::worker::{JobQueue, JobRunner, WorkerPool};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();

    logging::init(&config.log_dir)
        .with_context(|| format!("failed to initialise logging in {}", config.log_dir.display()))?;

    info!("Starting video-encoder application");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max database connections: {}", config.max_db_connections);
    info!("  - Number of workers: {}", config.num_workers);
    info!("  - Max queued jobs: {}", config.max_queued_jobs);
    info!("  - Scratch directory: {}", config.scratch_dir.display());
    info!("  - Output directory: {}", config.output_dir.display());

    let pool = db::connection::get_connection(&config.database_url, config.max_db_connections)
        .await
        .context("failed to connect to database")?;
    info!("Database connection pool established");

    db::migrations::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    if let Some(Command::Migrate) = config.command {
        pool.close().await;
        return Ok(());
    }

    let profile = EncodeProfile::WEBM_720P;
    let stager = Arc::new(ArtifactStager::new(
        &config.scratch_dir,
        &config.output_dir,
        profile.extension,
    ));
    stager.prepare().await.context("failed to create storage directories")?;
    let purged = stager.purge_leftovers().await.context("failed to clean storage directories")?;
    if purged > 0 {
        info!("Removed {} files left over from a previous run", purged);
    }

    let store: Arc<dyn JobStore> = Arc::new(JobRepository::new(pool.clone()));

    let ffmpeg = FfmpegEncoder::new(&config.ffmpeg_bin).with_timeout(config.encode_timeout());
    let encoder_available = match ffmpeg.locate() {
        Ok(path) => {
            info!("Using encoder at {}", path.display());
            true
        }
        Err(e) => {
            warn!("{}; uploads will be accepted but every encode will fail", e);
            false
        }
    };
    let encoder: Arc<dyn Encoder> = Arc::new(ffmpeg);

    // watch channel lets every worker observe the same shutdown flag
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let (queue, receiver) = JobQueue::bounded(usize::from(config.max_queued_jobs));
    let runner = Arc::new(JobRunner::new(store.clone(), stager.clone(), encoder, profile));
    let orphaned = runner
        .recover_interrupted()
        .await
        .context("failed to reconcile unfinished jobs")?;
    if orphaned > 0 {
        warn!("Marked {} jobs interrupted by a previous run as failed", orphaned);
    }
    let workers = WorkerPool::spawn(runner, receiver, usize::from(config.num_workers), shutdown_rx);

    let service = web::Data::new(VideoService::new(store.clone(), stager.clone(), queue.clone()));
    let gate = web::Data::new(DeliveryGate::new(store.clone()));
    let state = web::Data::new(AppState::new("video-encoder", encoder_available, workers.size(), queue));
    let store_data: web::Data<dyn JobStore> = web::Data::from(store);
    let max_payload_size = config.max_payload_size;
    let spool_dir = config.scratch_dir.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(service.clone())
            .app_data(gate.clone())
            .app_data(state.clone())
            .app_data(validation::multipart_config(max_payload_size))
            .app_data(TempFileConfig::default().directory(&spool_dir))
            .configure(api::routes)
    });

    let (host, port) = config.listen_addr();
    info!("Server starting on http://{}:{}", host, port);

    let server = server
        .bind((host.as_str(), port))
        .with_context(|| format!("failed to bind {}:{}", host, port))?
        .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(server_handle, server_task, workers, shutdown_tx, pool)
        .wait_for_shutdown()
        .await;

    Ok(())
}
