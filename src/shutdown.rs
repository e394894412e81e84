use actix_web::dev::ServerHandle;
use sqlx::{Pool, Postgres};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::worker::WorkerPool;

/// Handles graceful shutdown of the application
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server (stops accepting new uploads)
/// 3. Signaling workers to stop taking jobs from the queue
/// 4. Waiting for running encodes to finish and failing queued ones
/// 5. Closing database connections
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    workers: WorkerPool,
    shutdown_tx: watch::Sender<bool>,
    pool: Pool<Postgres>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        workers: WorkerPool,
        shutdown_tx: watch::Sender<bool>,
        pool: Pool<Postgres>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            workers,
            shutdown_tx,
            pool,
        }
    }

    /// Wait for CTRL+C or SIGTERM (Unix only), then shut down.
    ///
    /// A signal handler that cannot be installed is logged and never fires;
    /// the other one still works.
    pub async fn wait_for_shutdown(self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    async fn shutdown(self) {
        // 1. Stop HTTP server (stop accepting new uploads)
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;
        info!("HTTP server stopped accepting new requests");

        // 2. Signal workers to stop (they will finish current encodes)
        info!("Signaling workers to stop taking new jobs...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal to workers: {:?}", e);
        }

        // 3. Wait for workers, fail whatever never started
        self.workers.join().await;

        // 4. Wait for HTTP server task to complete
        info!("Waiting for HTTP server to fully shut down...");
        match self.server_task.await {
            Ok(Ok(())) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        // 5. Close database connections
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connections closed");

        info!("Graceful shutdown completed successfully");
    }
}
