use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use super::job_runner::{EncodeJob, JobRunner};

pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<EncodeJob>>>;

/// Background worker pulling encode jobs off the shared queue
pub struct JobWorker {
    runner: Arc<JobRunner>,
    queue: SharedReceiver,
}

impl JobWorker {
    pub fn new(runner: Arc<JobRunner>, queue: SharedReceiver) -> Self {
        Self { runner, queue }
    }

    /// Process jobs one at a time until shutdown is signalled or the queue closes
    ///
    /// # Concurrency Model
    /// - Workers share one receiver; whichever is idle takes the next job
    /// - A worker never holds the receiver while encoding
    /// - Shutdown is only observed between jobs, so an encode in progress
    ///   always runs to completion
    pub async fn run(&self, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Worker {} started", worker_id);

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => None,
                job = Self::next_job(&self.queue) => job,
            };

            let Some(job) = next else {
                break;
            };

            let id = job.id;
            info!("Worker {} acquired job {}", worker_id, id);
            let status = self.runner.run(job).await;
            if status.is_terminal() {
                info!("Worker {} finished job {} with status={}", worker_id, id, status);
            } else {
                warn!("Worker {} left job {} in status={}", worker_id, id, status);
            }
        }

        info!("Worker {} stopped", worker_id);
    }

    async fn next_job(queue: &Mutex<mpsc::Receiver<EncodeJob>>) -> Option<EncodeJob> {
        queue.lock().await.recv().await
    }
}
