use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::job_runner::{EncodeJob, JobRunner};
use super::job_worker::{JobWorker, SharedReceiver};

#[derive(Debug, Error)]
#[error("encode queue is full or shutting down")]
pub struct QueueFull;

/// Sending side of the bounded encode queue
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<EncodeJob>,
}

/// A reserved place in the queue. Dropping it gives the place back.
#[derive(Debug)]
pub struct QueueSlot {
    permit: mpsc::OwnedPermit<EncodeJob>,
}

impl JobQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<EncodeJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Reserve room for one job without waiting
    pub fn try_reserve(&self) -> Result<QueueSlot, QueueFull> {
        self.sender
            .clone()
            .try_reserve_owned()
            .map(|permit| QueueSlot { permit })
            .map_err(|_| QueueFull)
    }

    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

impl QueueSlot {
    pub fn submit(self, job: EncodeJob) {
        self.permit.send(job);
    }
}

/// Fixed set of workers draining the encode queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    queue: SharedReceiver,
    runner: Arc<JobRunner>,
}

impl WorkerPool {
    pub fn spawn(
        runner: Arc<JobRunner>,
        receiver: mpsc::Receiver<EncodeJob>,
        num_workers: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let queue: SharedReceiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 1..=num_workers {
            let worker = JobWorker::new(runner.clone(), queue.clone());
            let worker_shutdown_rx = shutdown_rx.clone();

            handles.push(tokio::spawn(async move {
                worker.run(worker_id, worker_shutdown_rx).await;
            }));
            info!("Spawned worker {}", worker_id);
        }

        Self {
            handles,
            queue,
            runner,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish its current job, then fail whatever is
    /// still queued. Call after shutdown has been signalled.
    pub async fn join(self) {
        let num_workers = self.handles.len();
        info!("Waiting for {} workers to complete current jobs...", num_workers);

        let mut completed = 0;
        for (i, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(()) => {
                    completed += 1;
                    info!("Worker {} stopped ({}/{})", i + 1, completed, num_workers);
                }
                Err(e) => error!("Worker {} failed to stop: {:?}", i + 1, e),
            }
        }

        let mut receiver = self.queue.lock().await;
        receiver.close();
        let mut abandoned = 0;
        while let Ok(job) = receiver.try_recv() {
            self.runner.abandon(job).await;
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("Marked {} queued jobs as failed during shutdown", abandoned);
        }
        info!("All workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{JobStatus, JobStore};
    use crate::worker::job_runner::tests::{Fixture, ScriptedEncoder};
    use std::collections::HashSet;
    use std::time::Duration;

    async fn wait_until_terminal(fx: &Fixture, ids: &[i32]) {
        for _ in 0..500 {
            if ids
                .iter()
                .all(|id| fx.store.status(*id).is_some_and(|s| s.is_terminal()))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("jobs did not finish in time");
    }

    #[tokio::test]
    async fn concurrent_jobs_all_finish_with_distinct_artifacts() {
        let fx = Fixture::new().await;
        let runner = Arc::new(fx.runner(ScriptedEncoder { succeed: true }));
        let (queue, receiver) = JobQueue::bounded(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::spawn(runner, receiver, 3, shutdown_rx);

        let mut ids = Vec::new();
        for i in 0..8 {
            let job = fx.job(&format!("video {}", i)).await;
            ids.push(job.id);
            queue.try_reserve().unwrap().submit(job);
        }

        wait_until_terminal(&fx, &ids).await;

        let mut artifacts = HashSet::new();
        for id in &ids {
            let record = fx.store.get_delivery(*id).await.unwrap().unwrap();
            assert_eq!(record.status, JobStatus::Encoded);
            assert!(artifacts.insert(record.artifact_path.unwrap()));
        }
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 8);

        shutdown_tx.send(true).unwrap();
        pool.join().await;
    }

    #[tokio::test]
    async fn full_queue_rejects_reservations() {
        let (queue, _receiver) = JobQueue::bounded(1);

        let slot = queue.try_reserve().unwrap();
        assert!(queue.try_reserve().is_err());

        drop(slot);
        assert!(queue.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn shutdown_fails_jobs_still_queued() {
        let fx = Fixture::new().await;
        let runner = Arc::new(fx.runner(ScriptedEncoder { succeed: true }));
        let (queue, receiver) = JobQueue::bounded(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let first = fx.job("a").await;
        let second = fx.job("b").await;
        let ids = [first.id, second.id];
        let inputs = [first.input.path().to_path_buf(), second.input.path().to_path_buf()];
        queue.try_reserve().unwrap().submit(first);
        queue.try_reserve().unwrap().submit(second);

        shutdown_tx.send(true).unwrap();
        let pool = WorkerPool::spawn(runner, receiver, 2, shutdown_rx);
        pool.join().await;

        for (id, input) in ids.iter().zip(&inputs) {
            assert_eq!(fx.store.status(*id), Some(JobStatus::Failed));
            assert!(!input.exists());
            assert!(!fx.stager.output_path(*id).exists());
        }
        assert!(queue.try_reserve().is_err());
    }
}
