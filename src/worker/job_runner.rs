use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{JobStatus, JobStore, StoreError};
use crate::encoder::{EncodeOutcome, EncodeProfile, Encoder};
use crate::storage::{ArtifactStager, StagedInput};

/// A created job waiting for its encode
#[derive(Debug)]
pub struct EncodeJob {
    pub id: i32,
    pub input: StagedInput,
}

/// Drives one job from `processing` to `encoded` or `failed`.
///
/// The runner is the only writer of a job's status after creation. The
/// store is updated only once the encode attempt has fully concluded, and
/// the staged input is released exactly once whatever the outcome.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    stager: Arc<ArtifactStager>,
    encoder: Arc<dyn Encoder>,
    profile: EncodeProfile,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        stager: Arc<ArtifactStager>,
        encoder: Arc<dyn Encoder>,
        profile: EncodeProfile,
    ) -> Self {
        Self {
            store,
            stager,
            encoder,
            profile,
        }
    }

    /// Run the job to a terminal state and return the state it should be in.
    ///
    /// Store failures are logged and do not stop the job; the returned status
    /// reflects the encode outcome even if recording it failed.
    pub async fn run(&self, job: EncodeJob) -> JobStatus {
        let EncodeJob { id, input } = job;

        // Restated so a re-entered runner notices a job that already finished.
        match self.store.set_status(id, JobStatus::Processing).await {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { .. }) => {
                warn!("Job {} is no longer processing, skipping encode", id);
                self.stager.release_input(input);
                return self.current_status(id).await;
            }
            Err(e) => warn!("Could not confirm processing status for job {}: {}", id, e),
        }

        let status = self.encode_and_record(id, &input).await;
        self.stager.release_input(input);
        status
    }

    /// Fail jobs interrupted by a previous process and delete any artifact
    /// they left behind. Run once at startup, before the workers.
    ///
    /// A job whose encode finished but whose row was never updated leaves a
    /// complete file at its output path; nothing can serve it once the row
    /// is `failed`.
    pub async fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let ids = self.store.fail_orphaned().await?;
        for &id in &ids {
            warn!("Job {} was interrupted by a previous run, marked failed", id);
            self.stager.discard_output(&self.stager.output_path(id)).await;
        }
        Ok(ids.len())
    }

    /// Fail a job that never reached a worker (e.g. queued at shutdown).
    pub async fn abandon(&self, job: EncodeJob) {
        let EncodeJob { id, input } = job;
        warn!("Abandoning queued job {}", id);
        self.record_failure(id).await;
        self.stager.release_input(input);
    }

    async fn encode_and_record(&self, id: i32, input: &StagedInput) -> JobStatus {
        let output = self.stager.output_path(id);
        info!("Encoding job {} with profile {}", id, self.profile.name);

        match self.encoder.encode(input.path(), &output, &self.profile).await {
            EncodeOutcome::Success => {
                match self
                    .store
                    .set_status_and_artifact(id, JobStatus::Encoded, &output)
                    .await
                {
                    Ok(()) => info!("Completed job {}: status=encoded", id),
                    Err(e) => error!("Job {} encoded but the store update failed: {}", id, e),
                }
                JobStatus::Encoded
            }
            EncodeOutcome::Failure { diagnostics } => {
                warn!("Encode failed for job {}: {}", id, diagnostics);
                self.stager.discard_output(&output).await;
                self.record_failure(id).await;
                JobStatus::Failed
            }
        }
    }

    async fn record_failure(&self, id: i32) {
        match self.store.set_status(id, JobStatus::Failed).await {
            Ok(()) => info!("Completed job {}: status=failed", id),
            Err(e) => error!("Failed to mark job {} as failed: {}", id, e),
        }
    }

    async fn current_status(&self, id: i32) -> JobStatus {
        match self.store.get_delivery(id).await {
            Ok(Some(record)) => record.status,
            Ok(None) => JobStatus::Failed,
            Err(e) => {
                error!("Failed to read status of job {}: {}", id, e);
                JobStatus::Failed
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db::memory::{new_video, MemoryJobStore};
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::Path;
    use tempfile::{NamedTempFile, TempDir};

    /// Encoder double that writes a fixed artifact or fails
    pub struct ScriptedEncoder {
        pub succeed: bool,
    }

    #[async_trait]
    impl Encoder for ScriptedEncoder {
        async fn encode(&self, input: &Path, output: &Path, _profile: &EncodeProfile) -> EncodeOutcome {
            assert!(input.exists(), "input must exist while encoding");
            if self.succeed {
                tokio::fs::write(output, b"webm-bytes").await.unwrap();
                EncodeOutcome::Success
            } else {
                EncodeOutcome::Failure {
                    diagnostics: "Invalid data found when processing input".to_string(),
                }
            }
        }
    }

    pub struct Fixture {
        pub dir: TempDir,
        pub store: Arc<MemoryJobStore>,
        pub stager: Arc<ArtifactStager>,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let stager = Arc::new(ArtifactStager::new(
                dir.path().join("scratch"),
                dir.path().join("out"),
                EncodeProfile::WEBM_720P.extension,
            ));
            stager.prepare().await.unwrap();
            Self {
                dir,
                store: Arc::new(MemoryJobStore::new()),
                stager,
            }
        }

        pub fn runner(&self, encoder: impl Encoder + 'static) -> JobRunner {
            JobRunner::new(
                self.store.clone(),
                self.stager.clone(),
                Arc::new(encoder),
                EncodeProfile::WEBM_720P,
            )
        }

        pub async fn job(&self, title: &str) -> EncodeJob {
            let id = self.store.create(&new_video(title)).await.unwrap();
            let mut upload = NamedTempFile::new_in(self.dir.path()).unwrap();
            upload.write_all(b"source").unwrap();
            let input = self.stager.adopt_input(upload, "clip.mp4").await.unwrap();
            EncodeJob { id, input }
        }
    }

    #[tokio::test]
    async fn success_links_artifact_and_releases_input() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: true });
        let job = fx.job("ok").await;
        let (id, input) = (job.id, job.input.path().to_path_buf());

        assert_eq!(runner.run(job).await, JobStatus::Encoded);

        let record = fx.store.get_delivery(id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Encoded);
        let artifact = record.artifact_path.unwrap();
        assert_eq!(artifact, fx.stager.output_path(id));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"webm-bytes");
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn failure_leaves_no_artifact_and_releases_input() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: false });
        let job = fx.job("bad").await;
        let (id, input) = (job.id, job.input.path().to_path_buf());

        assert_eq!(runner.run(job).await, JobStatus::Failed);

        let record = fx.store.get_delivery(id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.artifact_path, None);
        assert!(!fx.stager.output_path(id).exists());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn store_outage_does_not_stop_the_encode() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: true });
        let job = fx.job("outage").await;
        let (id, input) = (job.id, job.input.path().to_path_buf());
        fx.store.fail_updates(true);

        assert_eq!(runner.run(job).await, JobStatus::Encoded);

        assert!(fx.stager.output_path(id).exists());
        assert!(!input.exists());
        assert_eq!(fx.store.status(id), Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn terminal_job_is_not_encoded_again() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: true });
        let job = fx.job("done").await;
        let (id, input) = (job.id, job.input.path().to_path_buf());
        fx.store.set_status(id, JobStatus::Failed).await.unwrap();

        assert_eq!(runner.run(job).await, JobStatus::Failed);

        assert!(!fx.stager.output_path(id).exists());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn recovery_fails_interrupted_jobs_and_removes_their_artifacts() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: true });
        let done = fx.job("done").await;
        let done_id = done.id;
        runner.run(done).await;
        let interrupted = fx.job("interrupted").await;
        let id = interrupted.id;
        // Encoded, but the process died before the row was updated.
        tokio::fs::write(fx.stager.output_path(id), b"webm-bytes").await.unwrap();

        assert_eq!(runner.recover_interrupted().await.unwrap(), 1);

        assert_eq!(fx.store.status(id), Some(JobStatus::Failed));
        assert!(!fx.stager.output_path(id).exists());
        assert_eq!(fx.store.status(done_id), Some(JobStatus::Encoded));
        assert!(fx.stager.output_path(done_id).exists());
    }

    #[tokio::test]
    async fn abandon_fails_the_job_and_releases_input() {
        let fx = Fixture::new().await;
        let runner = fx.runner(ScriptedEncoder { succeed: true });
        let job = fx.job("queued").await;
        let (id, input) = (job.id, job.input.path().to_path_buf());

        runner.abandon(job).await;

        assert_eq!(fx.store.status(id), Some(JobStatus::Failed));
        assert!(!input.exists());
    }
}
