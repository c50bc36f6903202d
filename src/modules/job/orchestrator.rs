//! Shared lifecycle around every pipeline run: idempotency guard, claim,
//! scoped workspace, failure classification and the final status write.

use super::model::{Job, JobStatus, JobType};
use super::repository::JobRepository;
use crate::common::error::{is_non_retryable, non_retryable_msg};
use crate::common::retry::{RetryPolicy, retry};
use crate::common::workspace::TempWorkspace;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Output: Send;

    fn job_type(&self) -> JobType;

    /// Produce and publish the artifact. Errors marked non-retryable fail
    /// the job; anything else sends it back to Pending.
    async fn run(&self, job: &Job, workspace: &TempWorkspace) -> Result<Self::Output>;

    /// Update the owning aggregate after a successful run. Failures here are
    /// logged and never revert the job.
    async fn finalize(&self, job: &Job, output: Self::Output) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job was not Pending (or another worker claimed it first).
    Skipped(JobStatus),
    Completed,
    Failed,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    repo: Arc<dyn JobRepository>,
    temp_root: PathBuf,
    status_retry: RetryPolicy,
}

impl JobOrchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            temp_root: temp_root.into(),
            status_retry: RetryPolicy::default()
                .with_max_attempts(3)
                .with_initial_interval(Duration::from_millis(200)),
        }
    }

    pub fn with_status_retry(mut self, policy: RetryPolicy) -> Self {
        self.status_retry = policy;
        self
    }

    pub fn repo(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }

    /// Returns `Ok` for skipped, completed and permanently failed jobs.
    /// Returns `Err` for transient failures, after moving the job back to
    /// Pending.
    pub async fn process<P: Pipeline>(&self, job_id: Uuid, pipeline: &P) -> Result<ProcessOutcome> {
        let span = info_span!("job", job_id = %job_id, job_type = %pipeline.job_type());
        self.process_in_span(job_id, pipeline).instrument(span).await
    }

    async fn process_in_span<P: Pipeline>(&self, job_id: Uuid, pipeline: &P) -> Result<ProcessOutcome> {
        // The producer may publish before its insert commits, so a missing
        // row is retried.
        let job = self
            .repo
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        if job.status != JobStatus::Pending {
            info!(status = %job.status, "job is not pending; skipping");
            return Ok(ProcessOutcome::Skipped(job.status));
        }

        let claimed = self
            .repo
            .transition_job_status(job_id, JobStatus::Pending, JobStatus::Processing)
            .await
            .context("failed to claim job")?;
        if !claimed {
            info!("job claimed elsewhere; skipping");
            return Ok(ProcessOutcome::Skipped(JobStatus::Processing));
        }
        info!("job processing started");

        match self.execute(&job, pipeline).await {
            Ok(()) => {
                self.write_status(job_id, JobStatus::Completed).await?;
                info!("job completed");
                Ok(ProcessOutcome::Completed)
            }
            Err(err) if is_non_retryable(&err) => {
                error!(error = %format!("{:#}", err), "job failed permanently");
                self.write_status(job_id, JobStatus::Failed).await?;
                Ok(ProcessOutcome::Failed)
            }
            Err(err) => {
                warn!(error = %format!("{:#}", err), "job failed; returning to pending");
                if let Err(revert) = self.write_status(job_id, JobStatus::Pending).await {
                    error!(error = %format!("{:#}", revert), "failed to return job to pending");
                }
                Err(err)
            }
        }
    }

    async fn execute<P: Pipeline>(&self, job: &Job, pipeline: &P) -> Result<()> {
        if job.job_type != pipeline.job_type() {
            return Err(non_retryable_msg(format!(
                "job {} has type {}, expected {}",
                job.id,
                job.job_type,
                pipeline.job_type()
            )));
        }

        let workspace = TempWorkspace::create(&self.temp_root, job.id).await?;
        let output = pipeline.run(job, &workspace).await;
        workspace.cleanup().await;

        if let Err(e) = pipeline.finalize(job, output?).await {
            error!(error = %format!("{:#}", e), "failed to update aggregate after job success");
        }
        Ok(())
    }

    async fn write_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        retry(&self.status_retry, "update job status", || {
            self.repo.update_job_status(job_id, status)
        })
        .await
    }
}
