use super::concat::{
    chunk_file_name, concat_args, concat_manifest, final_object_key, normalize_args, normalized_file_name,
};
use super::events::RecordingMergeMessage;
use super::model::{ChunkStatus, RecordingChunk, RecordingSummary};
use crate::common::error::{NonRetryableExt, is_non_retryable, non_retryable_msg};
use crate::common::workspace::TempWorkspace;
use crate::infrastructure::media::MediaProcessor;
use crate::infrastructure::storage::BlobStore;
use crate::modules::job::model::{Job, JobType};
use crate::modules::job::orchestrator::{JobOrchestrator, Pipeline, ProcessOutcome};
use crate::modules::job::repository::JobRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct RecordingMergeService {
    orchestrator: JobOrchestrator,
    storage: Arc<dyn BlobStore>,
    media: Arc<dyn MediaProcessor>,
}

impl RecordingMergeService {
    pub fn new(orchestrator: JobOrchestrator, storage: Arc<dyn BlobStore>, media: Arc<dyn MediaProcessor>) -> Self {
        Self {
            orchestrator,
            storage,
            media,
        }
    }

    pub async fn process(&self, message: &RecordingMergeMessage) -> Result<ProcessOutcome> {
        let pipeline = MergePipeline {
            storage: self.storage.as_ref(),
            media: self.media.as_ref(),
            repo: self.orchestrator.repo().as_ref(),
            live_session_id: message.live_session_id,
        };
        self.orchestrator.process(message.job_id, &pipeline).await
    }
}

pub struct MergedRecording {
    pub object_key: String,
    pub chunks: Vec<RecordingChunk>,
}

struct MergePipeline<'a> {
    storage: &'a dyn BlobStore,
    media: &'a dyn MediaProcessor,
    repo: &'a dyn JobRepository,
    live_session_id: Uuid,
}

impl MergePipeline<'_> {
    async fn mark_chunks(&self, chunks: &[RecordingChunk], status: ChunkStatus) -> Result<()> {
        for chunk in chunks {
            self.repo.update_chunk_status(chunk.id, status).await?;
        }
        Ok(())
    }

    /// Status write that must not mask the error being reported.
    async fn mark_chunks_best_effort(&self, chunks: &[RecordingChunk], status: ChunkStatus) {
        for chunk in chunks {
            if let Err(e) = self.repo.update_chunk_status(chunk.id, status).await {
                warn!(
                    chunk_id = %chunk.id,
                    status = %status,
                    error = %format!("{:#}", e),
                    "failed to update chunk status"
                );
            }
        }
    }

    async fn merge(&self, chunks: &[RecordingChunk], workspace: &TempWorkspace) -> Result<String> {
        let chunk_dir = workspace.subdir("chunks").await?;
        let normalized_dir = workspace.subdir("normalized").await?;

        let mut downloaded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let local = chunk_dir.join(chunk_file_name(chunk.chunk_index, &chunk.object_name));
            self.storage
                .get_object_to_file(&chunk.object_name, &local)
                .await
                .with_context(|| format!("failed to download chunk {}", chunk.chunk_index))?;
            downloaded.push((chunk.chunk_index, local));
        }
        info!("⬇️ Downloaded {} chunks", downloaded.len());

        let mut normalized = Vec::with_capacity(downloaded.len());
        for (index, input) in &downloaded {
            let output = std::path::absolute(normalized_dir.join(normalized_file_name(*index)))
                .context("failed to resolve normalized chunk path")?;
            self.media
                .run(&normalize_args(input, &output))
                .await
                .with_context(|| format!("failed to normalize chunk {}", index))
                .non_retryable()?;
            normalized.push(output);
        }

        let manifest = workspace.path().join("concat.txt");
        tokio::fs::write(&manifest, concat_manifest(&normalized))
            .await
            .with_context(|| format!("failed to write {}", manifest.display()))?;

        let merged = workspace.path().join("recording.mp4");
        info!("🎬 Concatenating {} normalized chunks", normalized.len());
        self.media
            .run(&concat_args(&manifest, &merged))
            .await
            .context("failed to concatenate chunks")
            .non_retryable()?;

        let key = final_object_key(&chunks[0].object_name);
        self.storage
            .put_file(&key, &merged, "video/mp4")
            .await
            .context("failed to upload merged recording")?;
        info!("⬆️ Uploaded merged recording to {}", key);

        Ok(key)
    }
}

#[async_trait]
impl Pipeline for MergePipeline<'_> {
    type Output = MergedRecording;

    fn job_type(&self) -> JobType {
        JobType::RecordingMerge
    }

    async fn run(&self, _job: &Job, workspace: &TempWorkspace) -> Result<MergedRecording> {
        let chunks = self
            .repo
            .get_ordered_chunks(self.live_session_id)
            .await
            .context("failed to load recording chunks")?;

        if chunks.is_empty() {
            return Err(non_retryable_msg(format!(
                "no recording chunks for live session {}",
                self.live_session_id
            )));
        }
        info!(live_session_id = %self.live_session_id, chunks = chunks.len(), "merging recording");

        if let Err(e) = self.mark_chunks(&chunks, ChunkStatus::Processing).await {
            self.mark_chunks_best_effort(&chunks, ChunkStatus::Uploaded).await;
            return Err(e.context("failed to mark chunks processing"));
        }

        match self.merge(&chunks, workspace).await {
            Ok(object_key) => Ok(MergedRecording { object_key, chunks }),
            Err(e) if is_non_retryable(&e) => {
                self.mark_chunks_best_effort(&chunks, ChunkStatus::Failed).await;
                Err(e)
            }
            Err(e) => {
                self.mark_chunks_best_effort(&chunks, ChunkStatus::Uploaded).await;
                Err(e)
            }
        }
    }

    async fn finalize(&self, _job: &Job, merged: MergedRecording) -> Result<()> {
        self.mark_chunks_best_effort(&merged.chunks, ChunkStatus::Completed).await;

        let summary = RecordingSummary::completed(merged.object_key, &merged.chunks);
        self.repo
            .update_live_session_recording(self.live_session_id, &summary)
            .await?;

        info!(
            live_session_id = %self.live_session_id,
            duration = summary.recording_duration,
            total_chunks = summary.total_chunks,
            "live session recording updated"
        );
        Ok(())
    }
}
