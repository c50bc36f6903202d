use super::events::JobMessage;
use super::ladder::{MASTER_PLAYLIST, PROFILES, hls_args};
use super::playlist::master_playlist;
use crate::common::error::NonRetryableExt;
use crate::common::workspace::TempWorkspace;
use crate::infrastructure::media::MediaProcessor;
use crate::infrastructure::storage::{BlobStore, join_key, parent_key, upload_dir};
use crate::modules::job::model::{Job, JobType};
use crate::modules::job::orchestrator::{JobOrchestrator, Pipeline, ProcessOutcome};
use crate::modules::job::repository::JobRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TranscodeService {
    orchestrator: JobOrchestrator,
    storage: Arc<dyn BlobStore>,
    media: Arc<dyn MediaProcessor>,
}

impl TranscodeService {
    pub fn new(orchestrator: JobOrchestrator, storage: Arc<dyn BlobStore>, media: Arc<dyn MediaProcessor>) -> Self {
        Self {
            orchestrator,
            storage,
            media,
        }
    }

    pub async fn process(&self, message: &JobMessage) -> Result<ProcessOutcome> {
        let pipeline = TranscodePipeline {
            storage: self.storage.as_ref(),
            media: self.media.as_ref(),
            repo: self.orchestrator.repo().as_ref(),
            message,
        };
        self.orchestrator.process(message.job_id, &pipeline).await
    }
}

/// Local name for the downloaded source: the last path component of
/// `fileName`, else of the object path.
pub fn input_file_name(message: &JobMessage) -> String {
    [message.file_name.as_str(), message.object_path.as_str()]
        .into_iter()
        .filter_map(|name| {
            let normalized = name.replace('\\', "/");
            Path::new(&normalized)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .find(|n| !n.is_empty())
        .unwrap_or_else(|| "source".to_string())
}

struct TranscodePipeline<'a> {
    storage: &'a dyn BlobStore,
    media: &'a dyn MediaProcessor,
    repo: &'a dyn JobRepository,
    message: &'a JobMessage,
}

#[async_trait]
impl Pipeline for TranscodePipeline<'_> {
    /// Key of the uploaded master playlist.
    type Output = String;

    fn job_type(&self) -> JobType {
        JobType::Transcoder
    }

    async fn run(&self, _job: &Job, workspace: &TempWorkspace) -> Result<String> {
        let source_key = self.message.object_path.as_str();
        let input_dir = workspace.subdir("input").await?;
        let output_dir = workspace.subdir("output").await?;
        let input = input_dir.join(input_file_name(self.message));

        info!("⬇️ Downloading source {}", source_key);
        self.storage
            .get_object_to_file(source_key, &input)
            .await
            .context("failed to download source video")?;

        let with_audio = self
            .media
            .has_audio(&input)
            .await
            .context("failed to inspect source audio")
            .non_retryable()?;
        if !with_audio {
            info!("🔇 Source has no audio stream; rendering video only");
        }

        info!("🎞️ Rendering {} HLS renditions", PROFILES.len());
        self.media
            .run(&hls_args(&input, &output_dir, &PROFILES, with_audio))
            .await
            .context("failed to render HLS ladder")
            .non_retryable()?;

        let master_path = output_dir.join(MASTER_PLAYLIST);
        tokio::fs::write(&master_path, master_playlist(&PROFILES, with_audio))
            .await
            .with_context(|| format!("failed to write {}", master_path.display()))?;

        let prefix = parent_key(source_key);
        let keys = upload_dir(self.storage, &output_dir, prefix)
            .await
            .context("failed to upload renditions")?;
        info!("⬆️ Uploaded {} objects under '{}'", keys.len(), prefix);

        if let Err(e) = self.storage.remove_object(source_key).await {
            warn!(key = source_key, error = %format!("{:#}", e), "failed to remove source video");
        }

        Ok(join_key(prefix, MASTER_PLAYLIST))
    }

    async fn finalize(&self, job: &Job, master_key: String) -> Result<()> {
        self.repo
            .update_lesson_video_url(job.entity_id, &master_key)
            .await?;
        info!(lesson_id = %job.entity_id, video_url = %master_key, "lesson video url updated");
        Ok(())
    }
}
