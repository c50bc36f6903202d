#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use media_worker::common::retry::RetryPolicy;
use media_worker::infrastructure::media::{MediaError, MediaProcessor};
use media_worker::infrastructure::storage::BlobStore;
use media_worker::modules::job::model::{Job, JobStatus, JobType};
use media_worker::modules::job::orchestrator::JobOrchestrator;
use media_worker::modules::job::repository::JobRepository;
use media_worker::modules::recording::model::{ChunkStatus, RecordingChunk, RecordingSummary};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_initial_interval(Duration::from_millis(1))
        .without_jitter()
}

pub fn new_job(job_type: JobType, status: JobStatus) -> Job {
    let now = OffsetDateTime::now_utc();
    Job {
        id: Uuid::new_v4(),
        entity_id: Uuid::new_v4(),
        entity_type: match job_type {
            JobType::Transcoder => "lesson".to_string(),
            JobType::RecordingMerge => "live_session".to_string(),
        },
        status,
        job_type,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    pub jobs: Mutex<HashMap<Uuid, Job>>,
    pub chunks: Mutex<Vec<RecordingChunk>>,
    pub lesson_urls: Mutex<HashMap<Uuid, String>>,
    pub recordings: Mutex<HashMap<Uuid, RecordingSummary>>,
    pub status_writes: Mutex<Vec<JobStatus>>,
    /// Make every conditional claim lose, as if another worker got there first.
    pub lose_claims: AtomicBool,
}

impl InMemoryJobRepository {
    pub fn insert_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn status_of(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.lock().unwrap().get(&id).map(|j| j.status)
    }

    pub fn status_writes(&self) -> Vec<JobStatus> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn insert_chunk(
        &self,
        live_session_id: Uuid,
        chunk_index: i32,
        object_name: &str,
        duration: Option<i32>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.chunks.lock().unwrap().push(RecordingChunk {
            id,
            live_session_id,
            chunk_index,
            object_name: object_name.to_string(),
            file_size: Some(1024),
            duration_seconds: duration,
            status: ChunkStatus::Uploaded,
        });
        id
    }

    pub fn chunk_statuses(&self, live_session_id: Uuid) -> Vec<ChunkStatus> {
        let mut chunks: Vec<RecordingChunk> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.live_session_id == live_session_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks.into_iter().map(|c| c.status).collect()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update_job_status(&self, id: Uuid, status: JobStatus) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| anyhow!("job {} not found", id))?;
        job.status = status;
        self.status_writes.lock().unwrap().push(status);
        Ok(())
    }

    async fn transition_job_status(&self, id: Uuid, from: JobStatus, to: JobStatus) -> Result<bool> {
        if self.lose_claims.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == from => {
                job.status = to;
                self.status_writes.lock().unwrap().push(to);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_lesson_video_url(&self, lesson_id: Uuid, url: &str) -> Result<()> {
        self.lesson_urls.lock().unwrap().insert(lesson_id, url.to_string());
        Ok(())
    }

    async fn get_ordered_chunks(&self, live_session_id: Uuid) -> Result<Vec<RecordingChunk>> {
        let mut chunks: Vec<RecordingChunk> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.live_session_id == live_session_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> Result<()> {
        let mut chunks = self.chunks.lock().unwrap();
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .ok_or_else(|| anyhow!("chunk {} not found", chunk_id))?;
        chunk.status = status;
        Ok(())
    }

    async fn update_live_session_recording(&self, live_session_id: Uuid, summary: &RecordingSummary) -> Result<()> {
        self.recordings.lock().unwrap().insert(live_session_id, summary.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    pub objects: Mutex<HashMap<String, StoredObject>>,
    pub fail_uploads: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_object_to_file(&self, key: &str, dest: &Path) -> Result<()> {
        let data = self
            .get(key)
            .map(|o| o.data)
            .ok_or_else(|| anyhow!("object {} not found", key))?;
        tokio::fs::write(dest, data).await?;
        Ok(())
    }

    async fn put_file(&self, key: &str, src: &Path, content_type: &str) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset while uploading {}", key));
        }
        let data = tokio::fs::read(src).await?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Records every invocation and creates the outputs ffmpeg would write:
/// any `.m3u8`/`.mp4` argument that is not an `-i` input.
#[derive(Default)]
pub struct FakeMediaProcessor {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub audio_checks: Mutex<Vec<PathBuf>>,
    pub fail: AtomicBool,
    /// Report every input as having no audio stream.
    pub silent: AtomicBool,
}

impl FakeMediaProcessor {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            silent: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProcessor for FakeMediaProcessor {
    async fn run(&self, args: &[String]) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(args.to_vec());

        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::Failed {
                binary: "ffmpeg".to_string(),
                exit_code: Some(1),
                output: "Invalid data found when processing input".to_string(),
            });
        }

        for (i, arg) in args.iter().enumerate() {
            let is_input = i > 0 && args[i - 1] == "-i";
            if !is_input && (arg.ends_with(".m3u8") || arg.ends_with(".mp4")) {
                let path = PathBuf::from(arg);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
                tokio::fs::write(&path, b"#fake media output\n").await.ok();
            }
        }
        Ok(())
    }

    async fn has_audio(&self, input: &Path) -> Result<bool, MediaError> {
        self.audio_checks.lock().unwrap().push(input.to_path_buf());
        Ok(!self.silent.load(Ordering::SeqCst))
    }
}

pub struct Harness {
    pub repo: Arc<InMemoryJobRepository>,
    pub store: Arc<InMemoryBlobStore>,
    pub media: Arc<FakeMediaProcessor>,
    pub temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_media(FakeMediaProcessor::default())
    }

    pub fn with_media(media: FakeMediaProcessor) -> Self {
        Self {
            repo: Arc::new(InMemoryJobRepository::default()),
            store: Arc::new(InMemoryBlobStore::default()),
            media: Arc::new(media),
            temp: tempfile::tempdir().unwrap(),
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    pub fn orchestrator(&self) -> JobOrchestrator {
        let repo: Arc<dyn JobRepository> = self.repo.clone();
        JobOrchestrator::new(repo, self.temp_root()).with_status_retry(fast_retry(3))
    }

    pub fn blob_store(&self) -> Arc<dyn BlobStore> {
        self.store.clone()
    }

    pub fn media_processor(&self) -> Arc<dyn MediaProcessor> {
        self.media.clone()
    }

    /// Number of workspace directories left under the temp root.
    pub fn leftover_workspaces(&self) -> usize {
        match std::fs::read_dir(self.temp_root()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}
