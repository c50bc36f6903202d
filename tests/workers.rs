mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{FakeMediaProcessor, Harness, fast_retry, new_job};
use futures_util::stream;
use media_worker::infrastructure::queue::pool::{ConsumerState, InboundDelivery, Settlement, WorkerPool};
use media_worker::modules::job::model::{JobStatus, JobType};
use media_worker::modules::recording::service::RecordingMergeService;
use media_worker::modules::transcode::service::TranscodeService;
use media_worker::workers::{recording_merge, transcoder};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SOURCE: &str = "lessons/course-3/lesson-1/welcome.mp4";

struct RawDelivery {
    payload: Bytes,
    settlements: Arc<Mutex<Vec<Settlement>>>,
}

#[async_trait]
impl InboundDelivery for RawDelivery {
    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    fn delivery_tag(&self) -> u64 {
        1
    }

    fn redelivered(&self) -> bool {
        false
    }

    async fn settle(&self, settlement: Settlement) -> anyhow::Result<()> {
        self.settlements.lock().unwrap().push(settlement);
        Ok(())
    }
}

fn one_delivery(payload: impl Into<Bytes>) -> (Vec<Result<RawDelivery, std::io::Error>>, Arc<Mutex<Vec<Settlement>>>) {
    let settlements = Arc::new(Mutex::new(Vec::new()));
    let delivery = RawDelivery { payload: payload.into(), settlements: Arc::clone(&settlements) };
    (vec![Ok(delivery)], settlements)
}

async fn deliver_transcode(harness: &Harness, payload: impl Into<Bytes>) -> Vec<Settlement> {
    let service =
        Arc::new(TranscodeService::new(harness.orchestrator(), harness.blob_store(), harness.media_processor()));
    let pool = WorkerPool::new("transcoding_queue", 1, transcoder::handle_delivery).with_retry_policy(fast_retry(5));
    let (items, settlements) = one_delivery(payload);
    let (state, _rx) = watch::channel(ConsumerState::Consuming);

    pool.run(stream::iter(items), service, CancellationToken::new(), &state).await;

    let settled = settlements.lock().unwrap().clone();
    settled
}

async fn deliver_merge(harness: &Harness, payload: impl Into<Bytes>) -> Vec<Settlement> {
    let service =
        Arc::new(RecordingMergeService::new(harness.orchestrator(), harness.blob_store(), harness.media_processor()));
    let pool =
        WorkerPool::new("recording_merge_queue", 1, recording_merge::handle_delivery).with_retry_policy(fast_retry(5));
    let (items, settlements) = one_delivery(payload);
    let (state, _rx) = watch::channel(ConsumerState::Consuming);

    pool.run(stream::iter(items), service, CancellationToken::new(), &state).await;

    let settled = settlements.lock().unwrap().clone();
    settled
}

fn transcode_payload(job_id: Uuid) -> String {
    serde_json::json!({ "jobId": job_id, "objectPath": SOURCE, "fileName": "welcome.mp4" }).to_string()
}

#[tokio::test]
async fn completed_transcode_is_acked() {
    let harness = Harness::new();
    let job = new_job(JobType::Transcoder, JobStatus::Pending);
    harness.repo.insert_job(job.clone());
    harness.store.insert(SOURCE, b"source video");

    let settled = deliver_transcode(&harness, transcode_payload(job.id)).await;

    assert_eq!(settled, vec![Settlement::Ack]);
    assert_eq!(harness.repo.status_of(job.id), Some(JobStatus::Completed));
}

#[tokio::test]
async fn terminal_transcode_failure_is_acked_with_job_failed() {
    let harness = Harness::with_media(FakeMediaProcessor::failing());
    let job = new_job(JobType::Transcoder, JobStatus::Pending);
    harness.repo.insert_job(job.clone());
    harness.store.insert(SOURCE, b"source video");

    let settled = deliver_transcode(&harness, transcode_payload(job.id)).await;

    assert_eq!(settled, vec![Settlement::Ack]);
    assert_eq!(harness.repo.status_of(job.id), Some(JobStatus::Failed));
    assert_eq!(harness.media.calls().len(), 1);
}

#[tokio::test]
async fn transient_transcode_failure_is_dead_lettered_with_job_pending() {
    let harness = Harness::new();
    let job = new_job(JobType::Transcoder, JobStatus::Pending);
    harness.repo.insert_job(job.clone());

    let settled = deliver_transcode(&harness, transcode_payload(job.id)).await;

    assert_eq!(settled, vec![Settlement::DeadLetter]);
    assert_eq!(harness.repo.status_of(job.id), Some(JobStatus::Pending));
    let claims = harness.repo.status_writes().iter().filter(|s| **s == JobStatus::Processing).count();
    assert_eq!(claims, 5);
    assert!(harness.media.calls().is_empty());
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn undecodable_transcode_payload_is_dead_lettered_at_once() {
    let harness = Harness::new();

    let settled = deliver_transcode(&harness, "{not json").await;

    assert_eq!(settled, vec![Settlement::DeadLetter]);
    assert!(harness.repo.status_writes().is_empty());
}

#[tokio::test]
async fn merge_with_no_chunks_is_acked_with_job_failed() {
    let harness = Harness::new();
    let job = new_job(JobType::RecordingMerge, JobStatus::Pending);
    harness.repo.insert_job(job.clone());
    let payload = serde_json::json!({ "jobId": job.id, "liveSessionId": job.entity_id }).to_string();

    let settled = deliver_merge(&harness, payload).await;

    assert_eq!(settled, vec![Settlement::Ack]);
    assert_eq!(harness.repo.status_of(job.id), Some(JobStatus::Failed));
}

#[tokio::test]
async fn merge_with_missing_chunk_object_is_dead_lettered_with_job_pending() {
    let harness = Harness::new();
    let job = new_job(JobType::RecordingMerge, JobStatus::Pending);
    harness.repo.insert_job(job.clone());
    let session = job.entity_id;
    harness.repo.insert_chunk(session, 0, &format!("live-recordings/{}/chunks/lost.webm", session), Some(4));
    let payload = serde_json::json!({ "jobId": job.id, "liveSessionId": session }).to_string();

    let settled = deliver_merge(&harness, payload).await;

    assert_eq!(settled, vec![Settlement::DeadLetter]);
    assert_eq!(harness.repo.status_of(job.id), Some(JobStatus::Pending));
    assert!(harness.media.calls().is_empty());
}

#[tokio::test]
async fn undecodable_merge_payload_is_dead_lettered_at_once() {
    let harness = Harness::new();

    let settled = deliver_merge(&harness, r#"{"jobId":"not-a-uuid"}"#).await;

    assert_eq!(settled, vec![Settlement::DeadLetter]);
    assert!(harness.repo.status_writes().is_empty());
}
