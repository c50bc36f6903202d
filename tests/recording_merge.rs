mod common;

use common::{FakeMediaProcessor, Harness, new_job};
use media_worker::modules::job::model::{JobStatus, JobType};
use media_worker::modules::job::orchestrator::ProcessOutcome;
use media_worker::modules::recording::events::RecordingMergeMessage;
use media_worker::modules::recording::model::ChunkStatus;
use media_worker::modules::recording::service::RecordingMergeService;
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn service(harness: &Harness) -> RecordingMergeService {
    RecordingMergeService::new(harness.orchestrator(), harness.blob_store(), harness.media_processor())
}

fn merge_job(harness: &Harness) -> RecordingMergeMessage {
    let job = new_job(JobType::RecordingMerge, JobStatus::Pending);
    let message = RecordingMergeMessage {
        job_id: job.id,
        live_session_id: job.entity_id,
    };
    harness.repo.insert_job(job);
    message
}

fn seed_chunks(harness: &Harness, session: Uuid, durations: &[(i32, i32)]) {
    // out of order on purpose; the repository orders by index
    for (index, duration) in durations.iter().rev() {
        let key = format!("live-recordings/{}/chunks/chunk_{:04}.webm", session, index);
        harness.store.insert(&key, format!("chunk {}", index).as_bytes());
        harness.repo.insert_chunk(session, *index, &key, Some(*duration));
    }
}

#[tokio::test]
async fn merges_chunks_and_updates_live_session() {
    let harness = Harness::new();
    let message = merge_job(&harness);
    let session = message.live_session_id;
    seed_chunks(&harness, session, &[(0, 10), (1, 12), (2, 8)]);

    let outcome = service(&harness).process(&message).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed);

    let final_key = format!("live-recordings/{}/final/recording.mp4", session);
    let summary = harness.repo.recordings.lock().unwrap().get(&session).cloned().unwrap();
    assert_eq!(summary.total_chunks, 3);
    assert_eq!(summary.recording_duration, 30);
    assert_eq!(summary.recording_status, "COMPLETED");
    assert_eq!(summary.final_video_object_name, final_key);

    let uploaded = harness.store.get(&final_key).unwrap();
    assert_eq!(uploaded.content_type, "video/mp4");

    assert_eq!(harness.repo.chunk_statuses(session), vec![ChunkStatus::Completed; 3]);
    assert_eq!(harness.repo.status_of(message.job_id), Some(JobStatus::Completed));
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn normalizes_in_index_order_then_concats_once() {
    let harness = Harness::new();
    let message = merge_job(&harness);
    seed_chunks(&harness, message.live_session_id, &[(0, 5), (1, 5), (2, 5)]);

    service(&harness).process(&message).await.unwrap();

    let calls = harness.media.calls();
    assert_eq!(calls.len(), 4);
    for (i, call) in calls[..3].iter().enumerate() {
        let input = &call[call.iter().position(|a| a == "-i").unwrap() + 1];
        assert!(input.ends_with(&format!("chunk-{:04}.webm", i)), "unexpected input {}", input);
    }

    let concat = &calls[3];
    assert!(concat.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
    assert!(concat.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
}

#[tokio::test]
async fn zero_chunks_fail_without_invoking_media() {
    let harness = Harness::new();
    let message = merge_job(&harness);

    let outcome = service(&harness).process(&message).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Failed);
    assert!(harness.media.calls().is_empty());
    assert_eq!(harness.repo.status_of(message.job_id), Some(JobStatus::Failed));
}

#[tokio::test]
async fn conversion_failure_marks_chunks_failed() {
    let harness = Harness::with_media(FakeMediaProcessor::failing());
    let message = merge_job(&harness);
    let session = message.live_session_id;
    seed_chunks(&harness, session, &[(0, 10), (1, 12)]);

    let outcome = service(&harness).process(&message).await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Failed);
    assert_eq!(harness.repo.chunk_statuses(session), vec![ChunkStatus::Failed; 2]);
    assert!(harness.repo.recordings.lock().unwrap().is_empty());
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn upload_failure_is_transient_and_rolls_chunks_back() {
    let harness = Harness::new();
    harness.store.fail_uploads.store(true, Ordering::SeqCst);
    let message = merge_job(&harness);
    let session = message.live_session_id;
    seed_chunks(&harness, session, &[(0, 10), (1, 12)]);

    let result = service(&harness).process(&message).await;

    assert!(result.is_err());
    assert_eq!(harness.repo.status_of(message.job_id), Some(JobStatus::Pending));
    assert_eq!(harness.repo.chunk_statuses(session), vec![ChunkStatus::Uploaded; 2]);
}

#[tokio::test]
async fn missing_chunk_object_is_transient() {
    let harness = Harness::new();
    let message = merge_job(&harness);
    let session = message.live_session_id;
    harness
        .repo
        .insert_chunk(session, 0, &format!("live-recordings/{}/chunks/gone.webm", session), Some(3));

    let result = service(&harness).process(&message).await;

    assert!(result.is_err());
    assert!(harness.media.calls().is_empty());
    assert_eq!(harness.repo.status_of(message.job_id), Some(JobStatus::Pending));
}
