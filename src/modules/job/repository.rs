use super::model::{Job, JobRow, JobStatus};
use crate::infrastructure::db::pool::DbPool;
use crate::modules::recording::model::{ChunkStatus, RecordingChunk, RecordingChunkRow, RecordingSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence used by the orchestrator and both pipelines. Every call is
/// independent; nothing spans a transaction.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    async fn update_job_status(&self, id: Uuid, status: JobStatus) -> Result<()>;

    /// Write `to` only if the stored status is still `from`. Returns whether
    /// the row changed.
    async fn transition_job_status(&self, id: Uuid, from: JobStatus, to: JobStatus) -> Result<bool>;

    async fn update_lesson_video_url(&self, lesson_id: Uuid, url: &str) -> Result<()>;

    /// Chunks of a live session ordered by `chunk_index` ascending.
    async fn get_ordered_chunks(&self, live_session_id: Uuid) -> Result<Vec<RecordingChunk>>;

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> Result<()>;

    async fn update_live_session_recording(&self, live_session_id: Uuid, summary: &RecordingSummary) -> Result<()>;
}

pub struct PgJobRepository {
    pool: DbPool,
}

impl PgJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, entity_id, entity_type, status, job_type, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load job {}", id))?;

        row.map(Job::try_from).transpose()
    }

    async fn update_job_status(&self, id: Uuid, status: JobStatus) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set job {} to {}", id, status))?;
        Ok(())
    }

    async fn transition_job_status(&self, id: Uuid, from: JobStatus, to: JobStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to move job {} from {} to {}", id, from, to))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_lesson_video_url(&self, lesson_id: Uuid, url: &str) -> Result<()> {
        sqlx::query("UPDATE lessons SET video_url = $1 WHERE id = $2")
            .bind(url)
            .bind(lesson_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update video url of lesson {}", lesson_id))?;
        Ok(())
    }

    async fn get_ordered_chunks(&self, live_session_id: Uuid) -> Result<Vec<RecordingChunk>> {
        let rows = sqlx::query_as::<_, RecordingChunkRow>(
            r#"
            SELECT id, live_session_id, chunk_index, object_name, file_size, duration_seconds, status
            FROM recording_chunks
            WHERE live_session_id = $1
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(live_session_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load chunks of live session {}", live_session_id))?;

        rows.into_iter().map(RecordingChunk::try_from).collect()
    }

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> Result<()> {
        sqlx::query("UPDATE recording_chunks SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set chunk {} to {}", chunk_id, status))?;
        Ok(())
    }

    async fn update_live_session_recording(&self, live_session_id: Uuid, summary: &RecordingSummary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE live_sessions
            SET recording_status = $1,
                final_video_object_name = $2,
                recording_duration = $3,
                total_chunks = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&summary.recording_status)
        .bind(&summary.final_video_object_name)
        .bind(summary.recording_duration)
        .bind(summary.total_chunks)
        .bind(live_session_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update recording of live session {}", live_session_id))?;
        Ok(())
    }
}
