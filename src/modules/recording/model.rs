use anyhow::{Error, anyhow};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Uploaded => "UPLOADED",
            ChunkStatus::Processing => "PROCESSING",
            ChunkStatus::Completed => "COMPLETED",
            ChunkStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(ChunkStatus::Uploaded),
            "PROCESSING" => Ok(ChunkStatus::Processing),
            "COMPLETED" => Ok(ChunkStatus::Completed),
            "FAILED" => Ok(ChunkStatus::Failed),
            other => Err(anyhow!("unknown chunk status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingChunk {
    pub id: Uuid,
    pub live_session_id: Uuid,
    pub chunk_index: i32,
    pub object_name: String,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
    pub status: ChunkStatus,
}

#[derive(Debug, FromRow)]
pub struct RecordingChunkRow {
    pub id: Uuid,
    pub live_session_id: Uuid,
    pub chunk_index: i32,
    pub object_name: String,
    pub file_size: Option<i64>,
    pub duration_seconds: Option<i32>,
    pub status: String,
}

impl TryFrom<RecordingChunkRow> for RecordingChunk {
    type Error = Error;

    fn try_from(row: RecordingChunkRow) -> Result<Self, Self::Error> {
        Ok(RecordingChunk {
            id: row.id,
            live_session_id: row.live_session_id,
            chunk_index: row.chunk_index,
            object_name: row.object_name,
            file_size: row.file_size,
            duration_seconds: row.duration_seconds,
            status: row.status.parse()?,
        })
    }
}

pub const RECORDING_STATUS_COMPLETED: &str = "COMPLETED";

/// Recording fields written to the live session when a merge finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub recording_status: String,
    pub final_video_object_name: String,
    pub recording_duration: i32,
    pub total_chunks: i32,
}

impl RecordingSummary {
    /// Completed summary for `chunks`; missing durations count as zero.
    pub fn completed(final_video_object_name: String, chunks: &[RecordingChunk]) -> Self {
        let recording_duration = chunks.iter().filter_map(|c| c.duration_seconds).sum();
        Self {
            recording_status: RECORDING_STATUS_COMPLETED.to_string(),
            final_video_object_name,
            recording_duration,
            total_chunks: i32::try_from(chunks.len()).unwrap_or(i32::MAX),
        }
    }
}
