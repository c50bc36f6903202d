pub mod ffmpeg;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with {status}: {summary}", status = describe_exit(.exit_code), summary = tail(.output))]
    Failed {
        binary: String,
        exit_code: Option<i32>,
        output: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Last few lines of tool output, enough to see the actual error.
fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}

/// External media tool invoked with an explicit argument vector, no shell.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<(), MediaError>;

    /// Whether `input` carries at least one audio stream.
    async fn has_audio(&self, input: &Path) -> Result<bool, MediaError>;
}
