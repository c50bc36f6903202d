use super::{MediaError, MediaProcessor};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Clone, Debug)]
pub struct FfmpegProcessor {
    binary: String,
    ffprobe_binary: String,
}

impl FfmpegProcessor {
    pub fn new(binary: impl Into<String>, ffprobe_binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), ffprobe_binary: ffprobe_binary.into() }
    }
}

/// Arguments asking ffprobe to print one line per audio stream.
fn audio_stream_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "a".into(),
        "-show_entries".into(),
        "stream=index".into(),
        "-of".into(),
        "csv=p=0".into(),
        input.to_string_lossy().into_owned(),
    ]
}

async fn execute(binary: &str, args: &[String]) -> Result<Output, MediaError> {
    debug!(binary, args = %args.join(" "), "executing media processor");

    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaError::Spawn { binary: binary.to_string(), source })?;

    if output.status.success() {
        return Ok(output);
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    error!(binary, exit_code = ?output.status.code(), output = %combined, "media processor failed");

    Err(MediaError::Failed { binary: binary.to_string(), exit_code: output.status.code(), output: combined })
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn run(&self, args: &[String]) -> Result<(), MediaError> {
        execute(&self.binary, args).await.map(|_| ())
    }

    async fn has_audio(&self, input: &Path) -> Result<bool, MediaError> {
        let output = execute(&self.ffprobe_binary, &audio_stream_args(input)).await?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }
}
