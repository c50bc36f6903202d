use crate::infrastructure::storage::{join_key, parent_key};
use std::path::{Path, PathBuf};

pub const FINAL_RECORDING: &str = "final/recording.mp4";
const DEFAULT_CHUNK_EXT: &str = "webm";

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `chunk-0007.webm`; the extension comes from the object name.
pub fn chunk_file_name(chunk_index: i32, object_name: &str) -> String {
    let ext = Path::new(object_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_CHUNK_EXT);
    format!("chunk-{:04}.{}", chunk_index, ext)
}

pub fn normalized_file_name(chunk_index: i32) -> String {
    format!("chunk-{:04}.mp4", chunk_index)
}

/// Re-encode one chunk to H.264/AAC so every concat input shares codecs.
pub fn normalize_args(input: &Path, output: &Path) -> Vec<String> {
    let input = path_arg(input);
    let output = path_arg(output);
    [
        "-y",
        "-i",
        input.as_str(),
        "-c:v",
        "libx264",
        "-preset",
        "medium",
        "-crf",
        "23",
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-movflags",
        "+faststart",
        output.as_str(),
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Concat demuxer list. Paths must be absolute: the demuxer resolves
/// relative entries against the list file.
pub fn concat_manifest(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| format!("file '{}'\n", path_arg(f).replace('\'', "'\\''")))
        .collect()
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    let manifest = path_arg(manifest);
    let output = path_arg(output);
    [
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        manifest.as_str(),
        "-c",
        "copy",
        "-movflags",
        "+faststart",
        output.as_str(),
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `live-recordings/<session>/chunks/x.webm` -> `live-recordings/<session>`.
pub fn session_prefix(chunk_object_name: &str) -> &str {
    parent_key(parent_key(chunk_object_name))
}

pub fn final_object_key(chunk_object_name: &str) -> String {
    join_key(session_prefix(chunk_object_name), FINAL_RECORDING)
}
