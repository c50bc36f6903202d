pub mod s3;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Object storage addressed by slash-delimited keys inside one bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `key` into the local file at `dest`, creating or truncating it.
    async fn get_object_to_file(&self, key: &str, dest: &Path) -> Result<()>;

    async fn put_file(&self, key: &str, src: &Path, content_type: &str) -> Result<()>;

    async fn remove_object(&self, key: &str) -> Result<()>;
}

/// Content type used when uploading a local file.
pub fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        Some("mp4") => "video/mp4".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// Join key segments with `/`, ignoring empty segments and stray separators.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Parent "directory" of an object key, empty for top-level objects.
pub fn parent_key(key: &str) -> &str {
    match key.trim_end_matches('/').rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Upload every file under `dir` to `prefix`, keeping the relative layout.
/// Returns the uploaded keys in sorted order.
pub async fn upload_dir(store: &dyn BlobStore, dir: &Path, prefix: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .with_context(|| format!("failed to read {}", current.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();

    let mut keys = Vec::with_capacity(files.len());
    for path in files {
        let relative = path
            .strip_prefix(dir)
            .with_context(|| format!("{} escaped {}", path.display(), dir.display()))?;
        let key = join_key(prefix, &relative.to_string_lossy());

        store.put_file(&key, &path, &content_type_for(&path)).await?;
        keys.push(key);
    }

    debug!(prefix, files = keys.len(), "directory uploaded");
    Ok(keys)
}
