use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelFetchError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Resolve an ONNX model file by name, downloading into the user cache
/// on first use.
pub fn resolve(
    name: &str,
    url: &str,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelFetchError> {
    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    fs::create_dir_all(&cache_dir).map_err(ModelFetchError::CacheDir)?;
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Rollcall/models/`
/// - Linux: `$XDG_CACHE_HOME/Rollcall/models/` or `~/.cache/Rollcall/models/`
/// - Windows: `%LOCALAPPDATA%/Rollcall/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelFetchError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Rollcall").join("models"))
            .ok_or(ModelFetchError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Rollcall").join("models"))
            .ok_or(ModelFetchError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelFetchError> {
    let response = reqwest::blocking::get(url).map_err(|e| ModelFetchError::Download {
        url: url.to_string(),
        source: e,
    })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path).map_err(|e| ModelFetchError::Write {
        path: temp_path.clone(),
        source: e,
    })?;

    let bytes = response.bytes().map_err(|e| ModelFetchError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Report progress in chunks to avoid excessive callbacks
    let chunk_size = 1024 * 1024; // 1MB
    for chunk in bytes.chunks(chunk_size) {
        file.write_all(chunk).map_err(|e| ModelFetchError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        downloaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| ModelFetchError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ModelFetchError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_model_cache_dir_returns_path() {
        let dir = model_cache_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.to_string_lossy().contains("Rollcall"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[test]
    fn test_download_invalid_url_returns_error() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let _ = download("http://invalid.nonexistent.example.com/model", &dest, None);
        // Neither the dest nor the .part file should exist after failure
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
