use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("failed to create model directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine model directory")]
    NoCacheDir,
}

/// Download progress: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type DownloadProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

const READ_CHUNK: usize = 1024 * 1024;

/// On-disk location of speech models, downloading them on first use.
#[derive(Clone, Debug)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform cache directory, e.g. `~/.cache/voxscribe/models/` on Linux.
    pub fn default_location() -> Result<Self, ModelStoreError> {
        dirs::cache_dir()
            .map(|d| Self::new(d.join("voxscribe").join("models")))
            .ok_or(ModelStoreError::NoCacheDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `name` in the store, downloading it from `url` if absent.
    pub fn resolve(
        &self,
        name: &str,
        url: &str,
        progress: DownloadProgressFn<'_>,
    ) -> Result<PathBuf, ModelStoreError> {
        let path = self.dir.join(name);
        if path.exists() {
            return Ok(path);
        }

        fs::create_dir_all(&self.dir).map_err(ModelStoreError::CacheDir)?;
        log::info!("Downloading model {name} from {url}");
        download(url, &path, progress)?;
        Ok(path)
    }
}

fn download(url: &str, dest: &Path, progress: DownloadProgressFn<'_>) -> Result<(), ModelStoreError> {
    let mut response = reqwest::blocking::get(url).map_err(|e| ModelStoreError::Download {
        url: url.to_string(),
        source: e,
    })?;
    if !response.status().is_success() {
        return Err(ModelStoreError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total = response.content_length().unwrap_or(0);

    // Stream into a sibling temp file so a failed download never leaves a
    // truncated model behind.
    let temp_path = dest.with_extension("part");
    let mut file = fs::File::create(&temp_path).map_err(write_error(&temp_path))?;

    let mut buf = vec![0u8; READ_CHUNK];
    let mut downloaded: u64 = 0;
    loop {
        let n = match response.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&temp_path);
                return Err(ModelStoreError::Write {
                    path: temp_path,
                    source: e,
                });
            }
        };
        file.write_all(&buf[..n]).map_err(write_error(&temp_path))?;
        downloaded += n as u64;
        progress(downloaded, total);
    }

    file.flush().map_err(write_error(&temp_path))?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(write_error(dest))?;
    Ok(())
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ModelStoreError {
    let path = path.to_path_buf();
    move |source| ModelStoreError::Write { path, source }
}
