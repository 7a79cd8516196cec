//! Downloader (§4.4): fetches a URL to a temp path with retry/backoff,
//! hashing the exact bytes written via an in-stream tee (no "read the file
//! back" step, which would be wrong under partial writes).

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

pub struct DownloadOutcome {
    pub final_path: PathBuf,
    pub bytes_written: u64,
    pub md5_hex: String,
}

pub struct Downloader {
    client: reqwest::Client,
    max_attempts: u32,
}

impl Downloader {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn download(
        &self,
        url: &str,
        dst: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancelToken,
    ) -> CoreResult<DownloadOutcome> {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            cancel.check()?;
            match self.attempt(url, dst, progress.as_deref(), cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(Retry::No(err)) => return Err(err),
                Err(Retry::Yes(err)) => {
                    last_err = Some(err);
                    if attempt + 1 < self.max_attempts {
                        let backoff = Duration::from_secs(1 << attempt);
                        tracing::warn!(attempt, %url, "download attempt failed, retrying in {backoff:?}");
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                        }
                    }
                }
            }
        }

        Err(CoreError::DownloadFailed(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn attempt(
        &self,
        url: &str,
        dst: &Path,
        progress: Option<&(dyn Fn(u64, Option<u64>) + Send + Sync)>,
        cancel: &CancelToken,
    ) -> Result<DownloadOutcome, Retry> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| retry_for_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(retry_for_status(status));
        }

        let total = response.content_length();
        let tmp_path = tmp_path(dst);
        if let Some(parent) = tmp_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Retry::No(CoreError::Io(e)))?;
        }

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| Retry::No(CoreError::Io(e)))?;
        let mut hasher = md5::Context::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(Retry::No(CoreError::Cancelled));
            }
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(retry_for_transport(&e));
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(Retry::No(CoreError::Io(e)));
            }
            hasher.consume(&chunk);
            downloaded += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(downloaded, total);
            }
        }

        if let Err(e) = file.flush().await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Retry::No(CoreError::Io(e)));
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, dst).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Retry::No(CoreError::Io(e)));
        }

        let digest = hasher.compute();
        Ok(DownloadOutcome {
            final_path: dst.to_path_buf(),
            bytes_written: downloaded,
            md5_hex: format!("{digest:x}"),
        })
    }
}

enum Retry {
    Yes(CoreError),
    No(CoreError),
}

fn tmp_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn retry_for_status(status: reqwest::StatusCode) -> Retry {
    let code = status.as_u16();
    let msg = CoreError::DownloadFailed(format!("HTTP {code}"));
    if code == 408 || code == 429 || status.is_server_error() {
        Retry::Yes(msg)
    } else {
        Retry::No(msg)
    }
}

fn retry_for_transport(err: &reqwest::Error) -> Retry {
    let msg = CoreError::DownloadFailed(err.to_string());
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Retry::Yes(msg)
    } else {
        Retry::No(msg)
    }
}
