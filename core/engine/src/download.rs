//! Download and verification pipeline.
//!
//! An asset is streamed to `<home>/downloads/<file>.part`, verified, and only
//! then renamed to the staging path handed to the platform extractor.
//!
//! ## Retry policy
//!
//! - Connection errors, timeouts, `408`, `429`, `5xx` and bodies shorter than
//!   announced are retried with exponential backoff (1s, 2s, 4s, ... with
//!   +/- 25% jitter) up to the configured number of attempts.
//! - Retries resume the partial file with a `Range` request. A `206` answer is
//!   appended, a `200` answer restarts the file, a `416` answer truncates it.
//! - `404` and other client errors fail immediately.
//!
//! Integrity failures are never retried: the partial file is deleted and the
//! error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;

use crate::catalog::{Integrity, ReleaseAsset};
use crate::error::{EngineError, Result};
use crate::settings::Settings;
use crate::transport::{Transport, TransportError};
use crate::verify::{TrustedKeys, sha256_digest, verify_checksum};

/// Progress event emitted during downloads.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An attempt has started.
    Started {
        /// The URL being downloaded.
        url: String,
        /// Total file size in bytes, `0` when unknown.
        total: u64,
    },
    /// Download progress update.
    Progress {
        /// Bytes on disk so far, including resumed bytes.
        downloaded: u64,
        /// Current download speed in bytes per second.
        speed: u64,
    },
    /// A transient failure occurred and another attempt follows.
    Retrying {
        /// The attempt about to start, starting at 2.
        attempt: u32,
        /// The attempt ceiling.
        max_attempts: u32,
        /// Backoff before the attempt.
        delay_ms: u64,
    },
    /// Download completed and verified.
    Completed,
    /// Download failed with an error.
    Failed {
        /// Error description.
        error: String,
    },
}

/// Callback type for receiving progress updates during downloads.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Base delay between retries in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Minimum interval between progress callback invocations in milliseconds.
const PROGRESS_CALLBACK_INTERVAL_MS: u128 = 100;

/// Outcome of a single failed attempt.
enum AttemptError {
    /// Worth another attempt.
    Transient(String),
    /// The server will not serve this resource.
    Permanent(String),
    /// A local failure; retrying would not help.
    Fatal(EngineError),
}

impl From<TransportError> for AttemptError {
    fn from(error: TransportError) -> Self {
        if error.is_transient() {
            Self::Transient(error.describe())
        } else {
            Self::Permanent(error.describe())
        }
    }
}

/// Streams release assets to disk and verifies them.
pub struct Downloader<T> {
    transport: Arc<T>,
    trusted_keys: TrustedKeys,
    max_attempts: u32,
    disk_space_multiplier: u64,
    extraction_dir: Option<PathBuf>,
    retry_base_delay_ms: u64,
    progress: Option<ProgressCallback>,
}

impl<T> std::fmt::Debug for Downloader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("max_attempts", &self.max_attempts)
            .field("disk_space_multiplier", &self.disk_space_multiplier)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Downloader<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, settings: &Settings, trusted_keys: TrustedKeys) -> Self {
        Self {
            transport,
            trusted_keys,
            max_attempts: settings.max_download_attempts.max(1),
            disk_space_multiplier: settings.disk_space_multiplier.max(1),
            extraction_dir: None,
            retry_base_delay_ms: BASE_RETRY_DELAY_MS,
            progress: None,
        }
    }

    /// Reports progress through `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Also requires room for the extracted toolchain in `dir`, which may be
    /// on another filesystem than the downloads.
    #[must_use]
    pub fn with_extraction_dir(mut self, dir: PathBuf) -> Self {
        self.extraction_dir = Some(dir);
        self
    }

    /// Overrides the first backoff delay.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Downloads `asset` to `temp_path`, verifies it and renames it to
    /// `staging_path`.
    ///
    /// A partial `temp_path` left by an earlier run is resumed.
    ///
    /// # Errors
    ///
    /// - `InsufficientDiskSpace` if the download and its extraction cannot fit;
    /// - `DownloadFailed` once the attempts are exhausted or the server refuses
    ///   the request;
    /// - `ChecksumMismatch` or `SignatureInvalid` if verification fails, in
    ///   which case `temp_path` is deleted;
    /// - `Io` for local filesystem failures.
    pub async fn fetch_and_verify(
        &self,
        asset: &ReleaseAsset,
        temp_path: &Path,
        staging_path: &Path,
    ) -> Result<PathBuf> {
        let result = self.fetch(asset, temp_path).await;
        let result = match result {
            Ok(()) => self.verify(asset, temp_path).await.inspect_err(|_| {
                let _ = std::fs::remove_file(temp_path);
            }),
            Err(e) => Err(e),
        };
        let result = match result {
            Ok(()) => promote(temp_path, staging_path).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => self.emit(ProgressEvent::Completed),
            Err(e) => self.emit(ProgressEvent::Failed {
                error: e.to_string(),
            }),
        }
        result.map(|()| staging_path.to_path_buf())
    }

    async fn fetch(&self, asset: &ReleaseAsset, temp_path: &Path) -> Result<()> {
        let download_dir = temp_path.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(download_dir).await.map_err(|e| {
            EngineError::io(
                format!("Failed to create directory: {}", download_dir.display()),
                e,
            )
        })?;

        let mut space_checked = false;
        if let Some(size) = asset.size {
            self.check_disk_space(download_dir, size)?;
            space_checked = true;
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay_ms = calculate_retry_delay(self.retry_base_delay_ms, attempt - 2);
                tracing::info!(
                    "retrying download of {} (attempt {attempt}/{}): {last_error}",
                    asset.url,
                    self.max_attempts
                );
                self.emit(ProgressEvent::Retrying {
                    attempt,
                    max_attempts: self.max_attempts,
                    delay_ms,
                });
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self
                .attempt(asset, temp_path, download_dir, &mut space_checked)
                .await
            {
                Ok(()) => return Ok(()),
                Err(AttemptError::Transient(message)) => last_error = message,
                Err(AttemptError::Permanent(message)) => {
                    let _ = tokio::fs::remove_file(temp_path).await;
                    return Err(EngineError::DownloadFailed {
                        url: asset.url.clone(),
                        attempts: attempt,
                        message,
                    });
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }

        Err(EngineError::DownloadFailed {
            url: asset.url.clone(),
            attempts: self.max_attempts,
            message: last_error,
        })
    }

    async fn attempt(
        &self,
        asset: &ReleaseAsset,
        temp_path: &Path,
        download_dir: &Path,
        space_checked: &mut bool,
    ) -> std::result::Result<(), AttemptError> {
        let offset = tokio::fs::metadata(temp_path)
            .await
            .map_or(0, |m| m.len());

        let stream = match self.transport.open(&asset.url, offset).await {
            Ok(stream) => stream,
            Err(e @ TransportError::RangeNotSatisfiable { .. }) => {
                tracing::debug!("server rejected resume at byte {offset}; restarting");
                let _ = tokio::fs::remove_file(temp_path).await;
                return Err(AttemptError::Transient(e.describe()));
            }
            Err(e) => return Err(e.into()),
        };

        let start = if stream.resumed { offset } else { 0 };
        if offset > 0 && !stream.resumed {
            tracing::debug!("server ignored resume request; restarting {}", asset.url);
        }
        let expected = stream.content_length.map(|len| start + len).or(asset.size);

        if !*space_checked && let Some(total) = expected {
            self.check_disk_space(download_dir, total)
                .map_err(AttemptError::Fatal)?;
            *space_checked = true;
        }

        self.emit(ProgressEvent::Started {
            url: asset.url.clone(),
            total: expected.unwrap_or(0),
        });

        let mut file = if stream.resumed {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(temp_path)
                .await
        } else {
            tokio::fs::File::create(temp_path).await
        }
        .map_err(|e| {
            AttemptError::Fatal(EngineError::io(
                format!("Failed to create file: {}", temp_path.display()),
                e,
            ))
        })?;

        let mut body = stream.body;
        let mut downloaded = start;
        let mut received: u64 = 0;
        let start_time = Instant::now();
        let mut last_callback_time = Instant::now();
        let mut broken = None;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    broken = Some(e.describe());
                    break;
                }
            };
            file.write_all(&chunk).await.map_err(|e| {
                AttemptError::Fatal(EngineError::io(
                    format!("Failed to write to {}", temp_path.display()),
                    e,
                ))
            })?;
            downloaded += chunk.len() as u64;
            received += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_callback_time).as_millis() >= PROGRESS_CALLBACK_INTERVAL_MS {
                self.emit(ProgressEvent::Progress {
                    downloaded,
                    speed: speed(received, start_time),
                });
                last_callback_time = now;
            }
        }

        file.flush().await.map_err(|e| {
            AttemptError::Fatal(EngineError::io(
                format!("Failed to flush {}", temp_path.display()),
                e,
            ))
        })?;
        self.emit(ProgressEvent::Progress {
            downloaded,
            speed: speed(received, start_time),
        });

        if let Some(message) = broken {
            return Err(AttemptError::Transient(message));
        }
        match expected {
            Some(total) if downloaded < total => Err(AttemptError::Transient(format!(
                "connection closed after {downloaded} of {total} bytes"
            ))),
            Some(total) if downloaded > total => {
                let _ = tokio::fs::remove_file(temp_path).await;
                Err(AttemptError::Transient(format!(
                    "received {downloaded} bytes but {total} were announced"
                )))
            }
            _ => Ok(()),
        }
    }

    /// The download directory must hold the archive and its extraction; the
    /// extraction directory, when set, the extracted contents.
    fn check_disk_space(&self, download_dir: &Path, size: u64) -> Result<()> {
        let mut targets = vec![(
            download_dir.to_path_buf(),
            size.saturating_mul(self.disk_space_multiplier),
        )];
        if let Some(dir) = &self.extraction_dir {
            let extracted = self.disk_space_multiplier.saturating_sub(1).max(1);
            targets.push((dir.clone(), size.saturating_mul(extracted)));
        }
        ensure_space(&targets, |dir| fs4::available_space(dir))
    }

    async fn verify(&self, asset: &ReleaseAsset, temp_path: &Path) -> Result<()> {
        match &asset.integrity {
            Integrity::Signature { url, sha256 } => {
                let signature = self
                    .transport
                    .get_bytes(url)
                    .await
                    .map_err(|e| EngineError::network(url, e.describe()))?;
                let digest = sha256_digest(temp_path)?;
                if let Some(expected) = sha256 {
                    let actual = hex::encode(digest);
                    if !actual.eq_ignore_ascii_case(expected.trim()) {
                        return Err(EngineError::checksum_mismatch(
                            temp_path,
                            expected.trim().to_lowercase(),
                            actual,
                        ));
                    }
                }
                self.trusted_keys
                    .verify_digest(temp_path, &digest, &signature)?;
                tracing::debug!("signature verified for {}", asset.file_name);
            }
            Integrity::Checksum { sha256 } => {
                verify_checksum(temp_path, sha256)?;
                tracing::debug!("checksum verified for {}", asset.file_name);
            }
            Integrity::PackageSignature => {
                tracing::debug!(
                    "{} is verified by the platform installer",
                    asset.file_name
                );
            }
        }
        Ok(())
    }
}

async fn promote(temp_path: &Path, staging_path: &Path) -> Result<()> {
    if let Some(parent) = staging_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            EngineError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }
    tokio::fs::rename(temp_path, staging_path)
        .await
        .map_err(|e| {
            EngineError::io(
                format!(
                    "Failed to rename {} to {}",
                    temp_path.display(),
                    staging_path.display()
                ),
                e,
            )
        })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn speed(bytes: u64, since: Instant) -> u64 {
    let elapsed_secs = since.elapsed().as_secs_f64();
    if elapsed_secs > 0.0 {
        (bytes as f64 / elapsed_secs) as u64
    } else {
        0
    }
}

fn ensure_space(
    targets: &[(PathBuf, u64)],
    available_space: impl Fn(&Path) -> std::io::Result<u64>,
) -> Result<()> {
    for (dir, required) in targets {
        let dir = dir.ancestors().find(|d| d.exists()).unwrap_or(dir);
        let available = available_space(dir).map_err(|e| {
            EngineError::io(
                format!("Failed to query free space: {}", dir.display()),
                e,
            )
        })?;
        if available < *required {
            return Err(EngineError::InsufficientDiskSpace {
                path: dir.to_path_buf(),
                required: *required,
                available,
            });
        }
    }
    Ok(())
}

/// Calculates the retry delay with exponential backoff and jitter.
///
/// The delay doubles with each retry (1s, 2s, 4s for the default base) with
/// +/- 25% jitter, up to a minute before jitter.
fn calculate_retry_delay(base_delay_ms: u64, retry: u32) -> u64 {
    let base_delay = base_delay_ms
        .saturating_mul(2u64.saturating_pow(retry))
        .min(MAX_RETRY_DELAY_MS);
    let jitter_range = base_delay / 4;
    let jitter = rand::rng().random_range(0..=jitter_range.saturating_mul(2));
    base_delay.saturating_sub(jitter_range).saturating_add(jitter)
}
