use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Why a download task ended in failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorReason {
    /// The user cancelled; not a real failure
    Cancelled,
    /// Connection or transfer error
    Network,
    /// The fetched file failed validation
    Integrity,
    /// Anything else (filesystem, unexpected response, ...)
    Other,
}

/// Asynchronous events delivered by a download service
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Transfer progress for one file of a model
    Progress {
        /// Model key
        model: String,
        /// File currently transferring
        file: String,
        /// Bytes fetched so far
        downloaded: u64,
        /// Total bytes expected (0 when unknown)
        total: u64,
        /// Progress in `[0, 100]`
        percent: f32,
    },
    /// All files for the model were fetched
    Complete {
        /// Model key
        model: String,
    },
    /// The download task failed or was cancelled
    Error {
        /// Model key
        model: String,
        /// Tagged failure classification
        reason: DownloadErrorReason,
        /// Human-readable description
        message: String,
    },
}

/// On-disk status of a model
#[derive(Debug, Clone)]
pub struct ModelStatus {
    /// Whether every expected file is present
    pub installed: bool,
    /// Total bytes of the files present
    pub bytes_on_disk: u64,
    /// Expected files not found on disk
    pub missing_files: Vec<String>,
    /// Directory the model lives in
    pub directory: PathBuf,
}

/// Operations the settings surface needs from a model download backend.
///
/// Requests are fire-and-forget: their effect is only observed through
/// [`DownloadEvent`]s arriving on the event channel. The engine mocks this
/// trait in tests (via `mockall`).
#[cfg_attr(test, mockall::automock)]
pub trait DownloadService: Send + Sync {
    /// Start downloading all files for `model`
    ///
    /// # Errors
    /// Returns error only when the request itself cannot be issued.
    fn download_model(&self, model: &str) -> Result<()>;

    /// Request cancellation of an in-flight download
    ///
    /// # Errors
    /// Returns error only when the request itself cannot be issued.
    fn cancel_download(&self, model: &str) -> Result<()>;

    /// Remove the model's files from disk
    ///
    /// # Errors
    /// Returns error when deletion fails.
    fn delete_model(&self, model: &str) -> Result<()>;

    /// Inspect what is currently on disk for `model`
    ///
    /// # Errors
    /// Returns error when the model directory cannot be inspected.
    fn check_model_status(&self, model: &str) -> Result<ModelStatus>;
}

/// Maps model keys to their remote filenames
fn model_filename(model: &str) -> String {
    format!("{model}.bin")
}

/// HTTP download backend: streams model files from a base URL into a models
/// directory, emitting [`DownloadEvent`]s on a tokio channel.
///
/// Each download runs as a spawned task writing to a `.part` temp file that
/// is atomically renamed on success. Cancellation is a per-model flag checked
/// between chunks; a cancelled task reports `Error` with the `Cancelled`
/// reason, which the tracker suppresses.
pub struct HttpDownloadService {
    client: reqwest::Client,
    base_url: String,
    models_dir: PathBuf,
    events: UnboundedSender<DownloadEvent>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

/// Emit a progress event at most once per megabyte
const EMIT_THRESHOLD: u64 = 1024 * 1024;

impl HttpDownloadService {
    /// Create a service that fetches `{base_url}/{model}.bin` into `models_dir`
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        models_dir: impl Into<PathBuf>,
        events: UnboundedSender<DownloadEvent>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            models_dir: models_dir.into(),
            events,
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    fn cancel_flag(&self, model: &str) -> Arc<AtomicBool> {
        let mut flags = self
            .cancel_flags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let flag = Arc::new(AtomicBool::new(false));
        flags.insert(model.to_owned(), Arc::clone(&flag));
        flag
    }

    fn model_path(&self, model: &str) -> PathBuf {
        self.models_dir.join(model_filename(model))
    }

    async fn run_download(
        client: reqwest::Client,
        url: String,
        model_path: PathBuf,
        model: String,
        cancelled: Arc<AtomicBool>,
        events: UnboundedSender<DownloadEvent>,
    ) {
        let result = Self::fetch_file(&client, &url, &model_path, &model, &cancelled, &events).await;

        let event = match result {
            Ok(()) => DownloadEvent::Complete { model },
            Err(err) if cancelled.load(Ordering::SeqCst) => DownloadEvent::Error {
                model,
                reason: DownloadErrorReason::Cancelled,
                message: err.to_string(),
            },
            Err(err) => {
                let reason = if err.downcast_ref::<reqwest::Error>().is_some() {
                    DownloadErrorReason::Network
                } else {
                    DownloadErrorReason::Other
                };
                DownloadEvent::Error {
                    model,
                    reason,
                    message: format!("{err:#}"),
                }
            }
        };
        let _ = events.send(event);
    }

    async fn fetch_file(
        client: &reqwest::Client,
        url: &str,
        model_path: &Path,
        model: &str,
        cancelled: &AtomicBool,
        events: &UnboundedSender<DownloadEvent>,
    ) -> Result<()> {
        if let Some(parent) = model_path.parent() {
            fs::create_dir_all(parent).context("failed to create models directory")?;
        }

        info!(model = model, url = url, "starting download");

        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("download failed with status {}: {url}", response.status());
        }

        let total = response.content_length().unwrap_or(0);
        let file_label = model_filename(model);

        // Download to a temp file first so a partial transfer never looks
        // like an installed model
        let temp_path = model_path.with_extension("part");
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;

        let mut downloaded: u64 = 0;
        let mut last_emit: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancelled.load(Ordering::SeqCst) {
                drop(file);
                let _ = fs::remove_file(&temp_path);
                anyhow::bail!("download cancelled");
            }

            let chunk = chunk.context("error while reading download stream")?;
            file.write_all(&chunk).context("failed to write chunk")?;
            downloaded += chunk.len() as u64;

            if downloaded - last_emit >= EMIT_THRESHOLD || downloaded == total {
                last_emit = downloaded;
                let _ = events.send(DownloadEvent::Progress {
                    model: model.to_owned(),
                    file: file_label.clone(),
                    downloaded,
                    total,
                    percent: percent_of(downloaded, total),
                });
            }
        }

        drop(file);
        fs::rename(&temp_path, model_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                model_path.display()
            )
        })?;

        info!(
            model = model,
            path = %model_path.display(),
            size = downloaded,
            "download finished"
        );
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(downloaded: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((downloaded as f64 / total as f64) * 100.0).min(100.0) as f32
}

impl DownloadService for HttpDownloadService {
    fn download_model(&self, model: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, model_filename(model));
        let cancelled = self.cancel_flag(model);

        tokio::spawn(Self::run_download(
            self.client.clone(),
            url,
            self.model_path(model),
            model.to_owned(),
            cancelled,
            self.events.clone(),
        ));
        Ok(())
    }

    fn cancel_download(&self, model: &str) -> Result<()> {
        let flags = self
            .cancel_flags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(flag) = flags.get(model) {
            flag.store(true, Ordering::SeqCst);
            debug!(model = model, "cancel requested");
        } else {
            debug!(model = model, "cancel for unknown download, ignoring");
        }
        Ok(())
    }

    fn delete_model(&self, model: &str) -> Result<()> {
        let path = self.model_path(model);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            info!(model = model, path = %path.display(), "model deleted");
        } else {
            warn!(model = model, "delete requested for missing model file");
        }
        Ok(())
    }

    fn check_model_status(&self, model: &str) -> Result<ModelStatus> {
        let filename = model_filename(model);
        let path = self.models_dir.join(&filename);

        if path.exists() {
            let metadata = fs::metadata(&path)
                .with_context(|| format!("failed to stat {}", path.display()))?;
            Ok(ModelStatus {
                installed: metadata.len() > 0,
                bytes_on_disk: metadata.len(),
                missing_files: Vec::new(),
                directory: self.models_dir.clone(),
            })
        } else {
            Ok(ModelStatus {
                installed: false,
                bytes_on_disk: 0,
                missing_files: vec![filename],
                directory: self.models_dir.clone(),
            })
        }
    }
}
