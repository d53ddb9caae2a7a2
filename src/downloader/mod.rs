//! Bounded-concurrency morphology downloads.
//!
//! [`Downloader`] turns searched records into SWC files on disk. Each
//! record is handled independently: resolve the file URL from the
//! neuron's page, fetch with retries, then stage-and-rename into place
//! so a crash or cancellation never leaves a torn file under its final
//! name. Individual failures are recorded in the outcome list; they do
//! not stop the batch.

pub(crate) mod resolve;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::ArchiveClient;
use crate::config::Config;
use crate::error::{DownloadError, Error, Result};
use crate::metadata::{file_component, path_component};
use crate::retry::fetch_with_retry;
use crate::swc;
use crate::types::{DownloadOptions, DownloadOutcome, DownloadStatus, Event, NeuronRecord};

/// Directory under the output root where morphology files land.
const DOWNLOAD_SUBDIR: &str = "downloads";

/// Fetches morphology files for batches of records.
pub struct Downloader {
    client: ArchiveClient,
    concurrency: usize,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Downloader {
    /// Creates a downloader with the worker count from `config`.
    pub fn new(client: ArchiveClient, config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self {
            client,
            concurrency: config.download_concurrency,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Routes progress events through `event_tx` instead of the
    /// downloader's own channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = event_tx;
        self
    }

    /// Ties the downloader to an external cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Subscribes to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Downloads every record into `<output_dir>/downloads/`.
    ///
    /// Returns one outcome per record, in input order. Cancellation
    /// aborts the remainder of the batch with [`Error::Cancelled`];
    /// files already renamed into place stay on disk, staged partials
    /// never carry the final name.
    pub async fn download(
        &self,
        records: &[NeuronRecord],
        output_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<Vec<DownloadOutcome>> {
        let download_root = output_dir.join(DOWNLOAD_SUBDIR);
        tokio::fs::create_dir_all(&download_root).await?;

        self.emit(Event::DownloadStarted {
            total: records.len(),
        });
        tracing::info!(
            records = records.len(),
            concurrency = self.concurrency,
            root = %download_root.display(),
            "Starting downloads"
        );

        let total = records.len();
        let completed = AtomicUsize::new(0);
        let download_root = &download_root;
        let completed = &completed;

        let mut indexed: Vec<(usize, DownloadOutcome)> = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            results = stream::iter(records.iter().enumerate())
                .map(|(index, record)| async move {
                    let outcome = self.download_one(record, download_root, options).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.emit(Event::NeuronFinished {
                        id: outcome.id,
                        name: outcome.name.clone(),
                        status: outcome.status.clone(),
                        completed: done,
                        total,
                    });
                    (index, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect::<Vec<_>>() => results,
        };

        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
    }

    async fn download_one(
        &self,
        record: &NeuronRecord,
        download_root: &Path,
        options: &DownloadOptions,
    ) -> DownloadOutcome {
        let path = target_path(record, download_root, options);

        if options.skip_existing && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(
                neuron = %record.name,
                path = %path.display(),
                "File already present, skipping"
            );
            return DownloadOutcome {
                id: record.id,
                name: record.name.clone(),
                path,
                status: DownloadStatus::SkippedExists,
            };
        }

        let status = match self.fetch_and_store(record, &path, options).await {
            Ok(()) => DownloadStatus::Success,
            Err(e) => {
                tracing::warn!(neuron = %record.name, error = %e, "Download failed");
                DownloadStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        DownloadOutcome {
            id: record.id,
            name: record.name.clone(),
            path,
            status,
        }
    }

    async fn fetch_and_store(
        &self,
        record: &NeuronRecord,
        path: &Path,
        options: &DownloadOptions,
    ) -> Result<()> {
        let retry = self.client.retry_config();

        let url = fetch_with_retry(retry, || resolve::resolve_swc_url(&self.client, &record.name))
            .await?;

        let payload = fetch_with_retry(retry, || async {
            let text = self.client.fetch_text(&url).await?;
            if text.trim().is_empty() {
                return Err(Error::from(DownloadError::EmptyPayload {
                    name: record.name.clone(),
                }));
            }
            Ok(text)
        })
        .await?;

        if options.validate_swc {
            swc::parse_and_validate(&payload)?;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // rename is atomic only when staging and target share a filesystem
        let staging = path.with_extension("swc.part");
        tokio::fs::write(&staging, &payload).await?;
        tokio::fs::rename(&staging, path).await?;

        tracing::debug!(
            neuron = %record.name,
            path = %path.display(),
            bytes = payload.len(),
            "Stored morphology"
        );
        Ok(())
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Computes where a record's file belongs: the download root, one
/// directory per `group_by` attribute value, then `<name>.swc`.
///
/// Every component comes from the archive's response, so each one is
/// scrubbed; a crafted record name must not place a file outside the
/// download root.
fn target_path(record: &NeuronRecord, download_root: &Path, options: &DownloadOptions) -> PathBuf {
    let mut path = download_root.to_path_buf();
    for field in &options.group_by {
        let value = record.attribute(field).unwrap_or("");
        path.push(path_component(value));
    }
    path.push(format!("{}.swc", file_component(&record.name)));
    path
}
