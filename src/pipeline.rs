//! End-to-end run orchestration.
//!
//! [`Pipeline`] wires the pieces together in their fixed order: local
//! field-name validation, the archive health gate, value vocabulary
//! checks, paginated search, the download batch, and finally the
//! metadata export. Each stage only runs when the previous one
//! succeeded; per-record download failures are data, not errors, and
//! reach the [`RunSummary`] instead of aborting the run.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::ArchiveClient;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::metadata;
use crate::query::Query;
use crate::retry::fetch_with_retry;
use crate::search::SearchAggregator;
use crate::types::{DownloadOptions, DownloadOutcome, Event, NeuronRecord, RunSummary};
use crate::vocabulary::FieldVocabulary;

/// Expected status string from the archive's health endpoint.
const HEALTHY: &str = "UP";

/// Result size preview, fetched without paging the whole result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchPreview {
    /// Total matching records reported by the archive.
    pub total: u64,
    /// Names from the first few matching records.
    pub sample: Vec<String>,
}

/// Composes search and download into one cancellable run.
pub struct Pipeline {
    config: Config,
    client: ArchiveClient,
    vocabulary: FieldVocabulary,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Validates `config` and builds the shared HTTP client.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ArchiveClient::new(&config)?;
        let vocabulary = FieldVocabulary::new(client.clone());
        let (event_tx, _) = broadcast::channel(1000);
        Ok(Self {
            config,
            client,
            vocabulary,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribes to progress events from every stage of the run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the run when triggered, for wiring to a
    /// signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The underlying archive client, for direct endpoint access.
    pub fn client(&self) -> &ArchiveClient {
        &self.client
    }

    /// Confirms the archive reports itself healthy.
    pub async fn check_health(&self) -> Result<()> {
        let status = fetch_with_retry(self.client.retry_config(), || self.client.health()).await?;
        if status != HEALTHY {
            return Err(Error::ArchiveDown { status });
        }
        tracing::debug!("Archive health check passed");
        Ok(())
    }

    /// Reports how many records `query` matches, with a few sample
    /// names, without fetching the full result set.
    ///
    /// Field names are validated; value vocabularies are not consulted.
    pub async fn preview(&self, query: &Query) -> Result<SearchPreview> {
        query.validate_fields()?;
        self.check_health().await?;

        let q = query.to_query_string();
        let page = fetch_with_retry(self.client.retry_config(), || {
            self.client.select_page(q.as_deref(), 0, 3)
        })
        .await
        .map_err(|e| Error::SearchFailed {
            page: 0,
            source: Box::new(e),
        })?;

        let sample = page.records.iter().map(|r| r.name.clone()).collect();
        Ok(SearchPreview {
            total: page.total,
            sample,
        })
    }

    /// Validates `query`, gates on archive health, and aggregates the
    /// full matching record set.
    ///
    /// Value vocabularies are fetched on demand for each filtered
    /// field. A field whose vocabulary cannot be retrieved is checked
    /// by name only; the degradation is logged, not fatal.
    pub async fn search(&self, query: &Query) -> Result<Vec<NeuronRecord>> {
        query.validate_fields()?;
        self.check_health().await?;

        for field in query.filters.keys() {
            match self.vocabulary.ensure(field).await {
                Ok(()) => {}
                Err(Error::VocabularyUnavailable { field, reason }) => {
                    tracing::warn!(
                        field,
                        reason,
                        "Value vocabulary unavailable, checking this field by name only"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        query.validate(&self.vocabulary)?;

        let aggregator = SearchAggregator::new(self.client.clone(), &self.config)
            .with_events(self.event_tx.clone())
            .with_cancellation(self.cancel.clone());
        aggregator.run(query).await
    }

    /// Runs the whole pipeline: search, download, metadata export.
    ///
    /// Always writes the metadata file, even when the search matched
    /// nothing, so a run leaves a complete record of what it saw.
    pub async fn search_and_download(
        &self,
        query: &Query,
        output_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<RunSummary> {
        let records = self.search(query).await?;

        let outcomes = if records.is_empty() {
            tracing::info!("No records matched, nothing to download");
            Vec::new()
        } else {
            let downloader = Downloader::new(self.client.clone(), &self.config)
                .with_events(self.event_tx.clone())
                .with_cancellation(self.cancel.clone());
            downloader.download(&records, output_dir, options).await?
        };

        let metadata_path = self
            .write_metadata(&records, &outcomes, output_dir, options)
            .await?;

        let mut summary = RunSummary::from_outcomes(&outcomes);
        summary.metadata_path = Some(metadata_path);
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Run complete"
        );
        Ok(summary)
    }

    async fn write_metadata(
        &self,
        records: &[NeuronRecord],
        outcomes: &[DownloadOutcome],
        output_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf> {
        let csv = metadata::render_csv(records, outcomes);
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(&options.metadata_filename);
        tokio::fs::write(&path, csv).await?;

        self.event_tx
            .send(Event::MetadataWritten {
                path: path.clone(),
                rows: records.len(),
            })
            .ok();
        tracing::info!(path = %path.display(), rows = records.len(), "Wrote metadata export");
        Ok(path)
    }
}
