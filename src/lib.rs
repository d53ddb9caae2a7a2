//! # neuromorpho-dl
//!
//! Async client for the NeuroMorpho.org neuron morphology archive:
//! declarative queries, paginated search aggregation, and bulk SWC
//! downloads with a metadata export.
//!
//! ## Design Philosophy
//!
//! neuromorpho-dl is designed to be:
//! - **Declarative** - Queries are data, loadable from YAML or JSON and
//!   validated against the archive's vocabulary before anything downloads
//! - **Bounded** - Page fetches and file downloads run concurrently under
//!   independent, configurable limits
//! - **Failure-isolating** - One record failing never aborts a batch;
//!   every record ends with a recorded outcome
//! - **Event-driven** - Consumers subscribe to progress events, no
//!   polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use neuromorpho_dl::{Config, DownloadOptions, Pipeline, Query};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let query = Query::builder()
//!         .filter("species", ["mouse"])?
//!         .filter("cell_type", ["pyramidal"])?
//!         .build();
//!
//!     let pipeline = Pipeline::new(Config::default())?;
//!
//!     // Subscribe to progress events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline
//!         .search_and_download(&query, Path::new("neurons"), &DownloadOptions::default())
//!         .await?;
//!     println!("{} downloaded, {} failed", summary.succeeded, summary.failed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Typed HTTP access to the archive's REST endpoints
pub mod client;
/// Configuration types
pub mod config;
/// Bounded-concurrency morphology downloads
pub mod downloader;
/// Error types
pub mod error;
/// Logging setup for the command-line binary
pub mod logging;
/// Metadata value cleaning and CSV export
pub mod metadata;
/// End-to-end run orchestration
pub mod pipeline;
/// Declarative query construction and validation
pub mod query;
/// Retry logic with exponential backoff
pub mod retry;
/// Paginated search aggregation
pub mod search;
/// SWC morphology parsing and structural checks
pub mod swc;
/// Core types and events
pub mod types;
/// Queryable fields and their accepted values
pub mod vocabulary;

// Re-export commonly used types
pub use client::ArchiveClient;
pub use config::{Config, RetryConfig};
pub use downloader::Downloader;
pub use error::{DownloadError, Error, QueryViolation, Result, SwcError};
pub use pipeline::{Pipeline, SearchPreview};
pub use query::{Query, QueryBuilder, SortSpec};
pub use search::SearchAggregator;
pub use types::{
    DownloadOptions, DownloadOutcome, DownloadStatus, Event, NeuronId, NeuronRecord, RunSummary,
};
pub use vocabulary::FieldVocabulary;

/// Cancels `token` when the process receives a termination signal.
///
/// Spawn this alongside a pipeline run to make Ctrl+C stop the run at
/// the next suspension point instead of killing the process mid-write.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use neuromorpho_dl::{Config, Pipeline, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///     tokio::spawn(cancel_on_signal(pipeline.cancellation_token()));
///
///     // Run the pipeline; a signal cancels it cleanly.
///
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
