//! Core types shared across the search and download pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unique identifier for a neuron reconstruction in the archive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeuronId(pub i64);

impl NeuronId {
    /// Create a new NeuronId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for NeuronId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<NeuronId> for i64 {
    fn from(id: NeuronId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for NeuronId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<NeuronId> for i64 {
    fn eq(&self, other: &NeuronId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for NeuronId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NeuronId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One neuron row from the archive's search results.
///
/// `metadata` holds every descriptive attribute the archive returned,
/// flattened to strings and keyed by the archive's field names. A
/// `BTreeMap` keeps attribute order deterministic for exports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronRecord {
    /// Archive identifier for the reconstruction
    pub id: NeuronId,
    /// Neuron name, unique in the archive and used for file names
    pub name: String,
    /// Descriptive attributes (species, brain region, cell type, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NeuronRecord {
    /// Looks up a metadata attribute by archive field name.
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).map(String::as_str)
    }
}

/// Terminal state of one morphology download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DownloadStatus {
    /// The file was fetched and written.
    Success,
    /// The target file already existed and was left untouched.
    SkippedExists,
    /// The download failed; the reason is carried for reporting.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

impl DownloadStatus {
    /// Short label used in exports and progress output.
    pub fn label(&self) -> &'static str {
        match self {
            DownloadStatus::Success => "success",
            DownloadStatus::SkippedExists => "skipped-exists",
            DownloadStatus::Failed { .. } => "failed",
        }
    }

    /// True for the failure state.
    pub fn is_failure(&self) -> bool {
        matches!(self, DownloadStatus::Failed { .. })
    }
}

/// Result of one download attempt. The downloader returns one outcome per
/// input record, in input order, regardless of individual failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Identifier of the record this outcome belongs to
    pub id: NeuronId,
    /// Neuron name, kept so failures are individually identifiable
    pub name: String,
    /// Path the morphology file was (or would have been) written to
    pub path: PathBuf,
    /// Terminal state of the attempt
    pub status: DownloadStatus,
}

/// Options controlling how a batch of morphologies is written to disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Metadata fields whose values become nested directories under the
    /// download root, in order (default: none)
    #[serde(default)]
    pub group_by: Vec<String>,

    /// File name for the metadata export inside the output directory
    /// (default: "metadata.csv")
    #[serde(default = "default_metadata_filename")]
    pub metadata_filename: String,

    /// Leave already-present files untouched instead of refetching
    /// (default: true)
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    /// Run structural SWC checks on each fetched payload and mark records
    /// whose payload fails as failed (default: false)
    #[serde(default)]
    pub validate_swc: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            group_by: Vec::new(),
            metadata_filename: default_metadata_filename(),
            skip_existing: true,
            validate_swc: false,
        }
    }
}

/// Progress events emitted while a search or download runs.
///
/// Events are a lossy side-channel for progress display. Dropping a
/// receiver or never subscribing does not affect the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The first result page answered and the result size is known.
    SearchStarted {
        /// Total matching records reported by the archive
        total: u64,
        /// Number of result pages that will be fetched
        pages: u32,
    },

    /// One result page was fetched and parsed.
    PageFetched {
        /// Zero-based page index
        page: u32,
        /// Records carried by that page
        records: usize,
    },

    /// Aggregation finished.
    SearchCompleted {
        /// Records collected after de-duplication
        records: usize,
    },

    /// A download batch started.
    DownloadStarted {
        /// Number of records in the batch
        total: usize,
    },

    /// One record reached a terminal state.
    NeuronFinished {
        /// Identifier of the record
        id: NeuronId,
        /// Neuron name
        name: String,
        /// Terminal state
        status: DownloadStatus,
        /// Records finished so far, including this one
        completed: usize,
        /// Number of records in the batch
        total: usize,
    },

    /// The metadata export was written.
    MetadataWritten {
        /// Path of the export file
        path: PathBuf,
        /// Data rows written (excludes the header)
        rows: usize,
    },
}

/// Counts and failure details for one completed pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records that entered the download phase
    pub total: usize,
    /// Files fetched and written
    pub succeeded: usize,
    /// Files left untouched because they already existed
    pub skipped: usize,
    /// Records whose download failed
    pub failed: usize,
    /// Names of the failed records, in input order
    pub failed_names: Vec<String>,
    /// Path of the metadata export, when one was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
}

impl RunSummary {
    /// Tallies a batch of outcomes.
    pub fn from_outcomes(outcomes: &[DownloadOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            failed_names: Vec::new(),
            metadata_path: None,
        };
        for outcome in outcomes {
            match &outcome.status {
                DownloadStatus::Success => summary.succeeded += 1,
                DownloadStatus::SkippedExists => summary.skipped += 1,
                DownloadStatus::Failed { .. } => {
                    summary.failed += 1;
                    summary.failed_names.push(outcome.name.clone());
                }
            }
        }
        summary
    }
}

// Default value functions

fn default_metadata_filename() -> String {
    "metadata.csv".to_string()
}

fn default_true() -> bool {
    true
}
