//! Error types for the archive client and download pipeline.
//!
//! Covers query construction and validation, archive API calls, result page
//! aggregation, morphology downloads, and SWC structural checks. Per-record
//! download failures are recorded in outcome lists rather than raised; the
//! variants here surface when an operation as a whole cannot proceed.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value was rejected before any network activity.
    #[error("invalid configuration for `{key}`: {message}")]
    Config {
        /// Name of the offending configuration key.
        key: &'static str,
        /// Human-readable description of the problem.
        message: String,
    },

    /// A field name is not part of the archive's queryable vocabulary.
    #[error("unknown query field {field:?}")]
    InvalidField {
        /// The rejected field name.
        field: String,
    },

    /// Query validation found one or more violations. Validation inspects the
    /// whole query before returning, so `violations` is always complete.
    #[error("query validation failed: {}", format_violations(.violations))]
    InvalidQuery {
        /// Every violation found, in query order.
        violations: Vec<QueryViolation>,
    },

    /// A query file could not be parsed into the expected shape.
    #[error("malformed query file {}: {reason}", .path.display())]
    MalformedQuery {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Parser message describing the structural problem.
        reason: String,
    },

    /// A result page could not be retrieved even after retries. Aggregation
    /// aborts rather than return a silently incomplete result set.
    #[error("search failed on result page {page}: {source}")]
    SearchFailed {
        /// Zero-based index of the page that failed.
        page: u32,
        /// The underlying failure for that page.
        #[source]
        source: Box<Error>,
    },

    /// The accepted-value list for a field could not be retrieved.
    #[error("value vocabulary unavailable for field {field:?}: {reason}")]
    VocabularyUnavailable {
        /// Field whose values could not be fetched.
        field: String,
        /// Why the fetch failed.
        reason: String,
    },

    /// The archive's health endpoint reported it is not serving requests.
    #[error("the archive is currently down (reported status {status:?})")]
    ArchiveDown {
        /// Status string returned by the health endpoint.
        status: String,
    },

    /// The archive answered with a non-success HTTP status.
    #[error("archive returned HTTP {status}: {message}")]
    RemoteStatus {
        /// The HTTP status code.
        status: u16,
        /// The archive's documented meaning for that status.
        message: String,
    },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A URL could not be parsed or joined.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A JSON payload could not be serialized or deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML payload could not be serialized or deserialized.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single morphology could not be retrieved or stored.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// An SWC payload failed structural checks.
    #[error(transparent)]
    Swc(#[from] SwcError),

    /// The operation was interrupted by cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

/// A single defect found while validating a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryViolation {
    /// The field is not one of the archive's queryable fields.
    #[error("unknown field {field:?}")]
    InvalidField {
        /// The rejected field name.
        field: String,
    },

    /// The value is not in the accepted set for its field.
    #[error("field {field:?} does not accept value {value:?}")]
    InvalidValue {
        /// Field the value was given for.
        field: String,
        /// The rejected value.
        value: String,
    },
}

/// Failure modes for a single morphology download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The neuron's archive page has no standardized morphology link.
    #[error("no standardized morphology link found for neuron {name:?}")]
    MorphologyLinkMissing {
        /// Neuron name whose page was scanned.
        name: String,
    },

    /// The archive served an empty payload for the morphology file.
    #[error("empty morphology payload for neuron {name:?}")]
    EmptyPayload {
        /// Neuron name whose file was fetched.
        name: String,
    },
}

/// Structural defects in an SWC payload.
#[derive(Debug, Error)]
pub enum SwcError {
    /// A data line does not have the seven SWC columns.
    #[error("SWC line {line}: expected 7 columns, found {found}")]
    ColumnCount {
        /// One-based line number in the payload.
        line: usize,
        /// Number of whitespace-separated columns found.
        found: usize,
    },

    /// A column failed numeric parsing.
    #[error("SWC line {line}: invalid {column} value {value:?}")]
    InvalidNumber {
        /// One-based line number in the payload.
        line: usize,
        /// Which of the seven columns was malformed.
        column: &'static str,
        /// The text that failed to parse.
        value: String,
    },

    /// No sample carries the root parent marker (-1).
    #[error("SWC payload has no root sample with parent -1")]
    MissingRoot,
}

impl Error {
    /// Builds a [`Error::RemoteStatus`] carrying the archive's documented
    /// meaning for `status`. Statuses without documented meanings get a
    /// generic message.
    pub(crate) fn remote_status(status: u16) -> Self {
        let message = match status {
            400 => "bad request, usually wrong parameters to select queries",
            404 => "resource not found or does not exist",
            405 => "unsupported HTTP method used",
            500 => "internal server error, please notify nmoadmin@gmu.edu",
            _ => "unexpected response status",
        };
        Error::RemoteStatus {
            status,
            message: message.to_string(),
        }
    }
}

fn format_violations(violations: &[QueryViolation]) -> String {
    let parts: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    parts.join("; ")
}
