//! The archive's queryable field vocabulary.
//!
//! Field names are fixed and known ahead of time; accepted values per field
//! are fetched lazily from the archive and cached for the life of the
//! vocabulary. A failed value fetch degrades validation to field-name
//! checks only instead of blocking the pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::client::ArchiveClient;
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;

/// Field names the archive accepts in select queries.
///
/// Mirrors the archive's own field listing, including its one oddly
/// capitalized entry.
static QUERY_FIELDS: &[&str] = &[
    "neuron_name",
    "archive",
    "age_scale",
    "gender",
    "age_classification",
    "brain_region",
    "cell_type",
    "species",
    "strain",
    "scientific_name",
    "stain",
    "experiment_condition",
    "protocol",
    "slicing_direction",
    "reconstruction_software",
    "objective_type",
    "original_format",
    "domain",
    "attributes",
    "magnification",
    "upload_date",
    "deposition_date",
    "shrinkage_reported",
    "shrinkage_corrected",
    "reported_value",
    "reported_xy",
    "reported_z",
    "corrected_value",
    "corrected_xy",
    "corrected_z",
    "soma_surface",
    "surface",
    "volume",
    "slicing_thickness",
    "min_age",
    "max_age",
    "min_weight",
    "max_weight",
    "png_url",
    "reference_pmid",
    "reference_doi",
    "physical_Integrity",
];

/// Field-name list plus a lazy cache of accepted values per field.
pub struct FieldVocabulary {
    client: ArchiveClient,
    values: Mutex<HashMap<String, HashSet<String>>>,
}

impl FieldVocabulary {
    /// Creates an empty vocabulary backed by `client` for value fetches.
    pub fn new(client: ArchiveClient) -> Self {
        Self {
            client,
            values: Mutex::new(HashMap::new()),
        }
    }

    /// The fixed list of queryable field names.
    pub fn recognized_fields() -> &'static [&'static str] {
        QUERY_FIELDS
    }

    /// Whether `field` is a queryable field name.
    pub fn is_recognized(field: &str) -> bool {
        QUERY_FIELDS.contains(&field)
    }

    /// Whether accepted values for `field` are currently cached.
    pub fn has_values(&self, field: &str) -> bool {
        self.lock_values().contains_key(field)
    }

    /// Membership test against the cached values for `field`.
    ///
    /// Returns `None` when no values are cached, in which case the caller
    /// cannot judge the value either way.
    pub fn contains_value(&self, field: &str, value: &str) -> Option<bool> {
        self.lock_values().get(field).map(|set| set.contains(value))
    }

    /// A copy of the cached accepted values for `field`, if any.
    pub fn cached_values(&self, field: &str) -> Option<HashSet<String>> {
        self.lock_values().get(field).cloned()
    }

    /// Fetches and caches the accepted values for `field` unless they are
    /// cached already.
    pub async fn ensure(&self, field: &str) -> Result<()> {
        if self.has_values(field) {
            return Ok(());
        }
        self.refresh(field).await
    }

    /// Fetches the accepted values for `field` from the archive,
    /// replacing anything cached.
    ///
    /// Unknown fields fail with [`Error::InvalidField`]; fetch failures
    /// fail with [`Error::VocabularyUnavailable`] after retries.
    pub async fn refresh(&self, field: &str) -> Result<()> {
        if !Self::is_recognized(field) {
            return Err(Error::InvalidField {
                field: field.to_string(),
            });
        }

        let values = fetch_with_retry(self.client.retry_config(), || {
            self.client.field_values(field)
        })
        .await
        .map_err(|e| Error::VocabularyUnavailable {
            field: field.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(field, count = values.len(), "Cached field values");
        self.lock_values()
            .insert(field.to_string(), values.into_iter().collect());
        Ok(())
    }

    /// Seeds the cache directly, bypassing the archive.
    #[cfg(test)]
    pub(crate) fn prime<I, S>(&self, field: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_values().insert(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
    }

    fn lock_values(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
