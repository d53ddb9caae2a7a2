//! Declarative search queries.
//!
//! A [`Query`] is a set of field filters plus an optional sort, built in
//! code through [`QueryBuilder`] or loaded from a YAML or JSON file. The
//! same document shape serializes back out, so saved queries round-trip.
//!
//! Validation is two-staged: field names are checked against the fixed
//! vocabulary, values against whatever accepted-value sets are cached.
//! All violations are collected before an error is returned, so a user
//! fixing a query file sees every problem at once.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, QueryViolation, Result};
use crate::vocabulary::FieldVocabulary;

/// Sort order for search results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    /// Metadata field whose values order the results
    pub field: String,
    /// Ascending when true (the default), descending otherwise
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

/// A declarative archive query.
///
/// `filters` maps field names to accepted value sets; a record matches
/// when every filtered field carries one of its values. An empty filter
/// map matches the whole archive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// Field constraints; values within a field are OR-ed, fields AND-ed
    #[serde(default)]
    pub filters: BTreeMap<String, BTreeSet<String>>,

    /// Optional result ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl Query {
    /// Starts an empty builder.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Loads a query from a YAML or JSON file.
    ///
    /// The format follows the file extension; unknown extensions are
    /// parsed as YAML, which also accepts JSON documents. Structural
    /// problems (unknown keys, wrong value types) fail with
    /// [`Error::MalformedQuery`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let parsed: std::result::Result<Self, String> = match extension_of(path).as_deref() {
            Some("json") => serde_json::from_str(&text).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| Error::MalformedQuery {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Writes the query to a file, choosing the format by extension.
    /// YAML unless the extension says `.json`.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = match extension_of(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => serde_yaml::to_string(self)?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }

    /// True when no field constraints are set.
    pub fn is_unfiltered(&self) -> bool {
        self.filters.iter().all(|(_, values)| values.is_empty())
    }

    /// Renders the filter expression the archive's select endpoint
    /// expects: space-separated `field:value1,value2` terms. `None` for
    /// an unfiltered query.
    pub fn to_query_string(&self) -> Option<String> {
        let terms: Vec<String> = self
            .filters
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{field}:{}", joined.join(","))
            })
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }

    /// Checks filter and sort field names against the fixed vocabulary,
    /// without touching value caches or the network.
    pub fn validate_fields(&self) -> Result<()> {
        let violations = self.field_violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidQuery { violations })
        }
    }

    /// Full validation: field names against the fixed vocabulary, values
    /// against the cached accepted sets.
    ///
    /// Fields without cached values get name checks only, so callers that
    /// could not fetch the vocabulary still catch misspelled fields. The
    /// returned error lists every violation found.
    pub fn validate(&self, vocabulary: &FieldVocabulary) -> Result<()> {
        let mut violations = self.field_violations();

        for (field, values) in &self.filters {
            if !FieldVocabulary::is_recognized(field) {
                continue;
            }
            for value in values {
                if vocabulary.contains_value(field, value) == Some(false) {
                    violations.push(QueryViolation::InvalidValue {
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidQuery { violations })
        }
    }

    fn field_violations(&self) -> Vec<QueryViolation> {
        let mut violations = Vec::new();
        for field in self.filters.keys() {
            if !FieldVocabulary::is_recognized(field) {
                violations.push(QueryViolation::InvalidField {
                    field: field.clone(),
                });
            }
        }
        if let Some(sort) = &self.sort
            && !FieldVocabulary::is_recognized(&sort.field)
        {
            violations.push(QueryViolation::InvalidField {
                field: sort.field.clone(),
            });
        }
        violations
    }
}

/// Builds a [`Query`] with eager field-name checks.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    filters: BTreeMap<String, BTreeSet<String>>,
    sort: Option<SortSpec>,
}

impl QueryBuilder {
    /// Adds or replaces the constraint for `field`.
    ///
    /// An empty value list removes the constraint. Unknown field names
    /// fail immediately with [`Error::InvalidField`].
    pub fn filter<I, S>(mut self, field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !FieldVocabulary::is_recognized(field) {
            return Err(Error::InvalidField {
                field: field.to_string(),
            });
        }
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.filters.remove(field);
        } else {
            self.filters.insert(field.to_string(), values);
        }
        Ok(self)
    }

    /// Sets the result ordering. Unknown field names fail immediately
    /// with [`Error::InvalidField`].
    pub fn sort_by(mut self, field: &str, ascending: bool) -> Result<Self> {
        if !FieldVocabulary::is_recognized(field) {
            return Err(Error::InvalidField {
                field: field.to_string(),
            });
        }
        self.sort = Some(SortSpec {
            field: field.to_string(),
            ascending,
        });
        Ok(self)
    }

    /// Finishes the builder.
    pub fn build(self) -> Query {
        Query {
            filters: self.filters,
            sort: self.sort,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn default_ascending() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use crate::client::ArchiveClient;
    use crate::config::Config;

    use super::*;

    fn offline_vocabulary() -> FieldVocabulary {
        let client = ArchiveClient::new(&Config::default()).unwrap();
        FieldVocabulary::new(client)
    }

    fn species_query(value: &str) -> Query {
        Query::builder()
            .filter("species", [value])
            .unwrap()
            .build()
    }

    #[test]
    fn test_builder_rejects_unknown_field() {
        let result = Query::builder().filter("speciess", ["mouse"]);
        assert!(matches!(result, Err(Error::InvalidField { field }) if field == "speciess"));

        let result = Query::builder().sort_by("not_a_field", true);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_replaces_filter_and_dedups_values() {
        let query = Query::builder()
            .filter("species", ["rat", "mouse", "mouse"])
            .unwrap()
            .filter("species", ["human"])
            .unwrap()
            .build();

        let values = &query.filters["species"];
        assert_eq!(values.len(), 1, "second filter call replaces the first");
        assert!(values.contains("human"));
    }

    #[test]
    fn test_builder_empty_values_remove_constraint() {
        let query = Query::builder()
            .filter("species", ["mouse"])
            .unwrap()
            .filter("species", Vec::<String>::new())
            .unwrap()
            .build();
        assert!(query.is_unfiltered());
    }

    #[test]
    fn test_query_string_rendering() {
        let query = Query::builder()
            .filter("species", ["rat", "mouse"])
            .unwrap()
            .filter("brain_region", ["neocortex"])
            .unwrap()
            .build();

        // Fields and values are emitted in sorted order
        assert_eq!(
            query.to_query_string().unwrap(),
            "brain_region:neocortex species:mouse,rat"
        );

        assert_eq!(Query::default().to_query_string(), None);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.yml");

        let original = Query::builder()
            .filter("species", ["mouse"])
            .unwrap()
            .filter("cell_type", ["pyramidal", "interneuron"])
            .unwrap()
            .sort_by("brain_region", false)
            .unwrap()
            .build();

        original.to_file(&path).unwrap();
        let restored = Query::from_file(&path).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.json");

        let original = Query::builder()
            .filter("archive", ["Smith"])
            .unwrap()
            .build();

        original.to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('{'), "json format expected");

        let restored = Query::from_file(&path).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.yml");
        std::fs::write(&path, "filterz:\n  species: [mouse]\n").unwrap();

        let error = Query::from_file(&path).unwrap_err();
        match error {
            Error::MalformedQuery { path: p, reason } => {
                assert_eq!(p, path);
                assert!(reason.contains("filterz"), "reason was {reason:?}");
            }
            other => panic!("expected MalformedQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_from_file_rejects_wrong_value_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.yml");
        std::fs::write(&path, "filters: [species, mouse]\n").unwrap();

        assert!(matches!(
            Query::from_file(&path),
            Err(Error::MalformedQuery { .. })
        ));
    }

    #[test]
    fn test_from_file_accepts_json_content_in_extensionless_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query");
        std::fs::write(&path, r#"{"filters": {"species": ["mouse"]}}"#).unwrap();

        let query = Query::from_file(&path).unwrap();
        assert!(query.filters["species"].contains("mouse"));
    }

    #[test]
    fn test_validate_collects_all_violations() {
        let vocabulary = offline_vocabulary();
        vocabulary.prime("species", ["mouse", "rat"]);

        let mut query = species_query("cat");
        query
            .filters
            .insert("speciez".to_string(), BTreeSet::from(["x".to_string()]));

        let error = query.validate(&vocabulary).unwrap_err();
        match error {
            Error::InvalidQuery { violations } => {
                assert_eq!(violations.len(), 2, "one bad field, one bad value");
                assert!(violations.contains(&QueryViolation::InvalidField {
                    field: "speciez".to_string()
                }));
                assert!(violations.contains(&QueryViolation::InvalidValue {
                    field: "species".to_string(),
                    value: "cat".to_string()
                }));
            }
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_reports_each_bad_value_once() {
        let vocabulary = offline_vocabulary();
        vocabulary.prime("species", ["mouse", "rat"]);

        let error = species_query("cat").validate(&vocabulary).unwrap_err();
        match error {
            Error::InvalidQuery { violations } => {
                assert_eq!(
                    violations,
                    vec![QueryViolation::InvalidValue {
                        field: "species".to_string(),
                        value: "cat".to_string()
                    }]
                );
            }
            other => panic!("expected InvalidQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_passes_valid_query() {
        let vocabulary = offline_vocabulary();
        vocabulary.prime("species", ["mouse", "rat"]);

        assert!(species_query("mouse").validate(&vocabulary).is_ok());
    }

    #[test]
    fn test_validate_without_cache_checks_names_only() {
        let vocabulary = offline_vocabulary();

        // No cached values: "cat" cannot be judged, name checks still run
        assert!(species_query("cat").validate(&vocabulary).is_ok());
        let mut query = Query::default();
        query
            .filters
            .insert("bad_field".to_string(), BTreeSet::from(["x".to_string()]));
        assert!(query.validate(&vocabulary).is_err());
    }

    #[test]
    fn test_validate_checks_sort_field_name() {
        let vocabulary = offline_vocabulary();
        let query = Query {
            filters: BTreeMap::new(),
            sort: Some(SortSpec {
                field: "not_a_field".to_string(),
                ascending: true,
            }),
        };
        assert!(query.validate(&vocabulary).is_err());
        assert!(query.validate_fields().is_err());
    }

    #[test]
    fn test_empty_query_is_valid_and_unfiltered() {
        let vocabulary = offline_vocabulary();
        let query = Query::default();
        assert!(query.validate(&vocabulary).is_ok());
        assert!(query.validate_fields().is_ok());
        assert!(query.is_unfiltered());
    }
}
