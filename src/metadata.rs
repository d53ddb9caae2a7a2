//! Metadata normalization and CSV export.
//!
//! Archive attribute values arrive in presentation form: bracketed lists,
//! stray quotes, mixed case, embedded spaces. [`clean_value`] flattens
//! them into a stable snake_case-ish form so exports and directory names
//! are consistent across runs, and [`render_csv`] writes one row per
//! searched record with its download status appended.

use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::types::{DownloadOutcome, NeuronRecord};

/// Normalizes one attribute value for exports and grouping.
///
/// Strips the bracketed-list shell and quotes, joins list items and
/// spaces with underscores, collapses `layer 5` style region names to
/// `layer5`, and lowercases the result. Neuron names are never cleaned;
/// they are identifiers.
pub fn clean_value(raw: &str) -> String {
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .replace('\'', "")
        .replace(", ", "_")
        .replace("layer ", "layer")
        .replace(' ', "_")
        .to_lowercase()
}

/// Cleans an attribute value for use as a directory name.
///
/// Separators and dot-only names would escape the download root, so they
/// are scrubbed; values that clean away to nothing become `"unknown"`.
pub(crate) fn path_component(raw: &str) -> String {
    let cleaned = clean_value(raw).replace(['/', '\\'], "_");
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Scrubs a neuron name for use as a file name.
///
/// Names keep their case and punctuation since they are identifiers, but
/// the archive controls them, so separators and dot-only names are
/// neutralized the same way directory components are.
pub(crate) fn file_component(raw: &str) -> String {
    let scrubbed = raw.replace(['/', '\\'], "_");
    if scrubbed.is_empty() || scrubbed.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        scrubbed
    }
}

/// Renders the metadata export for a completed run.
///
/// One row per record, in record order. Columns are `neuron_id`,
/// `neuron_name`, the sorted union of every attribute key seen, and
/// `download_status`. Attribute values are cleaned; records missing an
/// attribute get an empty cell. `outcomes` is expected to parallel
/// `records`; a missing outcome exports as `unknown`.
pub fn render_csv(records: &[NeuronRecord], outcomes: &[DownloadOutcome]) -> String {
    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for record in records {
        for key in record.metadata.keys() {
            columns.insert(key);
        }
    }

    let mut out = String::new();
    out.push_str("neuron_id,neuron_name");
    for column in &columns {
        out.push(',');
        out.push_str(&csv_field(column));
    }
    out.push_str(",download_status\n");

    for (index, record) in records.iter().enumerate() {
        out.push_str(&record.id.to_string());
        out.push(',');
        out.push_str(&csv_field(&record.name));
        for column in &columns {
            out.push(',');
            if let Some(value) = record.attribute(column) {
                out.push_str(&csv_field(&clean_value(value)));
            }
        }
        out.push(',');
        let status = outcomes.get(index).map_or("unknown", |o| o.status.label());
        out.push_str(status);
        out.push('\n');
    }

    out
}

/// Quotes a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::types::{DownloadStatus, NeuronId};

    use super::*;

    fn record(id: i64, name: &str, attrs: &[(&str, &str)]) -> NeuronRecord {
        let metadata: BTreeMap<String, String> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NeuronRecord {
            id: NeuronId::new(id),
            name: name.to_string(),
            metadata,
        }
    }

    fn outcome(id: i64, name: &str, status: DownloadStatus) -> DownloadOutcome {
        DownloadOutcome {
            id: NeuronId::new(id),
            name: name.to_string(),
            path: PathBuf::from(format!("{name}.swc")),
            status,
        }
    }

    #[test]
    fn test_clean_value_rules() {
        assert_eq!(clean_value("neocortex"), "neocortex");
        assert_eq!(clean_value("[Soma, Dendrites]"), "soma_dendrites");
        assert_eq!(clean_value("'quoted'"), "quoted");
        assert_eq!(clean_value("layer 5"), "layer5");
        assert_eq!(clean_value("Not reported"), "not_reported");
        assert_eq!(clean_value("CA1 pyramidal"), "ca1_pyramidal");
        assert_eq!(clean_value(""), "");
    }

    #[test]
    fn test_path_component_scrubs_escapes() {
        assert_eq!(path_component("mouse"), "mouse");
        assert_eq!(path_component("a/b"), "a_b");
        assert_eq!(path_component("a\\b"), "a_b");
        assert_eq!(path_component(".."), "unknown");
        assert_eq!(path_component(""), "unknown");
    }

    #[test]
    fn test_file_component_keeps_identifiers_verbatim() {
        assert_eq!(file_component("cnic_001"), "cnic_001");
        assert_eq!(file_component("ACC1-Sux.CNG"), "ACC1-Sux.CNG");
    }

    #[test]
    fn test_file_component_neutralizes_traversal_names() {
        assert_eq!(file_component("../../escape"), ".._.._escape");
        assert_eq!(file_component("a\\b"), "a_b");
        assert_eq!(file_component(".."), "unknown");
        assert_eq!(file_component("..."), "unknown");
        assert_eq!(file_component(""), "unknown");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_render_csv_unions_columns_in_sorted_order() {
        let records = vec![
            record(1, "Neuron_A", &[("species", "Mouse"), ("brain_region", "layer 5")]),
            record(2, "Neuron_B", &[("species", "rat"), ("cell_type", "[pyramidal]")]),
        ];
        let outcomes = vec![
            outcome(1, "Neuron_A", DownloadStatus::Success),
            outcome(
                2,
                "Neuron_B",
                DownloadStatus::Failed {
                    reason: "HTTP 404".to_string(),
                },
            ),
        ];

        let csv = render_csv(&records, &outcomes);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3, "header plus one row per record");
        assert_eq!(
            lines[0],
            "neuron_id,neuron_name,brain_region,cell_type,species,download_status"
        );
        assert_eq!(lines[1], "1,Neuron_A,layer5,,mouse,success");
        assert_eq!(lines[2], "2,Neuron_B,,pyramidal,rat,failed");
    }

    #[test]
    fn test_render_csv_keeps_neuron_names_verbatim() {
        let records = vec![record(7, "ACC1-Sux,weird", &[("species", "mouse")])];
        let outcomes = vec![outcome(7, "ACC1-Sux,weird", DownloadStatus::SkippedExists)];

        let csv = render_csv(&records, &outcomes);
        assert!(
            csv.contains("\"ACC1-Sux,weird\""),
            "names are quoted, not cleaned: {csv}"
        );
        assert!(csv.contains("skipped-exists"));
    }

    #[test]
    fn test_render_csv_without_records_is_header_only() {
        let csv = render_csv(&[], &[]);
        assert_eq!(csv, "neuron_id,neuron_name,download_status\n");
    }

    #[test]
    fn test_render_csv_missing_outcome_marked_unknown() {
        let records = vec![record(1, "a", &[])];
        let csv = render_csv(&records, &[]);
        assert!(csv.lines().nth(1).unwrap().ends_with(",unknown"));
    }
}
