//! SWC morphology parsing and structural checks.
//!
//! SWC is the archive's interchange format: one sample per line with
//! seven whitespace-separated columns (id, type, x, y, z, radius,
//! parent), `#` comment lines, and a root sample whose parent is `-1`.
//! Parsing here is strict about shape and lenient about spacing; the
//! checks mirror what the archive itself promises about standardized
//! files.

use std::str::FromStr;

use crate::error::{Result, SwcError};

/// Parent id marking the root sample.
pub const ROOT_PARENT: i64 = -1;

/// Structure type code for soma samples.
pub const SOMA_KIND: i64 = 1;

/// One sample point of a reconstruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwcSample {
    /// Sample id, unique within the file
    pub id: i64,
    /// Structure type code (1 = soma, 2 = axon, 3 = basal dendrite, ...)
    pub kind: i64,
    /// X coordinate in micrometers
    pub x: f64,
    /// Y coordinate in micrometers
    pub y: f64,
    /// Z coordinate in micrometers
    pub z: f64,
    /// Radius in micrometers
    pub radius: f64,
    /// Id of the parent sample, or [`ROOT_PARENT`] for the root
    pub parent: i64,
}

/// Parses an SWC payload into samples.
///
/// Comment and blank lines are skipped. Any data line with the wrong
/// column count or a non-numeric column fails the whole payload; a
/// morphology with silently dropped samples is worse than no file.
pub fn parse(text: &str) -> Result<Vec<SwcSample>> {
    let mut samples = Vec::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = index + 1;
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() != 7 {
            return Err(SwcError::ColumnCount {
                line: number,
                found: columns.len(),
            }
            .into());
        }
        samples.push(SwcSample {
            id: parse_column(columns[0], number, "id")?,
            kind: parse_column(columns[1], number, "type")?,
            x: parse_column(columns[2], number, "x")?,
            y: parse_column(columns[3], number, "y")?,
            z: parse_column(columns[4], number, "z")?,
            radius: parse_column(columns[5], number, "radius")?,
            parent: parse_column(columns[6], number, "parent")?,
        });
    }
    Ok(samples)
}

/// Structural checks over parsed samples.
///
/// A payload without a root sample is rejected. A payload without any
/// soma sample is patched: the first sample becomes the soma, with a
/// warning, matching how the archive's own tooling treats such files.
pub fn validate(samples: &mut [SwcSample]) -> Result<()> {
    if !samples.iter().any(|s| s.parent == ROOT_PARENT) {
        return Err(SwcError::MissingRoot.into());
    }
    if !samples.iter().any(|s| s.kind == SOMA_KIND)
        && let Some(first) = samples.first_mut()
    {
        tracing::warn!(
            sample = first.id,
            "No soma sample in payload; marking the first sample as soma"
        );
        first.kind = SOMA_KIND;
    }
    Ok(())
}

/// Parses and validates in one step.
pub fn parse_and_validate(text: &str) -> Result<Vec<SwcSample>> {
    let mut samples = parse(text)?;
    validate(&mut samples)?;
    Ok(samples)
}

fn parse_column<T: FromStr>(text: &str, line: usize, column: &'static str) -> Result<T> {
    text.parse().map_err(|_| {
        SwcError::InvalidNumber {
            line,
            column,
            value: text.to_string(),
        }
        .into()
    })
}
