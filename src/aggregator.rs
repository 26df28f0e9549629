// Revision Aggregator
// Walks the narrow audit export in file order and folds every change-log
// line into one accumulated entry per revision identity.

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, BufReader, Read};

use crate::error::AuditError;
use crate::resolver::Resolver;
use crate::tokenizer::parse_assignments;
use crate::values::ValueNormalizer;

/// Fixed number of metadata lines preceding the header in a narrow export
pub const PREAMBLE_LINES: usize = 7;

// ============================================================================
// REVISION IDENTITY
// ============================================================================

/// Identity of one audit revision.
///
/// Two narrow rows sharing the same key merge into the same wide output row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionKey {
    pub timestamp: String,
    pub user: String,
    pub operation: String,
}

impl RevisionKey {
    pub fn new(
        timestamp: impl Into<String>,
        user: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        RevisionKey {
            timestamp: timestamp.into(),
            user: user.into(),
            operation: operation.into(),
        }
    }
}

/// One row of the narrow export. Extra columns are ignored; missing cells
/// default to empty, matching the permissive source format.
#[derive(Debug, Deserialize)]
struct NarrowRow {
    #[serde(rename = "Timestamp", default)]
    timestamp: String,

    #[serde(rename = "User", default)]
    user: String,

    #[serde(rename = "Operation", default)]
    operation: String,

    #[serde(rename = "Change Log", default)]
    change_log: String,
}

// ============================================================================
// REVISION HISTORY
// ============================================================================

/// Accumulated field changes per revision, in first-appearance order.
#[derive(Debug, Default)]
pub struct RevisionHistory {
    revisions: IndexMap<RevisionKey, HashMap<String, String>>,
    fields: BTreeSet<String>,
}

impl RevisionHistory {
    pub fn new() -> Self {
        RevisionHistory::default()
    }

    /// Merge one resolved field assignment into a revision entry.
    ///
    /// A later assignment to the same field under the same key overwrites
    /// the earlier one (last-write-wins).
    pub fn record(&mut self, key: &RevisionKey, field: &str, value: String) {
        self.revisions
            .entry(key.clone())
            .or_default()
            .insert(field.to_string(), value);
        self.fields.insert(field.to_string());
    }

    /// Union of all field names seen across all revisions, sorted
    pub fn field_union(&self) -> &BTreeSet<String> {
        &self.fields
    }

    /// Revisions in order of first appearance in the narrow input
    pub fn iter(&self) -> impl Iterator<Item = (&RevisionKey, &HashMap<String, String>)> {
        self.revisions.iter()
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Consume one narrow export and build its revision history.
///
/// Skips the fixed-size metadata preamble, then reads the delimited table.
/// Rows with an empty change-log cell produce no output. Field values are
/// normalized (references resolved) as they are recorded, so repeated
/// identifiers across rows hit the cache.
pub fn aggregate_revisions<R: Read>(
    input: R,
    normalizer: &ValueNormalizer,
    resolver: &mut Resolver,
) -> Result<RevisionHistory, AuditError> {
    let mut buffered = BufReader::new(input);

    let mut line = String::new();
    for _ in 0..PREAMBLE_LINES {
        line.clear();
        if buffered.read_line(&mut line)? == 0 {
            // Export shorter than the preamble - nothing to aggregate
            return Ok(RevisionHistory::new());
        }
    }

    let mut reader = csv::Reader::from_reader(buffered);
    let mut history = RevisionHistory::new();

    for result in reader.deserialize() {
        let row: NarrowRow = result?;
        if row.change_log.is_empty() {
            continue;
        }

        let key = RevisionKey::new(row.timestamp, row.user, row.operation);
        for (field, raw) in parse_assignments(&row.change_log) {
            let value = normalizer.normalize(&field, &raw, resolver);
            history.record(&key, &field, value);
        }
    }

    Ok(history)
}

// ============================================================================
// TESTS
// ============================================================================
