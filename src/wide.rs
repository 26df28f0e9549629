// Wide-Table Writer
// Pivots an accumulated revision history into one row per revision with a
// stable, sorted column schema.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::aggregator::RevisionHistory;
use crate::error::AuditError;

/// Leading columns present in every wide table
pub const FIXED_COLUMNS: [&str; 5] = [
    "Modified Date",
    "Modified By",
    "Operation",
    "Requirement ID",
    "Event Label",
];

/// Known-noisy field names dropped from every wide table
pub const EXCLUDED_FIELDS: [&str; 4] = ["preBarcodedTube", "fixative", "receiver", "source_file"];

// ============================================================================
// COLUMN SCHEMA
// ============================================================================

/// Dynamic column order: the field union minus the exclusion list, sorted.
///
/// Deterministic regardless of row-processing order - the union is a sorted
/// set, so the schema depends only on which fields were ever seen.
pub fn column_schema(fields: &BTreeSet<String>) -> Vec<String> {
    fields
        .iter()
        .filter(|field| !EXCLUDED_FIELDS.contains(&field.as_str()))
        .cloned()
        .collect()
}

// ============================================================================
// TABLE OUTPUT
// ============================================================================

/// Emit the wide table for one requirement.
///
/// One row per revision in accumulation order; a revision that never touched
/// a column gets an empty cell there.
pub fn write_wide_table<W: Write>(
    out: W,
    history: &RevisionHistory,
    req_id: i64,
    event_label: &str,
) -> Result<(), AuditError> {
    let mut writer = csv::Writer::from_writer(out);
    let columns = column_schema(history.field_union());

    let mut header: Vec<&str> = FIXED_COLUMNS.to_vec();
    header.extend(columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    let req_id = req_id.to_string();
    for (key, fields) in history.iter() {
        let mut row: Vec<&str> = vec![
            &key.timestamp,
            &key.user,
            &key.operation,
            &req_id,
            event_label,
        ];
        row.extend(
            columns
                .iter()
                .map(|column| fields.get(column).map(String::as_str).unwrap_or("")),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// File name for one requirement's wide table
pub fn wide_file_name(req_id: i64) -> String {
    format!("req_{req_id}_wide.csv")
}

/// Write the wide table into the output folder and return its path
pub fn write_wide_file(
    folder: &Path,
    history: &RevisionHistory,
    req_id: i64,
    event_label: &str,
) -> Result<PathBuf, AuditError> {
    let path = folder.join(wide_file_name(req_id));
    let file = File::create(&path)?;
    write_wide_table(file, history, req_id, event_label)?;
    Ok(path)
}

// ============================================================================
// TESTS
// ============================================================================
