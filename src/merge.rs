// Cross-Requirement Merger
// Concatenates many per-requirement wide tables into one final table,
// aligning heterogeneous column sets by union and tolerating unreadable
// inputs.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AuditError;

/// Outcome of one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Wide files concatenated into the output
    pub merged_files: usize,
    /// Wide files skipped because they failed to read
    pub skipped_files: usize,
    /// Data rows in the merged output
    pub rows: usize,
}

/// One parsed wide table held in memory until the union schema is known
struct WideTable {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge every `*_wide.csv` in `folder` into `output_name` (same folder).
///
/// Columns are the union of all input columns in first-appearance order;
/// rows keep each source table's order, tables concatenate in discovery
/// order (file-name sort, for a stable output). A table that fails to parse
/// is skipped with a diagnostic, never fatal to the merge.
pub fn merge_wide_tables(folder: &Path, output_name: &str) -> Result<MergeReport, AuditError> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with("_wide.csv"))
        })
        .collect();
    inputs.sort();

    let mut report = MergeReport::default();
    let mut tables = Vec::new();
    let mut columns: Vec<String> = Vec::new();

    for path in &inputs {
        match read_table(path) {
            Ok(table) => {
                for header in &table.headers {
                    if !columns.contains(header) {
                        columns.push(header.clone());
                    }
                }
                tables.push(table);
                report.merged_files += 1;
            }
            Err(err) => {
                eprintln!("⚠️  Skipping {}: {err}", path.display());
                report.skipped_files += 1;
            }
        }
    }

    let output = folder.join(output_name);
    let mut writer = csv::Writer::from_writer(File::create(&output)?);
    if columns.is_empty() {
        // Nothing merged - leave an empty output rather than a zero-field record
        writer.flush()?;
        return Ok(report);
    }
    writer.write_record(&columns)?;

    for table in &tables {
        let positions: HashMap<&str, usize> = table
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        for record in &table.rows {
            let row: Vec<&str> = columns
                .iter()
                .map(|column| {
                    positions
                        .get(column.as_str())
                        .and_then(|&i| record.get(i))
                        .unwrap_or("")
                })
                .collect();
            writer.write_record(&row)?;
            report.rows += 1;
        }
    }

    writer.flush()?;
    Ok(report)
}

fn read_table(path: &Path) -> Result<WideTable, AuditError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(WideTable { headers, rows })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = File::create(dir.join(name)).expect("create test file");
        file.write_all(content.as_bytes()).expect("write test file");
    }

    fn read_output(dir: &Path, name: &str) -> Vec<String> {
        std::fs::read_to_string(dir.join(name))
            .expect("merged output exists")
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_merge_unions_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "req_1_wide.csv", "a,b\n1,2\n");
        write_file(dir.path(), "req_2_wide.csv", "b,c\n3,4\n");

        let report = merge_wide_tables(dir.path(), "merged.csv").expect("merge should succeed");
        assert_eq!(report.merged_files, 2);
        assert_eq!(report.rows, 2);

        let lines = read_output(dir.path(), "merged.csv");
        assert_eq!(lines[0], "a,b,c");
        assert_eq!(lines[1], "1,2,", "A's rows leave missing c empty");
        assert_eq!(lines[2], ",3,4", "B's rows leave missing a empty");
    }

    #[test]
    fn test_merge_preserves_row_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "req_1_wide.csv", "x\nfirst\nsecond\n");
        write_file(dir.path(), "req_2_wide.csv", "x\nthird\n");

        merge_wide_tables(dir.path(), "merged.csv").expect("merge should succeed");
        let lines = read_output(dir.path(), "merged.csv");
        assert_eq!(lines, vec!["x", "first", "second", "third"]);
    }

    #[test]
    fn test_merge_skips_unreadable_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "req_1_wide.csv", "a,b\n1,2\n");
        // Ragged row - csv rejects the record, file is skipped
        write_file(dir.path(), "req_2_wide.csv", "a,b\n1,2,3,4\n");

        let report = merge_wide_tables(dir.path(), "merged.csv").expect("merge should succeed");
        assert_eq!(report.merged_files, 1);
        assert_eq!(report.skipped_files, 1);
        assert_eq!(report.rows, 1);
    }

    #[test]
    fn test_merge_ignores_non_wide_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "req_1_wide.csv", "a\n1\n");
        write_file(dir.path(), "notes.csv", "unrelated\n");

        let report = merge_wide_tables(dir.path(), "merged.csv").expect("merge should succeed");
        assert_eq!(report.merged_files, 1);
    }

    #[test]
    fn test_merge_empty_folder_writes_empty_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = merge_wide_tables(dir.path(), "merged.csv").expect("merge should succeed");
        assert_eq!(report.merged_files, 0);
        assert_eq!(report.rows, 0);

        let content = std::fs::read_to_string(dir.path().join("merged.csv"))
            .expect("merged output exists");
        assert!(content.is_empty());
    }
}
