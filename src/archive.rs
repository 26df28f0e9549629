// Export archive handling
// The audit export job delivers a zip archive; the narrow table is its first
// CSV entry.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::AuditError;

/// Extract the first `.csv` entry from an export archive held in memory
pub fn extract_first_csv(bytes: &[u8]) -> Result<Vec<u8>, AuditError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.name().ends_with(".csv") {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }

    Err(AuditError::EmptyArchive)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start archive entry");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish archive").into_inner()
    }

    #[test]
    fn test_extracts_first_csv_entry() {
        let archive = build_archive(&[("readme.txt", "ignore me"), ("audit.csv", "a,b\n1,2\n")]);
        let data = extract_first_csv(&archive).expect("extraction should succeed");
        assert_eq!(data, b"a,b\n1,2\n");
    }

    #[test]
    fn test_archive_without_csv_is_an_error() {
        let archive = build_archive(&[("readme.txt", "no tables here")]);
        let err = extract_first_csv(&archive).expect_err("should fail without csv");
        assert!(matches!(err, AuditError::EmptyArchive));
    }

    #[test]
    fn test_garbage_bytes_are_an_archive_error() {
        let err = extract_first_csv(b"not a zip").expect_err("should fail on garbage");
        assert!(matches!(err, AuditError::Archive(_)));
    }
}
