// Error taxonomy for the audit history pipeline
//
// Only two classes are fatal to a whole run: authentication and startup
// configuration. Everything else is scoped to one requirement or one cell:
// a requirement that times out is skipped, an identifier that fails to
// resolve degrades to its decimal form (counted in CacheStats), a merge
// input that fails to read is skipped (counted in MergeReport).

/// Main error type for the audit pipeline
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Session could not be established (run-fatal)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Startup configuration is missing or invalid (run-fatal)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the platform
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The platform answered with an unexpected status
    #[error("unexpected response from {endpoint}: HTTP {status}")]
    Api { endpoint: String, status: u16 },

    /// Export job never produced a file within the poll budget
    #[error("export file {file_id} not ready after {waited_secs}s")]
    ExportTimeout { file_id: String, waited_secs: u64 },

    /// Export archive held no CSV entry
    #[error("export archive contains no csv entry")]
    EmptyArchive,

    /// Export archive could not be opened
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Malformed delimited table
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    /// Check if the error must abort the whole run
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, AuditError::Auth(_) | AuditError::Config(_))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_is_run_fatal() {
        assert!(AuditError::Auth("bad credentials".to_string()).is_run_fatal());
        assert!(AuditError::Config("missing SR_AUDIT_USERNAME".to_string()).is_run_fatal());
    }

    #[test]
    fn test_per_requirement_errors_are_not_fatal() {
        let err = AuditError::ExportTimeout {
            file_id: "f-123".to_string(),
            waited_secs: 60,
        };
        assert!(!err.is_run_fatal());
        assert!(!AuditError::EmptyArchive.is_run_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AuditError::Api {
            endpoint: "/rest/ng/sessions".to_string(),
            status: 500,
        };
        assert!(err.to_string().contains("HTTP 500"));
    }
}
