// Run configuration
// Credentials and endpoint come from the environment; everything else uses
// the platform defaults.

use crate::client::{Credentials, PollBudget};
use crate::error::AuditError;

/// Login domain used when none is configured
pub const DEFAULT_DOMAIN: &str = "openspecimen";

/// Catalogs prefetched into the label cache before processing begins
pub const DEFAULT_PREFETCH_ATTRIBUTES: [&str; 2] = ["anatomic_site", "specimen_type"];

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub credentials: Credentials,
    pub poll: PollBudget,
    pub prefetch_attributes: Vec<String>,
}

impl Config {
    /// Build the run configuration from the environment.
    ///
    /// `SR_AUDIT_BASE_URL`, `SR_AUDIT_USERNAME` and `SR_AUDIT_PASSWORD` are
    /// required; `SR_AUDIT_DOMAIN` falls back to the platform default.
    /// Missing variables are a startup error - nothing has been fetched yet,
    /// so the run aborts cleanly.
    pub fn from_env() -> Result<Self, AuditError> {
        Ok(Config {
            base_url: require_env("SR_AUDIT_BASE_URL")?,
            credentials: Credentials {
                login_name: require_env("SR_AUDIT_USERNAME")?,
                password: require_env("SR_AUDIT_PASSWORD")?,
                domain: env_or("SR_AUDIT_DOMAIN", DEFAULT_DOMAIN),
            },
            poll: PollBudget::default(),
            prefetch_attributes: DEFAULT_PREFETCH_ATTRIBUTES
                .iter()
                .map(|attr| attr.to_string())
                .collect(),
        })
    }
}

/// Output folder for one collection protocol's wide tables
pub fn output_folder(cp_id: i64) -> String {
    format!("specimen_req_audits_cp_{cp_id}")
}

/// File name of the final merged table
pub fn merged_file_name(cp_id: i64) -> String {
    format!("cp_{cp_id}_merged_specimen_req_audit_final.csv")
}

fn require_env(name: &str) -> Result<String, AuditError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuditError::Config(format!("{name} is not set")))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ============================================================================
// TESTS
// ============================================================================
