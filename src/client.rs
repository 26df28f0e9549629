// REST client for the clinical-data platform
// Session acquisition, catalog lookups, requirement discovery, and the
// asynchronous audit export job. All calls are blocking - the run processes
// one requirement at a time.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use chrono::Utc;

use crate::error::AuditError;
use crate::resolver::{LabelSource, PermissibleValue};

/// Session token header expected by the platform
pub const TOKEN_HEADER: &str = "X-OS-API-TOKEN";

/// Audit entity exported by this tool
const ENTITY_TYPE: &str = "SpecimenRequirement";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Login credentials for the session endpoint
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login_name: String,
    pub password: String,
    pub domain: String,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "loginName")]
    login_name: &'a str,
    password: &'a str,
    #[serde(rename = "domainName")]
    domain_name: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
}

/// One collection-protocol event
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionEvent {
    pub id: i64,

    #[serde(rename = "eventLabel")]
    pub label: String,
}

/// One node of the specimen-requirement tree
#[derive(Debug, Clone, Deserialize)]
pub struct RequirementNode {
    pub id: i64,

    #[serde(rename = "eventLabel", default)]
    pub event_label: Option<String>,

    #[serde(default)]
    pub children: Vec<RequirementNode>,
}

/// Flattened view of one requirement, parents before children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRequirement {
    pub id: i64,
    pub event_label: Option<String>,
}

/// Depth-first flatten of a requirement tree
pub fn flatten_requirements(nodes: &[RequirementNode]) -> Vec<FlatRequirement> {
    let mut flat = Vec::new();
    for node in nodes {
        flat.push(FlatRequirement {
            id: node.id,
            event_label: node.event_label.clone(),
        });
        flat.extend(flatten_requirements(&node.children));
    }
    flat
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    #[serde(rename = "recordIds")]
    record_ids: [i64; 1],

    entities: [&'a str; 1],

    #[serde(rename = "includeModifiedProps")]
    include_modified_props: bool,

    #[serde(rename = "startDate")]
    start_date: i64,

    #[serde(rename = "endDate")]
    end_date: i64,
}

#[derive(Deserialize)]
struct ExportResponse {
    #[serde(rename = "fileId", default)]
    file_id: Option<String>,
}

// ============================================================================
// TIME WINDOW & POLL BUDGET
// ============================================================================

/// Export time window in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_millis: i64,
    pub end_millis: i64,
}

impl TimeWindow {
    /// The trailing year, the platform's audit retention horizon
    pub fn last_year() -> Self {
        let end = Utc::now();
        let start = end - chrono::Duration::days(365);
        TimeWindow {
            start_millis: start.timestamp_millis(),
            end_millis: end.timestamp_millis(),
        }
    }
}

/// Bounded retry budget for export-file polling
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub max_wait: Duration,
    pub interval: Duration,
}

impl PollBudget {
    pub fn attempts(&self) -> u64 {
        self.max_wait.as_secs() / self.interval.as_secs().max(1)
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        PollBudget {
            max_wait: Duration::from_secs(60),
            interval: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// REST CLIENT
// ============================================================================

pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuditError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(RestClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_token(&self) -> Result<&str, AuditError> {
        self.token
            .as_deref()
            .ok_or_else(|| AuditError::Auth("no active session".to_string()))
    }

    /// Establish a session. Any non-success answer is run-fatal; the server
    /// message is surfaced when the error body is JSON.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<(), AuditError> {
        let response = self
            .http
            .post(self.url("/rest/ng/sessions"))
            .json(&SessionRequest {
                login_name: &credentials.login_name,
                password: &credentials.password,
                domain_name: &credentials.domain,
            })
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response
                .text()
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AuditError::Auth(detail));
        }

        let session: SessionResponse = response.json()?;
        self.token = Some(session.token);
        Ok(())
    }

    /// Bulk catalog listing for one attribute, leaf values only
    pub fn list_permissible_values(
        &self,
        attribute: &str,
    ) -> Result<Vec<PermissibleValue>, AuditError> {
        let response = self
            .http
            .get(self.url("/rest/ng/permissible-values/v"))
            .header(TOKEN_HEADER, self.session_token()?)
            .query(&[
                ("searchString", ""),
                ("attribute", attribute),
                ("includeOnlyLeafValue", "true"),
                ("includeOnlyRootValue", "false"),
                ("query", ""),
                ("maxResults", "1000"),
            ])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Single-identifier catalog lookup
    pub fn permissible_value_by_id(
        &self,
        _attribute: &str,
        id: i64,
    ) -> Result<PermissibleValue, AuditError> {
        let response = self
            .http
            .get(self.url(&format!("/rest/ng/permissible-values/v/{id}")))
            .header(TOKEN_HEADER, self.session_token()?)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Events of one collection protocol
    pub fn list_events(&self, cp_id: i64) -> Result<Vec<CollectionEvent>, AuditError> {
        let response = self
            .http
            .get(self.url("/rest/ng/collection-protocol-events"))
            .header(TOKEN_HEADER, self.session_token()?)
            .query(&[("cpId", cp_id.to_string())])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Requirement tree for one event, children included
    pub fn list_requirements(
        &self,
        cp_id: i64,
        event_label: &str,
    ) -> Result<Vec<RequirementNode>, AuditError> {
        let response = self
            .http
            .get(self.url("/rest/ng/specimen-requirements"))
            .header(TOKEN_HEADER, self.session_token()?)
            .query(&[
                ("cpId", cp_id.to_string()),
                ("eventLabel", event_label.to_string()),
                ("includeChildReqs", "true".to_string()),
            ])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// Submit an audit export job for one requirement.
    ///
    /// The platform may answer without a file id when there is nothing to
    /// export; that is not an error.
    pub fn submit_export(
        &self,
        req_id: i64,
        window: &TimeWindow,
    ) -> Result<Option<String>, AuditError> {
        let response = self
            .http
            .post(self.url("/rest/ng/audit/export-revisions"))
            .header(TOKEN_HEADER, self.session_token()?)
            .json(&ExportRequest {
                record_ids: [req_id],
                entities: [ENTITY_TYPE],
                include_modified_props: true,
                start_date: window.start_millis,
                end_date: window.end_millis,
            })
            .send()?
            .error_for_status()?;
        let export: ExportResponse = response.json()?;
        Ok(export.file_id)
    }

    /// Poll for the export file until it is ready or the budget runs out.
    ///
    /// 200 delivers the archive bytes, 404 means not ready yet; anything
    /// else is an error for this requirement.
    pub fn poll_export_file(
        &self,
        file_id: &str,
        budget: &PollBudget,
    ) -> Result<Vec<u8>, AuditError> {
        for _ in 0..budget.attempts() {
            let response = self
                .http
                .get(self.url("/rest/ng/audit/revisions-file"))
                .header(TOKEN_HEADER, self.session_token()?)
                .query(&[("fileId", file_id)])
                .send()?;

            match response.status().as_u16() {
                200 => return Ok(response.bytes()?.to_vec()),
                404 => std::thread::sleep(budget.interval),
                status => {
                    return Err(AuditError::Api {
                        endpoint: "/rest/ng/audit/revisions-file".to_string(),
                        status,
                    })
                }
            }
        }

        Err(AuditError::ExportTimeout {
            file_id: file_id.to_string(),
            waited_secs: budget.max_wait.as_secs(),
        })
    }
}

impl LabelSource for RestClient {
    fn fetch_label(&self, attribute: &str, id: i64) -> Result<String, AuditError> {
        Ok(self.permissible_value_by_id(attribute, id)?.label())
    }
}

/// Pull a human-readable message out of a JSON error body.
/// The platform answers either `{"message": ...}` or a list of such objects.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = match &value {
        serde_json::Value::Array(items) => items.first()?.get("message")?,
        other => other.get("message")?,
    };
    message.as_str().map(str::to_string)
}

// ============================================================================
// TESTS
// ============================================================================
