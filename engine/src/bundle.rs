//! Server response envelopes.
//!
//! Only the envelope fields the sync protocols read are modelled; resource
//! bodies stay opaque JSON values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bundle type of a paged search result.
pub const SEARCHSET: &str = "searchset";
/// Bundle type returned for a transaction upload.
pub const TRANSACTION_RESPONSE: &str = "transaction-response";

/// A `Bundle` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(rename = "type")]
    pub bundle_type: Option<String>,
    #[serde(default)]
    pub link: Vec<BundleLink>,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    /// Whether the bundle has the given `type`.
    pub fn is(&self, bundle_type: &str) -> bool {
        self.bundle_type.as_deref() == Some(bundle_type)
    }

    /// URL of the `next` page, if the server supplied one.
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

/// A relation link on a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// One bundle entry: a resource, a per-item response, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub resource: Option<Value>,
    pub response: Option<EntryResponse>,
}

/// Per-item response descriptor of a transaction response entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub status: Option<String>,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// An `OperationOutcome` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(default)]
    pub issue: Vec<OutcomeIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeIssue {
    pub severity: Option<String>,
    pub code: Option<String>,
    pub diagnostics: Option<String>,
    pub details: Option<IssueDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueDetails {
    pub text: Option<String>,
}

impl OperationOutcome {
    /// Diagnostic text of the first issue.
    pub fn diagnostics(&self) -> String {
        self.issue
            .first()
            .and_then(|issue| {
                issue
                    .diagnostics
                    .clone()
                    .or_else(|| issue.details.as_ref().and_then(|d| d.text.clone()))
            })
            .unwrap_or_else(|| "server returned an OperationOutcome".to_string())
    }
}

/// A server response, classified by its `resourceType`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerResponse {
    Outcome(OperationOutcome),
    Bundle(Bundle),
    /// Any other resource (or a malformed envelope)
    Resource(Value),
}

impl ServerResponse {
    /// Classify a raw JSON response.
    pub fn parse(value: Value) -> Self {
        match value.get("resourceType").and_then(Value::as_str) {
            Some("OperationOutcome") => {
                ServerResponse::Outcome(serde_json::from_value(value).unwrap_or_default())
            }
            Some("Bundle") => match serde_json::from_value::<Bundle>(value.clone()) {
                Ok(bundle) => ServerResponse::Bundle(bundle),
                Err(e) => {
                    tracing::debug!("unreadable bundle envelope: {}", e);
                    ServerResponse::Resource(value)
                }
            },
            _ => ServerResponse::Resource(value),
        }
    }
}
