//! Upload acknowledgments and the version metadata they carry.
//!
//! The server answers an uploaded edit either by echoing the stored resource
//! or with a `transaction-response` bundle. Both are reduced to a list of
//! [`VersionUpdate`]s. Acknowledgments that lack the required fields produce
//! no update; that is not an error.

use crate::bundle::{Bundle, BundleEntry, ServerResponse, TRANSACTION_RESPONSE};
use crate::record::parse_instant;
use crate::{EditToken, Record, RecordRef, Timestamp, VersionId};
use serde_json::Value;

/// One item of the upload stream: journal tokens and the server's answer.
///
/// Most uploads acknowledge a single edit. A transaction upload may cover
/// several edits with one response.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadAck {
    pub tokens: Vec<EditToken>,
    pub response: Value,
}

impl UploadAck {
    /// Acknowledge one journal entry.
    pub fn new(token: EditToken, response: Value) -> Self {
        Self {
            tokens: vec![token],
            response,
        }
    }

    /// Acknowledge several journal entries with one response.
    pub fn covering(tokens: impl IntoIterator<Item = EditToken>, response: Value) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            response,
        }
    }
}

/// New server-assigned version metadata for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpdate {
    pub reference: RecordRef,
    pub version_id: VersionId,
    pub last_updated: Timestamp,
}

/// A server acknowledgment, dispatched by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    /// The stored resource echoed back
    SingleRecord(Value),
    /// A bundle of per-entry results
    Transaction(Bundle),
    /// Anything else, e.g. an `OperationOutcome` answering a delete
    Unrecognized(Value),
}

impl Acknowledgment {
    /// Classify a raw acknowledgment body.
    ///
    /// Outcomes and untyped bodies are kept exactly as the server sent them.
    pub fn classify(value: Value) -> Self {
        match value.get("resourceType").and_then(Value::as_str) {
            None | Some("OperationOutcome") => Acknowledgment::Unrecognized(value),
            Some("Bundle") => match ServerResponse::parse(value.clone()) {
                ServerResponse::Bundle(bundle) => Acknowledgment::Transaction(bundle),
                _ => Acknowledgment::SingleRecord(value),
            },
            Some(_) => Acknowledgment::SingleRecord(value),
        }
    }

    /// Version metadata updates this acknowledgment supplies.
    pub fn version_updates(&self) -> Vec<VersionUpdate> {
        match self {
            Acknowledgment::SingleRecord(resource) => {
                from_resource(resource).into_iter().collect()
            }
            Acknowledgment::Transaction(bundle) if bundle.is(TRANSACTION_RESPONSE) => bundle
                .entry
                .iter()
                .filter_map(from_entry)
                .collect(),
            Acknowledgment::Transaction(bundle) => {
                tracing::warn!(
                    "ignoring acknowledgment bundle of type {:?}",
                    bundle.bundle_type
                );
                Vec::new()
            }
            Acknowledgment::Unrecognized(_) => Vec::new(),
        }
    }
}

fn from_resource(resource: &Value) -> Option<VersionUpdate> {
    let record = Record::from_resource(resource.clone()).ok()?;
    match (record.version_id, record.last_updated) {
        (Some(version_id), Some(last_updated)) => Some(VersionUpdate {
            reference: record.reference,
            version_id,
            last_updated,
        }),
        _ => None,
    }
}

fn from_entry(entry: &BundleEntry) -> Option<VersionUpdate> {
    if let Some(resource) = &entry.resource {
        return from_resource(resource);
    }

    let response = entry.response.as_ref()?;
    let (Some(etag), Some(last_modified), Some(location)) = (
        response.etag.as_deref(),
        response.last_modified.as_deref(),
        response.location.as_deref(),
    ) else {
        return None;
    };

    let reference = parse_location(location)?;
    let version_id = version_from_etag(etag)?;
    let last_updated = parse_instant(last_modified)?;

    Some(VersionUpdate {
        reference,
        version_id,
        last_updated,
    })
}

/// Read `(type, id)` from `[prefix/].../<type>/<id>/_history/<version>`.
///
/// Segments are counted from the end, so absolute and relative forms both
/// work. Returns `None` when there are fewer than four segments.
pub fn parse_location(location: &str) -> Option<RecordRef> {
    let segments: Vec<&str> = location.split('/').collect();
    if segments.len() < 4 {
        return None;
    }
    let id = segments[segments.len() - 3];
    let resource_type = segments[segments.len() - 4];
    if id.is_empty() || resource_type.is_empty() {
        return None;
    }
    Some(RecordRef::new(resource_type, id))
}

/// Strip weak-validator quoting: `W/"3"` becomes `3`.
pub fn version_from_etag(etag: &str) -> Option<VersionId> {
    let tag = etag.strip_prefix("W/").unwrap_or(etag).trim_matches('"');
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn location_absolute_and_relative() {
        let expected = RecordRef::new("Patient", "abc123");
        assert_eq!(
            parse_location("https://server/fhir/Patient/abc123/_history/2"),
            Some(expected.clone())
        );
        assert_eq!(parse_location("Patient/abc123/_history/2"), Some(expected));
    }

    #[test]
    fn location_too_short() {
        assert_eq!(parse_location("Patient/abc123"), None);
        assert_eq!(parse_location("abc123/_history/2"), None);
        assert_eq!(parse_location(""), None);
    }

    #[test]
    fn etag_quoting() {
        assert_eq!(version_from_etag("W/\"3\"").as_deref(), Some("3"));
        assert_eq!(version_from_etag("\"12\"").as_deref(), Some("12"));
        assert_eq!(version_from_etag("5").as_deref(), Some("5"));
        assert_eq!(version_from_etag("W/\"\""), None);
    }

    #[test]
    fn single_record_with_full_meta() {
        let ack = Acknowledgment::classify(json!({
            "resourceType": "Patient",
            "id": "p-1",
            "meta": {"versionId": "2", "lastUpdated": "2024-02-02T02:02:02Z"},
        }));
        assert!(matches!(ack, Acknowledgment::SingleRecord(_)));
        assert_eq!(
            ack.version_updates(),
            vec![VersionUpdate {
                reference: RecordRef::new("Patient", "p-1"),
                version_id: "2".into(),
                last_updated: Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap(),
            }]
        );
    }

    #[test]
    fn single_record_missing_meta_is_skipped() {
        let ack = Acknowledgment::classify(json!({
            "resourceType": "Patient",
            "id": "p-1",
            "meta": {"versionId": "2"},
        }));
        assert!(ack.version_updates().is_empty());
    }

    #[test]
    fn transaction_response_entries() {
        let ack = Acknowledgment::classify(json!({
            "resourceType": "Bundle",
            "type": "transaction-response",
            "entry": [
                {"response": {
                    "status": "201 Created",
                    "location": "https://fhir.example/Observation/o-1/_history/1",
                    "etag": "W/\"1\"",
                    "lastModified": "2024-03-03T03:03:03Z",
                }},
                {"resource": {
                    "resourceType": "Patient",
                    "id": "p-1",
                    "meta": {"versionId": "4", "lastUpdated": "2024-03-03T03:03:04Z"},
                }},
                {"response": {"status": "200 OK", "location": "Patient/p-2/_history/1"}},
                {"response": {
                    "status": "200 OK",
                    "location": "p-3",
                    "etag": "W/\"1\"",
                    "lastModified": "2024-03-03T03:03:03Z",
                }},
            ],
        }));

        let updates = ack.version_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].reference, RecordRef::new("Observation", "o-1"));
        assert_eq!(updates[0].version_id, "1");
        assert_eq!(updates[1].reference, RecordRef::new("Patient", "p-1"));
        assert_eq!(updates[1].version_id, "4");
    }

    #[test]
    fn other_bundle_kinds_are_ignored() {
        let ack = Acknowledgment::classify(json!({
            "resourceType": "Bundle",
            "type": "batch-response",
            "entry": [{"response": {
                "location": "Patient/p-1/_history/1",
                "etag": "W/\"1\"",
                "lastModified": "2024-03-03T03:03:03Z",
            }}],
        }));
        assert!(matches!(ack, Acknowledgment::Transaction(_)));
        assert!(ack.version_updates().is_empty());
    }

    #[test]
    fn outcomes_are_unrecognized() {
        let ack = Acknowledgment::classify(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "information", "diagnostics": "deleted"}],
        }));
        assert!(matches!(ack, Acknowledgment::Unrecognized(_)));
        assert!(ack.version_updates().is_empty());
    }

    #[test]
    fn unrecognized_keeps_server_body() {
        let outcome = json!({
            "resourceType": "OperationOutcome",
            "id": "oo-7",
            "text": {"status": "generated", "div": "<div>deleted</div>"},
            "issue": [{"severity": "information", "code": "informational"}],
        });
        assert_eq!(
            Acknowledgment::classify(outcome.clone()),
            Acknowledgment::Unrecognized(outcome)
        );

        let untyped = json!({"status": "204 No Content"});
        assert_eq!(
            Acknowledgment::classify(untyped.clone()),
            Acknowledgment::Unrecognized(untyped)
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_location_reads_type_and_id(
                prefix in proptest::collection::vec("[a-z0-9.:]{1,8}", 0..4),
                resource_type in "[A-Z][a-zA-Z]{2,12}",
                id in "[A-Za-z0-9\\-.]{1,24}",
                version in 1u32..1000,
            ) {
                let mut segments = prefix.clone();
                segments.push(resource_type.clone());
                segments.push(id.clone());
                segments.push("_history".to_string());
                segments.push(version.to_string());
                let location = segments.join("/");

                prop_assert_eq!(
                    parse_location(&location),
                    Some(RecordRef::new(resource_type, id))
                );
            }
        }
    }
}
