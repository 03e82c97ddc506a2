//! Response digestor: turns one paged server response into records.

use crate::bundle::{ServerResponse, SEARCHSET};
use crate::{DownloadCursor, Error, Record, Result};
use serde_json::Value;

/// What one response contributes to a download pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    /// Records in server order
    pub records: Vec<Record>,
    /// Continuation URL of the next page
    pub next: Option<String>,
}

/// Digest a response without touching any cursor.
///
/// An `OperationOutcome` fails with [`Error::Remote`]. A search-set bundle
/// yields its entry resources and `next` link. Anything else yields nothing.
pub fn inspect(response: Value) -> Result<Digest> {
    match ServerResponse::parse(response) {
        ServerResponse::Outcome(outcome) => Err(Error::remote(outcome.diagnostics())),
        ServerResponse::Bundle(bundle) if bundle.is(SEARCHSET) => {
            let next = bundle.next_link().map(str::to_owned);
            let records = bundle
                .entry
                .into_iter()
                .filter_map(|entry| entry.resource)
                .filter_map(|resource| match Record::from_resource(resource) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!("skipping search entry: {}", e);
                        None
                    }
                })
                .collect();
            Ok(Digest { records, next })
        }
        ServerResponse::Bundle(bundle) => {
            tracing::debug!(
                "ignoring bundle of type {:?} in download",
                bundle.bundle_type
            );
            Ok(Digest::default())
        }
        ServerResponse::Resource(_) => Ok(Digest::default()),
    }
}

/// Digest a response, queueing its continuation on `cursor`.
pub fn digest(response: Value, cursor: &mut DownloadCursor) -> Result<Vec<Record>> {
    let Digest { records, next } = inspect(response)?;
    if let Some(url) = next {
        cursor.push_continuation(url);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordRef, SearchParams};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn searchset(ids: &[&str], next: Option<&str>) -> Value {
        let mut link = vec![json!({"relation": "self", "url": "Patient"})];
        if let Some(next) = next {
            link.push(json!({"relation": "next", "url": next}));
        }
        json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "link": link,
            "entry": ids
                .iter()
                .map(|id| json!({"resource": {"resourceType": "Patient", "id": id}}))
                .collect::<Vec<_>>(),
        })
    }

    #[test]
    fn searchset_records_keep_server_order() {
        let digest = inspect(searchset(&["c", "a", "b"], None)).unwrap();
        let ids: Vec<_> = digest.records.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(digest.next, None);
    }

    #[test]
    fn outcome_is_remote_error() {
        let err = inspect(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "Search timed out"}],
        }))
        .unwrap_err();
        assert_eq!(err, Error::remote("Search timed out"));
    }

    #[test]
    fn unexpected_shapes_yield_nothing() {
        assert!(inspect(json!({"resourceType": "Patient", "id": "a"}))
            .unwrap()
            .records
            .is_empty());
        assert!(inspect(json!({"resourceType": "Bundle", "type": "history"}))
            .unwrap()
            .records
            .is_empty());
        assert!(inspect(json!("not a resource")).unwrap().records.is_empty());
    }

    #[test]
    fn entries_without_identity_are_skipped() {
        let digest = inspect(json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {"resourceType": "Patient"}},
                {"search": {"mode": "match"}},
                {"resource": {"resourceType": "Patient", "id": "ok"}},
            ],
        }))
        .unwrap();
        assert_eq!(digest.records.len(), 1);
        assert_eq!(digest.records[0].reference, RecordRef::new("Patient", "ok"));
    }

    #[tokio::test]
    async fn next_link_is_queued_on_cursor() {
        let ctx: BTreeMap<String, String> = BTreeMap::new();
        let mut cursor = DownloadCursor::new([
            ("Patient", SearchParams::new()),
            ("Encounter", SearchParams::new()),
        ]);
        cursor.next_request_url(&ctx).await.unwrap();

        let records = digest(searchset(&["a"], Some("Patient?page=2")), &mut cursor).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            cursor.next_request_url(&ctx).await.unwrap().as_deref(),
            Some("Patient?page=2")
        );
    }
}
