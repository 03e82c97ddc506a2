//! Edge case tests for clinisync-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use clinisync_engine::{
    build_url, digest, inspect, parse_location, version_from_etag, AcceptRemote, Acknowledgment,
    DownloadCursor, Error, MemoryStore, Record, RecordRef, RecordStore, SearchParams,
    Synchronizer,
};
use futures::stream;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn params(pairs: &[(&str, &str)]) -> SearchParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Cursor Edge Cases
// ============================================================================

#[tokio::test]
async fn empty_work_list_yields_nothing() {
    let ctx: BTreeMap<String, String> = BTreeMap::new();
    let mut cursor = DownloadCursor::new(Vec::<(String, SearchParams)>::new());
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.next_request_url(&ctx).await.unwrap(), None);
}

#[tokio::test]
async fn same_type_declared_twice_is_requested_twice() {
    let ctx: BTreeMap<String, String> = BTreeMap::new();
    let mut cursor = DownloadCursor::new([
        ("Observation", params(&[("code", "1234-5")])),
        ("Observation", params(&[("code", "8867-4")])),
    ]);
    assert_eq!(cursor.remaining_types(), 2);

    let first = cursor.next_request_url(&ctx).await.unwrap().unwrap();
    let second = cursor.next_request_url(&ctx).await.unwrap().unwrap();
    assert_eq!(first, "Observation?_sort=_lastUpdated&code=1234-5");
    assert_eq!(second, "Observation?_sort=_lastUpdated&code=8867-4");
}

#[tokio::test]
async fn continuation_urls_are_returned_verbatim() {
    let ctx: BTreeMap<String, String> = BTreeMap::new();
    let mut cursor = DownloadCursor::new([("Patient", SearchParams::new())]);
    cursor.next_request_url(&ctx).await.unwrap();

    let next = "https://fhir.example/r4?_getpages=abc&_getpagesoffset=50&_count=50";
    cursor.push_continuation(next);
    assert_eq!(cursor.next_request_url(&ctx).await.unwrap().as_deref(), Some(next));
}

#[test]
fn unicode_and_reserved_values_are_encoded() {
    let url = build_url("Patient", &params(&[("name", "Łukasz & Zoë"), ("_id", "a,b")]));
    assert_eq!(url, "Patient?_id=a%2Cb&name=%C5%81ukasz%20%26%20Zo%C3%AB");
}

#[test]
fn no_params_means_bare_type() {
    assert_eq!(build_url("Patient", &SearchParams::new()), "Patient");
}

// ============================================================================
// Digest Edge Cases
// ============================================================================

#[test]
fn searchset_without_entries() {
    let digest = inspect(json!({"resourceType": "Bundle", "type": "searchset"})).unwrap();
    assert!(digest.records.is_empty());
    assert_eq!(digest.next, None);
}

#[test]
fn outcome_without_diagnostics_uses_details_text() {
    let err = inspect(json!({
        "resourceType": "OperationOutcome",
        "issue": [{"severity": "error", "details": {"text": "Invalid search parameter"}}],
    }))
    .unwrap_err();
    assert_eq!(err, Error::remote("Invalid search parameter"));
}

#[test]
fn outcome_without_any_text_is_still_an_error() {
    let err = inspect(json!({"resourceType": "OperationOutcome", "issue": []})).unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
}

#[test]
fn bundle_with_unknown_type_is_ignored() {
    let mut cursor = DownloadCursor::new([("Patient", SearchParams::new())]);
    let records = digest(
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "link": [{"relation": "next", "url": "Patient?page=2"}],
            "entry": [{"resource": {"resourceType": "Patient", "id": "a"}}],
        }),
        &mut cursor,
    )
    .unwrap();

    assert!(records.is_empty());
    assert_eq!(cursor.remaining_types(), 1);
}

#[test]
fn records_from_mixed_types_in_one_page() {
    let digest = inspect(json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "entry": [
            {"resource": {"resourceType": "Encounter", "id": "e1"}},
            {"resource": {"resourceType": "Patient", "id": "p1"}, "search": {"mode": "include"}},
        ],
    }))
    .unwrap();
    let refs: Vec<_> = digest.records.iter().map(|r| r.reference.to_string()).collect();
    assert_eq!(refs, vec!["Encounter/e1", "Patient/p1"]);
}

// ============================================================================
// Acknowledgment Edge Cases
// ============================================================================

#[test]
fn location_with_trailing_slash_shifts_segments() {
    // Segments are counted from the end, so the empty tail segment shifts them.
    assert_eq!(
        parse_location("Patient/abc/_history/2/"),
        Some(RecordRef::new("abc", "_history"))
    );
}

#[test]
fn strong_etag() {
    assert_eq!(version_from_etag("\"7\"").as_deref(), Some("7"));
}

#[test]
fn transaction_response_without_entries() {
    let ack = Acknowledgment::classify(json!({
        "resourceType": "Bundle",
        "type": "transaction-response",
    }));
    assert!(ack.version_updates().is_empty());
}

#[test]
fn entry_resource_takes_precedence_over_response() {
    let ack = Acknowledgment::classify(json!({
        "resourceType": "Bundle",
        "type": "transaction-response",
        "entry": [{
            "resource": {
                "resourceType": "Patient",
                "id": "from-resource",
                "meta": {"versionId": "2", "lastUpdated": "2024-01-01T00:00:00Z"},
            },
            "response": {
                "location": "Patient/from-location/_history/9",
                "etag": "W/\"9\"",
                "lastModified": "2024-01-01T00:00:00Z",
            },
        }],
    }));

    let updates = ack.version_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].reference, RecordRef::new("Patient", "from-resource"));
    assert_eq!(updates[0].version_id, "2");
}

#[test]
fn unparseable_last_modified_is_skipped() {
    let ack = Acknowledgment::classify(json!({
        "resourceType": "Bundle",
        "type": "transaction-response",
        "entry": [{"response": {
            "location": "Patient/a/_history/1",
            "etag": "W/\"1\"",
            "lastModified": "Tue, 01 Jan 2024",
        }}],
    }));
    assert!(ack.version_updates().is_empty());
}

// ============================================================================
// Store Edge Cases
// ============================================================================

#[tokio::test]
async fn unicode_payloads_survive_a_download() {
    let store = Arc::new(MemoryStore::new());
    let sync = Synchronizer::new(Arc::clone(&store));
    let names = ["日本語テスト", "Привет мир", "مرحبا بالعالم", "🎉🚀", "Null\0Test"];

    let batch: Vec<Record> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Record::from_resource(json!({
                "resourceType": "Patient",
                "id": format!("p{i}"),
                "name": name,
            }))
            .unwrap()
        })
        .collect();

    sync.download_and_apply(&AcceptRemote, |_| stream::iter(vec![Ok(batch)]))
        .await
        .unwrap();

    for (i, name) in names.iter().enumerate() {
        let stored = store
            .select(&RecordRef::new("Patient", format!("p{i}")))
            .await
            .unwrap();
        assert_eq!(stored.payload["name"], *name);
    }
    // No record carried lastUpdated, so no watermark was written.
    assert_eq!(store.last_known_watermark("Patient").await.unwrap(), None);
}

#[tokio::test]
async fn purge_of_unknown_record() {
    let store = MemoryStore::new();
    let reference = RecordRef::new("Patient", "ghost");
    assert_eq!(
        store.purge(&reference, true).await,
        Err(Error::RecordNotFound(reference))
    );
}

#[tokio::test]
async fn large_batch_commits_once() {
    let store = Arc::new(MemoryStore::new());
    let sync = Synchronizer::new(Arc::clone(&store));
    let batch: Vec<Record> = (0..2_000)
        .map(|i| {
            Record::from_resource(json!({
                "resourceType": "Observation",
                "id": format!("o{i}"),
                "meta": {
                    "versionId": "1",
                    "lastUpdated": format!("2024-01-01T00:00:{:02}Z", i % 60),
                },
            }))
            .unwrap()
        })
        .collect();

    let report = sync
        .download_and_apply(&AcceptRemote, |_| stream::iter(vec![Ok(batch)]))
        .await
        .unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(store.snapshot().record_count(), 2_000);
    assert_eq!(
        store.last_known_watermark("Observation").await.unwrap().as_deref(),
        Some("2024-01-01T00:00:59Z")
    );
}
