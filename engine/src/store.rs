//! Record store seam and the in-memory store.
//!
//! The sync core talks to persistence only through [`RecordStore`]. Writes
//! that must land together are expressed as a plan of [`StoreWrite`]s and
//! handed to [`RecordStore::with_transaction`], which applies all of them or
//! none.

use crate::{
    EditKind, EditSelector, EditToken, Error, PendingEdit, Record, RecordId, RecordRef, Result,
    ResourceType, Timestamp,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One write inside an atomic store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Insert or overwrite a record as synced state, without journaling
    UpsertSynced(Record),
    /// Set the sync watermark of a resource type
    RecordWatermark {
        resource_type: ResourceType,
        timestamp: String,
    },
    /// Remove every pending edit for a record
    DropPendingEdits(RecordRef),
}

/// Transactional record store with a journal of pending local edits.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create records locally, journaling an insert for each.
    async fn insert(&self, records: Vec<Record>) -> Result<Vec<RecordRef>>;

    /// Replace a record's payload locally, journaling an update.
    async fn update(&self, record: Record) -> Result<()>;

    /// Remove a record locally, journaling a delete.
    async fn delete(&self, reference: &RecordRef) -> Result<()>;

    /// Read a stored record.
    async fn select(&self, reference: &RecordRef) -> Result<Record>;

    /// Remove a record and its pending edits.
    ///
    /// Fails with [`Error::PurgeBlocked`] if edits are pending and `force`
    /// is not set.
    async fn purge(&self, reference: &RecordRef, force: bool) -> Result<()>;

    /// Remove all records, edits and watermarks.
    async fn clear_all(&self) -> Result<()>;

    /// Apply `writes` in order, atomically.
    async fn with_transaction(&self, writes: Vec<StoreWrite>) -> Result<()>;

    /// Snapshot of the whole journal in token order.
    async fn pending_edits(&self) -> Result<Vec<PendingEdit>>;

    /// Delete journal entries.
    async fn delete_pending_edits(&self, selector: EditSelector) -> Result<()>;

    /// Overwrite `versionId` and `lastUpdated` of a stored record.
    ///
    /// A missing record is not an error; nothing is written.
    async fn update_version_metadata(
        &self,
        reference: &RecordRef,
        version_id: &str,
        last_updated: Timestamp,
    ) -> Result<()>;

    /// The watermark recorded for `resource_type`, if any.
    async fn last_known_watermark(&self, resource_type: &str) -> Result<Option<String>>;

    /// Record watermarks in one transaction.
    async fn record_synced_watermarks(&self, entries: Vec<(ResourceType, String)>) -> Result<()> {
        self.with_transaction(watermark_writes(entries)).await
    }

    /// Store remote records and their watermarks in one transaction.
    async fn insert_synced_batch(
        &self,
        watermarks: Vec<(ResourceType, String)>,
        records: Vec<Record>,
    ) -> Result<()> {
        let mut writes: Vec<StoreWrite> = records.into_iter().map(StoreWrite::UpsertSynced).collect();
        writes.extend(watermark_writes(watermarks));
        self.with_transaction(writes).await
    }
}

fn watermark_writes(entries: Vec<(ResourceType, String)>) -> Vec<StoreWrite> {
    entries
        .into_iter()
        .map(|(resource_type, timestamp)| StoreWrite::RecordWatermark {
            resource_type,
            timestamp,
        })
        .collect()
}

/// Full state of a [`MemoryStore`].
///
/// BTreeMaps keep iteration and serialization order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Records by resource type, then id
    pub records: BTreeMap<ResourceType, BTreeMap<RecordId, Record>>,
    /// Journal in token order
    pub pending_edits: Vec<PendingEdit>,
    /// Sync watermarks by resource type
    pub watermarks: BTreeMap<ResourceType, String>,
    /// Last token handed out
    pub last_token: i64,
}

impl StoreSnapshot {
    /// Get a record.
    pub fn get(&self, reference: &RecordRef) -> Option<&Record> {
        self.records
            .get(&reference.resource_type)?
            .get(&reference.id)
    }

    /// Count records across all types.
    pub fn record_count(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    fn put(&mut self, record: Record) {
        self.records
            .entry(record.reference.resource_type.clone())
            .or_default()
            .insert(record.reference.id.clone(), record);
    }

    fn remove(&mut self, reference: &RecordRef) -> Option<Record> {
        let by_id = self.records.get_mut(&reference.resource_type)?;
        let removed = by_id.remove(&reference.id);
        if by_id.is_empty() {
            self.records.remove(&reference.resource_type);
        }
        removed
    }

    fn journal(&mut self, reference: RecordRef, kind: EditKind, payload: Option<serde_json::Value>) {
        self.last_token += 1;
        self.pending_edits.push(PendingEdit {
            token: EditToken(self.last_token),
            reference,
            kind,
            payload,
            created_at: Utc::now(),
        });
    }

    fn has_pending(&self, reference: &RecordRef) -> bool {
        self.pending_edits.iter().any(|e| &e.reference == reference)
    }

    fn apply(&mut self, write: StoreWrite) {
        match write {
            StoreWrite::UpsertSynced(record) => self.put(record),
            StoreWrite::RecordWatermark {
                resource_type,
                timestamp,
            } => {
                self.watermarks.insert(resource_type, timestamp);
            }
            StoreWrite::DropPendingEdits(reference) => {
                self.pending_edits.retain(|e| e.reference != reference);
            }
        }
    }
}

/// In-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
    commit_failure: Mutex<Option<usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a previously exported snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            commit_failure: Mutex::new(None),
        }
    }

    /// Export the current state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    /// Make the next transaction fail after applying `after_writes` writes.
    ///
    /// The staged writes are discarded, as a real backend would roll back.
    pub fn inject_commit_failure(&self, after_writes: usize) {
        *self.commit_failure.lock() = Some(after_writes);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, records: Vec<Record>) -> Result<Vec<RecordRef>> {
        let mut state = self.state.write();
        let mut created: Vec<RecordRef> = Vec::with_capacity(records.len());
        for record in &records {
            if state.get(&record.reference).is_some() || created.contains(&record.reference) {
                return Err(Error::RecordAlreadyExists(record.reference.clone()));
            }
            created.push(record.reference.clone());
        }

        for record in records {
            state.journal(
                record.reference.clone(),
                EditKind::Insert,
                Some(record.payload.clone()),
            );
            state.put(record);
        }
        Ok(created)
    }

    async fn update(&self, record: Record) -> Result<()> {
        let mut state = self.state.write();
        let stored = state
            .get(&record.reference)
            .ok_or_else(|| Error::RecordNotFound(record.reference.clone()))?;

        let mut updated = record;
        updated.version_id = stored.version_id.clone();
        updated.last_updated = stored.last_updated;

        state.journal(
            updated.reference.clone(),
            EditKind::Update,
            Some(updated.payload.clone()),
        );
        state.put(updated);
        Ok(())
    }

    async fn delete(&self, reference: &RecordRef) -> Result<()> {
        let mut state = self.state.write();
        state
            .remove(reference)
            .ok_or_else(|| Error::RecordNotFound(reference.clone()))?;
        state.journal(reference.clone(), EditKind::Delete, None);
        Ok(())
    }

    async fn select(&self, reference: &RecordRef) -> Result<Record> {
        self.state
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::RecordNotFound(reference.clone()))
    }

    async fn purge(&self, reference: &RecordRef, force: bool) -> Result<()> {
        let mut state = self.state.write();
        if state.get(reference).is_none() {
            return Err(Error::RecordNotFound(reference.clone()));
        }
        if state.has_pending(reference) && !force {
            return Err(Error::PurgeBlocked(reference.clone()));
        }
        state.remove(reference);
        state.pending_edits.retain(|e| &e.reference != reference);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut state = self.state.write();
        let last_token = state.last_token;
        *state = StoreSnapshot {
            last_token,
            ..StoreSnapshot::default()
        };
        Ok(())
    }

    async fn with_transaction(&self, writes: Vec<StoreWrite>) -> Result<()> {
        let mut state = self.state.write();
        let fail_after = self.commit_failure.lock().take();

        let mut staged = state.clone();
        for (applied, write) in writes.into_iter().enumerate() {
            if fail_after == Some(applied) {
                return Err(Error::Transaction(format!(
                    "commit aborted after {applied} writes"
                )));
            }
            staged.apply(write);
        }
        if let Some(applied) = fail_after {
            return Err(Error::Transaction(format!(
                "commit aborted after {applied} writes"
            )));
        }

        *state = staged;
        Ok(())
    }

    async fn pending_edits(&self) -> Result<Vec<PendingEdit>> {
        Ok(self.state.read().pending_edits.clone())
    }

    async fn delete_pending_edits(&self, selector: EditSelector) -> Result<()> {
        self.state
            .write()
            .pending_edits
            .retain(|e| !selector.matches(e));
        Ok(())
    }

    async fn update_version_metadata(
        &self,
        reference: &RecordRef,
        version_id: &str,
        last_updated: Timestamp,
    ) -> Result<()> {
        let mut state = self.state.write();
        let Some(record) = state
            .records
            .get_mut(&reference.resource_type)
            .and_then(|by_id| by_id.get_mut(&reference.id))
        else {
            tracing::debug!("no stored record {} for version update", reference);
            return Ok(());
        };
        record.set_version_metadata(version_id.to_string(), last_updated);
        Ok(())
    }

    async fn last_known_watermark(&self, resource_type: &str) -> Result<Option<String>> {
        Ok(self.state.read().watermarks.get(resource_type).cloned())
    }
}
