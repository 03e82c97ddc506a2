//! Sync orchestration: the download pass and the upload pass.
//!
//! Both passes consume a stream supplied by the caller and apply its items
//! in delivery order, one at a time. The next item is only polled after the
//! previous one has been written.

use crate::ack::{Acknowledgment, UploadAck};
use crate::record::format_instant;
use crate::resolver::{ConflictResolver, Resolution};
use crate::{
    DownloadContext, EditSelector, EditToken, Error, PendingEdit, Record, RecordRef, RecordStore,
    Result, StoreWrite, Timestamp,
};
use async_trait::async_trait;
use futures::{pin_mut, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Watermark lookups served from a [`RecordStore`].
pub struct StoreContext<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StoreContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[async_trait]
impl<S> DownloadContext for StoreContext<S>
where
    S: RecordStore + ?Sized,
{
    async fn latest_timestamp_for(&self, resource_type: &str) -> Result<Option<String>> {
        self.store.last_known_watermark(resource_type).await
    }
}

/// Totals of one download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    /// Batches committed
    pub batches: usize,
    /// Incoming records written
    pub records: usize,
    /// Incoming identities that had pending local edits
    pub conflicts: usize,
    /// Conflicts the resolver settled
    pub resolved: usize,
}

/// An acknowledgment that could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFailure {
    pub tokens: Vec<EditToken>,
    pub error: Error,
    /// Whether the journal entries were already deleted when the pair failed.
    /// If not, they are uploaded again on the next pass.
    pub tokens_deleted: bool,
}

/// Totals of one upload pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    /// Journal entries deleted
    pub acknowledged: usize,
    /// Records whose version metadata was overwritten
    pub metadata_updates: usize,
    /// Pairs that failed, in delivery order
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    /// Whether every pair was applied.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives download and upload passes against one store.
///
/// Passes must not run concurrently against the same store; callers
/// serialize them.
pub struct Synchronizer<S: ?Sized> {
    store: Arc<S>,
}

impl<S> Synchronizer<S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The store this synchronizer writes to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Watermark context handed to fetch collaborators.
    pub fn context(&self) -> StoreContext<S> {
        StoreContext {
            store: Arc::clone(&self.store),
        }
    }

    /// Run one download pass.
    ///
    /// `fetch` receives a watermark context and returns the batch stream.
    /// Each batch commits in its own transaction: incoming records and the
    /// per-type watermarks first, then the resolver's replacements with their
    /// pending edits dropped. The first failure aborts the pass; batches
    /// committed before it stay.
    #[tracing::instrument(skip_all)]
    pub async fn download_and_apply<R, F, St>(
        &self,
        resolver: &R,
        fetch: F,
    ) -> Result<DownloadReport>
    where
        R: ConflictResolver + ?Sized,
        F: FnOnce(StoreContext<S>) -> St,
        St: Stream<Item = Result<Vec<Record>>>,
    {
        let batches = fetch(self.context());
        pin_mut!(batches);

        let mut report = DownloadReport::default();
        while let Some(batch) = batches.try_next().await? {
            let applied = self.apply_batch(resolver, batch).await?;
            report.batches += 1;
            report.records += applied.records;
            report.conflicts += applied.conflicts;
            report.resolved += applied.resolved;
        }

        info!(
            batches = report.batches,
            records = report.records,
            conflicts = report.conflicts,
            resolved = report.resolved,
            "download pass complete"
        );
        Ok(report)
    }

    async fn apply_batch<R>(&self, resolver: &R, batch: Vec<Record>) -> Result<DownloadReport>
    where
        R: ConflictResolver + ?Sized,
    {
        let pending = self.store.pending_edits().await?;
        let edited: HashSet<&RecordRef> = pending.iter().map(|e| &e.reference).collect();

        // Later copies of an identity replace earlier ones.
        let mut colliding: BTreeMap<&RecordRef, &Record> = BTreeMap::new();
        for record in &batch {
            if edited.contains(&record.reference) {
                colliding.insert(&record.reference, record);
            }
        }

        let mut resolutions: Vec<(RecordRef, Record)> = Vec::new();
        for (&reference, &remote) in &colliding {
            let local = match self.store.select(reference).await {
                Ok(local) => local,
                Err(Error::RecordNotFound(_)) => {
                    debug!(%reference, "conflict with a pending delete; remote value stands");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match resolver.resolve(&local, remote) {
                Resolution::Resolved(record) => resolutions.push((reference.clone(), record)),
                Resolution::Kept => debug!(%reference, "resolver kept the remote value"),
            }
        }
        let conflicts = colliding.len();

        let mut latest: BTreeMap<&str, Timestamp> = BTreeMap::new();
        for record in &batch {
            if let Some(at) = record.last_updated {
                latest
                    .entry(record.resource_type())
                    .and_modify(|seen| *seen = (*seen).max(at))
                    .or_insert(at);
            }
        }
        let watermarks: Vec<StoreWrite> = latest
            .into_iter()
            .map(|(resource_type, at)| StoreWrite::RecordWatermark {
                resource_type: resource_type.to_string(),
                timestamp: format_instant(&at),
            })
            .collect();

        let records = batch.len();
        let resolved = resolutions.len();
        let mut writes: Vec<StoreWrite> = batch.into_iter().map(StoreWrite::UpsertSynced).collect();
        writes.extend(watermarks);
        for (reference, record) in resolutions {
            writes.push(StoreWrite::DropPendingEdits(reference));
            writes.push(StoreWrite::UpsertSynced(record));
        }

        self.store.with_transaction(writes).await?;
        debug!(records, conflicts, resolved, "batch committed");

        Ok(DownloadReport {
            batches: 1,
            records,
            conflicts,
            resolved,
        })
    }

    /// Run one upload pass.
    ///
    /// `upload` receives the whole journal and returns acknowledgments. Each
    /// acknowledgment deletes its journal entries by token and then applies
    /// any version metadata it carries. A pair that fails to apply is
    /// recorded in the report and the pass moves on; an error item in the
    /// stream ends the pass. Entries count as acknowledged once deleted,
    /// even if the metadata write that follows fails.
    ///
    /// An empty journal returns immediately without calling `upload`.
    #[tracing::instrument(skip_all)]
    pub async fn upload_pending<F, St>(&self, upload: F) -> Result<UploadReport>
    where
        F: FnOnce(Vec<PendingEdit>) -> St,
        St: Stream<Item = Result<UploadAck>>,
    {
        let pending = self.store.pending_edits().await?;
        if pending.is_empty() {
            debug!("journal empty, nothing to upload");
            return Ok(UploadReport::default());
        }
        debug!(edits = pending.len(), "uploading journal");

        let acks = upload(pending);
        pin_mut!(acks);

        let mut report = UploadReport::default();
        while let Some(ack) = acks.try_next().await? {
            if let Err(e) = self
                .store
                .delete_pending_edits(EditSelector::Tokens(ack.tokens.clone()))
                .await
            {
                error!(tokens = ?ack.tokens, "failed to delete acknowledged edits: {}", e);
                report.failures.push(UploadFailure {
                    tokens: ack.tokens,
                    error: e,
                    tokens_deleted: false,
                });
                continue;
            }
            report.acknowledged += ack.tokens.len();

            match self.apply_versions(ack.response).await {
                Ok(updated) => report.metadata_updates += updated,
                Err(e) => {
                    error!(tokens = ?ack.tokens, "failed to apply version metadata: {}", e);
                    report.failures.push(UploadFailure {
                        tokens: ack.tokens,
                        error: e,
                        tokens_deleted: true,
                    });
                }
            }
        }

        info!(
            acknowledged = report.acknowledged,
            metadata_updates = report.metadata_updates,
            failures = report.failures.len(),
            "upload pass complete"
        );
        Ok(report)
    }

    async fn apply_versions(&self, response: serde_json::Value) -> Result<usize> {
        let updates = Acknowledgment::classify(response).version_updates();
        for update in &updates {
            self.store
                .update_version_metadata(&update.reference, &update.version_id, update.last_updated)
                .await?;
        }
        Ok(updates.len())
    }
}
