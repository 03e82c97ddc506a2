//! Conflict resolution between stored records and incoming remote records.
//!
//! A conflict exists when an identity in an incoming batch also has pending
//! local edits. The resolver sees the stored (locally edited) record and the
//! incoming one and either produces the record to keep or declines.
//!
//! Declining ([`Resolution::Kept`]) leaves the remote value written by the
//! download pass in place, and the pending edits stay in the journal.

use crate::Record;
use std::cmp::Ordering;

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Store this record and drop the pending edits for its identity
    Resolved(Record),
    /// No override
    Kept,
}

/// A conflict resolution policy.
///
/// Implementations must be deterministic and side-effect free.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: &Record, remote: &Record) -> Resolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Record, &Record) -> Resolution + Send + Sync,
{
    fn resolve(&self, local: &Record, remote: &Record) -> Resolution {
        self(local, remote)
    }
}

/// The remote record wins; local edits are discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptRemote;

impl ConflictResolver for AcceptRemote {
    fn resolve(&self, _local: &Record, remote: &Record) -> Resolution {
        Resolution::Resolved(remote.clone())
    }
}

/// The stored local record wins and is kept as synced state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptLocal;

impl ConflictResolver for AcceptLocal {
    fn resolve(&self, local: &Record, _remote: &Record) -> Resolution {
        Resolution::Resolved(local.clone())
    }
}

/// The record with the later `lastUpdated` wins.
///
/// Ties and records without a timestamp are left unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastUpdatedWins;

impl ConflictResolver for LastUpdatedWins {
    fn resolve(&self, local: &Record, remote: &Record) -> Resolution {
        match (local.last_updated, remote.last_updated) {
            (Some(l), Some(r)) => match l.cmp(&r) {
                Ordering::Greater => Resolution::Resolved(local.clone()),
                Ordering::Less => Resolution::Resolved(remote.clone()),
                Ordering::Equal => Resolution::Kept,
            },
            _ => Resolution::Kept,
        }
    }
}

/// Never resolves; conflicts wait for a manual merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualMerge;

impl ConflictResolver for ManualMerge {
    fn resolve(&self, _local: &Record, _remote: &Record) -> Resolution {
        Resolution::Kept
    }
}
