//! # Clinisync Engine
//!
//! The synchronization core of a local-first store for clinical records.
//!
//! This crate reconciles a local, possibly offline copy of a record set with
//! a remote authority in both directions. Local edits that have not reached
//! the server are kept in a journal, and clashes between local and remote
//! edits are settled by a caller-supplied policy.
//!
//! ## Design Principles
//!
//! - **No transport**: Fetching and uploading are collaborators passed in as
//!   streams; the engine never opens a connection
//! - **Ordered**: Batches and acknowledgments are applied one at a time, in
//!   delivery order
//! - **Atomic batches**: Each download batch commits in one store transaction
//! - **Pluggable storage**: Everything persistent goes through [`RecordStore`]
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is identified by a [`RecordRef`] (`resourceType` and `id`)
//! and carries a JSON payload plus optional server version metadata
//! (`versionId`, `lastUpdated`).
//!
//! ### Pending edits
//!
//! Local inserts, updates and deletes are journaled as [`PendingEdit`]s with a
//! monotonically increasing [`EditToken`]. Uploads drain the journal and
//! delete entries by token as they are acknowledged.
//!
//! ### Download cursor
//!
//! The [`DownloadCursor`] turns `(resource type, search params)` pairs into
//! request URLs. It injects `_sort=_lastUpdated` and an incremental
//! `_lastUpdated=gt<watermark>` filter, and drains every continuation page of
//! a type before starting the next one.
//!
//! ### Conflict resolution
//!
//! When an incoming record collides with a pending local edit, a
//! [`ConflictResolver`] decides:
//! - [`AcceptRemote`] - the incoming record wins
//! - [`AcceptLocal`] - the stored local record wins
//! - [`LastUpdatedWins`] - the later `lastUpdated` wins
//! - [`ManualMerge`] - nothing is resolved; the edit stays for later
//!
//! Any `Fn(&Record, &Record) -> Resolution` closure is a resolver too.
//!
//! ## Quick Start
//!
//! ```rust
//! use clinisync_engine::{AcceptRemote, MemoryStore, Record, RecordStore, Synchronizer};
//! use futures::{executor::block_on, stream};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let sync = Synchronizer::new(Arc::clone(&store));
//!
//! let incoming = Record::from_resource(json!({
//!     "resourceType": "Patient",
//!     "id": "p-1",
//!     "meta": {"versionId": "1", "lastUpdated": "2024-01-01T00:00:00Z"},
//! }))
//! .unwrap();
//!
//! let report = block_on(
//!     sync.download_and_apply(&AcceptRemote, |_ctx| stream::iter(vec![Ok(vec![incoming])])),
//! )
//! .unwrap();
//! assert_eq!(report.records, 1);
//!
//! let watermark = block_on(store.last_known_watermark("Patient")).unwrap();
//! assert_eq!(watermark.as_deref(), Some("2024-01-01T00:00:00Z"));
//! ```
//!
//! ## Persistence
//!
//! [`MemoryStore`] keeps everything in memory and can export a
//! [`StoreSnapshot`]. The `clinisync-store` crate provides a SQLite-backed
//! [`RecordStore`].

pub mod ack;
pub mod bundle;
pub mod config;
pub mod cursor;
pub mod digest;
pub mod download;
pub mod edit;
pub mod error;
pub mod record;
pub mod resolver;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use ack::{parse_location, version_from_etag, Acknowledgment, UploadAck, VersionUpdate};
pub use bundle::{Bundle, BundleEntry, BundleLink, EntryResponse, OperationOutcome, ServerResponse};
pub use config::SyncConfig;
pub use cursor::{build_url, DownloadContext, DownloadCursor, SearchParams, WorkItem};
pub use digest::{digest, inspect, Digest};
pub use download::{Downloader, RemoteSource};
pub use edit::{EditKind, EditSelector, EditToken, PendingEdit};
pub use error::{Error, Result};
pub use record::{format_instant, parse_instant, Record, RecordRef};
pub use resolver::{
    AcceptLocal, AcceptRemote, ConflictResolver, LastUpdatedWins, ManualMerge, Resolution,
};
pub use store::{MemoryStore, RecordStore, StoreSnapshot, StoreWrite};
pub use sync::{
    DownloadReport, StoreContext, Synchronizer, UploadFailure, UploadReport,
};

/// Type aliases for clarity
pub type ResourceType = String;
pub type RecordId = String;
pub type VersionId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
