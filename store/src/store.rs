//! [`RecordStore`] backed by SQLite.
//!
//! Every trait operation runs in its own database transaction, so a local
//! edit and its journal entry land together or not at all.

use crate::db::{self, Pool};
use crate::error::Result;
use crate::StoreConfig;
use async_trait::async_trait;
use clinisync_engine::{
    EditKind, EditSelector, Error, PendingEdit, Record, RecordRef, RecordStore, StoreWrite,
    Timestamp,
};

/// SQLite implementation of [`RecordStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Wrap an existing, migrated pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open the configured database and bring its schema up to date.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        tracing::info!("Opening record store at {}", config.database_url);
        let pool = db::create_pool(config).await?;

        tracing::debug!("Running database migrations...");
        db::run_migrations(&pool).await?;

        Ok(Self::new(pool))
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Number of stored records.
    pub async fn record_count(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        db::count_records(&mut conn).await
    }

    async fn insert_records(&self, records: Vec<Record>) -> Result<Vec<RecordRef>> {
        let mut tx = self.pool.begin().await?;
        let mut created: Vec<RecordRef> = Vec::with_capacity(records.len());

        for record in &records {
            if created.contains(&record.reference)
                || db::record_exists(&mut tx, &record.reference).await?
            {
                return Err(Error::RecordAlreadyExists(record.reference.clone()).into());
            }
            db::upsert_record(&mut tx, record).await?;
            db::append_edit(&mut tx, &record.reference, EditKind::Insert, Some(&record.payload))
                .await?;
            created.push(record.reference.clone());
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_record(&self, mut record: Record) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let stored = db::fetch_record(&mut tx, &record.reference)
            .await?
            .ok_or_else(|| Error::RecordNotFound(record.reference.clone()))?;

        record.version_id = stored.version_id;
        record.last_updated = stored.last_updated;
        db::upsert_record(&mut tx, &record).await?;
        db::append_edit(&mut tx, &record.reference, EditKind::Update, Some(&record.payload))
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_record(&self, reference: &RecordRef) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !db::delete_record(&mut tx, reference).await? {
            return Err(Error::RecordNotFound(reference.clone()).into());
        }
        db::append_edit(&mut tx, reference, EditKind::Delete, None).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn select_record(&self, reference: &RecordRef) -> Result<Record> {
        let mut conn = self.pool.acquire().await?;
        let record = db::fetch_record(&mut conn, reference)
            .await?
            .ok_or_else(|| Error::RecordNotFound(reference.clone()))?;
        Ok(record)
    }

    async fn purge_record(&self, reference: &RecordRef, force: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !db::record_exists(&mut tx, reference).await? {
            return Err(Error::RecordNotFound(reference.clone()).into());
        }
        if !force && db::has_edits_for(&mut tx, reference).await? {
            return Err(Error::PurgeBlocked(reference.clone()).into());
        }
        db::delete_record(&mut tx, reference).await?;
        db::delete_edits_for(&mut tx, reference).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        db::clear_records(&mut tx).await?;
        db::clear_edits(&mut tx).await?;
        db::clear_watermarks(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_writes(&self, writes: Vec<StoreWrite>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for write in &writes {
            match write {
                StoreWrite::UpsertSynced(record) => db::upsert_record(&mut tx, record).await?,
                StoreWrite::RecordWatermark {
                    resource_type,
                    timestamp,
                } => db::set_watermark(&mut tx, resource_type, timestamp).await?,
                StoreWrite::DropPendingEdits(reference) => {
                    db::delete_edits_for(&mut tx, reference).await?
                }
            }
        }
        tx.commit().await?;
        tracing::debug!("committed {} writes", writes.len());
        Ok(())
    }

    async fn journal(&self) -> Result<Vec<PendingEdit>> {
        let mut conn = self.pool.acquire().await?;
        db::list_edits(&mut conn).await
    }

    async fn drop_edits(&self, selector: EditSelector) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        match selector {
            EditSelector::Tokens(tokens) => {
                for token in tokens {
                    db::delete_edit(&mut tx, token).await?;
                }
            }
            EditSelector::References(references) => {
                for reference in &references {
                    db::delete_edits_for(&mut tx, reference).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_version(
        &self,
        reference: &RecordRef,
        version_id: &str,
        last_updated: Timestamp,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let Some(mut record) = db::fetch_record(&mut tx, reference).await? else {
            tracing::debug!("no stored record {} for version update", reference);
            return Ok(());
        };
        record.set_version_metadata(version_id.to_string(), last_updated);
        db::upsert_record(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn watermark(&self, resource_type: &str) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        db::get_watermark(&mut conn, resource_type).await
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, records: Vec<Record>) -> clinisync_engine::Result<Vec<RecordRef>> {
        Ok(self.insert_records(records).await?)
    }

    async fn update(&self, record: Record) -> clinisync_engine::Result<()> {
        Ok(self.update_record(record).await?)
    }

    async fn delete(&self, reference: &RecordRef) -> clinisync_engine::Result<()> {
        Ok(self.delete_record(reference).await?)
    }

    async fn select(&self, reference: &RecordRef) -> clinisync_engine::Result<Record> {
        Ok(self.select_record(reference).await?)
    }

    async fn purge(&self, reference: &RecordRef, force: bool) -> clinisync_engine::Result<()> {
        Ok(self.purge_record(reference, force).await?)
    }

    async fn clear_all(&self) -> clinisync_engine::Result<()> {
        Ok(self.clear().await?)
    }

    async fn with_transaction(&self, writes: Vec<StoreWrite>) -> clinisync_engine::Result<()> {
        self.apply_writes(writes).await.map_err(|e| {
            tracing::error!("transaction rolled back: {}", e);
            Error::Transaction(e.to_string())
        })
    }

    async fn pending_edits(&self) -> clinisync_engine::Result<Vec<PendingEdit>> {
        Ok(self.journal().await?)
    }

    async fn delete_pending_edits(&self, selector: EditSelector) -> clinisync_engine::Result<()> {
        Ok(self.drop_edits(selector).await?)
    }

    async fn update_version_metadata(
        &self,
        reference: &RecordRef,
        version_id: &str,
        last_updated: Timestamp,
    ) -> clinisync_engine::Result<()> {
        Ok(self.set_version(reference, version_id, last_updated).await?)
    }

    async fn last_known_watermark(
        &self,
        resource_type: &str,
    ) -> clinisync_engine::Result<Option<String>> {
        Ok(self.watermark(resource_type).await?)
    }
}
