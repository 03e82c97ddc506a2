//! Database operations for the records table.

use crate::error::Result;
use chrono::{DateTime, Utc};
use clinisync_engine::{Record, RecordRef};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteConnection;

/// A stored record row from the database.
#[derive(Debug, sqlx::FromRow)]
pub struct RecordRow {
    pub resource_type: String,
    pub id: String,
    pub payload: Json<Value>,
    pub version_id: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RecordRow {
    /// Convert a database row to an engine record.
    pub fn into_record(self) -> Record {
        Record {
            reference: RecordRef::new(self.resource_type, self.id),
            payload: self.payload.0,
            version_id: self.version_id,
            last_updated: self.last_updated,
        }
    }
}

/// Get a record by identity.
pub async fn fetch_record(
    conn: &mut SqliteConnection,
    reference: &RecordRef,
) -> Result<Option<Record>> {
    let row = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT resource_type, id, payload, version_id, last_updated
        FROM records
        WHERE resource_type = ? AND id = ?
        "#,
    )
    .bind(&reference.resource_type)
    .bind(&reference.id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(RecordRow::into_record))
}

/// Whether a record exists.
pub async fn record_exists(conn: &mut SqliteConnection, reference: &RecordRef) -> Result<bool> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM records WHERE resource_type = ? AND id = ?")
            .bind(&reference.resource_type)
            .bind(&reference.id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// Upsert a record (insert or overwrite).
pub async fn upsert_record(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO records (resource_type, id, payload, version_id, last_updated)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (resource_type, id) DO UPDATE SET
            payload = excluded.payload,
            version_id = excluded.version_id,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(&record.reference.resource_type)
    .bind(&record.reference.id)
    .bind(Json(&record.payload))
    .bind(&record.version_id)
    .bind(record.last_updated)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Delete a record. Returns whether a row was removed.
pub async fn delete_record(conn: &mut SqliteConnection, reference: &RecordRef) -> Result<bool> {
    let result = sqlx::query("DELETE FROM records WHERE resource_type = ? AND id = ?")
        .bind(&reference.resource_type)
        .bind(&reference.id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Count stored records.
pub async fn count_records(conn: &mut SqliteConnection) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Delete every record.
pub async fn clear_records(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM records").execute(&mut *conn).await?;
    Ok(())
}
