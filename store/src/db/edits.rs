//! Database operations for the pending edit journal.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use clinisync_engine::{EditKind, EditToken, PendingEdit, RecordRef};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteConnection;

/// A stored journal row from the database.
#[derive(Debug, sqlx::FromRow)]
pub struct EditRow {
    pub token: i64,
    pub resource_type: String,
    pub id: String,
    pub kind: String,
    pub payload: Option<Json<Value>>,
    pub created_at: DateTime<Utc>,
}

impl EditRow {
    /// Convert a database row to an engine pending edit.
    pub fn into_edit(self) -> Result<PendingEdit> {
        let kind = EditKind::parse(&self.kind).ok_or_else(|| {
            StoreError::CorruptRow(format!("edit #{} has unknown kind '{}'", self.token, self.kind))
        })?;

        Ok(PendingEdit {
            token: EditToken(self.token),
            reference: RecordRef::new(self.resource_type, self.id),
            kind,
            payload: self.payload.map(|p| p.0),
            created_at: self.created_at,
        })
    }
}

/// Append an edit to the journal and return its token.
pub async fn append_edit(
    conn: &mut SqliteConnection,
    reference: &RecordRef,
    kind: EditKind,
    payload: Option<&Value>,
) -> Result<EditToken> {
    let result = sqlx::query(
        r#"
        INSERT INTO pending_edits (resource_type, id, kind, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&reference.resource_type)
    .bind(&reference.id)
    .bind(kind.as_str())
    .bind(payload.map(Json))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(EditToken(result.last_insert_rowid()))
}

/// The whole journal in token order.
pub async fn list_edits(conn: &mut SqliteConnection) -> Result<Vec<PendingEdit>> {
    let rows = sqlx::query_as::<_, EditRow>(
        r#"
        SELECT token, resource_type, id, kind, payload, created_at
        FROM pending_edits
        ORDER BY token
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(EditRow::into_edit).collect()
}

/// Whether any edit is pending for a record.
pub async fn has_edits_for(conn: &mut SqliteConnection, reference: &RecordRef) -> Result<bool> {
    let found: Option<(i64,)> = sqlx::query_as(
        "SELECT token FROM pending_edits WHERE resource_type = ? AND id = ? LIMIT 1",
    )
    .bind(&reference.resource_type)
    .bind(&reference.id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Delete one journal entry by token.
pub async fn delete_edit(conn: &mut SqliteConnection, token: EditToken) -> Result<()> {
    sqlx::query("DELETE FROM pending_edits WHERE token = ?")
        .bind(token.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete every journal entry for a record.
pub async fn delete_edits_for(conn: &mut SqliteConnection, reference: &RecordRef) -> Result<()> {
    sqlx::query("DELETE FROM pending_edits WHERE resource_type = ? AND id = ?")
        .bind(&reference.resource_type)
        .bind(&reference.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete the whole journal. Tokens are not reused afterwards.
pub async fn clear_edits(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM pending_edits")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
