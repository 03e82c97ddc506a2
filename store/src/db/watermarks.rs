//! Database operations for the sync watermarks table.

use crate::error::Result;
use sqlx::SqliteConnection;

/// Set the watermark of a resource type, replacing any previous value.
pub async fn set_watermark(
    conn: &mut SqliteConnection,
    resource_type: &str,
    timestamp: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_watermarks (resource_type, timestamp)
        VALUES (?, ?)
        ON CONFLICT (resource_type) DO UPDATE SET timestamp = excluded.timestamp
        "#,
    )
    .bind(resource_type)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Get the watermark of a resource type.
pub async fn get_watermark(
    conn: &mut SqliteConnection,
    resource_type: &str,
) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT timestamp FROM sync_watermarks WHERE resource_type = ?")
            .bind(resource_type)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(|(timestamp,)| timestamp))
}

/// Delete every watermark.
pub async fn clear_watermarks(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM sync_watermarks")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
