use chrono::Utc;
use sqlx::MySqlConnection;

use crate::error::ApiError;
use crate::model::notification::{NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, task_id, leave_id, kind, message, is_read, created_at";

pub async fn insert(
    conn: &mut MySqlConnection,
    new: NewNotification,
) -> Result<Notification, ApiError> {
    let created_at = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (recipient_id, task_id, leave_id, kind, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.recipient_id)
    .bind(new.task_id)
    .bind(new.leave_id)
    .bind(new.kind.as_ref())
    .bind(&new.message)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(Notification {
        id: result.last_insert_id(),
        recipient_id: new.recipient_id,
        task_id: new.task_id,
        leave_id: new.leave_id,
        kind: new.kind.to_string(),
        message: new.message,
        is_read: false,
        created_at,
    })
}

pub async fn insert_all(
    conn: &mut MySqlConnection,
    batch: Vec<NewNotification>,
) -> Result<Vec<Notification>, ApiError> {
    let mut stored = Vec::with_capacity(batch.len());
    for new in batch {
        stored.push(insert(conn, new).await?);
    }
    Ok(stored)
}

pub async fn list_for(
    conn: &mut MySqlConnection,
    recipient_id: u64,
    unread_only: bool,
    limit: u32,
    offset: u64,
) -> Result<(Vec<Notification>, i64), ApiError> {
    let filter = if unread_only { " AND is_read = FALSE" } else { "" };

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?{}",
        filter
    ))
    .bind(recipient_id)
    .fetch_one(&mut *conn)
    .await?;

    let data = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {} FROM notifications WHERE recipient_id = ?{} \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        NOTIFICATION_COLUMNS, filter
    ))
    .bind(recipient_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    Ok((data, total))
}

pub async fn count_unread(conn: &mut MySqlConnection, recipient_id: u64) -> Result<i64, ApiError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE",
    )
    .bind(recipient_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Marks `ids` (or everything when `ids` is empty) read. Rows belonging to
/// other recipients are never touched.
pub async fn mark_read(
    conn: &mut MySqlConnection,
    recipient_id: u64,
    ids: &[u64],
) -> Result<u64, ApiError> {
    let result = if ids.is_empty() {
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE")
            .bind(recipient_id)
            .execute(&mut *conn)
            .await?
    } else {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND id IN ({})",
            placeholders
        );
        let mut q = sqlx::query(&sql).bind(recipient_id);
        for id in ids {
            q = q.bind(*id);
        }
        q.execute(&mut *conn).await?
    };
    Ok(result.rows_affected())
}
