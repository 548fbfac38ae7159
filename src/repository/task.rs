use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::MySqlConnection;

use crate::error::ApiError;
use crate::model::task::{AssigneeRow, TASK_COLUMNS, Task, TaskRow};
use crate::workflow::task::{Priority, TaskStatus};

/// Which tasks a listing may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Created by or assigned to the user.
    VisibleTo(u64),
    AssignedTo(u64),
    CreatedBy(u64),
}

#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub scope: TaskScope,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub limit: u32,
    pub offset: u64,
}

pub struct NewTask<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub created_by: u64,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub assignees: &'a [u64],
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
}

fn where_clause(filter: &TaskFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    match filter.scope {
        TaskScope::All => {}
        TaskScope::VisibleTo(uid) => {
            where_sql.push_str(
                " AND (t.created_by = ? OR EXISTS \
                 (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = ?))",
            );
            args.push(FilterValue::U64(uid));
            args.push(FilterValue::U64(uid));
        }
        TaskScope::AssignedTo(uid) => {
            where_sql.push_str(
                " AND EXISTS (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = ?)",
            );
            args.push(FilterValue::U64(uid));
        }
        TaskScope::CreatedBy(uid) => {
            where_sql.push_str(" AND t.created_by = ?");
            args.push(FilterValue::U64(uid));
        }
    }

    if let Some(status) = filter.status {
        where_sql.push_str(" AND t.status = ?");
        args.push(FilterValue::Str(status.into()));
    }

    if let Some(priority) = filter.priority {
        where_sql.push_str(" AND t.priority = ?");
        args.push(FilterValue::Str(priority.into()));
    }

    (where_sql, args)
}

/// Returns `(page of tasks, total matching)`.
pub async fn list_tasks(
    conn: &mut MySqlConnection,
    filter: &TaskFilter,
) -> Result<(Vec<Task>, i64), ApiError> {
    let (where_sql, args) = where_clause(filter);

    let count_sql = format!("SELECT COUNT(*) FROM tasks t{}", where_sql);
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }
    let total = count_q.fetch_one(&mut *conn).await?;

    let data_sql = format!(
        "SELECT {} FROM tasks t{} ORDER BY t.created_at DESC, t.id DESC LIMIT ? OFFSET ?",
        TASK_COLUMNS, where_sql
    );
    let mut data_q = sqlx::query_as::<_, TaskRow>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let rows = data_q
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&mut *conn)
        .await?;

    let tasks = attach_assignees(conn, rows).await?;
    Ok((tasks, total))
}

async fn attach_assignees(
    conn: &mut MySqlConnection,
    rows: Vec<TaskRow>,
) -> Result<Vec<Task>, ApiError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; rows.len()].join(", ");
    let sql = format!(
        "SELECT task_id, user_id, status, notes, requested_at, reviewed_at, review_notes \
         FROM task_assignees WHERE task_id IN ({}) ORDER BY task_id, user_id",
        placeholders
    );
    let mut q = sqlx::query_as::<_, AssigneeRow>(&sql);
    for row in &rows {
        q = q.bind(row.id);
    }

    let mut by_task: HashMap<u64, Vec<AssigneeRow>> = HashMap::new();
    for assignee in q.fetch_all(&mut *conn).await? {
        by_task.entry(assignee.task_id).or_default().push(assignee);
    }

    rows.into_iter()
        .map(|row| {
            let assignees = by_task.remove(&row.id).unwrap_or_default();
            Task::from_rows(row, assignees).map_err(ApiError::from)
        })
        .collect()
}

/// Loads one task. With `lock` the task and its sub-records are locked
/// until the surrounding transaction ends.
pub async fn fetch_task(
    conn: &mut MySqlConnection,
    task_id: u64,
    lock: bool,
) -> Result<Option<Task>, ApiError> {
    let suffix = if lock { " FOR UPDATE" } else { "" };

    let task_sql = format!("SELECT {} FROM tasks t WHERE t.id = ?{}", TASK_COLUMNS, suffix);
    let row = sqlx::query_as::<_, TaskRow>(&task_sql)
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let assignee_sql = format!(
        "SELECT task_id, user_id, status, notes, requested_at, reviewed_at, review_notes \
         FROM task_assignees WHERE task_id = ? ORDER BY user_id{}",
        suffix
    );
    let assignees = sqlx::query_as::<_, AssigneeRow>(&assignee_sql)
        .bind(task_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(Task::from_rows(row, assignees)?))
}

pub async fn insert_task(conn: &mut MySqlConnection, new: NewTask<'_>) -> Result<u64, ApiError> {
    let result = sqlx::query(
        r#"
        INSERT INTO tasks (title, description, created_by, priority, due_date, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.title)
    .bind(new.description)
    .bind(new.created_by)
    .bind(new.priority.as_ref())
    .bind(new.due_date)
    .bind(TaskStatus::Incomplete.as_ref())
    .execute(&mut *conn)
    .await?;

    let task_id = result.last_insert_id();
    add_assignees(conn, task_id, new.assignees).await?;
    Ok(task_id)
}

async fn add_assignees(
    conn: &mut MySqlConnection,
    task_id: u64,
    user_ids: &[u64],
) -> Result<(), ApiError> {
    for user_id in user_ids {
        sqlx::query("INSERT IGNORE INTO task_assignees (task_id, user_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(*user_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Makes the assignee set equal to `user_ids`, keeping the sub-records of
/// assignees that stay.
pub async fn replace_assignees(
    conn: &mut MySqlConnection,
    task_id: u64,
    user_ids: &[u64],
) -> Result<(), ApiError> {
    if user_ids.is_empty() {
        return Err(ApiError::bad_request("A task needs at least one assignee"));
    }

    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!(
        "DELETE FROM task_assignees WHERE task_id = ? AND user_id NOT IN ({})",
        placeholders
    );
    let mut q = sqlx::query(&sql).bind(task_id);
    for user_id in user_ids {
        q = q.bind(*user_id);
    }
    q.execute(&mut *conn).await?;

    add_assignees(conn, task_id, user_ids).await
}

/// Persists the workflow part of a task: status, completion request,
/// review and every assignee sub-record.
pub async fn save_workflow_state(conn: &mut MySqlConnection, task: &Task) -> Result<(), ApiError> {
    let request = task.completion_request.as_ref();
    let review = task.review.as_ref();

    sqlx::query(
        r#"
        UPDATE tasks
        SET status = ?,
            completion_notes = ?,
            completion_requested_at = ?,
            completion_requested_by = ?,
            review_status = ?,
            reviewed_by = ?,
            reviewed_at = ?,
            review_notes = ?
        WHERE id = ?
        "#,
    )
    .bind(task.status.as_ref())
    .bind(request.and_then(|r| r.notes.as_deref()))
    .bind(request.map(|r| r.requested_at))
    .bind(request.map(|r| r.requested_by))
    .bind(review.map(|r| r.status.as_ref()))
    .bind(review.map(|r| r.reviewed_by))
    .bind(review.map(|r| r.reviewed_at))
    .bind(review.and_then(|r| r.review_notes.as_deref()))
    .bind(task.id)
    .execute(&mut *conn)
    .await?;

    for assignee in &task.assignees {
        sqlx::query(
            r#"
            UPDATE task_assignees
            SET status = ?, notes = ?, requested_at = ?, reviewed_at = ?, review_notes = ?
            WHERE task_id = ? AND user_id = ?
            "#,
        )
        .bind(assignee.status.as_ref())
        .bind(assignee.notes.as_deref())
        .bind(assignee.requested_at)
        .bind(assignee.reviewed_at)
        .bind(assignee.review_notes.as_deref())
        .bind(task.id)
        .bind(assignee.user_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn delete_task(conn: &mut MySqlConnection, task_id: u64) -> Result<u64, ApiError> {
    sqlx::query("DELETE FROM notifications WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Ids from `user_ids` that have no user row.
pub async fn missing_users(
    conn: &mut MySqlConnection,
    user_ids: &[u64],
) -> Result<Vec<u64>, ApiError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!("SELECT id FROM users WHERE id IN ({})", placeholders);
    let mut q = sqlx::query_scalar::<_, u64>(&sql);
    for user_id in user_ids {
        q = q.bind(*user_id);
    }
    let found = q.fetch_all(&mut *conn).await?;

    Ok(user_ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect())
}
