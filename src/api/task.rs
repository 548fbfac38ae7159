use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        notification::{NewNotification, NotificationKind},
        task::Task,
    },
    repository::{
        notification as notifications,
        task::{self as tasks, NewTask, TaskFilter, TaskScope},
    },
    services::event_bus::{EventBus, NotificationEvent},
    utils::{pagination, validation},
    workflow::task::{Priority, ReviewDecision, TaskStatus},
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateTask {
    #[schema(example = "Prepare quarterly report")]
    pub title: String,
    pub description: Option<String>,
    /// One or more assignee user ids
    #[schema(example = json!([3, 4]))]
    pub assigned_to: Vec<u64>,
    #[schema(example = "medium", value_type = Option<String>)]
    pub priority: Option<Priority>,
    #[schema(example = "2026-02-01", format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
}

/// Keeps an explicit `null` apart from an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Editable task fields. Status is changed through the workflow endpoints.
/// `description` and `due_date` are cleared by sending `null`.
#[derive(Deserialize, ToSchema)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub assigned_to: Option<Vec<u64>>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(format = "date", value_type = Option<String>)]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Deserialize, ToSchema)]
pub struct CompletionRequestBody {
    #[schema(example = "done")]
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewCompletionBody {
    #[schema(example = "approved", value_type = String)]
    pub decision: ReviewDecision,
    pub review_notes: Option<String>,
    /// Review one assignee's request only; all pending requests otherwise
    pub assignee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetStatusBody {
    /// `on_hold` or `incomplete`
    #[schema(example = "on_hold", value_type = String)]
    pub status: TaskStatus,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct TaskQuery {
    /// Filter by task status
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub status: Option<TaskStatus>,
    /// Filter by priority
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct TaskListResponse {
    pub data: Vec<Task>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

fn clean_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    validation::max_len("title", title, validation::TASK_TITLE_MAX)?;
    Ok(title)
}

fn dedup_assignees(ids: &[u64]) -> Result<Vec<u64>, ApiError> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Err(ApiError::bad_request("A task needs at least one assignee"));
    }
    Ok(ids)
}

async fn ensure_users_exist(conn: &mut MySqlConnection, ids: &[u64]) -> Result<(), ApiError> {
    let missing = tasks::missing_users(conn, ids).await?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Unknown assignee ids: {missing:?}")))
    }
}

async fn load_locked(conn: &mut MySqlConnection, task_id: u64) -> Result<Task, ApiError> {
    tasks::fetch_task(conn, task_id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

async fn list_scoped(
    pool: &MySqlPool,
    scope: TaskScope,
    query: &TaskQuery,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = pagination::resolve(query.page, query.per_page);
    let filter = TaskFilter {
        scope,
        status: query.status,
        priority: query.priority,
        limit: per_page,
        offset,
    };

    let mut conn = pool.acquire().await?;
    let (data, total) = tasks::list_tasks(&mut conn, &filter).await?;

    Ok(HttpResponse::Ok().json(TaskListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Create a task
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTask,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Missing or overlong title, or unknown assignees"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTask>,
) -> ApiResult<HttpResponse> {
    let title = clean_title(&payload.title)?;
    let assignees = dedup_assignees(&payload.assigned_to)?;

    let mut tx = pool.begin().await?;
    ensure_users_exist(&mut tx, &assignees).await?;

    let task_id = tasks::insert_task(
        &mut tx,
        NewTask {
            title,
            description: payload.description.as_deref(),
            created_by: auth.user_id,
            priority: payload.priority.unwrap_or(Priority::Medium),
            due_date: payload.due_date,
            assignees: &assignees,
        },
    )
    .await?;

    let task = tasks::fetch_task(&mut tx, task_id, false)
        .await?
        .ok_or_else(|| ApiError::internal("inserted task vanished"))?;
    tx.commit().await?;

    info!(
        task_id,
        created_by = auth.user_id,
        actor_email = %auth.email,
        assignees = ?assignees,
        "Task created"
    );
    Ok(HttpResponse::Created().json(task))
}

/// List tasks visible to the caller
#[utoipa::path(
    get,
    path = "/api/tasks",
    params(TaskQuery),
    responses(
        (status = 200, description = "Admins see all tasks; others those they created or are assigned to", body = TaskListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let scope = if auth.is_super_user {
        TaskScope::All
    } else {
        TaskScope::VisibleTo(auth.user_id)
    };
    list_scoped(pool.get_ref(), scope, &query).await
}

/// Tasks assigned to a user
#[utoipa::path(
    get,
    path = "/api/tasks/assigned-to/{user_id}",
    params(("user_id" = u64, Path, description = "Assignee user ID"), TaskQuery),
    responses(
        (status = 200, description = "Tasks assigned to the user", body = TaskListResponse),
        (status = 403, description = "Only the user themselves or an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn assigned_to(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_super_user(user_id)?;
    list_scoped(pool.get_ref(), TaskScope::AssignedTo(user_id), &query).await
}

/// Tasks created by a user
#[utoipa::path(
    get,
    path = "/api/tasks/created-by/{user_id}",
    params(("user_id" = u64, Path, description = "Creator user ID"), TaskQuery),
    responses(
        (status = 200, description = "Tasks created by the user", body = TaskListResponse),
        (status = 403, description = "Only the user themselves or an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn created_by(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_super_user(user_id)?;
    list_scoped(pool.get_ref(), TaskScope::CreatedBy(user_id), &query).await
}

/// Get a task
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 403, description = "Not the creator, an assignee or an admin"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn get_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    let task = tasks::fetch_task(&mut conn, task_id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    if !task.state().can_view(auth.actor()) {
        return Err(ApiError::forbidden("You cannot view this task"));
    }

    Ok(HttpResponse::Ok().json(task))
}

/// Edit task fields (creator or admin)
#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = UpdateTask,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Empty or overlong title, or unknown assignees"),
        (status = 403, description = "Only the creator or an admin"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Assignees cannot change after work was submitted")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateTask>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let payload = payload.into_inner();

    let mut tx = pool.begin().await?;
    let task = load_locked(&mut tx, task_id).await?;
    let state = task.state();
    if !state.can_manage(auth.actor()) {
        return Err(ApiError::forbidden("Only the task creator can change this task"));
    }

    let title = payload.title.as_deref().map(clean_title).transpose()?;

    sqlx::query(
        r#"
        UPDATE tasks
        SET title = COALESCE(?, title),
            description = IF(?, ?, description),
            priority = COALESCE(?, priority),
            due_date = IF(?, ?, due_date)
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(payload.description.is_some())
    .bind(payload.description.clone().flatten())
    .bind(payload.priority.map(<&'static str>::from))
    .bind(payload.due_date.is_some())
    .bind(payload.due_date.flatten())
    .bind(task_id)
    .execute(&mut *tx)
    .await?;

    if let Some(assigned_to) = &payload.assigned_to {
        let assignees = dedup_assignees(assigned_to)?;
        if assignees != task.assigned_to {
            if !state.can_reassign() {
                return Err(ApiError::conflict(
                    "Assignees cannot change after completion was requested",
                ));
            }
            ensure_users_exist(&mut tx, &assignees).await?;
            tasks::replace_assignees(&mut tx, task_id, &assignees).await?;
        }
    }

    let task = tasks::fetch_task(&mut tx, task_id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    tx.commit().await?;

    info!(task_id, updated_by = auth.user_id, actor_email = %auth.email, "Task updated");
    Ok(HttpResponse::Ok().json(task))
}

/// Delete a task (creator or admin)
#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 403, description = "Only the creator or an admin"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let task = load_locked(&mut tx, task_id).await?;
    if !task.state().can_manage(auth.actor()) {
        return Err(ApiError::forbidden("Only the task creator can delete this task"));
    }
    tasks::delete_task(&mut tx, task_id).await?;
    tx.commit().await?;

    info!(task_id, deleted_by = auth.user_id, actor_email = %auth.email, "Task deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully deleted"
    })))
}

/// Assignee asks the creator to accept their work
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/completion-request",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = CompletionRequestBody,
    responses(
        (status = 200, description = "Completion requested", body = Task),
        (status = 403, description = "Caller is not an assignee"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Completion already requested or task completed")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn request_completion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    bus: web::Data<EventBus>,
    path: web::Path<u64>,
    payload: web::Json<CompletionRequestBody>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let notes = payload
        .into_inner()
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let mut tx = pool.begin().await?;
    let mut task = load_locked(&mut tx, task_id).await?;

    let mut state = task.state();
    state.request_completion(auth.actor(), notes, Utc::now())?;
    task.apply(state);
    tasks::save_workflow_state(&mut tx, &task).await?;

    let notification = notifications::insert(
        &mut tx,
        NewNotification {
            recipient_id: task.created_by,
            task_id: Some(task_id),
            leave_id: None,
            kind: NotificationKind::CompletionRequested,
            message: format!("Completion requested for \"{}\"", task.title),
        },
    )
    .await?;
    tx.commit().await?;

    bus.publish_all(vec![notification]);
    info!(task_id, requested_by = auth.user_id, status = %task.status, "Completion requested");
    Ok(HttpResponse::Ok().json(task))
}

/// Creator (or admin) approves or rejects pending completion requests
#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}/review-completion",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = ReviewCompletionBody,
    responses(
        (status = 200, description = "Review recorded", body = Task),
        (status = 400, description = "assignee_id is not assigned to the task"),
        (status = 403, description = "Only the task creator can review", body = Object, example = json!({
            "message": "Only the task creator can review completion requests"
        })),
        (status = 404, description = "Task not found"),
        (status = 409, description = "No pending completion request")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn review_completion(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    bus: web::Data<EventBus>,
    path: web::Path<u64>,
    payload: web::Json<ReviewCompletionBody>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();
    let ReviewCompletionBody {
        decision,
        review_notes,
        assignee_id,
    } = payload.into_inner();

    let mut tx = pool.begin().await?;
    let mut task = load_locked(&mut tx, task_id).await?;

    let mut state = task.state();
    let reviewed = state.review_completion(
        auth.actor(),
        decision,
        review_notes,
        assignee_id,
        Utc::now(),
    )?;
    task.apply(state);
    tasks::save_workflow_state(&mut tx, &task).await?;

    let kind = match decision {
        ReviewDecision::Approved => NotificationKind::CompletionApproved,
        ReviewDecision::Rejected => NotificationKind::CompletionRejected,
    };
    let batch = reviewed
        .iter()
        .map(|&recipient_id| NewNotification {
            recipient_id,
            task_id: Some(task_id),
            leave_id: None,
            kind,
            message: format!("Your completion request for \"{}\" was {}", task.title, decision),
        })
        .collect();
    let stored = notifications::insert_all(&mut tx, batch).await?;
    tx.commit().await?;

    bus.publish_all(stored);
    info!(
        task_id,
        reviewer = auth.user_id,
        actor_email = %auth.email,
        decision = %decision,
        reviewed = ?reviewed,
        status = %task.status,
        "Completion reviewed"
    );
    Ok(HttpResponse::Ok().json(task))
}

/// Put a task on hold or resume it (creator or admin)
#[utoipa::path(
    patch,
    path = "/api/tasks/{task_id}/status",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = SetStatusBody,
    responses(
        (status = 200, description = "Status changed", body = Task),
        (status = 403, description = "Only the creator or an admin"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn set_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    bus: web::Data<EventBus>,
    path: web::Path<u64>,
    payload: web::Json<SetStatusBody>,
) -> ApiResult<HttpResponse> {
    let task_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let mut task = load_locked(&mut tx, task_id).await?;

    let mut state = task.state();
    state.set_status(auth.actor(), payload.status)?;
    task.apply(state);
    tasks::save_workflow_state(&mut tx, &task).await?;
    tx.commit().await?;

    for recipient_id in &task.assigned_to {
        bus.publish(
            *recipient_id,
            NotificationEvent::TaskChanged {
                task_id,
                status: task.status.to_string(),
            },
        );
    }
    info!(task_id, changed_by = auth.user_id, status = %task.status, "Task status changed");
    Ok(HttpResponse::Ok().json(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_user, send, test_app};
    use actix_web::{http::StatusCode, test::TestRequest};
    use serde_json::json;

    #[test]
    fn assignee_lists_are_deduplicated_and_required() {
        assert_eq!(dedup_assignees(&[4, 2, 4]).unwrap(), vec![2, 4]);
        assert!(matches!(
            dedup_assignees(&[]).unwrap_err(),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(clean_title("  Ship it ").unwrap(), "Ship it");
        assert!(clean_title(&"t".repeat(200)).is_ok());
        assert!(matches!(
            clean_title(&"t".repeat(201)).unwrap_err(),
            ApiError::BadRequest(ref m) if m == "title must be at most 200 characters"
        ));
        assert!(clean_title("   ").is_err());
    }

    #[test]
    fn update_body_tells_null_from_absent() {
        let absent: UpdateTask = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(absent.description, None);
        assert_eq!(absent.due_date, None);

        let cleared: UpdateTask =
            serde_json::from_str(r#"{"description":null,"due_date":null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        assert_eq!(cleared.due_date, Some(None));

        let set: UpdateTask =
            serde_json::from_str(r#"{"description":"notes","due_date":"2026-03-01"}"#).unwrap();
        assert_eq!(set.description, Some(Some("notes".to_string())));
        assert_eq!(set.due_date, Some(NaiveDate::from_ymd_opt(2026, 3, 1)));
    }

    #[test]
    fn set_status_body_accepts_storage_names() {
        let body: SetStatusBody = serde_json::from_str(r#"{"status":"on_hold"}"#).unwrap();
        assert_eq!(body.status, TaskStatus::OnHold);

        let review: ReviewCompletionBody =
            serde_json::from_str(r#"{"decision":"rejected","review_notes":"redo"}"#).unwrap();
        assert_eq!(review.decision, ReviewDecision::Rejected);
        assert!(review.assignee_id.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn approved_completion_finishes_the_task(pool: MySqlPool) {
        let manager = insert_user(&pool, "manager@company.com", false).await;
        let employee = insert_user(&pool, "employee@company.com", false).await;
        let app = test_app!(pool.clone());

        let (status, task) = send!(
            app,
            TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({"title": "Quarterly report", "assigned_to": [employee]})),
            as manager, false
        );
        assert_eq!(status, StatusCode::CREATED);
        let task_id = task["id"].as_u64().unwrap();

        let (status, task) = send!(
            app,
            TestRequest::post()
                .uri(&format!("/api/tasks/{task_id}/completion-request"))
                .set_json(json!({"notes": "done"})),
            as employee, false
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "completion_requested");
        assert_eq!(task["completion_request"]["requested_by"], employee);

        let (_, count) = send!(
            app,
            TestRequest::get().uri("/api/notifications/count"),
            as manager, false
        );
        assert_eq!(count["unread"], 1);

        let (_, pending) = send!(
            app,
            TestRequest::get().uri("/api/notifications/pending-approvals"),
            as manager, false
        );
        assert_eq!(pending["total"], 1);
        assert_eq!(pending["data"][0]["id"], task_id);

        let (status, task) = send!(
            app,
            TestRequest::patch()
                .uri(&format!("/api/tasks/{task_id}/review-completion"))
                .set_json(json!({"decision": "approved", "review_notes": "great"})),
            as manager, false
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "completed");
        assert_eq!(task["review"]["reviewed_by"], manager);
        assert_eq!(task["review"]["status"], "approved");
        assert_eq!(task["assignees"][0]["status"], "completed");

        let (_, inbox) = send!(
            app,
            TestRequest::get().uri("/api/notifications"),
            as employee, false
        );
        assert_eq!(inbox["total"], 1);
        assert_eq!(inbox["data"][0]["kind"], "completion_approved");
        assert_eq!(inbox["data"][0]["task_id"], task_id);

        let (_, pending) = send!(
            app,
            TestRequest::get().uri("/api/notifications/pending-approvals"),
            as manager, false
        );
        assert_eq!(pending["total"], 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_the_creator_reviews_completion(pool: MySqlPool) {
        let manager = insert_user(&pool, "owner@company.com", false).await;
        let employee = insert_user(&pool, "worker@company.com", false).await;
        let colleague = insert_user(&pool, "colleague@company.com", false).await;
        let app = test_app!(pool.clone());

        let (_, task) = send!(
            app,
            TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({"title": "Audit", "assigned_to": [employee]})),
            as manager, false
        );
        let task_id = task["id"].as_u64().unwrap();
        send!(
            app,
            TestRequest::post()
                .uri(&format!("/api/tasks/{task_id}/completion-request"))
                .set_json(json!({})),
            as employee, false
        );

        let (status, body) = send!(
            app,
            TestRequest::patch()
                .uri(&format!("/api/tasks/{task_id}/review-completion"))
                .set_json(json!({"decision": "approved"})),
            as colleague, false
        );
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Only the task creator can review completion requests");

        let (_, task) = send!(
            app,
            TestRequest::get().uri(&format!("/api/tasks/{task_id}")),
            as manager, false
        );
        assert_eq!(task["status"], "completion_requested");
        assert!(task["review"].is_null());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn task_completes_once_every_assignee_is_approved(pool: MySqlPool) {
        let manager = insert_user(&pool, "lead@company.com", false).await;
        let first = insert_user(&pool, "first@company.com", false).await;
        let second = insert_user(&pool, "second@company.com", false).await;
        let app = test_app!(pool.clone());

        let (_, task) = send!(
            app,
            TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({"title": "Migration", "assigned_to": [first, second]})),
            as manager, false
        );
        let task_id = task["id"].as_u64().unwrap();
        let request_uri = format!("/api/tasks/{task_id}/completion-request");
        let review_uri = format!("/api/tasks/{task_id}/review-completion");

        send!(app, TestRequest::post().uri(&request_uri).set_json(json!({})), as first, false);
        let (_, task) = send!(
            app,
            TestRequest::patch()
                .uri(&review_uri)
                .set_json(json!({"decision": "approved", "assignee_id": first})),
            as manager, false
        );
        assert_eq!(task["status"], "incomplete");
        assert_eq!(task["assignees"][0]["status"], "completed");
        assert_eq!(task["assignees"][1]["status"], "incomplete");

        send!(app, TestRequest::post().uri(&request_uri).set_json(json!({})), as second, false);
        let (_, task) = send!(
            app,
            TestRequest::patch()
                .uri(&review_uri)
                .set_json(json!({"decision": "approved"})),
            as manager, false
        );
        assert_eq!(task["status"], "completed");

        let stored: String = sqlx::query_scalar("SELECT status FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "completed");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn creator_parks_and_resumes_a_task(pool: MySqlPool) {
        let manager = insert_user(&pool, "planner@company.com", false).await;
        let employee = insert_user(&pool, "doer@company.com", false).await;
        let app = test_app!(pool.clone());

        let (_, task) = send!(
            app,
            TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({"title": "Refactor", "assigned_to": [employee]})),
            as manager, false
        );
        let status_uri = format!("/api/tasks/{}/status", task["id"]);

        let (status, _) = send!(
            app,
            TestRequest::patch().uri(&status_uri).set_json(json!({"status": "on_hold"})),
            as employee, false
        );
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, task) = send!(
            app,
            TestRequest::patch().uri(&status_uri).set_json(json!({"status": "on_hold"})),
            as manager, false
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "on_hold");

        let (status, _) = send!(
            app,
            TestRequest::patch().uri(&status_uri).set_json(json!({"status": "completed"})),
            as manager, false
        );
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, task) = send!(
            app,
            TestRequest::patch().uri(&status_uri).set_json(json!({"status": "incomplete"})),
            as manager, false
        );
        assert_eq!(task["status"], "incomplete");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn task_lists_are_scoped_to_the_caller(pool: MySqlPool) {
        let manager = insert_user(&pool, "boss@company.com", false).await;
        let employee = insert_user(&pool, "staff@company.com", false).await;
        let outsider = insert_user(&pool, "outsider@company.com", false).await;
        let admin = insert_user(&pool, "root@company.com", true).await;
        let app = test_app!(pool.clone());

        send!(
            app,
            TestRequest::post()
                .uri("/api/tasks")
                .set_json(json!({"title": "Budget", "assigned_to": [employee]})),
            as manager, false
        );

        let (_, list) = send!(app, TestRequest::get().uri("/api/tasks"), as outsider, false);
        assert_eq!(list["total"], 0);

        let (_, list) = send!(app, TestRequest::get().uri("/api/tasks"), as employee, false);
        assert_eq!(list["total"], 1);

        let (_, list) = send!(
            app,
            TestRequest::get().uri(&format!("/api/tasks/assigned-to/{employee}")),
            as employee, false
        );
        assert_eq!(list["total"], 1);
        assert_eq!(list["data"][0]["title"], "Budget");

        let (_, list) = send!(
            app,
            TestRequest::get().uri(&format!("/api/tasks/created-by/{manager}")),
            as admin, true
        );
        assert_eq!(list["total"], 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn explicit_null_clears_task_fields(pool: MySqlPool) {
        let manager = insert_user(&pool, "editor@company.com", false).await;
        let employee = insert_user(&pool, "reader@company.com", false).await;
        let app = test_app!(pool.clone());

        let (_, task) = send!(
            app,
            TestRequest::post().uri("/api/tasks").set_json(json!({
                "title": "Docs",
                "description": "first draft",
                "assigned_to": [employee],
                "due_date": "2026-05-01"
            })),
            as manager, false
        );
        let task_uri = format!("/api/tasks/{}", task["id"]);

        let (status, task) = send!(
            app,
            TestRequest::patch()
                .uri(&task_uri)
                .set_json(json!({"description": null, "priority": "high"})),
            as manager, false
        );
        assert_eq!(status, StatusCode::OK);
        assert!(task["description"].is_null());
        assert_eq!(task["due_date"], "2026-05-01");
        assert_eq!(task["priority"], "high");

        let (_, task) = send!(
            app,
            TestRequest::patch().uri(&task_uri).set_json(json!({"due_date": null})),
            as manager, false
        );
        assert!(task["due_date"].is_null());

        let (status, _) = send!(
            app,
            TestRequest::patch()
                .uri(&task_uri)
                .set_json(json!({"title": "t".repeat(201)})),
            as manager, false
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
