use crate::{
    api::task::TaskListResponse,
    auth::auth::AuthUser,
    config::Config,
    error::ApiResult,
    model::notification::Notification,
    repository::{
        notification as notifications,
        task::{self as tasks, TaskFilter, TaskScope},
    },
    services::event_bus::EventBus,
    utils::pagination,
    workflow::task::TaskStatus,
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct NotificationQuery {
    /// Only unread notifications
    pub unread_only: Option<bool>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<Notification>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct MarkReadBody {
    /// Notification ids to mark read; all of the caller's when omitted
    #[serde(default)]
    pub ids: Vec<u64>,
}

/// The caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Paginated notifications", body = NotificationListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = pagination::resolve(query.page, query.per_page);
    let mut conn = pool.acquire().await?;

    let (data, total) = notifications::list_for(
        &mut conn,
        auth.user_id,
        query.unread_only.unwrap_or(false),
        per_page,
        offset,
    )
    .await?;

    Ok(HttpResponse::Ok().json(NotificationListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Unread notification count
#[utoipa::path(
    get,
    path = "/api/notifications/count",
    responses(
        (status = 200, description = "Unread count", body = Object, example = json!({"unread": 3})),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let mut conn = pool.acquire().await?;
    let unread = notifications::count_unread(&mut conn, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "unread": unread })))
}

/// Mark notifications read
#[utoipa::path(
    patch,
    path = "/api/notifications/read",
    request_body = MarkReadBody,
    responses(
        (status = 200, description = "Number of notifications marked", body = Object, example = json!({"updated": 2})),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<MarkReadBody>,
) -> ApiResult<HttpResponse> {
    let mut conn = pool.acquire().await?;
    let updated = notifications::mark_read(&mut conn, auth.user_id, &payload.ids).await?;
    debug!(user_id = auth.user_id, updated, "Notifications marked read");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": updated })))
}

/// Completion requests waiting for the caller's review
#[utoipa::path(
    get,
    path = "/api/notifications/pending-approvals",
    params(
        ("page" = Option<u32>, Query, description = "Page number"),
        ("per_page" = Option<u32>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Tasks created by the caller with status completion_requested", body = TaskListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn pending_approvals(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = pagination::resolve(query.page, query.per_page);
    let filter = TaskFilter {
        scope: TaskScope::CreatedBy(auth.user_id),
        status: Some(TaskStatus::CompletionRequested),
        priority: None,
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

fn sse_frame(event: &str, data: &str) -> web::Bytes {
    web::Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

/// Server-sent events push channel for the caller's notifications
#[utoipa::path(
    get,
    path = "/api/notifications/stream",
    responses(
        (status = 200, description = "text/event-stream of notification events"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn stream(
    auth: AuthUser,
    bus: web::Data<EventBus>,
    config: web::Data<Config>,
) -> HttpResponse {
    let user_id = auth.user_id;
    let mut rx = bus.subscribe();
    let mut keepalive =
        tokio::time::interval(Duration::from_secs(config.sse_keepalive_secs.max(1)));

    let body = async_stream::stream! {
        yield Ok::<_, actix_web::Error>(sse_frame("ready", "{}"));

        loop {
            let frame = tokio::select! {
                received = rx.recv() => match received {
                    Ok(msg) if msg.recipient_id == user_id => match serde_json::to_string(&msg.event) {
                        Ok(json) => Some(sse_frame("notification", &json)),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode notification event");
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(RecvError::Lagged(skipped)) => {
                        // the client should refetch its list
                        warn!(user_id, skipped, "Notification stream lagged");
                        Some(sse_frame("resync", "{}"))
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = keepalive.tick() => Some(web::Bytes::from_static(b": keep-alive\n\n")),
            };

            if let Some(frame) = frame {
                yield Ok(frame);
            }
        }
    };

    debug!(user_id, "Notification stream opened");
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::notification::{NewNotification, NotificationKind},
        testing::{insert_user, send, test_app},
    };
    use actix_web::{http::StatusCode, test::TestRequest};
    use serde_json::json;

    #[test]
    fn frames_follow_event_stream_format() {
        let frame = sse_frame("notification", r#"{"id":1}"#);
        assert_eq!(&frame[..], b"event: notification\ndata: {\"id\":1}\n\n");
    }

    #[test]
    fn mark_read_defaults_to_all() {
        let body: MarkReadBody = serde_json::from_str("{}").unwrap();
        assert!(body.ids.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn marking_read_only_touches_the_callers_inbox(pool: MySqlPool) {
        let reader = insert_user(&pool, "inbox@company.com", false).await;
        let other = insert_user(&pool, "someone-else@company.com", false).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut ids = Vec::new();
        for recipient_id in [reader, reader, other] {
            let stored = notifications::insert(
                &mut conn,
                NewNotification {
                    recipient_id,
                    task_id: None,
                    leave_id: None,
                    kind: NotificationKind::LeaveApproved,
                    message: "Your leave was approved".to_string(),
                },
            )
            .await
            .unwrap();
            ids.push(stored.id);
        }
        drop(conn);
        let app = test_app!(pool.clone());

        let (status, body) = send!(
            app,
            TestRequest::patch()
                .uri("/api/notifications/read")
                .set_json(json!({"ids": [ids[0], ids[2]]})),
            as reader, false
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 1);

        let (_, unread) = send!(
            app,
            TestRequest::get().uri("/api/notifications?unread_only=true"),
            as reader, false
        );
        assert_eq!(unread["total"], 1);
        assert_eq!(unread["data"][0]["id"], ids[1]);

        send!(
            app,
            TestRequest::patch().uri("/api/notifications/read").set_json(json!({})),
            as reader, false
        );
        let (_, count) = send!(
            app,
            TestRequest::get().uri("/api/notifications/count"),
            as reader, false
        );
        assert_eq!(count["unread"], 0);

        let (_, count) = send!(
            app,
            TestRequest::get().uri("/api/notifications/count"),
            as other, false
        );
        assert_eq!(count["unread"], 1);
    }
}
