use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        leave_request::{LEAVE_COLUMNS, LeaveRequest},
        notification::{NewNotification, NotificationKind},
    },
    repository::notification as notifications,
    services::event_bus::EventBus,
    utils::{pagination, validation},
    workflow::leave::{LeaveStatus, leave_days},
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ApplyLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Family event")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LeaveDecision {
    /// `approved` or `rejected`
    #[schema(example = "approved", value_type = String)]
    pub status: LeaveStatus,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    #[schema(example = 123)]
    /// Filter by applicant (admins only; others always see their own)
    pub user_id: Option<u64>,
    #[schema(example = "pending")]
    /// Filter by leave status
    pub status: Option<String>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    #[schema(example = 10)]
    /// Pagination per page number
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

async fn fetch_leave(
    conn: &mut MySqlConnection,
    leave_id: u64,
    lock: bool,
) -> Result<Option<LeaveRequest>, ApiError> {
    let sql = format!(
        "SELECT {} FROM leave_requests WHERE id = ?{}",
        LEAVE_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    let leave = sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(leave_id)
        .fetch_optional(conn)
        .await?;
    Ok(leave)
}

fn clean_reason(reason: &str) -> Result<&str, ApiError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("reason must not be empty"));
    }
    validation::max_len("reason", reason, validation::LEAVE_REASON_MAX)?;
    Ok(reason)
}

/* =========================
Apply for leave
========================= */
#[utoipa::path(
    post,
    path = "/api/leaves/apply-leave/{user_id}",
    params(("user_id" = u64, Path, description = "Applicant user ID")),
    request_body(content = ApplyLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Applicant not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn apply_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ApplyLeave>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_super_user(user_id)?;

    // 1️⃣ validate
    let days = leave_days(payload.start_date, payload.end_date)?;
    let reason = clean_reason(&payload.reason)?;

    // 2️⃣ insert request
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (user_id, start_date, end_date, reason, leave_days, leave_status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(reason)
    .bind(days)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, user_id, "Failed to create leave request");
        ApiError::from(e)
    })?;

    let leave = fetch_leave(&mut tx, result.last_insert_id(), false)
        .await?
        .ok_or_else(|| ApiError::internal("inserted leave vanished"))?;
    tx.commit().await?;

    info!(
        leave_id = leave.id,
        user_id,
        days,
        actor_email = %auth.email,
        "Leave requested"
    );
    Ok(HttpResponse::Created().json(leave))
}

/* =========================
Approve / reject leave (admin)
========================= */
#[utoipa::path(
    patch,
    path = "/api/leaves/approve-leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to decide")),
    request_body = LeaveDecision,
    responses(
        (status = 200, description = "Leave decided", body = LeaveRequest),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed", body = Object, example = json!({
            "message": "Cannot move from 'approved' to 'rejected'"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    bus: web::Data<EventBus>,
    path: web::Path<u64>,
    payload: web::Json<LeaveDecision>,
) -> ApiResult<HttpResponse> {
    auth.require_super_user()?;
    let leave_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let mut leave = fetch_leave(&mut tx, leave_id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    let current = LeaveStatus::from_str(&leave.leave_status)?;
    let next = current.decide(payload.status)?;
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE leave_requests
        SET leave_status = ?, approved_by = ?, approved_at = ?
        WHERE id = ? AND leave_status = ?
        "#,
    )
    .bind(next.as_ref())
    .bind(auth.user_id)
    .bind(now)
    .bind(leave_id)
    .bind(current.as_ref())
    .execute(&mut *tx)
    .await?;

    let kind = match next {
        LeaveStatus::Approved => NotificationKind::LeaveApproved,
        _ => NotificationKind::LeaveRejected,
    };
    let notification = notifications::insert(
        &mut tx,
        NewNotification {
            recipient_id: leave.user_id,
            task_id: None,
            leave_id: Some(leave_id),
            kind,
            message: format!(
                "Your leave from {} to {} was {}",
                leave.start_date, leave.end_date, next
            ),
        },
    )
    .await?;
    tx.commit().await?;

    bus.publish_all(vec![notification]);
    info!(
        leave_id,
        approver = auth.user_id,
        actor_email = %auth.email,
        status = %next,
        "Leave decided"
    );

    leave.leave_status = next.to_string();
    leave.approved_by = Some(auth.user_id);
    leave.approved_at = Some(now);
    Ok(HttpResponse::Ok().json(leave))
}

/// Get a leave application
#[utoipa::path(
    get,
    path = "/api/leaves/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 403, description = "Not your leave"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    let leave = fetch_leave(&mut conn, leave_id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;
    auth.require_self_or_super_user(leave.user_id)?;

    Ok(HttpResponse::Ok().json(leave))
}

/// List leave applications. Admins see everyone's, others their own.
#[utoipa::path(
    get,
    path = "/api/leaves/leave-data",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_data(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = pagination::resolve(query.page, query.per_page);

    let user_filter = if auth.is_super_user {
        query.user_id
    } else {
        Some(auth.user_id)
    };

    let status_filter = query
        .status
        .as_deref()
        .map(|s| {
            LeaveStatus::from_str(s)
                .map_err(|_| ApiError::bad_request("status must be pending, approved or rejected"))
        })
        .transpose()?;

    let mut where_sql = String::from(" WHERE 1=1");
    if user_filter.is_some() {
        where_sql.push_str(" AND user_id = ?");
    }
    if status_filter.is_some() {
        where_sql.push_str(" AND leave_status = ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", where_sql);
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(uid) = user_filter {
        count_q = count_q.bind(uid);
    }
    if let Some(status) = status_filter {
        count_q = count_q.bind(status.as_ref().to_string());
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    let data_sql = format!(
        "SELECT {} FROM leave_requests{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        LEAVE_COLUMNS, where_sql
    );
    let mut data_q = sqlx::query_as::<_, LeaveRequest>(&data_sql);
    if let Some(uid) = user_filter {
        data_q = data_q.bind(uid);
    }
    if let Some(status) = status_filter {
        data_q = data_q.bind(status.as_ref().to_string());
    }
    let leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data: leaves,
        page,
        per_page,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_user, send, test_app};
    use actix_web::{http::StatusCode, test::TestRequest};
    use serde_json::json;

    #[test]
    fn reasons_are_trimmed_and_bounded() {
        assert_eq!(clean_reason(" Family event\n").unwrap(), "Family event");
        assert!(clean_reason(&"r".repeat(500)).is_ok());
        assert!(matches!(
            clean_reason(&"r".repeat(501)).unwrap_err(),
            ApiError::BadRequest(ref m) if m == "reason must be at most 500 characters"
        ));
        assert!(clean_reason(" ").is_err());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn leave_is_decided_once_and_the_applicant_is_told(pool: MySqlPool) {
        let employee = insert_user(&pool, "traveller@company.com", false).await;
        let admin = insert_user(&pool, "hr@company.com", true).await;
        let app = test_app!(pool.clone());

        let (status, leave) = send!(
            app,
            TestRequest::post()
                .uri(&format!("/api/leaves/apply-leave/{employee}"))
                .set_json(json!({
                    "start_date": "2026-03-02",
                    "end_date": "2026-03-04",
                    "reason": "Family event"
                })),
            as employee, false
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(leave["leave_days"], 3);
        assert_eq!(leave["leave_status"], "pending");
        let decide_uri = format!("/api/leaves/approve-leave/{}", leave["id"]);

        let (status, leave) = send!(
            app,
            TestRequest::patch().uri(&decide_uri).set_json(json!({"status": "approved"})),
            as admin, true
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(leave["leave_status"], "approved");
        assert_eq!(leave["approved_by"], admin);

        let (status, body) = send!(
            app,
            TestRequest::patch().uri(&decide_uri).set_json(json!({"status": "rejected"})),
            as admin, true
        );
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Cannot move from 'approved' to 'rejected'");

        let (_, inbox) = send!(
            app,
            TestRequest::get().uri("/api/notifications"),
            as employee, false
        );
        assert_eq!(inbox["total"], 1);
        assert_eq!(inbox["data"][0]["kind"], "leave_approved");
        assert_eq!(inbox["data"][0]["leave_id"], leave["id"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn leave_for_an_unknown_user_is_not_found(pool: MySqlPool) {
        let admin = insert_user(&pool, "people-ops@company.com", true).await;
        let app = test_app!(pool.clone());

        let (status, body) = send!(
            app,
            TestRequest::post()
                .uri("/api/leaves/apply-leave/999999")
                .set_json(json!({
                    "start_date": "2026-03-02",
                    "end_date": "2026-03-02",
                    "reason": "Conference"
                })),
            as admin, true
        );
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Referenced resource not found");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn overlong_reason_is_rejected_before_insert(pool: MySqlPool) {
        let employee = insert_user(&pool, "verbose@company.com", false).await;
        let app = test_app!(pool.clone());

        let (status, _) = send!(
            app,
            TestRequest::post()
                .uri(&format!("/api/leaves/apply-leave/{employee}"))
                .set_json(json!({
                    "start_date": "2026-03-02",
                    "end_date": "2026-03-02",
                    "reason": "r".repeat(501)
                })),
            as employee, false
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leave_requests")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }
}
