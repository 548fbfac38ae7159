use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "user_id": 1000,
    "start_date": "2026-01-01",
    "end_date": "2026-01-03",
    "reason": "Family event",
    "leave_days": 3,
    "leave_status": "pending",
    "approved_by": null,
    "approved_at": null,
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub reason: String,
    pub leave_days: u32,
    pub leave_status: String,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const LEAVE_COLUMNS: &str = "id, user_id, start_date, end_date, reason, leave_days, \
     leave_status, approved_by, approved_at, created_at";
