use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    CompletionRequested,
    CompletionApproved,
    CompletionRejected,
    LeaveApproved,
    LeaveRejected,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: u64,
    pub recipient_id: u64,
    pub task_id: Option<u64>,
    pub leave_id: Option<u64>,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// A notification that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: u64,
    pub task_id: Option<u64>,
    pub leave_id: Option<u64>,
    pub kind: NotificationKind,
    pub message: String,
}
