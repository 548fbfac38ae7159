use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::workflow::task::{
    AssigneeRecord, AssigneeStatus, CompletionRequest, Priority, Review, ReviewDecision,
    TaskState, TaskStatus,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: u64,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub completion_notes: Option<String>,
    pub completion_requested_at: Option<DateTime<Utc>>,
    pub completion_requested_by: Option<u64>,
    pub review_status: Option<String>,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.created_by, t.priority, \
     t.due_date, t.status, t.completion_notes, t.completion_requested_at, \
     t.completion_requested_by, t.review_status, t.reviewed_by, t.reviewed_at, t.review_notes, \
     t.created_at, t.updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssigneeRow {
    pub task_id: u64,
    pub user_id: u64,
    pub status: String,
    pub notes: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

impl TryFrom<AssigneeRow> for AssigneeRecord {
    type Error = strum::ParseError;

    fn try_from(row: AssigneeRow) -> Result<Self, Self::Error> {
        Ok(AssigneeRecord {
            user_id: row.user_id,
            status: AssigneeStatus::from_str(&row.status)?,
            notes: row.notes,
            requested_at: row.requested_at,
            reviewed_at: row.reviewed_at,
            review_notes: row.review_notes,
        })
    }
}

/// A task as returned by the API, assignee sub-records included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: u64,
    pub assigned_to: Vec<u64>,
    pub priority: Priority,
    #[schema(value_type = Option<String>, format = "date")]
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub completion_request: Option<CompletionRequest>,
    pub review: Option<Review>,
    pub assignees: Vec<AssigneeRecord>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn from_rows(row: TaskRow, assignees: Vec<AssigneeRow>) -> Result<Self, strum::ParseError> {
        let assignees = assignees
            .into_iter()
            .map(AssigneeRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let completion_request = match (row.completion_requested_at, row.completion_requested_by) {
            (Some(requested_at), Some(requested_by)) => Some(CompletionRequest {
                notes: row.completion_notes,
                requested_at,
                requested_by,
            }),
            _ => None,
        };

        let review = match (row.review_status.as_deref(), row.reviewed_by, row.reviewed_at) {
            (Some(status), Some(reviewed_by), Some(reviewed_at)) => Some(Review {
                status: ReviewDecision::from_str(status)?,
                reviewed_by,
                reviewed_at,
                review_notes: row.review_notes,
            }),
            _ => None,
        };

        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            created_by: row.created_by,
            assigned_to: assignees.iter().map(|a| a.user_id).collect(),
            priority: Priority::from_str(&row.priority)?,
            due_date: row.due_date,
            status: TaskStatus::from_str(&row.status)?,
            completion_request,
            review,
            assignees,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub fn state(&self) -> TaskState {
        TaskState {
            created_by: self.created_by,
            status: self.status,
            completion_request: self.completion_request.clone(),
            review: self.review.clone(),
            assignees: self.assignees.clone(),
        }
    }

    pub fn apply(&mut self, state: TaskState) {
        self.status = state.status;
        self.completion_request = state.completion_request;
        self.review = state.review;
        self.assignees = state.assignees;
    }
}
