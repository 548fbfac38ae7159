use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};
use utoipa::ToSchema;

use super::{Actor, WorkflowError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Incomplete,
    CompletionRequested,
    Completed,
    OnHold,
}

/// Status of one assignee's share of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssigneeStatus {
    Incomplete,
    CompletionRequested,
    Completed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CompletionRequest {
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub requested_at: DateTime<Utc>,
    pub requested_by: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Review {
    pub status: ReviewDecision,
    pub reviewed_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub reviewed_at: DateTime<Utc>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AssigneeRecord {
    pub user_id: u64,
    pub status: AssigneeStatus,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub requested_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

impl AssigneeRecord {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            status: AssigneeStatus::Incomplete,
            notes: None,
            requested_at: None,
            reviewed_at: None,
            review_notes: None,
        }
    }
}

/// The mutable part of a task that the completion workflow operates on.
///
/// Every operation either applies completely or returns an error and leaves
/// the state untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub created_by: u64,
    pub status: TaskStatus,
    pub completion_request: Option<CompletionRequest>,
    pub review: Option<Review>,
    pub assignees: Vec<AssigneeRecord>,
}

impl TaskState {
    pub fn new(created_by: u64, assignees: &[u64]) -> Self {
        Self {
            created_by,
            status: TaskStatus::Incomplete,
            completion_request: None,
            review: None,
            assignees: assignees.iter().copied().map(AssigneeRecord::new).collect(),
        }
    }

    pub fn is_assignee(&self, user_id: u64) -> bool {
        self.assignees.iter().any(|a| a.user_id == user_id)
    }

    /// Creator or super user.
    pub fn can_manage(&self, actor: Actor) -> bool {
        actor.is_super_user || actor.user_id == self.created_by
    }

    pub fn can_view(&self, actor: Actor) -> bool {
        self.can_manage(actor) || self.is_assignee(actor.user_id)
    }

    /// Assignees may only be swapped before anyone has submitted work.
    pub fn can_reassign(&self) -> bool {
        self.status != TaskStatus::Completed
            && self
                .assignees
                .iter()
                .all(|a| a.status == AssigneeStatus::Incomplete)
    }

    pub fn request_completion(
        &mut self,
        actor: Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let status = self.status;
        let record = self
            .assignees
            .iter_mut()
            .find(|a| a.user_id == actor.user_id)
            .ok_or(WorkflowError::NotAssignee)?;

        if record.status != AssigneeStatus::Incomplete {
            return Err(WorkflowError::transition(
                status,
                TaskStatus::CompletionRequested,
            ));
        }

        record.status = AssigneeStatus::CompletionRequested;
        record.notes = notes.clone();
        record.requested_at = Some(now);

        self.completion_request = Some(CompletionRequest {
            notes,
            requested_at: now,
            requested_by: actor.user_id,
        });
        self.recompute_status();
        Ok(())
    }

    /// Reviews pending completion requests. With `assignee` set only that
    /// assignee's request is reviewed, otherwise every pending one is.
    /// Returns the ids of the reviewed assignees.
    pub fn review_completion(
        &mut self,
        actor: Actor,
        decision: ReviewDecision,
        review_notes: Option<String>,
        assignee: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<u64>, WorkflowError> {
        if !self.can_manage(actor) {
            return Err(WorkflowError::NotReviewer);
        }

        if self.status != TaskStatus::CompletionRequested {
            let target = match decision {
                ReviewDecision::Approved => TaskStatus::Completed,
                ReviewDecision::Rejected => TaskStatus::Incomplete,
            };
            return Err(WorkflowError::transition(self.status, target));
        }

        let reviewed: Vec<u64> = match assignee {
            Some(user_id) => {
                let record = self
                    .assignees
                    .iter()
                    .find(|a| a.user_id == user_id)
                    .ok_or(WorkflowError::UnknownAssignee(user_id))?;
                if record.status != AssigneeStatus::CompletionRequested {
                    return Err(WorkflowError::NothingToReview);
                }
                vec![user_id]
            }
            None => self
                .assignees
                .iter()
                .filter(|a| a.status == AssigneeStatus::CompletionRequested)
                .map(|a| a.user_id)
                .collect(),
        };

        if reviewed.is_empty() {
            return Err(WorkflowError::NothingToReview);
        }

        for record in self
            .assignees
            .iter_mut()
            .filter(|a| reviewed.contains(&a.user_id))
        {
            record.reviewed_at = Some(now);
            record.review_notes = review_notes.clone();
            match decision {
                ReviewDecision::Approved => record.status = AssigneeStatus::Completed,
                ReviewDecision::Rejected => {
                    record.status = AssigneeStatus::Incomplete;
                    record.notes = None;
                    record.requested_at = None;
                }
            }
        }

        if decision == ReviewDecision::Rejected {
            let requester_rejected = self
                .completion_request
                .as_ref()
                .is_some_and(|r| reviewed.contains(&r.requested_by));
            if requester_rejected {
                self.completion_request = None;
            }
        }

        self.review = Some(Review {
            status: decision,
            reviewed_by: actor.user_id,
            reviewed_at: now,
            review_notes,
        });
        self.recompute_status();
        Ok(reviewed)
    }

    /// Direct creator transition used to park a task and resume it later.
    pub fn set_status(&mut self, actor: Actor, target: TaskStatus) -> Result<(), WorkflowError> {
        if !self.can_manage(actor) {
            return Err(WorkflowError::NotCreator);
        }

        match (self.status, target) {
            (TaskStatus::Incomplete, TaskStatus::OnHold)
            | (TaskStatus::OnHold, TaskStatus::Incomplete) => {
                self.status = target;
                Ok(())
            }
            (from, to) => Err(WorkflowError::transition(from, to)),
        }
    }

    fn recompute_status(&mut self) {
        let all_completed = !self.assignees.is_empty()
            && self
                .assignees
                .iter()
                .all(|a| a.status == AssigneeStatus::Completed);
        let any_requested = self
            .assignees
            .iter()
            .any(|a| a.status == AssigneeStatus::CompletionRequested);

        self.status = if all_completed {
            TaskStatus::Completed
        } else if any_requested {
            TaskStatus::CompletionRequested
        } else if self.status == TaskStatus::OnHold {
            TaskStatus::OnHold
        } else {
            TaskStatus::Incomplete
        };
    }
}
