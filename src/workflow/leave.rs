use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::WorkflowError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    /// `pending -> approved | rejected`; terminal states never move.
    pub fn decide(self, decision: LeaveStatus) -> Result<LeaveStatus, WorkflowError> {
        match (self, decision) {
            (LeaveStatus::Pending, LeaveStatus::Approved | LeaveStatus::Rejected) => Ok(decision),
            (from, to) => Err(WorkflowError::transition(from, to)),
        }
    }
}

/// Inclusive number of calendar days covered by a leave.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> Result<u32, WorkflowError> {
    if start > end {
        return Err(WorkflowError::InvalidDateRange);
    }
    let days = (end - start).num_days() + 1;
    u32::try_from(days).map_err(|_| WorkflowError::InvalidDateRange)
}
