use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

use crate::workflow::WorkflowError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every error leaves the service as `{"message": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal Server Error")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal(error: impl std::fmt::Display) -> Self {
        ApiError::Internal(error.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(detail) = self {
            tracing::error!(error = %detail, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            message: self.to_string(),
        })
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::NotAssignee | WorkflowError::NotReviewer | WorkflowError::NotCreator => {
                ApiError::Forbidden(message)
            }
            WorkflowError::InvalidTransition { .. } | WorkflowError::NothingToReview => {
                ApiError::Conflict(message)
            }
            WorkflowError::UnknownAssignee(_) | WorkflowError::InvalidDateRange => {
                ApiError::BadRequest(message)
            }
        }
    }
}

/// Maps MySQL server error numbers that are caused by the request rather
/// than by the server.
fn from_mysql_number(number: u16) -> Option<ApiError> {
    match number {
        // ER_DUP_ENTRY
        1062 => Some(ApiError::conflict("Resource already exists")),
        // ER_ROW_IS_REFERENCED_2
        1451 => Some(ApiError::conflict("Resource is still referenced")),
        // ER_NO_REFERENCED_ROW_2
        1452 => Some(ApiError::not_found("Referenced resource not found")),
        // ER_BAD_NULL_ERROR
        1048 => Some(ApiError::bad_request("A required field is missing")),
        // ER_DATA_TOO_LONG
        1406 => Some(ApiError::bad_request("A field is longer than allowed")),
        _ => None,
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let mapped = db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .and_then(|e| from_mysql_number(e.number()));
            if let Some(api_err) = mapped {
                tracing::debug!(error = %db_err, "Database rejected request");
                return api_err;
            }
        }
        ApiError::internal(err)
    }
}

impl From<strum::ParseError> for ApiError {
    fn from(err: strum::ParseError) -> Self {
        ApiError::internal(format!("corrupt enum value in storage: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn renders_message_field() {
        let (status, body) = body_of(ApiError::not_found("Task not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Task not found");
    }

    #[actix_web::test]
    async fn internal_details_are_not_leaked() {
        let (status, body) = body_of(ApiError::internal("connection reset by peer")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn reviewer_mismatch_is_forbidden_with_readable_message() {
        let (status, body) = body_of(WorkflowError::NotReviewer.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["message"],
            "Only the task creator can review completion requests"
        );
    }

    #[test]
    fn only_duplicate_keys_are_conflicts() {
        let duplicate = from_mysql_number(1062).unwrap();
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let null_column = from_mysql_number(1048).unwrap();
        assert_eq!(null_column.status_code(), StatusCode::BAD_REQUEST);

        let missing_parent = from_mysql_number(1452).unwrap();
        assert_eq!(missing_parent.status_code(), StatusCode::NOT_FOUND);

        let too_long = from_mysql_number(1406).unwrap();
        assert_eq!(too_long.status_code(), StatusCode::BAD_REQUEST);

        assert!(from_mysql_number(1213).is_none());
    }

    #[test]
    fn unmapped_database_errors_are_internal() {
        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn workflow_errors_map_to_status_codes() {
        let conflict: ApiError = WorkflowError::transition("completed", "incomplete").into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let bad: ApiError = WorkflowError::UnknownAssignee(7).into();
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let forbidden: ApiError = WorkflowError::NotAssignee.into();
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
    }
}
