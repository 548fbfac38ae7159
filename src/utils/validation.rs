use crate::error::ApiError;

pub const TASK_TITLE_MAX: usize = 200;
pub const LEAVE_REASON_MAX: usize = 500;

/// Widths of the free-text `users` columns.
const USER_TEXT_LIMITS: &[(&str, usize)] = &[
    ("name", 120),
    ("email", 190),
    ("employee_id", 64),
    ("phone", 32),
    ("image_path", 255),
    ("position", 120),
    ("department", 120),
    ("address", 255),
    ("linkedin_url", 255),
    ("github_url", 255),
];

/// Fails with a 400 when `value` has more than `max` characters.
pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters"
        )))
    } else {
        Ok(())
    }
}

/// Checks a `users` column value against its width. Unknown columns pass.
pub fn user_field(column: &str, value: &str) -> Result<(), ApiError> {
    match USER_TEXT_LIMITS.iter().find(|(name, _)| *name == column) {
        Some((_, max)) => max_len(column, value, *max),
        None => Ok(()),
    }
}
