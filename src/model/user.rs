use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Public view of a user row. The password hash is never selected into it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Jane Doe",
    "email": "jane@company.com",
    "phone": "+8801712345678",
    "employee_id": "EMP-001",
    "date_of_birth": "1990-04-12",
    "gender": "female",
    "image_path": null,
    "is_super_user": false,
    "joining_date": "2024-01-01",
    "position": "Engineer",
    "department": "Platform",
    "address": null,
    "linkedin_url": null,
    "github_url": null,
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub employee_id: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub image_path: Option<String>,
    pub is_super_user: bool,
    #[schema(value_type = Option<String>, format = "date")]
    pub joining_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub address: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const PROFILE_COLUMNS: &str = "id, name, email, phone, employee_id, date_of_birth, gender, \
     image_path, is_super_user, joining_date, position, department, address, linkedin_url, \
     github_url, created_at";
