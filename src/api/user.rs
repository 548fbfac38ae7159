use crate::{
    auth::{auth::AuthUser, handlers::fetch_profile, password::hash_password},
    error::{ApiError, ApiResult},
    model::user::{Gender, PROFILE_COLUMNS, UserProfile},
    utils::{
        db_utils::{build_update_sql, execute_update},
        email_cache, email_filter, pagination, validation,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

/// Profile columns any user may edit on their own record.
const SELF_EDITABLE: &[&str] = &[
    "name",
    "phone",
    "date_of_birth",
    "gender",
    "image_path",
    "position",
    "department",
    "address",
    "linkedin_url",
    "github_url",
    "password",
];

/// Extra columns only a super user may edit.
const ADMIN_EDITABLE: &[&str] = &["employee_id", "joining_date", "is_super_user", "email"];

/// Editable columns declared `NOT NULL`.
const REQUIRED: &[&str] = &["name", "email", "employee_id", "password", "is_super_user"];

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page
    pub per_page: Option<u32>,
    /// Filter by department
    pub department: Option<String>,
    /// Search by name, email or employee id
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserProfile>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = pagination::resolve(query.page, query.per_page);

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(department) = &query.department {
        conditions.push("department = ?");
        bindings.push(department.clone());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(name LIKE ? OR email LIKE ? OR employee_id LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone());
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting users");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql = format!(
        "SELECT {} FROM users {} ORDER BY id DESC LIMIT ? OFFSET ?",
        PROFILE_COLUMNS, where_clause
    );
    let mut data_query = sqlx::query_as::<_, UserProfile>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let users = data_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        data: users,
        page,
        per_page,
        total,
    }))
}

/// List super users (task reviewers and leave approvers)
#[utoipa::path(
    get,
    path = "/api/users/admins",
    responses(
        (status = 200, description = "All super users", body = [UserProfile]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_admins(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let sql = format!(
        "SELECT {} FROM users WHERE is_super_user = TRUE ORDER BY name",
        PROFILE_COLUMNS
    );
    let admins = sqlx::query_as::<_, UserProfile>(&sql)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(admins))
}

/// Get a user profile
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserProfile),
        (status = 404, description = "User not found", body = Object, example = json!({
            "message": "User not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    match fetch_profile(&mut conn, user_id).await? {
        Some(profile) => Ok(HttpResponse::Ok().json(profile)),
        None => Err(ApiError::not_found("User not found")),
    }
}

/// Checks field-level rules the column whitelist cannot express and
/// rewrites the password into its hash.
fn prepare_update(auth: &AuthUser, mut body: Value) -> Result<(Value, Vec<&'static str>), ApiError> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    let mut allowed: Vec<&'static str> = SELF_EDITABLE.to_vec();
    if auth.is_super_user {
        allowed.extend_from_slice(ADMIN_EDITABLE);
    } else if let Some(key) = obj.keys().find(|k| ADMIN_EDITABLE.contains(&k.as_str())) {
        return Err(ApiError::forbidden(format!("Only an admin can change '{key}'")));
    }

    for (key, value) in obj.iter() {
        if REQUIRED.contains(&key.as_str()) {
            let blank = value.is_null() || value.as_str().is_some_and(|v| v.trim().is_empty());
            if blank {
                return Err(ApiError::bad_request(format!("{key} must not be empty")));
            }
        }
        if let Some(text) = value.as_str() {
            validation::user_field(key, text)?;
        }
    }

    if let Some(gender) = obj.get("gender").and_then(Value::as_str) {
        Gender::from_str(gender)
            .map_err(|_| ApiError::bad_request("gender must be one of male, female, other"))?;
    }

    if let Some(email) = obj.get_mut("email") {
        let normalized = email
            .as_str()
            .map(email_filter::normalize)
            .filter(|e| e.contains('@'))
            .ok_or_else(|| ApiError::bad_request("A valid email is required"))?;
        *email = Value::String(normalized);
    }

    if let Some(password) = obj.get_mut("password") {
        let plain = password
            .as_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::bad_request("password must be a non-empty string"))?;
        *password = Value::String(hash_password(plain).map_err(ApiError::internal)?);
    }

    Ok((body, allowed))
}

/// Moves the availability index from a released address to its replacement.
async fn sync_email_index(old: &str, new: &str) {
    email_cache::forget(old).await;
    email_filter::insert(new);
    email_cache::mark_taken(new).await;
}

/// Update a user profile (self or admin)
#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body(content = Object, description = "Any subset of the editable profile fields"),
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Unknown or invalid field"),
        (status = 403, description = "Not your profile, or admin-only field"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_super_user(user_id)?;

    let (body, allowed) = prepare_update(&auth, body.into_inner())?;
    let update = build_update_sql("users", &body, &allowed, "id", user_id)?;

    let mut tx = pool.begin().await?;
    let before = fetch_profile(&mut tx, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    execute_update(&mut tx, update).await?;
    let profile = fetch_profile(&mut tx, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    tx.commit().await?;

    if before.email != profile.email {
        sync_email_index(&before.email, &profile.email).await;
        debug!(user_id, old = %before.email, new = %profile.email, "Email index updated");
    }

    info!(
        user_id,
        updated_by = auth.user_id,
        actor_email = %auth.email,
        "User profile updated"
    );
    Ok(HttpResponse::Ok().json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::handlers::is_email_available,
        testing::{insert_user, send, test_app},
    };
    use actix_web::{http::StatusCode, test::TestRequest};
    use serde_json::json;

    fn user(is_super_user: bool) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "jane@company.com".into(),
            is_super_user,
        }
    }

    #[test]
    fn employees_cannot_grant_themselves_admin() {
        let err = prepare_update(&user(false), json!({"is_super_user": true})).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn admins_may_edit_admin_fields() {
        let (_, allowed) = prepare_update(&user(true), json!({"is_super_user": true})).unwrap();
        assert!(allowed.contains(&"is_super_user"));
    }

    #[test]
    fn password_is_hashed_before_storage() {
        let (body, _) = prepare_update(&user(false), json!({"password": "n3w-secret"})).unwrap();
        let stored = body["password"].as_str().unwrap();
        assert!(stored.starts_with("$argon2"));
    }

    #[test]
    fn required_columns_cannot_be_nulled() {
        for field in ["name", "password"] {
            let err = prepare_update(&user(false), json!({ field: null })).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains(field)));
        }
        for field in ["email", "employee_id", "is_super_user"] {
            let err = prepare_update(&user(true), json!({ field: null })).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
        }
        assert!(prepare_update(&user(false), json!({"name": "  "})).is_err());
    }

    #[test]
    fn optional_columns_may_be_cleared() {
        let (body, _) = prepare_update(&user(false), json!({"phone": null})).unwrap();
        assert!(body["phone"].is_null());
    }

    #[test]
    fn overlong_profile_fields_are_rejected() {
        let err = prepare_update(&user(false), json!({"name": "n".repeat(121)})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "name must be at most 120 characters"));

        let err =
            prepare_update(&user(true), json!({"employee_id": "7".repeat(65)})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("employee_id")));
    }

    #[tokio::test]
    async fn email_change_moves_the_availability_index() {
        email_cache::mark_taken("before-move@company.com").await;
        sync_email_index("before-move@company.com", "after-move@company.com").await;

        assert!(!email_cache::is_taken("before-move@company.com").await);
        assert!(email_cache::is_taken("after-move@company.com").await);
        assert!(email_filter::might_exist("after-move@company.com"));
    }

    #[test]
    fn invalid_gender_is_rejected() {
        let err = prepare_update(&user(false), json!({"gender": "robot"})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn nulling_a_required_column_is_a_bad_request(pool: MySqlPool) {
        let employee = insert_user(&pool, "keeps-name@company.com", false).await;
        let app = test_app!(pool.clone());

        let (status, body) = send!(
            app,
            TestRequest::patch()
                .uri(&format!("/api/users/{employee}"))
                .set_json(json!({"name": null})),
            as employee, false
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "name must not be empty");

        let name: String = sqlx::query_scalar("SELECT name FROM users WHERE id = ?")
            .bind(employee)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "keeps-name");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_email_is_a_conflict(pool: MySqlPool) {
        insert_user(&pool, "taken@company.com", false).await;
        let employee = insert_user(&pool, "mover@company.com", false).await;
        let admin = insert_user(&pool, "directory@company.com", true).await;
        let app = test_app!(pool.clone());

        let (status, _) = send!(
            app,
            TestRequest::patch()
                .uri(&format!("/api/users/{employee}"))
                .set_json(json!({"email": "taken@company.com"})),
            as admin, true
        );
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn admin_email_change_releases_the_old_address(pool: MySqlPool) {
        let employee = insert_user(&pool, "old-address@company.com", false).await;
        let admin = insert_user(&pool, "accounts@company.com", true).await;
        let app = test_app!(pool.clone());

        email_filter::insert("old-address@company.com");
        email_cache::mark_taken("old-address@company.com").await;
        assert!(!is_email_available("old-address@company.com", &pool).await);

        let (status, profile) = send!(
            app,
            TestRequest::patch()
                .uri(&format!("/api/users/{employee}"))
                .set_json(json!({"email": "New-Address@Company.com"})),
            as admin, true
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["email"], "new-address@company.com");

        assert!(is_email_available("old-address@company.com", &pool).await);
        assert!(!is_email_available("new-address@company.com", &pool).await);
        assert!(email_cache::is_taken("new-address@company.com").await);
    }
}
