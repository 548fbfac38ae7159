use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::user::{Gender, PROFILE_COLUMNS, UserProfile},
    models::{Credentials, LoginReqDto, Session, TokenType},
    utils::{email_cache, email_filter, validation},
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct SignupReq {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@company.com")]
    pub email: String,
    pub password: String,
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = "date", example = "1990-04-12")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[schema(value_type = Option<String>, format = "date", example = "2024-01-01")]
    pub joining_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub address: Option<String>,
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email_filter::normalize(email);

    // 1️⃣ Cuckoo filter: fast negative
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2️⃣ Moka cache: fast positive
    if email_cache::is_taken(&email).await {
        return false;
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    if exists {
        email_cache::mark_taken(&email).await;
        return false;
    }

    true
}

pub(crate) async fn fetch_profile(
    conn: &mut MySqlConnection,
    user_id: u64,
) -> Result<Option<UserProfile>, ApiError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", PROFILE_COLUMNS);
    let profile = sqlx::query_as::<_, UserProfile>(&sql)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(profile)
}

/// Issues an access/refresh pair and records the refresh token.
async fn open_session(
    conn: &mut MySqlConnection,
    config: &Config,
    user: UserProfile,
) -> Result<Session, ApiError> {
    let access_token = generate_access_token(
        user.id,
        user.email.clone(),
        user.is_super_user,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(ApiError::internal)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user.id,
        user.email.clone(),
        user.is_super_user,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(ApiError::internal)?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(conn)
    .await?;

    Ok(Session {
        access_token,
        refresh_token,
        user,
    })
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Required fields and column widths; returns the normalized email.
fn validate_signup(payload: &SignupReq) -> Result<String, ApiError> {
    let email = email_filter::normalize(&payload.email);

    if payload.name.trim().is_empty()
        || payload.password.is_empty()
        || payload.employee_id.trim().is_empty()
    {
        return Err(ApiError::bad_request(
            "name, password and employee_id must not be empty",
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }

    validation::user_field("name", payload.name.trim())?;
    validation::user_field("email", &email)?;
    validation::user_field("employee_id", payload.employee_id.trim())?;
    let optional = [
        ("phone", &payload.phone),
        ("position", &payload.position),
        ("department", &payload.department),
        ("address", &payload.address),
    ];
    for (column, value) in optional {
        if let Some(value) = value {
            validation::user_field(column, value)?;
        }
    }

    Ok(email)
}

/// User registration
#[utoipa::path(
    post,
    path = "/api/users/signup",
    request_body = SignupReq,
    responses(
        (status = 201, description = "User registered", body = Session),
        (status = 400, description = "Missing or invalid fields"),
        (status = 409, description = "Email or employee id already taken")
    ),
    tag = "Users"
)]
#[instrument(name = "auth_signup", skip(pool, config, payload), fields(email = %payload.email))]
pub async fn signup(
    payload: web::Json<SignupReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let email = validate_signup(&payload)?;

    if !is_email_available(&email, pool.get_ref()).await {
        return Err(ApiError::conflict("Email already registered"));
    }

    let hashed = hash_password(&payload.password).map_err(ApiError::internal)?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO users
            (name, email, password, employee_id, phone, date_of_birth, gender,
             joining_date, position, department, address)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&hashed)
    .bind(payload.employee_id.trim())
    .bind(&payload.phone)
    .bind(payload.date_of_birth)
    .bind(payload.gender.as_ref().map(|g| g.as_ref()))
    .bind(payload.joining_date)
    .bind(&payload.position)
    .bind(&payload.department)
    .bind(&payload.address)
    .execute(&mut *tx)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Email or employee id already registered"),
        other => other,
    })?;

    let profile = fetch_profile(&mut tx, result.last_insert_id())
        .await?
        .ok_or_else(|| ApiError::internal("inserted user vanished"))?;
    let session = open_session(&mut tx, &config, profile).await?;
    tx.commit().await?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;
    info!(user_id = session.user.id, "User registered");

    Ok(HttpResponse::Created().json(session))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = Session),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Users"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(ApiError::bad_request("Email or password required"));
    }

    let email = email_filter::normalize(&user.email);
    let mut conn = pool.acquire().await?;

    let db_user = sqlx::query_as::<_, Credentials>(
        "SELECT id, email, password, is_super_user FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        ApiError::Unauthorized("Invalid credentials".to_string())
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }
    debug!(user_id = db_user.id, super_user = db_user.is_super_user, "Password verified");

    let profile = fetch_profile(&mut conn, db_user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;
    let session = open_session(&mut conn, &config, profile).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(&mut *conn)
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }
    email_cache::mark_taken(&db_user.email).await;

    info!("Login successful");
    Ok(HttpResponse::Ok().json(session))
}

/// Exchange a refresh token (sent as bearer) for a new session
#[utoipa::path(
    post,
    path = "/api/users/refresh",
    responses(
        (status = 200, description = "New session", body = Session),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let unauthorized = || ApiError::Unauthorized("Invalid refresh token".to_string());

    let token = bearer(&req).ok_or_else(unauthorized)?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;
    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    let mut tx = pool.begin().await?;

    // 🔍 find refresh token in DB
    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE",
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(unauthorized()),
    };

    // 🔥 revoke old refresh token
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

    // the profile is re-read so privilege changes apply on refresh
    let profile = fetch_profile(&mut tx, user_id)
        .await?
        .ok_or_else(unauthorized)?;
    let session = open_session(&mut tx, &config, profile).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(session))
}

/// Revoke a refresh token (sent as bearer). Always 204.
#[utoipa::path(
    post,
    path = "/api/users/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}
