//! Helpers shared by the handler tests.
//!
//! Database-backed tests run under `#[sqlx::test(migrations = "migrations")]`,
//! which gives every test its own freshly migrated database taken from
//! `DATABASE_URL`.

use crate::{auth::jwt::generate_access_token, config::Config};
use actix_web::{body::MessageBody, dev::ServiceResponse, http::StatusCode, test};
use serde_json::Value;
use sqlx::MySqlPool;
use std::net::SocketAddr;

/// Every request needs a peer address for the rate limiter key.
pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

pub fn bearer(user_id: u64, is_super_user: bool) -> String {
    let config = Config::for_tests();
    let token = generate_access_token(
        user_id,
        format!("user{user_id}@company.com"),
        is_super_user,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .unwrap();
    format!("Bearer {token}")
}

/// Inserts a user directly and returns its id. The address doubles as the
/// employee id so both unique keys stay distinct.
pub async fn insert_user(pool: &MySqlPool, email: &str, is_super_user: bool) -> u64 {
    sqlx::query(
        "INSERT INTO users (name, email, password, employee_id, is_super_user) \
         VALUES (?, ?, 'not-a-hash', ?, ?)",
    )
    .bind(email.split('@').next().unwrap_or(email))
    .bind(email)
    .bind(email)
    .bind(is_super_user)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_id()
}

/// Status plus the JSON body; an empty body reads as `null`.
pub async fn read_json<B: MessageBody>(resp: ServiceResponse<B>) -> (StatusCode, Value) {
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// Builds the full route tree over `$pool`.
macro_rules! test_app {
    ($pool:expr) => {{
        let config = $crate::config::Config::for_tests();
        let routes_config = config.clone();
        ::actix_web::test::init_service(
            ::actix_web::App::new()
                .app_data(::actix_web::web::Data::new($pool))
                .app_data(::actix_web::web::Data::new(config))
                .app_data(::actix_web::web::Data::new(
                    $crate::services::event_bus::EventBus::new(16),
                ))
                .configure(move |cfg| $crate::routes::configure(cfg, routes_config)),
        )
        .await
    }};
}

pub(crate) use test_app;

/// Sends a request, optionally as `user`, and reads the JSON reply.
macro_rules! send {
    ($app:expr, $req:expr) => {{
        let req = $req.peer_addr($crate::testing::peer()).to_request();
        $crate::testing::read_json(::actix_web::test::call_service(&$app, req).await).await
    }};
    ($app:expr, $req:expr, as $user:expr, $is_super:expr) => {{
        let req = $req
            .insert_header((
                "Authorization",
                $crate::testing::bearer($user, $is_super),
            ))
            .peer_addr($crate::testing::peer())
            .to_request();
        $crate::testing::read_json(::actix_web::test::call_service(&$app, req).await).await
    }};
}

pub(crate) use send;
