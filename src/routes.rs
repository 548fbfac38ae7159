use crate::{
    api::{leave_request, notification, task, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let burst = requests_per_min.max(1);
    let per_ms = (60_000 / burst as u64).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let prefix = config.api_prefix.trim_end_matches('/').to_string();

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let signup_limiter = Arc::new(build_limiter(config.rate_signup_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes (must precede the protected scope)
    cfg.service(
        web::resource(format!("{prefix}/users/signup"))
            .wrap(signup_limiter)
            .route(web::post().to(handlers::signup)),
    )
    .service(
        web::resource(format!("{prefix}/users/login"))
            .wrap(login_limiter.clone())
            .route(web::post().to(handlers::login)),
    )
    .service(
        web::resource(format!("{prefix}/users/refresh"))
            .wrap(refresh_limiter)
            .route(web::post().to(handlers::refresh_token)),
    )
    .service(
        web::resource(format!("{prefix}/users/logout"))
            .wrap(login_limiter)
            .route(web::post().to(handlers::logout)),
    );

    // Protected routes
    cfg.service(
        web::scope(&prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/users")
                    // /users
                    .service(web::resource("").route(web::get().to(user::list_users)))
                    // /users/admins
                    .service(web::resource("/admins").route(web::get().to(user::list_admins)))
                    // /users/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::patch().to(user::update_user)),
                    ),
            )
            .service(
                web::scope("/tasks")
                    // /tasks
                    .service(
                        web::resource("")
                            .route(web::post().to(task::create_task))
                            .route(web::get().to(task::list_tasks)),
                    )
                    .service(
                        web::resource("/assigned-to/{uid}").route(web::get().to(task::assigned_to)),
                    )
                    .service(
                        web::resource("/created-by/{uid}").route(web::get().to(task::created_by)),
                    )
                    // /tasks/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(task::get_task))
                            .route(web::patch().to(task::update_task))
                            .route(web::delete().to(task::delete_task)),
                    )
                    .service(
                        web::resource("/{id}/completion-request")
                            .route(web::post().to(task::request_completion)),
                    )
                    .service(
                        web::resource("/{id}/review-completion")
                            .route(web::patch().to(task::review_completion)),
                    )
                    .service(web::resource("/{id}/status").route(web::patch().to(task::set_status))),
            )
            .service(
                web::scope("/leaves")
                    .service(
                        web::resource("/leave-data").route(web::get().to(leave_request::leave_data)),
                    )
                    .service(
                        web::resource("/apply-leave/{uid}")
                            .route(web::post().to(leave_request::apply_leave)),
                    )
                    .service(
                        web::resource("/approve-leave/{id}")
                            .route(web::patch().to(leave_request::approve_leave)),
                    )
                    // /leaves/{id}
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave))),
            )
            .service(
                web::scope("/notifications")
                    .service(
                        web::resource("").route(web::get().to(notification::list_notifications)),
                    )
                    .service(web::resource("/count").route(web::get().to(notification::unread_count)))
                    .service(web::resource("/read").route(web::patch().to(notification::mark_read)))
                    .service(
                        web::resource("/pending-approvals")
                            .route(web::get().to(notification::pending_approvals)),
                    )
                    .service(web::resource("/stream").route(web::get().to(notification::stream))),
            ),
    );
}

// LOGIN / SIGNUP
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /users/refresh with Bearer refresh_token
//       └─ returns a new session, old refresh token revoked
