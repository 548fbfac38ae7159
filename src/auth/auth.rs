use crate::config::Config;
use crate::error::ApiError;
use crate::models::TokenType;
use crate::workflow::Actor;
use crate::auth::jwt::verify_token;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub is_super_user: bool,
}

/// Reads `Authorization: Bearer <token>` and validates it as an access token.
pub fn authenticate(req: &HttpRequest, config: &Config) -> Result<AuthUser, ApiError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized("Access token required".to_string()));
    }

    Ok(AuthUser {
        user_id: claims.user_id,
        email: claims.sub,
        is_super_user: claims.is_super_user,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already validated by the auth middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let result = match req.app_data::<Data<Config>>() {
            Some(config) => authenticate(req, config),
            None => Err(ApiError::internal("Config missing")),
        };
        ready(result)
    }
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            is_super_user: self.is_super_user,
        }
    }

    pub fn require_super_user(&self) -> Result<(), ApiError> {
        if self.is_super_user {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    /// The caller acts on their own record, or is a super user.
    pub fn require_self_or_super_user(&self, user_id: u64) -> Result<(), ApiError> {
        if self.is_super_user || self.user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden("You can only act on your own records"))
        }
    }
}
