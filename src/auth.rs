use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    models::{ADMIN_ROLE, User},
    repository::RepositoryState,
};

/// Name of the session cookie cleared after a successful self-erasure.
pub const SESSION_COOKIE: &str = "session";

/// Claims
///
/// Standard payload expected inside a JSON Web Token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id in the `users` table.
    pub sub: Uuid,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers use it for the
/// caller's id and for role checks.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Accounts that are deactivated or banned cannot act, which is what makes
/// the erasure soft-delete effective even before the purge commits.
fn usable(user: User) -> Option<AuthUser> {
    if !user.is_active || user.is_banned {
        tracing::debug!(user_id = %user.id, "rejecting inactive or banned account");
        return None;
    }
    Some(AuthUser {
        id: user.id,
        role: user.role,
    })
}

/// AuthUser Extractor Implementation
///
/// 1. Dependency Resolution: Repository and AppConfig from the application state.
/// 2. Local Bypass: development-time access using the 'x-user-id' header.
/// 3. Token Validation: Bearer token extraction and JWT decoding.
/// 4. DB Lookup: the user's current role and activity flags.
///
/// Rejection: Returns StatusCode::UNAUTHORIZED (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // Local Development Bypass, guarded by the Env check.
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await {
                    return usable(user).ok_or(StatusCode::UNAUTHORIZED);
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("jwt rejected: {:?}", e.kind());
            StatusCode::UNAUTHORIZED
        })?;

        // An erased user's token stays cryptographically valid until it expires;
        // the lookup is what locks them out.
        let user = repo
            .get_user(token_data.claims.sub)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)?;

        usable(user).ok_or(StatusCode::UNAUTHORIZED)
    }
}
