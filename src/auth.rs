// Authentication: JWT bearer tokens carrying the upstream-verified owner id.
//
// Wallet signature checks and the Discord OAuth exchange happen upstream;
// this module only trusts a token they issued.

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{is_local_mode, LOCAL_OWNER_ID};
use crate::error::ArenaError;
use crate::models::{normalize_owner, Provider};

pub const ADMIN_ROLE: &str = "admin";

/// JWT secret – in production this should come from an env var.
fn jwt_secret() -> Vec<u8> {
    std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "arena-dev-secret-change-in-production".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Wallet address or Discord user id.
    pub sub: String,
    pub provider: Provider,
    pub role: String,
    pub exp: usize, // expiry (unix timestamp)
}

impl Claims {
    pub fn owner(&self) -> String {
        normalize_owner(&self.sub)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    fn local() -> Self {
        Claims {
            sub: LOCAL_OWNER_ID.to_string(),
            provider: Provider::Wallet,
            role: ADMIN_ROLE.to_string(),
            exp: usize::MAX,
        }
    }
}

pub fn create_token(owner: &str, provider: Provider, role: &str) -> Result<String, String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .ok_or_else(|| "Token expiry out of range".to_string())?
        .timestamp() as usize;

    let claims = Claims {
        sub: normalize_owner(owner),
        provider,
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&jwt_secret()),
    )
    .map_err(|e| format!("Failed to create token: {e}"))
}

pub fn verify_token(token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&jwt_secret()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {e}"))
}

// ── Axum extractor: AuthUser ─────────────────────────────────────────

/// Extracts the authenticated caller from the Authorization header.
/// In local mode a request without the header acts as the local owner.
/// Usage: `AuthUser(claims)` in handler parameters.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ArenaError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(auth_header) = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
        else {
            if is_local_mode() {
                return Ok(AuthUser(Claims::local()));
            }
            return Err(ArenaError::Unauthorized(
                "Missing Authorization header".into(),
            ));
        };

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            ArenaError::Unauthorized("Invalid Authorization header format".into())
        })?;

        verify_token(token)
            .map(AuthUser)
            .map_err(|_| ArenaError::Unauthorized("Invalid token".into()))
    }
}

/// Optional auth extractor – does not reject if no valid token is present.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Claims>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = ArenaError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(
            AuthUser::from_request_parts(parts, state)
                .await
                .ok()
                .map(|AuthUser(claims)| claims),
        ))
    }
}
