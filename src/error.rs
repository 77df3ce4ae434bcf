use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::rate_limit::{LimitCheckError, RateLimitError};
use crate::store::StoreError;

/// Application-level error for the arena operations and their HTTP handlers.
///
/// Rejections (validation, ownership, missing entities, cooldown, rate limits)
/// are raised before any write. `Store` can surface mid-persistence; writes
/// already applied stay applied.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("You do not own this character")]
    Forbidden,

    #[error("Character not found")]
    CharacterNotFound,

    #[error("No opponents available")]
    NoOpponents,

    #[error("Character is on cooldown for {retry_after_secs}s")]
    Cooldown { retry_after_secs: u64 },

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type ArenaResult<T> = Result<T, ArenaError>;

impl From<LimitCheckError> for ArenaError {
    fn from(err: LimitCheckError) -> Self {
        match err {
            LimitCheckError::Exceeded(e) => ArenaError::RateLimited(e),
            LimitCheckError::Store(e) => ArenaError::Store(e),
        }
    }
}

impl IntoResponse for ArenaError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ArenaError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ArenaError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ArenaError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ArenaError::CharacterNotFound => (StatusCode::NOT_FOUND, "CHARACTER_NOT_FOUND"),
            ArenaError::NoOpponents => (StatusCode::NOT_FOUND, "NO_OPPONENTS"),
            ArenaError::Cooldown { .. } => (StatusCode::TOO_MANY_REQUESTS, "COOLDOWN_ACTIVE"),
            ArenaError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            ArenaError::Store(e) => {
                tracing::error!(error = %e, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self {
            ArenaError::Store(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let retry_after = match &self {
            ArenaError::Cooldown { retry_after_secs } => Some(*retry_after_secs),
            ArenaError::RateLimited(e) => Some(e.retry_after_secs),
            _ => None,
        };

        let body = match retry_after {
            Some(secs) => json!({ "error": message, "code": code, "retryAfter": secs }),
            None => json!({ "error": message, "code": code }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ArenaError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ArenaError::Forbidden, StatusCode::FORBIDDEN),
            (ArenaError::CharacterNotFound, StatusCode::NOT_FOUND),
            (ArenaError::NoOpponents, StatusCode::NOT_FOUND),
            (
                ArenaError::Cooldown { retry_after_secs: 5 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ArenaError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_cooldown_sets_retry_after_header() {
        let resp = ArenaError::Cooldown { retry_after_secs: 42 }.into_response();
        assert_eq!(
            resp.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from_static("42")
        );
    }
}
