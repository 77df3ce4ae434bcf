// Store-backed fixed-window rate limiter, keyed by owner id.
//
// Counters live in the ranking store so every instance behind a load
// balancer shares them.

use std::sync::Arc;
use std::time::Duration;

use crate::store::{keys, RankingStore, StoreError};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Battles started per hour.
    Battles,
    /// Character creations, trait updates and deletions per hour.
    CharacterWrites,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> i64 {
        match self {
            RateLimitType::Battles => 60,
            RateLimitType::CharacterWrites => 20,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn key_name(&self) -> &'static str {
        match self {
            RateLimitType::Battles => "battles",
            RateLimitType::CharacterWrites => "character-writes",
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::Battles => write!(f, "battles per hour"),
            RateLimitType::CharacterWrites => write!(f, "character changes per hour"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Rate limit exceeded: max {max} {limit_type}")]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: i64,
    /// Seconds until the current window closes.
    pub retry_after_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum LimitCheckError {
    #[error(transparent)]
    Exceeded(#[from] RateLimitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RankingStore>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RankingStore>) -> Self {
        Self {
            store,
            enabled: true,
        }
    }

    /// Limiter that admits everything (local mode).
    pub fn disabled(store: Arc<dyn RankingStore>) -> Self {
        Self {
            store,
            enabled: false,
        }
    }

    /// Count one event for `owner`. Errors once the window is full.
    pub async fn check_limit(
        &self,
        owner: &str,
        limit_type: RateLimitType,
    ) -> Result<(), LimitCheckError> {
        self.check_limit_at(owner, limit_type, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn check_limit_at(
        &self,
        owner: &str,
        limit_type: RateLimitType,
        now_secs: i64,
    ) -> Result<(), LimitCheckError> {
        if !self.enabled {
            return Ok(());
        }
        let window_secs = limit_type.window().as_secs().max(1) as i64;
        let window = now_secs.div_euclid(window_secs);
        let key = keys::rate_limit(limit_type.key_name(), owner, window);

        let count = self.store.incr_ex(&key, limit_type.window()).await?;
        let max = limit_type.max_count();
        if count > max {
            let window_end = (window + 1) * window_secs;
            tracing::debug!(%owner, kind = limit_type.key_name(), count, "Rate limit hit");
            return Err(RateLimitError {
                limit_type,
                max,
                retry_after_secs: (window_end - now_secs).max(1) as u64,
            }
            .into());
        }
        Ok(())
    }
}
