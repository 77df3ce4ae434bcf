// Ranking store: the narrow key-value interface the arena persists through.
//
// Each call is an independent write or read. There are no multi-key
// transactions, so callers must tolerate index/entity divergence after a
// partial failure (see `characters::reconcile_indexes`).

pub mod keys;
pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Hash, set, sorted-set, list and string operations over a hosted KV store.
///
/// Range arguments follow Redis conventions: `stop` is inclusive and negative
/// indices count from the end. Sorted-set ranges order by score, then member.
#[async_trait]
pub trait RankingStore: Send + Sync {
    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;
    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;
    async fn del(&self, key: &str) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()>;
    async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()>;
    /// Members with `min <= score <= max`, ascending.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64)
        -> StoreResult<Vec<(String, f64)>>;
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>>;
    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>>;
    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;
    /// Zero-based position counting from the highest score.
    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;
    /// Remove every occurrence of `value`.
    async fn lrem(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;
    /// Set only if the key does not exist. Returns whether the value was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;
    /// Overwrite only while the key still holds `expected`. Returns whether
    /// the value was written.
    async fn replace_ex(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;
    /// Increment a counter, starting its TTL when the increment creates it.
    async fn incr_ex(&self, key: &str, ttl: Duration) -> StoreResult<i64>;
}
