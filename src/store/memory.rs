// In-process ranking store used in local mode and by the test suites.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{RankingStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
    strings: HashMap<String, (String, Option<Instant>)>,
}

impl Inner {
    /// Drop a string key whose TTL has passed.
    fn expire_string(&mut self, key: &str) {
        let expired = matches!(
            self.strings.get(key),
            Some((_, Some(deadline))) if *deadline <= Instant::now()
        );
        if expired {
            self.strings.remove(key);
        }
    }

    fn sorted(&self, key: &str) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> = self
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

/// Thread-safe in-memory store with Redis range semantics.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

/// Resolve a Redis-style inclusive `[start, stop]` range against `len` items.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn slice<T: Clone>(items: &[T], start: isize, stop: isize) -> Vec<T> {
    match resolve_range(items.len(), start, stop) {
        Some((s, e)) => items[s..=e].to_vec(),
        None => Vec::new(),
    }
}

#[async_trait]
impl RankingStore for MemoryStore {
    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.zsets.remove(key);
        inner.lists.remove(key);
        inner.strings.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.expire_string(key);
        Ok(inner.hashes.contains_key(key)
            || inner.sets.contains_key(key)
            || inner.zsets.contains_key(key)
            || inner.lists.contains_key(key)
            || inner.strings.contains_key(key))
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        self.lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                inner.sets.remove(key);
            }
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.lock()
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(zset) = inner.zsets.get_mut(key) {
            zset.remove(member);
            if zset.is_empty() {
                inner.zsets.remove(key);
            }
        }
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        Ok(self
            .lock()
            .sorted(key)
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect())
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>> {
        Ok(slice(&self.lock().sorted(key), start, stop))
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>> {
        let mut entries = self.lock().sorted(key);
        entries.reverse();
        Ok(slice(&entries, start, stop))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self
            .lock()
            .zsets
            .get(key)
            .and_then(|z| z.get(member).copied()))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let mut entries = self.lock().sorted(key);
        entries.reverse();
        Ok(entries
            .iter()
            .position(|(m, _)| m == member)
            .map(|p| p as u64))
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        let items: Vec<String> = inner
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default();
        Ok(slice(&items, start, stop))
    }

    async fn lrem(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(list) = inner.lists.get_mut(key) {
            list.retain(|v| v != value);
            if list.is_empty() {
                inner.lists.remove(key);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.lock();
        inner.expire_string(key);
        Ok(inner.strings.get(key).map(|(v, _)| v.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.lock().strings.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.expire_string(key);
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn replace_ex(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.expire_string(key);
        match inner.strings.get_mut(key) {
            Some(entry) if entry.0 == expected => {
                *entry = (value.to_string(), Some(Instant::now() + ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut inner = self.lock();
        inner.expire_string(key);
        match inner.strings.get_mut(key) {
            Some((value, _)) => {
                let next = value.parse::<i64>().map_err(|_| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: format!("counter holds non-integer {value:?}"),
                })? + 1;
                *value = next.to_string();
                Ok(next)
            }
            None => {
                inner.strings.insert(
                    key.to_string(),
                    ("1".to_string(), Some(Instant::now() + ttl)),
                );
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 1, 2), Some((1, 2)));
        assert_eq!(resolve_range(5, 0, 99), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 5, 10), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 2, 1), None);
    }

    #[tokio::test]
    async fn test_sorted_set_ordering() {
        let store = MemoryStore::new();
        store.zadd("z", "b", 1000.0).await.unwrap();
        store.zadd("z", "a", 1000.0).await.unwrap();
        store.zadd("z", "c", 900.0).await.unwrap();
        store.zadd("z", "d", 1300.0).await.unwrap();

        let asc = store.zrange_with_scores("z", 0, -1).await.unwrap();
        let ids: Vec<&str> = asc.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);

        let top = store.zrevrange_with_scores("z", 0, 1).await.unwrap();
        assert_eq!(top[0], ("d".to_string(), 1300.0));
        assert_eq!(top[1], ("b".to_string(), 1000.0));

        let window = store.zrange_by_score("z", 900.0, 1000.0).await.unwrap();
        assert_eq!(window.len(), 3);

        assert_eq!(store.zrevrank("z", "d").await.unwrap(), Some(0));
        assert_eq!(store.zrevrank("z", "c").await.unwrap(), Some(3));
        assert_eq!(store.zrevrank("z", "zz").await.unwrap(), None);

        store.zadd("z", "c", 2000.0).await.unwrap();
        assert_eq!(store.zscore("z", "c").await.unwrap(), Some(2000.0));
        store.zrem("z", "c").await.unwrap();
        assert_eq!(store.zscore("z", "c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let store = MemoryStore::new();
        for v in ["one", "two", "three"] {
            store.lpush("l", v).await.unwrap();
        }
        assert_eq!(store.lrange("l", 0, 1).await.unwrap(), vec!["three", "two"]);

        store.lrem("l", "two").await.unwrap();
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["three", "one"]);
    }

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.set_nx_ex("k", "1", ttl).await.unwrap());
        assert!(!store.set_nx_ex("k", "2", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));

        store.del("k").await.unwrap();
        assert!(store.set_nx_ex("k", "3", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_ex_compares_current_value() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert!(!store.replace_ex("k", "1", "2", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set_ex("k", "1", ttl).await.unwrap();
        assert!(store.replace_ex("k", "1", "2", ttl).await.unwrap());
        assert!(!store.replace_ex("k", "1", "3", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_string_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(store.exists("k").await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_ex_counts_up() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr_ex("c", ttl).await.unwrap(), 1);
        assert_eq!(store.incr_ex("c", ttl).await.unwrap(), 2);

        store.set_ex("bad", "x", ttl).await.unwrap();
        assert!(matches!(
            store.incr_ex("bad", ttl).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_hashes_and_sets() {
        let store = MemoryStore::new();
        store
            .hset_all(
                "h",
                &[
                    ("name".to_string(), "Rook".to_string()),
                    ("elo".to_string(), "1000".to_string()),
                ],
            )
            .await
            .unwrap();
        store
            .hset_all("h", &[("elo".to_string(), "1016".to_string())])
            .await
            .unwrap();
        let h = store.hget_all("h").await.unwrap();
        assert_eq!(h.get("name").map(String::as_str), Some("Rook"));
        assert_eq!(h.get("elo").map(String::as_str), Some("1016"));

        store.sadd("s", "a").await.unwrap();
        store.sadd("s", "a").await.unwrap();
        store.sadd("s", "b").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["a", "b"]);
        store.srem("s", "a").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["b"]);

        store.del("h").await.unwrap();
        assert!(store.hget_all("h").await.unwrap().is_empty());
        assert!(!store.exists("h").await.unwrap());
    }
}
