//! In-memory counter store
//!
//! Mirrors the Redis semantics the service relies on (lazy creation,
//! wrong-type errors, expiry) closely enough to exercise the engine
//! without a server.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::CounterStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// HashMap-backed store with per-key expiry
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, if it exists and has an expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Run `f` on the live entry map, dropping `key` first if it expired
    fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
            entries.remove(key);
        }
        f(&mut entries)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Int(v),
                ..
            }) => Ok(Some(*v)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Int(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.with_entry(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Int(0),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Int(v) => {
                    *v = v.checked_add(1).ok_or_else(|| StoreError::Command {
                        command: "INCR",
                        message: "increment or decrement would overflow".to_string(),
                    })?;
                    Ok(*v)
                }
                Value::Set(_) => Err(StoreError::WrongType(key.to_string())),
            }
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_entry(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(members) => Ok(members.insert(member.to_string())),
                Value::Int(_) => Err(StoreError::WrongType(key.to_string())),
            }
        })
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.with_entry(key, |entries| match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.len() as u64),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.with_entry(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_missing_keys_read_as_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.get("site_pv:example.com").await.unwrap(), None);
        assert_eq!(store.scard("site_uv:example.com").await.unwrap(), 0);
        assert!(!store.expire("site_pv:example.com", TTL).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incr_creates_and_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
        // Counters are created without an expiry
        assert!(store.ttl("k").is_none());
    }

    #[tokio::test]
    async fn test_sadd_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "10.0.0.1").await.unwrap());
        assert!(!store.sadd("s", "10.0.0.1").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 1);

        assert!(store.sadd("s", "10.0.0.2").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.sadd("s", "a").await.unwrap();
        assert!(matches!(store.incr("s").await, Err(StoreError::WrongType(_))));
        assert!(matches!(store.get("s").await, Err(StoreError::WrongType(_))));

        store.incr("k").await.unwrap();
        assert!(matches!(
            store.sadd("k", "a").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("short", 7, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("short").await.unwrap(), Some(7));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);

        // An expired counter starts again from zero
        store.incr("c").await.unwrap();
        store.expire("c", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expire_refreshes_ttl() {
        let store = MemoryStore::new();
        store.incr("c").await.unwrap();
        assert!(store.expire("c", TTL).await.unwrap());

        let ttl = store.ttl("c").unwrap();
        assert!(ttl > Duration::from_secs(59) && ttl <= TTL);
    }
}
