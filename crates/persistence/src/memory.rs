//! In-memory shared store
//!
//! Single-process stand-in for Redis. Expiry is evaluated lazily against the
//! injected [`Clock`], so tests can expire keys by advancing a
//! [`ManualClock`](parish_chat_core::ManualClock). An availability switch
//! simulates store outages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parish_chat_core::{Clock, KeyValueStore, StoreError, SystemClock};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent command fail with `StoreError::Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .lock()
            .values()
            .filter(|e| !is_expired(e, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
        }
    }

    /// Run `f` over the live entry map, dropping `key` first if it expired
    fn with_key<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>, i64) -> T) -> Result<T, StoreError> {
        self.check()?;
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| is_expired(e, now)) {
            entries.remove(key);
        }
        Ok(f(&mut entries, now))
    }
}

fn is_expired(entry: &Entry, now_ms: i64) -> bool {
    entry.expires_at_ms.is_some_and(|at| at <= now_ms)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_key(key, |entries, _| match entries.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Text(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })?
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with_key(key, |entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at_ms: ttl.map(|d| now + d.as_millis() as i64),
                },
            );
        })
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.with_key(key, |entries, _| entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.with_key(key, |entries, _| entries.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.with_key(key, |entries, now| {
            entries
                .get(key)
                .and_then(|e| e.expires_at_ms)
                .map(|at| Duration::from_millis((at - now).max(0) as u64))
        })
    }

    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, StoreError> {
        self.with_key(key, |entries, now| {
            if !entries.contains_key(key) {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text("1".to_string()),
                        expires_at_ms: Some(now + ttl_on_create.as_millis() as i64),
                    },
                );
                return Ok(1);
            }
            match entries.get_mut(key) {
                Some(Entry { value: Value::Text(s), .. }) => {
                    let n: i64 = s
                        .parse()
                        .map_err(|_| StoreError::Command("value is not an integer".to_string()))?;
                    *s = (n + 1).to_string();
                    Ok(n + 1)
                },
                _ => Err(wrong_type(key)),
            }
        })?
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.with_key(key, |entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Set(BTreeSet::new()),
                expires_at_ms: None,
            });
            match &mut entry.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                    Ok(())
                },
                Value::Text(_) => Err(wrong_type(key)),
            }
        })?
    }

    async fn list_set(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_key(key, |entries, _| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })?
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.with_key(key, |entries, _| {
            let now_empty = match entries.get_mut(key) {
                None => return Ok(()),
                Some(Entry { value: Value::Set(set), .. }) => {
                    set.remove(member);
                    set.is_empty()
                },
                Some(_) => return Err(wrong_type(key)),
            };
            // Redis drops empty sets
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        })?
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parish_chat_core::ManualClock;

    fn store() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_expire() {
        let (store, clock) = store();
        store.set("k", "v", Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_expiry() {
        let (store, clock) = store();
        store.set("k", "v", None).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_sets_expiry_only_on_create() {
        let (store, clock) = store();
        let window = Duration::from_secs(60);
        assert_eq!(store.incr("c", window).await.unwrap(), 1);

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.incr("c", window).await.unwrap(), 2);
        assert_eq!(store.ttl("c").await.unwrap(), Some(Duration::from_secs(30)));

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.incr("c", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sets() {
        let (store, _) = store();
        store.add_to_set("s", "b").await.unwrap();
        store.add_to_set("s", "a").await.unwrap();
        store.add_to_set("s", "a").await.unwrap();
        assert_eq!(store.list_set("s").await.unwrap(), vec!["a", "b"]);

        store.remove_from_set("s", "a").await.unwrap();
        store.remove_from_set("s", "b").await.unwrap();
        assert!(!store.exists("s").await.unwrap());
        assert!(store.list_set("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let (store, _) = store();
        store.set("k", "v", None).await.unwrap();
        assert!(matches!(store.add_to_set("k", "m").await, Err(StoreError::Command(_))));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let (store, _) = store();
        store.set_available(false);
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_del() {
        let (store, _) = store();
        store.set("k", "v", None).await.unwrap();
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert!(store.is_empty());
    }
}
