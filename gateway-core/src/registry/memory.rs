//! In-memory [`KvStore`] used by `gateway-core`'s own test suite in place of
//! a live etcd cluster. Lease expiry is modeled with `tokio::time` rather
//! than a real TTL clock on a server: granting a lease spawns a watchdog
//! task that removes the lease's keys once `ttl` elapses without a renewal,
//! and `keep_alive` renews the lease on a heartbeat until its stream is
//! dropped — mirroring etcd's own grant/keepalive/expire lifecycle closely
//! enough to exercise the spec.md §3/§8 liveness invariant without a live
//! cluster.

use super::{KeepAliveStream, KvStore, WatchEvent, WatchStream};
use crate::error::RegistryError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

struct Lease {
    ttl: Duration,
    expires_at: Instant,
}

struct Inner {
    entries: HashMap<String, String>,
    leases: HashMap<i64, Lease>,
    next_lease_id: i64,
}

struct Shared {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WatchEvent>,
}

impl Shared {
    /// Drops `lease_id` and every key it was backing. Called by the
    /// watchdog task spawned in `grant_lease` once a lease's TTL elapses
    /// without renewal, and directly by tests.
    fn expire_lease(&self, lease_id: i64) {
        let removed = {
            let mut inner = self.inner.lock().expect("memory store lock poisoned");
            inner.leases.remove(&lease_id);
            let marker_prefix = format!("__lease:{lease_id}:");
            let dead: Vec<String> = inner
                .entries
                .keys()
                .filter(|k| k.starts_with(&marker_prefix))
                .cloned()
                .collect();
            let mut removed = Vec::new();
            for marker in dead {
                inner.entries.remove(&marker);
                if let Some(stripped) = marker.strip_prefix(&marker_prefix) {
                    if inner.entries.remove(stripped).is_some() {
                        removed.push(stripped.to_string());
                    }
                }
            }
            removed
        };
        for key in removed {
            let _ = self.events.send(WatchEvent::Delete { key });
        }
    }
}

pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    entries: HashMap::new(),
                    leases: HashMap::new(),
                    next_lease_id: 1,
                }),
                events,
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<bool, RegistryError> {
        let mut inner = self.shared.inner.lock().expect("memory store lock poisoned");
        inner.entries.insert(key.to_string(), value.to_string());
        let _ = self.shared.events.send(WatchEvent::Put {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let inner = self.shared.inner.lock().expect("memory store lock poisoned");
        Ok(inner.entries.get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, RegistryError> {
        let inner = self.shared.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix) && !k.starts_with("__lease:"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        let mut inner = self.shared.inner.lock().expect("memory store lock poisoned");
        inner.entries.remove(key);
        let _ = self.shared.events.send(WatchEvent::Delete {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, RegistryError> {
        use futures_util::StreamExt;
        let prefix = prefix.to_string();
        let rx = self.shared.events.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let prefix = prefix.clone();
            async move {
                match item {
                    Ok(event) => {
                        let key = match &event {
                            WatchEvent::Put { key, .. } | WatchEvent::Delete { key } => key,
                        };
                        if key.starts_with(&prefix) {
                            Some(Ok(event))
                        } else {
                            None
                        }
                    }
                    Err(_) => Some(Err(RegistryError::WatchCompacted)),
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn grant_lease(&self, ttl_seconds: i64) -> Result<i64, RegistryError> {
        let ttl = Duration::from_secs(ttl_seconds.max(0) as u64);
        let id = {
            let mut inner = self.shared.inner.lock().expect("memory store lock poisoned");
            let id = inner.next_lease_id;
            inner.next_lease_id += 1;
            inner.leases.insert(
                id,
                Lease {
                    ttl,
                    expires_at: Instant::now() + ttl,
                },
            );
            id
        };

        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                let wait = {
                    let inner = shared.inner.lock().expect("memory store lock poisoned");
                    match inner.leases.get(&id) {
                        Some(lease) => lease.expires_at.saturating_duration_since(Instant::now()),
                        None => return,
                    }
                };
                if wait.is_zero() {
                    shared.expire_lease(id);
                    return;
                }
                tokio::time::sleep(wait).await;
            }
        });

        Ok(id)
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease_id: i64,
    ) -> Result<(), RegistryError> {
        {
            let mut inner = self.shared.inner.lock().expect("memory store lock poisoned");
            inner.entries.insert(key.to_string(), value.to_string());
            inner
                .entries
                .insert(format!("__lease:{lease_id}:{key}"), String::new());
        }
        let _ = self.shared.events.send(WatchEvent::Put {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64) -> Result<KeepAliveStream, RegistryError> {
        let (tx, rx) = mpsc::channel(8);
        let shared = self.shared.clone();
        let ttl = {
            let inner = shared.inner.lock().expect("memory store lock poisoned");
            inner.leases.get(&lease_id).map(|l| l.ttl).unwrap_or_default()
        };
        // Heartbeat at a third of the TTL, same margin etcd's own client
        // leaves itself before a lease would otherwise lapse.
        let interval = (ttl / 3).max(Duration::from_millis(10));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let renewed = {
                    let mut inner = shared.inner.lock().expect("memory store lock poisoned");
                    match inner.leases.get_mut(&lease_id) {
                        Some(lease) => {
                            lease.expires_at = Instant::now() + lease.ttl;
                            true
                        }
                        None => false,
                    }
                };
                if !renewed || tx.send(Ok(())).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.put("v1.echo.say", "hello").await.unwrap();
        assert_eq!(store.get("v1.echo.say").await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn get_missing_key_is_none_not_error() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_put_is_idempotent() {
        let store = MemoryStore::new();
        store.put("k", "a").await.unwrap();
        store.put("k", "a").await.unwrap();
        assert_eq!(store.get_prefix("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lease_expiry_removes_entry() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(0).await.unwrap();
        store.put_with_lease("addr:1", "127.0.0.1:9000", lease).await.unwrap();
        assert!(store.get("addr:1").await.unwrap().is_some());
        store.shared.expire_lease(lease);
        assert!(store.get("addr:1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lease_expires_on_its_own_without_keep_alive() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(1).await.unwrap();
        store.put_with_lease("addr:1", "127.0.0.1:9000", lease).await.unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;

        assert!(store.get("addr:1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_renews_lease_past_its_original_ttl() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(1).await.unwrap();
        store.put_with_lease("addr:1", "127.0.0.1:9000", lease).await.unwrap();
        let mut keep_alive = store.keep_alive(lease).await.unwrap();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(400)).await;
            use futures_util::StreamExt;
            keep_alive.next().await.unwrap().unwrap();
        }

        assert!(store.get("addr:1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_keep_alive_lets_the_lease_lapse() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(1).await.unwrap();
        store.put_with_lease("addr:1", "127.0.0.1:9000", lease).await.unwrap();
        let keep_alive = store.keep_alive(lease).await.unwrap();

        // Stop renewing (drop the stream, as `Registration::stop` does) and
        // let the original TTL plus a margin pass.
        drop(keep_alive);
        tokio::time::advance(Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;

        assert!(store.get("addr:1").await.unwrap().is_none());
    }
}
