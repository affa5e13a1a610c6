//! Backend-side registration: a service instance announces itself under
//! `"/{scheme}/{service}/{instance_key}"` (spec.md §3/§4.3/§6) with a leased
//! key that it renews until asked to stop. Grounded on
//! `internal/service/etcd/naming.go`'s `RegisterService`/`withAlive`/
//! `UnRegister`. The original's reflection-based `RegisterApi` (walking a Go
//! value's method set to auto-register every method) is out of scope here
//! (spec.md §9) — callers register each method explicitly via
//! [`crate::directory::register`].
//!
//! This is backend-side machinery: leases belong to the process serving the
//! RPCs, never to the gateway (spec.md §5). The gateway only ever reads
//! through [`crate::resolver::NameResolver`].

use crate::error::RegistryError;
use crate::registry::KvStore;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Handle to a running keepalive loop. Dropping it without calling
/// [`Registration::stop`] leaves the loop running until the lease's own TTL
/// expires and the registry drops the entry.
pub struct Registration {
    stop: Option<oneshot::Sender<()>>,
}

impl Registration {
    pub fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

/// Registers `address` under `/{scheme}/{service}/{instance_key}` with a
/// lease of `ttl_seconds`, and spawns a task that keeps the lease alive
/// until [`Registration::stop`] is called.
pub async fn register_instance(
    kv: Arc<dyn KvStore>,
    scheme: &str,
    service: &str,
    instance_key: &str,
    address: &str,
    ttl_seconds: i64,
) -> Result<Registration, RegistryError> {
    let lease_id = kv.grant_lease(ttl_seconds).await?;
    let key = format!("/{scheme}/{service}/{instance_key}");
    kv.put_with_lease(&key, address, lease_id).await?;

    let mut keep_alive = kv.keep_alive(lease_id).await?;
    let (tx, mut rx) = oneshot::channel();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut rx => break,
                tick = keep_alive.next() => {
                    match tick {
                        Some(Ok(())) => continue,
                        _ => break,
                    }
                }
            }
        }
    });

    Ok(Registration { stop: Some(tx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryStore;

    #[tokio::test]
    async fn register_instance_is_visible_under_prefix() {
        let kv = Arc::new(MemoryStore::new());
        let registration = register_instance(kv.clone(), "grpc", "echo", "1", "127.0.0.1:9000", 30)
            .await
            .unwrap();
        let found = kv.get_prefix("/grpc/echo/").await.unwrap();
        assert_eq!(
            found.get("/grpc/echo/1").map(String::as_str),
            Some("127.0.0.1:9000")
        );
        registration.stop();
    }
}
