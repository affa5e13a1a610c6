//! C3: the name resolver.
//!
//! Service addresses are registered under the prefix `"/{scheme}/{service}/"`,
//! one key per instance (spec.md §3/§4.3/§6; grounded on
//! `internal/service/etcd/naming.go` and the custom `grpc/resolver.Builder`
//! in `resolver.go`). Rather than reimplement a gRPC-core resolver, this
//! pushes bootstrap and watch events straight into a `tonic` load-balanced
//! channel via `tower::discover::Change` — the idiomatic Rust equivalent of
//! the Go original's custom resolver, and the resolution for spec.md §9's
//! "round_robin" Open Question: tonic's `balance_channel` load-balances
//! (power-of-two-choices), it does not do literal round robin, and that's
//! the accepted substitution.

use crate::error::RegistryError;
use crate::registry::{KvStore, WatchEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use tonic::transport::channel::Change;
use tonic::transport::{Channel, Endpoint};

const BALANCE_CHANNEL_CAPACITY: usize = 32;

pub struct NameResolver {
    registry: Arc<dyn KvStore>,
    scheme: String,
}

impl NameResolver {
    pub fn new(registry: Arc<dyn KvStore>, scheme: impl Into<String>) -> Self {
        Self {
            registry,
            scheme: scheme.into(),
        }
    }

    /// Builds a load-balanced channel for `service` and spawns a task that
    /// keeps it in sync with the registry for as long as the channel lives.
    /// Callers (the invoker's channel cache, C6) are expected to call this
    /// once per service and hold onto the resulting `Channel`.
    pub async fn resolve(&self, service: &str) -> Result<Channel, RegistryError> {
        let (channel, tx) = Channel::balance_channel::<String>(BALANCE_CHANNEL_CAPACITY);
        let prefix = format!("/{}/{service}/", self.scheme);

        let initial = self.registry.get_prefix(&prefix).await?;
        for (key, address) in initial {
            if let Some(endpoint) = to_endpoint(&address) {
                let _ = tx.send(Change::Insert(key, endpoint)).await;
            }
        }

        let mut watch = self.registry.watch(&prefix).await?;
        let watch_tx = tx.clone();
        let service = service.to_string();
        tokio::spawn(async move {
            while let Some(event) = watch.next().await {
                match event {
                    Ok(WatchEvent::Put { key, value }) => {
                        let Some(endpoint) = to_endpoint(&value) else {
                            continue;
                        };
                        if watch_tx.send(Change::Insert(key, endpoint)).await.is_err() {
                            break;
                        }
                    }
                    Ok(WatchEvent::Delete { key }) => {
                        if watch_tx.send(Change::Remove(key)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%service, error = %err, "name resolver watch ended");
                        break;
                    }
                }
            }
        });

        Ok(channel)
    }
}

fn to_endpoint(address: &str) -> Option<Endpoint> {
    let uri = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    Endpoint::from_shared(uri).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryStore;

    #[tokio::test]
    async fn resolve_picks_up_bootstrap_addresses() {
        let kv = Arc::new(MemoryStore::new());
        kv.put("/grpc/echo/1", "127.0.0.1:50051").await.unwrap();
        let resolver = NameResolver::new(kv, "grpc");
        let channel = resolver.resolve("echo").await.unwrap();
        drop(channel);
    }

    #[test]
    fn to_endpoint_accepts_bare_host_port() {
        assert!(to_endpoint("127.0.0.1:50051").is_some());
        assert!(to_endpoint("https://example.com:443").is_some());
    }
}
