//! Production [`KvStore`] backed by etcd, grounded on
//! `internal/service/etcd/client.go` and `internal/service/etcd/naming.go`
//! in the original source. `etcd-client` is itself built on `tonic`, which
//! keeps the registry transport on the same stack as the backend RPCs.

use super::{KeepAliveStream, KvStore, WatchEvent, WatchStream};
use crate::error::RegistryError;
use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, EventType, GetOptions, PutOptions, WatchOptions,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Credentials and dial options recognized under the `etcd` config block
/// (spec.md §6).
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect(cfg: &EtcdConfig) -> Result<Self, RegistryError> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(std::time::Duration::from_secs(cfg.dial_timeout_secs));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            options = options.with_user(user.clone(), pass.clone());
        }
        let client = Client::connect(&cfg.endpoints, Some(options)).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn put(&self, key: &str, value: &str) -> Result<bool, RegistryError> {
        let mut client = self.client.kv_client();
        match client.put(key, value, None).await {
            Ok(_) => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let mut client = self.client.kv_client();
        let resp = client.get(key, None).await?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| String::from_utf8_lossy(kv.value()).into_owned()))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, RegistryError> {
        let mut client = self.client.kv_client();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    String::from_utf8_lossy(kv.value()).into_owned(),
                )
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), RegistryError> {
        let mut client = self.client.kv_client();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, RegistryError> {
        let mut watch_client = self.client.watch_client();
        let (_watcher, mut stream) = watch_client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        if resp.canceled() {
                            let _ = tx.send(Err(RegistryError::WatchCompacted)).await;
                            break;
                        }
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let key = String::from_utf8_lossy(kv.key()).into_owned();
                            let mapped = match event.event_type() {
                                EventType::Put => WatchEvent::Put {
                                    key,
                                    value: String::from_utf8_lossy(kv.value()).into_owned(),
                                },
                                EventType::Delete => WatchEvent::Delete { key },
                            };
                            if tx.send(Ok(mapped)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(Err(RegistryError::WatchClosed)).await;
                        break;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn grant_lease(&self, ttl_seconds: i64) -> Result<i64, RegistryError> {
        let mut lease_client = self.client.lease_client();
        let resp = lease_client.grant(ttl_seconds, None).await?;
        Ok(resp.id())
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease_id: i64,
    ) -> Result<(), RegistryError> {
        let mut client = self.client.kv_client();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64) -> Result<KeepAliveStream, RegistryError> {
        let mut lease_client = self.client.lease_client();
        let (mut keeper, mut stream) = lease_client.keep_alive(lease_id).await?;

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            loop {
                if keeper.keep_alive().await.is_err() {
                    break;
                }
                match stream.message().await {
                    Ok(Some(_)) => {
                        if tx.send(Ok(())).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(Err(RegistryError::WatchClosed)).await;
                        break;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        break;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
