//! C1: the registry client.
//!
//! Wraps a watched key-value store with lease-based liveness behind the
//! [`KvStore`] trait so that the method directory (C2) and name resolver
//! (C3) never depend on etcd concretely (spec.md §9, "process-wide
//! singletons" / "explicit dependencies, not ambient globals").

pub mod etcd;
pub mod memory;

use crate::error::RegistryError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashMap;

/// A single mutation observed on a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: String, value: String },
    Delete { key: String },
}

pub type WatchStream = BoxStream<'static, Result<WatchEvent, RegistryError>>;
pub type KeepAliveStream = BoxStream<'static, Result<(), RegistryError>>;

/// The registry transport contract (spec.md §4.1).
///
/// `get` returning `Ok(None)` means "key absent"; a transport failure is a
/// distinct `Err` (this is the §9 "swallow error, return ∅" redesign flag,
/// resolved: callers can tell "not found" from "registry unavailable").
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<bool, RegistryError>;

    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError>;

    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, RegistryError>;

    async fn delete(&self, key: &str) -> Result<(), RegistryError>;

    /// Every mutation under `prefix`, in commit order, for the lifetime of
    /// the returned stream. A missed/compacted event surfaces as a fatal
    /// `Err` on the stream rather than being silently skipped (spec.md §4.1).
    async fn watch(&self, prefix: &str) -> Result<WatchStream, RegistryError>;

    async fn grant_lease(&self, ttl_seconds: i64) -> Result<i64, RegistryError>;

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease_id: i64,
    ) -> Result<(), RegistryError>;

    async fn keep_alive(&self, lease_id: i64) -> Result<KeepAliveStream, RegistryError>;
}
