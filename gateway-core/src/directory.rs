//! C2: the method directory.
//!
//! Maps `(version, service, method)` to a [`RoutingRecord`] stored as JSON
//! under a composite key, grounded on `internal/service/etcd/discover.go`'s
//! `RegisterMethod`/`UnRegisterMethod`. The wire field is `authorization`,
//! not `authRequired` — kept as the original names it.

use crate::error::DirectoryError;
use crate::registry::KvStore;
use serde::{Deserialize, Serialize};

/// What the directory hands back for a resolved method: whether the caller
/// must be authenticated, and the gRPC path (`/{service}/{method}`) used to
/// look the method up in the reflected descriptor set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingRecord {
    pub authorization: bool,
    pub path: String,
}

/// Lowercases the first rune only, matching Go's `lowerFirst` in
/// `discover.go` (used so method directory keys are case-insensitive on
/// their leading letter while `path` preserves the caller-visible casing).
fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn directory_key(version: &str, service: &str, method: &str) -> String {
    format!(
        "{version}.{}.{}",
        lower_first(service),
        lower_first(method)
    )
}

/// Registers a method under `{version}/{service}/{method}`. `authorization`
/// mirrors the YAML config's per-method flag (spec.md §6).
pub async fn register(
    kv: &dyn KvStore,
    version: &str,
    service: &str,
    method: &str,
    authorization: bool,
) -> Result<(), DirectoryError> {
    let record = RoutingRecord {
        authorization,
        path: format!("/{service}/{method}"),
    };
    let value = serde_json::to_string(&record)
        .map_err(|e| DirectoryError::Malformed(directory_key(version, service, method), e))?;
    kv.put(&directory_key(version, service, method), &value)
        .await?;
    Ok(())
}

pub async fn unregister(
    kv: &dyn KvStore,
    version: &str,
    service: &str,
    method: &str,
) -> Result<(), DirectoryError> {
    kv.delete(&directory_key(version, service, method)).await?;
    Ok(())
}

/// Looks up the routing record for an incoming `POST /{version}/{service}/{method}`
/// request. Distinguishes "no such method" (`NotFound`) from a registry
/// transport failure (`Registry`) and from a corrupt stored value (`Malformed`).
pub async fn lookup(
    kv: &dyn KvStore,
    version: &str,
    service: &str,
    method: &str,
) -> Result<RoutingRecord, DirectoryError> {
    let key = directory_key(version, service, method);
    let raw = kv
        .get(&key)
        .await?
        .ok_or_else(|| DirectoryError::NotFound(key.clone()))?;
    serde_json::from_str(&raw).map_err(|e| DirectoryError::Malformed(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryStore;

    #[test]
    fn lower_first_handles_empty_and_ascii() {
        assert_eq!(lower_first(""), "");
        assert_eq!(lower_first("Echo"), "echo");
        assert_eq!(lower_first("say"), "say");
    }

    #[tokio::test]
    async fn register_then_lookup_roundtrips() {
        let kv = MemoryStore::new();
        register(&kv, "v1", "Echo", "Say", true).await.unwrap();
        let record = lookup(&kv, "v1", "Echo", "Say").await.unwrap();
        assert_eq!(record.path, "/Echo/Say");
        assert!(record.authorization);
    }

    #[tokio::test]
    async fn lookup_missing_method_is_not_found() {
        let kv = MemoryStore::new();
        let err = lookup(&kv, "v1", "Echo", "Say").await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn unregister_removes_record() {
        let kv = MemoryStore::new();
        register(&kv, "v1", "Echo", "Say", false).await.unwrap();
        unregister(&kv, "v1", "Echo", "Say").await.unwrap();
        assert!(lookup(&kv, "v1", "Echo", "Say").await.is_err());
    }
}
