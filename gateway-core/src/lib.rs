//! Dynamic gRPC invocation engine backing the HTTP gateway: a registry
//! client (C1), method directory (C2), name resolver (C3), descriptor
//! source and cache (C4), transcoder (C5) and invoker with channel cache
//! (C6).

pub mod codec;
pub mod directory;
pub mod error;
pub mod identity;
pub mod membership;
pub mod reflection;
pub mod registry;
pub mod resolver;
pub mod invoker;

pub use error::{DirectoryError, ErrorCode, InvokeError, RegistryError};
pub use identity::CallerIdentity;
pub use invoker::{InvokeRequest, Invoker};
pub use registry::KvStore;

use std::sync::Arc;

/// Bundles the registry-backed components a running gateway process needs,
/// shared behind an `Arc` via axum's `State` extractor rather than a
/// process-wide singleton (spec.md §9).
pub struct GatewayState {
    registry: Arc<dyn KvStore>,
    invoker: Invoker,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState").finish_non_exhaustive()
    }
}

impl GatewayState {
    pub fn new(registry: Arc<dyn KvStore>, scheme: impl Into<String>) -> Self {
        Self {
            invoker: Invoker::new(registry.clone(), scheme),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<dyn KvStore> {
        &self.registry
    }

    pub async fn invoke(
        &self,
        request: InvokeRequest,
    ) -> Result<serde_json::Value, InvokeError> {
        self.invoker.invoke(request).await
    }

    pub async fn register_method(
        &self,
        version: &str,
        service: &str,
        method: &str,
        authorization: bool,
    ) -> Result<(), DirectoryError> {
        directory::register(self.registry.as_ref(), version, service, method, authorization).await
    }

    pub async fn unregister_method(
        &self,
        version: &str,
        service: &str,
        method: &str,
    ) -> Result<(), DirectoryError> {
        directory::unregister(self.registry.as_ref(), version, service, method).await
    }
}
