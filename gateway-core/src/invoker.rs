//! C6: channel cache and the end-to-end invoke algorithm.
//!
//! Mirrors `internal/rpc/invoke.go`'s `Invoke()`: directory lookup, then an
//! auth check performed *before* any reflection round trip (so an
//! unauthenticated caller never triggers a descriptor fetch against a
//! method it isn't allowed to call), then dial, resolve, transcode, call.
//! The original's 15-second deadline is widened to the 20 seconds spec.md
//! specifies.

use crate::codec::JsonCodec;
use crate::directory::{self, RoutingRecord};
use crate::error::InvokeError;
use crate::identity::CallerIdentity;
use crate::reflection::{self, DescriptorCache};
use crate::registry::KvStore;
use crate::resolver::NameResolver;
use http::uri::PathAndQuery;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

const CALL_TIMEOUT: Duration = Duration::from_secs(20);

pub struct InvokeRequest {
    pub version: String,
    pub service: String,
    pub method: String,
    pub body: serde_json::Value,
    pub remote_addr: String,
    pub caller: Option<CallerIdentity>,
}

pub struct Invoker {
    directory_kv: Arc<dyn KvStore>,
    resolver: NameResolver,
    descriptors: DescriptorCache,
    channels: RwLock<HashMap<String, Channel>>,
}

impl Invoker {
    pub fn new(registry: Arc<dyn KvStore>, scheme: impl Into<String>) -> Self {
        Self {
            resolver: NameResolver::new(registry.clone(), scheme),
            directory_kv: registry,
            descriptors: DescriptorCache::new(),
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn channel_for(&self, service: &str) -> Result<Channel, InvokeError> {
        if let Some(channel) = self
            .channels
            .read()
            .expect("channel cache lock poisoned")
            .get(service)
        {
            return Ok(channel.clone());
        }

        let channel = self.resolver.resolve(service).await.map_err(|err| {
            tracing::warn!(%service, error = %err, "name resolution failed");
            InvokeError::NoAvailableService(service.to_string())
        })?;

        self.channels
            .write()
            .expect("channel cache lock poisoned")
            .insert(service.to_string(), channel.clone());
        Ok(channel)
    }

    pub async fn invoke(&self, req: InvokeRequest) -> Result<serde_json::Value, InvokeError> {
        let record: RoutingRecord = directory::lookup(
            self.directory_kv.as_ref(),
            &req.version,
            &req.service,
            &req.method,
        )
        .await?;

        if record.authorization && req.caller.is_none() {
            return Err(InvokeError::LoginRequired);
        }

        let channel = self.channel_for(&req.service).await?;
        let descriptors =
            reflection::resolve_method(&self.descriptors, channel.clone(), &req.service, &req.method)
                .await?;

        let mut pool = descriptors.pool.clone();
        reflection::prefetch_any_types(&mut pool, channel.clone(), &req.body).await?;

        let codec = JsonCodec::new(descriptors.method.input(), descriptors.method.output());
        let mut client = tonic::client::Grpc::new(channel);
        client
            .ready()
            .await
            .map_err(|e| InvokeError::RemoteCallFailed(tonic::Status::unavailable(e.to_string())))?;

        let path = PathAndQuery::from_str(&record.path)
            .map_err(|e| InvokeError::RemoteCallFailed(tonic::Status::internal(e.to_string())))?;

        let mut request = tonic::Request::new(req.body);
        if let Ok(value) = MetadataValue::try_from(req.remote_addr.as_str()) {
            request.metadata_mut().insert("host", value);
        }
        if let Some(identity) = &req.caller {
            if let Ok(value) = MetadataValue::try_from(identity.to_metadata_value()) {
                request.metadata_mut().insert("user", value);
            }
        }

        let call = client.unary(request, path, codec);
        let response = tokio::time::timeout(CALL_TIMEOUT, call)
            .await
            .map_err(|_| {
                InvokeError::RemoteCallFailed(tonic::Status::deadline_exceeded(
                    "gateway call timed out",
                ))
            })?
            .map_err(InvokeError::RemoteCallFailed)?;

        Ok(response.into_inner())
    }
}
