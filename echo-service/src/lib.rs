//! Minimal gRPC service used as the backend under test by `gateway-core`'s
//! integration tests — an in-process stand-in for a real registered
//! service, exposing its own descriptors over server reflection the same
//! way a production backend would.

pub mod echo {
    tonic::include_proto!("echo");
}

pub use echo::{
    echo_service_server::{EchoService, EchoServiceServer},
    SayReply, SayRequest,
};

/// Raw `FileDescriptorSet` bytes for the `echo` package, generated at build
/// time by `tonic-prost-build`. Used to seed a `tonic-reflection` server so
/// that tests can exercise the gateway's descriptor-fetch path exactly as a
/// reflection-capable backend would present it.
pub const FILE_DESCRIPTOR_SET: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/echo_descriptor.bin"));

#[derive(Debug, Default)]
pub struct EchoServiceImpl;

#[tonic::async_trait]
impl EchoService for EchoServiceImpl {
    async fn say(
        &self,
        request: tonic::Request<SayRequest>,
    ) -> Result<tonic::Response<SayReply>, tonic::Status> {
        let message = request.into_inner().message;
        Ok(tonic::Response::new(SayReply { message }))
    }
}
