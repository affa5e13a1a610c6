//! C5: the transcoder.
//!
//! A `tonic::codec::Codec` that encodes outgoing `serde_json::Value`
//! request bodies into protobuf wire bytes using a request
//! `MessageDescriptor`, and decodes incoming protobuf wire bytes back into
//! `serde_json::Value` using a response `MessageDescriptor`. Shaped after
//! `DynamicCodec` (grpcurl-rs, binary in/binary out) but swaps both sides
//! for JSON, matching how `granc-core`'s client handler layer constructs
//! `JsonCodec::new(method.input(), method.output())` per call.

use bytes::Buf;
use prost::Message as _;
use prost_reflect::{DynamicMessage, MessageDescriptor, SerializeOptions};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("request body does not match method input schema: {0}")]
    Encode(serde_json::Error),
    #[error("response payload does not match method output schema: {0}")]
    DecodeJson(serde_json::Error),
    #[error("response payload is not valid protobuf for its descriptor: {0}")]
    DecodeProto(#[from] prost::DecodeError),
}

impl From<TranscodeError> for Status {
    fn from(err: TranscodeError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

#[derive(Clone)]
pub struct JsonCodec {
    input: MessageDescriptor,
    output: MessageDescriptor,
}

impl JsonCodec {
    pub fn new(input: MessageDescriptor, output: MessageDescriptor) -> Self {
        Self { input, output }
    }
}

impl Codec for JsonCodec {
    type Encode = serde_json::Value;
    type Decode = serde_json::Value;
    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder {
            descriptor: self.input.clone(),
        }
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder {
            descriptor: self.output.clone(),
        }
    }
}

pub struct JsonEncoder {
    descriptor: MessageDescriptor,
}

impl Encoder for JsonEncoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let message = DynamicMessage::deserialize(self.descriptor.clone(), item)
            .map_err(TranscodeError::Encode)?;
        message
            .encode(dst)
            .map_err(|e| Status::internal(format!("failed to encode protobuf: {e}")))?;
        Ok(())
    }
}

pub struct JsonDecoder {
    descriptor: MessageDescriptor,
}

impl Decoder for JsonDecoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let message = DynamicMessage::decode(self.descriptor.clone(), src)
            .map_err(TranscodeError::from)?;
        // Emit default-valued fields (spec.md §4.5) rather than prost-reflect's
        // default of omitting them, matching the original's
        // jsonpb.Marshaler{EmitDefaults: true}.
        let options = SerializeOptions::new().skip_default_fields(false);
        let value = message
            .serialize_with_options(serde_json::value::Serializer, &options)
            .map_err(TranscodeError::DecodeJson)?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_test_support::compile_protos;
    use serde::Serialize as _;

    fn echo_descriptors() -> (MessageDescriptor, MessageDescriptor) {
        let set = compile_protos(&[(
            "echo.proto",
            r#"
                syntax = "proto3";
                package echo;
                message SayRequest { string message = 1; }
                message SayReply { string message = 1; int32 id = 2; }
            "#,
        )]);
        let pool = prost_reflect::DescriptorPool::from_file_descriptor_set(set).unwrap();
        (
            pool.get_message_by_name("echo.SayRequest").unwrap(),
            pool.get_message_by_name("echo.SayReply").unwrap(),
        )
    }

    #[test]
    fn json_roundtrips_through_protobuf_bytes() {
        let (input, output) = echo_descriptors();
        let message = DynamicMessage::deserialize(input, serde_json::json!({"message": "hi"}))
            .unwrap();
        let bytes = message.encode_to_vec();

        let decoded = DynamicMessage::decode(output, bytes.as_slice()).unwrap();
        let value = decoded.serialize(serde_json::value::Serializer).unwrap();
        assert_eq!(value["message"], "hi");
    }

    #[test]
    fn decode_emits_default_valued_fields() {
        let (_, output) = echo_descriptors();
        // `id` is left at its default (0) and `message` is empty; both must
        // still appear in the serialized JSON rather than being omitted, the
        // same SerializeOptions JsonDecoder::decode uses.
        let message = DynamicMessage::deserialize(output, serde_json::json!({})).unwrap();
        let options = SerializeOptions::new().skip_default_fields(false);
        let value = message
            .serialize_with_options(serde_json::value::Serializer, &options)
            .unwrap();
        assert_eq!(value["message"], "");
        assert_eq!(value["id"], 0);
    }
}
