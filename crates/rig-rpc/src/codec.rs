//! The encode/decode capability a server is parameterized over.
//!
//! One dispatch core serves both wire formats; everything format-specific
//! (envelopes, payloads, frame type) lives behind this trait.

use crate::error::{DecodeError, EncodeError};
use crate::protocol::{Request, Response};
use crate::transport::{Frame, FrameType};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One wire format for the shared envelope model.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs.
    const NAME: &'static str;

    /// Frame type this format travels in.
    const FRAME_TYPE: FrameType;

    fn decode_request(frame: &[u8]) -> Result<Request, DecodeError>;

    fn encode_request(request: &Request) -> Result<Vec<u8>, EncodeError>;

    fn decode_response(frame: &[u8]) -> Result<Response, DecodeError>;

    fn encode_response(response: &Response) -> Result<Vec<u8>, EncodeError>;

    /// Decode an opaque payload into a concrete type. An absent payload is
    /// decoded as the format's "nothing" value.
    fn decode_payload<T: DeserializeOwned>(payload: Option<&[u8]>) -> Result<T, DecodeError>;

    fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, EncodeError>;

    /// Human-readable rendering of a payload for logs.
    fn describe_payload(payload: Option<&[u8]>) -> String;
}

/// Wrap encoded bytes in the frame type `C` travels in.
pub fn to_frame<C: Codec>(bytes: Vec<u8>) -> Result<Frame, EncodeError> {
    match C::FRAME_TYPE {
        FrameType::Binary => Ok(Frame::Binary(Bytes::from(bytes))),
        FrameType::Text => String::from_utf8(bytes)
            .map(Frame::Text)
            .map_err(|_| EncodeError::InvalidJsonPayload),
    }
}

/// Unwrap a frame's bytes if it is of the type `C` reads.
///
/// Returns `None` for frames of the other type and for close frames.
pub fn frame_bytes<C: Codec>(frame: &Frame) -> Option<&[u8]> {
    match (C::FRAME_TYPE, frame) {
        (FrameType::Binary, Frame::Binary(bytes)) => Some(&bytes[..]),
        (FrameType::Text, Frame::Text(text)) => Some(text.as_bytes()),
        _ => None,
    }
}

/// Encode a response and wrap it for the transport.
pub fn response_frame<C: Codec>(response: &Response) -> Result<Frame, EncodeError> {
    to_frame::<C>(C::encode_response(response)?)
}

/// Encode a request and wrap it for the transport.
pub fn request_frame<C: Codec>(request: &Request) -> Result<Frame, EncodeError> {
    to_frame::<C>(C::encode_request(request)?)
}
