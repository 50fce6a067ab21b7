//! JSON encoding: a subset of JSON-RPC 2.0 with string ids.
//!
//! Requests are `{"id"?, "method", "params", "stream"?}`. A missing (or empty)
//! `id` makes the request a notification; `"stream": true` asks for a streaming
//! response. `params` is kept as an undecoded sub-document until the handler's
//! input type is known.
//!
//! Responses:
//!
//! ```text
//! succeed  {"id", "result"}
//! yield    {"id", "result", "end": false}
//! end      {"id", "end": true}
//! fail     {"id", "error": {"code", "message", "data"?}}
//! notify   {"method", "params"}
//! call     {"id", "method", "params"}
//! ```

use crate::codec::Codec;
use crate::error::{DecodeError, EncodeError};
use crate::protocol::{Fail, Request, RequestKind, Response, ResponseBody};
use crate::transport::FrameType;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// The JSON object encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

#[derive(Deserialize)]
struct WireRequest<'a> {
    #[serde(default)]
    id: Option<String>,
    method: String,
    #[serde(default, borrow)]
    params: Option<&'a RawValue>,
    #[serde(default)]
    stream: bool,
}

#[derive(Serialize)]
struct OutboundRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Just enough of a request to answer a malformed one.
#[derive(Deserialize)]
struct IdOnly {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    code: i32,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Box<RawValue>>,
}

fn raw(payload: &Option<Bytes>) -> Result<Option<Box<RawValue>>, EncodeError> {
    payload.as_deref().map(raw_value).transpose()
}

fn raw_or_null(payload: &Option<Bytes>) -> Result<Option<Box<RawValue>>, EncodeError> {
    match payload {
        Some(bytes) => raw_value(bytes).map(Some),
        None => Ok(Some(raw_value(b"null")?)),
    }
}

fn raw_value(bytes: &[u8]) -> Result<Box<RawValue>, EncodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| EncodeError::InvalidJsonPayload)?;
    Ok(RawValue::from_string(text.to_string())?)
}

fn payload(value: Option<Box<RawValue>>) -> Option<Bytes> {
    value.map(|raw| Bytes::copy_from_slice(raw.get().as_bytes()))
}

impl Codec for Json {
    const NAME: &'static str = "jrpc";
    const FRAME_TYPE: FrameType = FrameType::Text;

    fn decode_request(frame: &[u8]) -> Result<Request, DecodeError> {
        let wire: WireRequest<'_> = match serde_json::from_slice(frame) {
            Ok(wire) => wire,
            Err(err) => {
                let err = DecodeError::from(err);
                return Err(match serde_json::from_slice::<IdOnly>(frame) {
                    Ok(IdOnly { id: Some(id) }) if !id.is_empty() => err.with_id(id),
                    _ => err,
                });
            }
        };
        let id = wire.id.unwrap_or_default();
        let kind = if id.is_empty() {
            RequestKind::Notify
        } else if wire.stream {
            RequestKind::Start
        } else {
            RequestKind::Call
        };
        Ok(Request {
            id,
            kind,
            function: wire.method,
            input: wire
                .params
                .map(|raw| Bytes::copy_from_slice(raw.get().as_bytes())),
        })
    }

    fn encode_request(request: &Request) -> Result<Vec<u8>, EncodeError> {
        let wire = OutboundRequest {
            id: request.expects_response().then_some(request.id.as_str()),
            method: &request.function,
            params: raw(&request.input)?,
            stream: request.kind.is_streaming(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    fn decode_response(frame: &[u8]) -> Result<Response, DecodeError> {
        let wire: WireResponse = serde_json::from_slice(frame)?;
        let id = wire.id.unwrap_or_default();
        let body = if let Some(error) = wire.error {
            ResponseBody::Fail(Fail::new(error.code, error.message))
        } else if let Some(function) = wire.method {
            let params = payload(wire.params);
            if id.is_empty() {
                ResponseBody::Notify { function, params }
            } else {
                ResponseBody::Call { function, params }
            }
        } else {
            match wire.end {
                Some(true) => ResponseBody::End,
                Some(false) => ResponseBody::Yield(payload(wire.result)),
                None => ResponseBody::Succ(payload(wire.result)),
            }
        };
        Ok(Response { id, body })
    }

    fn encode_response(response: &Response) -> Result<Vec<u8>, EncodeError> {
        let id = Some(response.id.clone());
        let wire = match &response.body {
            ResponseBody::Succ(output) => WireResponse {
                id,
                result: raw_or_null(output)?,
                ..Default::default()
            },
            ResponseBody::Yield(output) => WireResponse {
                id,
                result: raw_or_null(output)?,
                end: Some(false),
                ..Default::default()
            },
            ResponseBody::End => WireResponse {
                id,
                end: Some(true),
                ..Default::default()
            },
            ResponseBody::Fail(fail) => WireResponse {
                id,
                error: Some(WireError {
                    code: fail.code,
                    message: fail.msg.clone(),
                    data: None,
                }),
                ..Default::default()
            },
            ResponseBody::Notify { function, params } => WireResponse {
                method: Some(function.clone()),
                params: raw(params)?,
                ..Default::default()
            },
            ResponseBody::Call { function, params } => WireResponse {
                id,
                method: Some(function.clone()),
                params: raw(params)?,
                ..Default::default()
            },
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    fn decode_payload<T: DeserializeOwned>(payload: Option<&[u8]>) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(payload.unwrap_or(b"null".as_slice()))?)
    }

    fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn describe_payload(payload: Option<&[u8]>) -> String {
        match payload {
            None => "null".to_string(),
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}
