//! Compact binary encoding.
//!
//! Envelopes are fixed-arity postcard tuples:
//!
//! ```text
//! request:  [id: string, kind: string, function: string, input: bytes?]
//! response: [id: string, method: string, output: bytes?]
//! ```
//!
//! `input` and `output` are themselves postcard blobs, so the envelope can be
//! decoded without knowing the payload type. Method-specific outputs:
//!
//! - `succ` / `yield`: the handler's encoded output
//! - `fail`: `[code: int, msg: string]`
//! - `end`: absent
//! - `notify` / `call`: `[function: string, params: bytes?]`

use crate::codec::Codec;
use crate::error::{DecodeError, EncodeError};
use crate::protocol::{Fail, Request, RequestKind, Response, ResponseBody};
use crate::transport::FrameType;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bytes of a payload shown in log previews.
const PREVIEW_LEN: usize = 32;

/// The binary tuple encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binary;

/// Tag `err` with the request id, unless the id is empty and the request
/// could not be answered anyway.
fn answerable(err: DecodeError, id: &str) -> DecodeError {
    if id.is_empty() {
        err
    } else {
        err.with_id(id)
    }
}

impl Codec for Binary {
    const NAME: &'static str = "mrpc";
    const FRAME_TYPE: FrameType = FrameType::Binary;

    fn decode_request(frame: &[u8]) -> Result<Request, DecodeError> {
        // The id is decoded on its own first so that a broken tail can still be
        // answered against the right request.
        let (id, rest): (String, &[u8]) = postcard::take_from_bytes(frame)
            .map_err(|e| DecodeError::new(format!("{e} in request id")))?;
        let ((kind, function, input), rest): ((String, String, Option<Bytes>), &[u8]) =
            postcard::take_from_bytes(rest).map_err(|e| answerable(DecodeError::from(e), &id))?;
        if !rest.is_empty() {
            let err = DecodeError::new(format!("{} trailing bytes after request", rest.len()));
            return Err(answerable(err, &id));
        }
        Ok(Request {
            id,
            kind: RequestKind::from(kind.as_str()),
            function,
            input,
        })
    }

    fn encode_request(request: &Request) -> Result<Vec<u8>, EncodeError> {
        Ok(postcard::to_allocvec(&(
            &request.id,
            request.kind.as_str(),
            &request.function,
            &request.input,
        ))?)
    }

    fn decode_response(frame: &[u8]) -> Result<Response, DecodeError> {
        let ((id, method, output), rest): ((String, String, Option<Bytes>), &[u8]) =
            postcard::take_from_bytes(frame)?;
        if !rest.is_empty() {
            return Err(DecodeError::new(format!(
                "{} trailing bytes after response",
                rest.len()
            ))
            .with_id(id));
        }
        let body = match method.as_str() {
            "succ" => ResponseBody::Succ(output),
            "yield" => ResponseBody::Yield(output),
            "end" => ResponseBody::End,
            "fail" => {
                let fail: Fail = Self::decode_payload(output.as_deref())
                    .map_err(|e| e.with_id(&id))?;
                ResponseBody::Fail(fail)
            }
            "notify" | "call" => {
                let (function, params): (String, Option<Bytes>) =
                    Self::decode_payload(output.as_deref()).map_err(|e| e.with_id(&id))?;
                if method == "notify" {
                    ResponseBody::Notify { function, params }
                } else {
                    ResponseBody::Call { function, params }
                }
            }
            other => {
                return Err(DecodeError::new(format!("unknown response method {other:?}")).with_id(id))
            }
        };
        Ok(Response { id, body })
    }

    fn encode_response(response: &Response) -> Result<Vec<u8>, EncodeError> {
        let output = match &response.body {
            ResponseBody::Succ(output) | ResponseBody::Yield(output) => output.clone(),
            ResponseBody::End => None,
            ResponseBody::Fail(fail) => Some(Self::encode_payload(fail)?),
            ResponseBody::Notify { function, params } | ResponseBody::Call { function, params } => {
                Some(Self::encode_payload(&(function, params))?)
            }
        };
        Ok(postcard::to_allocvec(&(
            &response.id,
            response.body.method(),
            &output,
        ))?)
    }

    fn decode_payload<T: DeserializeOwned>(payload: Option<&[u8]>) -> Result<T, DecodeError> {
        Ok(postcard::from_bytes(payload.unwrap_or_default())?)
    }

    fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from(postcard::to_allocvec(value)?))
    }

    fn describe_payload(payload: Option<&[u8]>) -> String {
        match payload {
            None => "nil".to_string(),
            Some(bytes) if bytes.len() <= PREVIEW_LEN => {
                format!("{} bytes: {}", bytes.len(), hex::encode(bytes))
            }
            Some(bytes) => format!(
                "{} bytes: {}...",
                bytes.len(),
                hex::encode(&bytes[..PREVIEW_LEN])
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        msg: String,
        info: Vec<String>,
    }

    fn printf_request() -> Request {
        let input = Binary::encode_payload(&Greeting {
            msg: "Hello, %s!".into(),
            info: vec!["world".into()],
        })
        .unwrap();
        Request::new("1", RequestKind::Call, "printf", Some(input))
    }

    #[test]
    fn test_request_roundtrip_and_lazy_input() {
        let req = printf_request();
        let bytes = Binary::encode_request(&req).unwrap();
        let decoded = Binary::decode_request(&bytes).unwrap();
        assert_eq!(decoded, req);

        let greeting: Greeting = Binary::decode_payload(decoded.input.as_deref()).unwrap();
        assert_eq!(greeting.info, vec!["world".to_string()]);
    }

    #[test]
    fn test_request_without_input() {
        let req = Request::new("2", RequestKind::Call, "nope", None);
        let decoded = Binary::decode_request(&Binary::encode_request(&req).unwrap()).unwrap();
        assert_eq!(decoded.input, None);
        assert_eq!(decoded.function, "nope");
    }

    #[test]
    fn test_large_payload() {
        let blob = Bytes::from(vec![0xab; 1 << 20]);
        let req = Request::new("big", RequestKind::Start, "upload", Some(blob.clone()));
        let decoded = Binary::decode_request(&Binary::encode_request(&req).unwrap()).unwrap();
        assert_eq!(decoded.input, Some(blob));
    }

    #[test]
    fn test_truncated_request_keeps_id() {
        let bytes = Binary::encode_request(&printf_request()).unwrap();
        let err = Binary::decode_request(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("1"));
    }

    #[test]
    fn test_broken_request_with_empty_id_has_no_id() {
        let req = Request::new("", RequestKind::Notify, "log", None);
        let bytes = Binary::encode_request(&req).unwrap();
        let err = Binary::decode_request(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.id.is_none());

        let mut bytes = Binary::encode_request(&req).unwrap();
        bytes.push(0);
        let err = Binary::decode_request(&bytes).unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn test_garbage_request_has_no_id() {
        let err = Binary::decode_request(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.id.is_none());
    }

    #[test]
    fn test_response_roundtrip() {
        let responses = [
            Response::new("1", ResponseBody::Succ(Some(Bytes::from_static(b"\x05hello")))),
            Response::new("1", ResponseBody::Yield(Some(Bytes::from_static(b"\x01")))),
            Response::new("1", ResponseBody::End),
            Response::fail("2", 404, r#"function "nope" not found"#),
            Response::new(
                "",
                ResponseBody::Notify {
                    function: "tick".into(),
                    params: None,
                },
            ),
            Response::new(
                "srv-1",
                ResponseBody::Call {
                    function: "confirm".into(),
                    params: Some(Bytes::from_static(b"\x02ok")),
                },
            ),
        ];
        for response in responses {
            let bytes = Binary::encode_response(&response).unwrap();
            assert_eq!(Binary::decode_response(&bytes).unwrap(), response);
        }
    }

    #[test]
    fn test_fail_output_is_code_and_message() {
        let bytes = Binary::encode_response(&Response::fail("2", 406, "bad")).unwrap();
        let (id, method, output): (String, String, Option<Bytes>) =
            postcard::from_bytes(&bytes).unwrap();
        assert_eq!((id.as_str(), method.as_str()), ("2", "fail"));
        let (code, msg): (i32, String) = postcard::from_bytes(&output.unwrap()).unwrap();
        assert_eq!((code, msg.as_str()), (406, "bad"));
    }

    #[test]
    fn test_describe_payload() {
        assert_eq!(Binary::describe_payload(None), "nil");
        assert_eq!(Binary::describe_payload(Some(&[1, 2])), "2 bytes: 0102");
        assert!(Binary::describe_payload(Some(&[0; 64])).ends_with("..."));
    }
}
