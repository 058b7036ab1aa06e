//! Message shapes of the msgpack-RPC protocol.
//!
//! Every wire frame is a msgpack array whose first element is the type tag:
//!
//! - Request: `[0, id, method, params]`
//! - Response: `[1, id, error, result]`
//! - Notification: `[2, method, params]`
//!
//! The tag is decoded first and the rest of the shape is branched per type,
//! so a notification (which carries no id or error slot) is never forced
//! through the 4-element response layout.

use rmpv::Value;
use thiserror::Error;

use crate::error::{ClientError, Result};

/// Message type tags (first element of every frame).
pub mod message_type {
    /// Request frame: `[0, id, method, params]`.
    pub const REQUEST: u64 = 0;
    /// Response frame: `[1, id, error, result]`.
    pub const RESPONSE: u64 = 1;
    /// Notification frame: `[2, method, params]`.
    pub const NOTIFICATION: u64 = 2;
}

/// Error returned by the remote side in a response frame.
///
/// Wire shape: a 2-element array `[code, message]` in the response's error
/// slot, nil when the call succeeded.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    /// Server-defined error code.
    pub code: i64,
    /// Human-readable description from the server.
    pub message: String,
}

impl RemoteError {
    fn from_value(value: Value) -> Result<Self> {
        let Value::Array(pair) = value else {
            return Err(ClientError::Protocol(
                "response error slot is not an array".to_string(),
            ));
        };
        let [code, message] = <[Value; 2]>::try_from(pair).map_err(|pair| {
            ClientError::Protocol(format!(
                "response error has {} elements, expected 2",
                pair.len()
            ))
        })?;
        let code = code.as_i64().ok_or_else(|| {
            ClientError::Protocol("response error code is not an integer".to_string())
        })?;
        let message = expect_string(message, "response error message")?;
        Ok(Self { code, message })
    }
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call placed by one side, expecting a response with the same id.
    Request {
        id: u64,
        method: String,
        params: Vec<Value>,
    },
    /// Answer to a previously placed call.
    ///
    /// `result` is `Value::Nil` for a void success.
    Response {
        id: u64,
        error: Option<RemoteError>,
        result: Value,
    },
    /// Fire-and-forget event; carries no id and expects no answer.
    Notification { method: String, params: Vec<Value> },
}

impl Message {
    /// Interpret one decoded msgpack value as a protocol frame.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(fields) = value else {
            return Err(ClientError::Protocol("frame is not an array".to_string()));
        };
        let tag = fields
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Protocol("frame has no integer type tag".to_string()))?;

        match tag {
            message_type::REQUEST => {
                let [_, id, method, params] = take_fields::<4>(fields, "request")?;
                Ok(Message::Request {
                    id: expect_id(id)?,
                    method: expect_string(method, "request method")?,
                    params: expect_array(params, "request params")?,
                })
            }
            message_type::RESPONSE => {
                let [_, id, error, result] = take_fields::<4>(fields, "response")?;
                let error = if error.is_nil() {
                    None
                } else {
                    Some(RemoteError::from_value(error)?)
                };
                Ok(Message::Response {
                    id: expect_id(id)?,
                    error,
                    result,
                })
            }
            message_type::NOTIFICATION => {
                let [_, method, params] = take_fields::<3>(fields, "notification")?;
                Ok(Message::Notification {
                    method: expect_string(method, "notification method")?,
                    params: expect_array(params, "notification params")?,
                })
            }
            other => Err(ClientError::Protocol(format!(
                "unknown message type tag {other}"
            ))),
        }
    }
}

/// Encode a request frame `[0, id, method, params]`.
pub fn encode_request(method: &str, id: u64, params: Vec<Value>) -> Result<Vec<u8>> {
    encode_frame(Value::Array(vec![
        Value::from(message_type::REQUEST),
        Value::from(id),
        Value::from(method),
        Value::Array(params),
    ]))
}

/// Encode a response frame `[1, id, error, result]`.
///
/// The client never sends responses itself; this is the mirror half of the
/// codec, used by servers and by test harnesses scripting the remote side.
pub fn encode_response(id: u64, error: Option<&RemoteError>, result: Value) -> Result<Vec<u8>> {
    let error = match error {
        Some(err) => Value::Array(vec![
            Value::from(err.code),
            Value::from(err.message.as_str()),
        ]),
        None => Value::Nil,
    };
    encode_frame(Value::Array(vec![
        Value::from(message_type::RESPONSE),
        Value::from(id),
        error,
        result,
    ]))
}

/// Encode a notification frame `[2, method, params]`.
pub fn encode_notification(method: &str, params: Vec<Value>) -> Result<Vec<u8>> {
    encode_frame(Value::Array(vec![
        Value::from(message_type::NOTIFICATION),
        Value::from(method),
        Value::Array(params),
    ]))
}

fn encode_frame(frame: Value) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    rmpv::encode::write_value(&mut buf, &frame)?;
    Ok(buf)
}

fn take_fields<const N: usize>(fields: Vec<Value>, kind: &str) -> Result<[Value; N]> {
    <[Value; N]>::try_from(fields).map_err(|fields| {
        ClientError::Protocol(format!(
            "{kind} frame has {} elements, expected {N}",
            fields.len()
        ))
    })
}

fn expect_id(value: Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        ClientError::Protocol("message id is not an unsigned integer".to_string())
    })
}

fn expect_string(value: Value, what: &str) -> Result<String> {
    let Value::String(s) = value else {
        return Err(ClientError::Protocol(format!("{what} is not a string")));
    };
    s.into_str()
        .ok_or_else(|| ClientError::Protocol(format!("{what} is not valid UTF-8")))
}

fn expect_array(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ClientError::Protocol(format!("{what} is not an array"))),
    }
}
