//! Protocol module - message shapes and streaming frame decode.
//!
//! This module implements the msgpack-RPC wire protocol:
//! - tagged message frames (request / response / notification)
//! - a decode buffer that reassembles frames from partial transport reads

mod decode_buffer;
mod message;

pub use decode_buffer::{DecodeBuffer, DEFAULT_MAX_FRAME_SIZE};
pub use message::{
    encode_notification, encode_request, encode_response, message_type, Message, RemoteError,
};
