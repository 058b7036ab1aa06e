//! Error types for nvim-rpc-client.

use thiserror::Error;

use crate::protocol::RemoteError;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack value serialization error.
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmpv::encode::Error),

    /// Conversion between a Rust type and a msgpack value failed.
    #[error("value conversion error: {0}")]
    Convert(#[from] rmpv::ext::Error),

    /// Malformed or undecodable frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A call was placed with an id that is still pending.
    #[error("call id {0} is already pending")]
    DuplicateId(u64),

    /// A response referenced an id that was never placed.
    #[error("response for unknown call id {0}")]
    UnknownCall(u64),

    /// A second response arrived for an already fulfilled call.
    #[error("call id {0} was already fulfilled")]
    DuplicateResponse(u64),

    /// The server answered the request with an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Connection went down while the call was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send attempted without an active connection.
    #[error("not connected")]
    NotConnected,

    /// Deadline elapsed before the response arrived.
    #[error("call timed out")]
    Timeout,
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
