//! # nvim-rpc-client
//!
//! Async msgpack-RPC client for driving a remote Neovim instance over TCP.
//!
//! Many callers place requests concurrently; a single background dispatcher
//! owns the receive side of the connection and resolves each call by message
//! id, so responses may arrive in any order relative to how calls were
//! placed.
//!
//! ## Architecture
//!
//! - **Protocol**: tagged msgpack frames plus a streaming decode buffer that
//!   reassembles frames from partial reads
//! - **Registry**: pending-call table handing each caller a future-like
//!   [`CallHandle`]
//! - **Dispatcher**: background task reading, decoding, and resolving
//! - **Client**: typed facade over `call`/`request`
//!
//! ## Example
//!
//! ```ignore
//! use nvim_rpc_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // nvim --listen 127.0.0.1:6666
//!     let config = ClientConfig { host: "127.0.0.1".into(), port: 6666 };
//!     let client = Client::connect(&config).await?;
//!
//!     client.command("echo 'hello'").await?;
//!     client.set_current_line("written over RPC").await?;
//!     println!("{}", client.get_current_line().await?);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use dispatcher::NotificationSink;
pub use error::{ClientError, Result};
pub use protocol::{Message, RemoteError};
pub use registry::{CallHandle, CallResult, PendingCalls};
pub use rmpv::Value;
