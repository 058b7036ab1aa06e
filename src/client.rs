//! Client facade: configuration, builder, and the typed API surface.
//!
//! [`Client::connect`] opens the TCP transport, spawns the dispatcher task
//! on the read half, and keeps the write half plus the pending-call table
//! behind one mutex. Every remote procedure boils down to the same
//! pass-through: build params, place the call, await the handle, decode.
//!
//! # Example
//!
//! ```ignore
//! use nvim_rpc_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig { host: "127.0.0.1".into(), port: 6666 };
//!     let client = Client::connect(&config).await?;
//!
//!     client.command("vsplit").await?;
//!     println!("{}", client.get_current_line().await?);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rmpv::Value;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::codec;
use crate::dispatcher::{self, ConnState, NotificationSink, Shared};
use crate::error::{ClientError, Result};
use crate::protocol::{encode_request, DEFAULT_MAX_FRAME_SIZE};
use crate::registry::CallHandle;
use crate::transport::TcpTransport;

/// Connection parameters for a remote Neovim instance.
///
/// The instance must be listening on a TCP address, e.g. started with
/// `nvim --listen 127.0.0.1:6666`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host name or address of the instance.
    pub host: String,
    /// TCP port the instance listens on.
    pub port: u16,
}

/// Builder for configuring and creating a client.
pub struct ClientBuilder {
    sink: Option<Arc<dyn NotificationSink>>,
    max_frame_size: usize,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            sink: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Route server-initiated notifications to `sink`.
    ///
    /// Without a sink, notifications are logged at debug level and dropped.
    pub fn notification_sink<S: NotificationSink>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Cap the size of a single incoming frame.
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.max_frame_size = limit;
        self
    }

    /// Connect over TCP and start the dispatcher.
    pub async fn connect(self, config: &ClientConfig) -> Result<Client> {
        let transport = TcpTransport::connect(&config.host, config.port).await?;
        let (reader, writer) = transport.into_split();
        Ok(self.attach(reader, writer))
    }

    /// Attach to an already established byte stream.
    ///
    /// Useful for tests and for transports other than plain TCP.
    pub fn attach<R, W>(self, reader: R, writer: W) -> Client
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared::new(Box::new(writer)));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let dispatcher = tokio::spawn(dispatcher::run(
            reader,
            shared.clone(),
            self.sink,
            self.max_frame_size,
            shutdown_tx,
        ));

        Client {
            shared,
            dispatcher,
            shutdown_rx: Some(shutdown_rx),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running connection.
///
/// Cheap to share by reference; every method takes `&self` and callers may
/// place calls concurrently with each other and with the dispatcher.
pub struct Client {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect with default settings.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        ClientBuilder::new().connect(config).await
    }

    /// Place a call and return a handle to await its response.
    ///
    /// Registering the id and writing the request bytes happen under one
    /// lock, so a response can never race ahead of its registry entry.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<CallHandle> {
        let mut conn = self.shared.conn.lock().await;
        let ConnState { writer, calls } = &mut *conn;
        let writer = writer.as_mut().ok_or(ClientError::NotConnected)?;

        let id = calls.next_id();
        let frame = encode_request(method, id, params)?;
        let handle = calls.register(id)?;

        if let Err(err) = write_frame(writer, &frame).await {
            calls.abandon(id);
            return Err(err.into());
        }
        trace!(id, %method, bytes = frame.len(), "request placed");

        Ok(handle)
    }

    /// Place a call and wait for its result.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call(method, params).await?.wait().await
    }

    /// Execute an Ex command.
    pub async fn command(&self, command: &str) -> Result<()> {
        self.request("nvim_command", vec![Value::from(command)])
            .await?;
        Ok(())
    }

    /// Get the line the cursor is on.
    pub async fn get_current_line(&self) -> Result<String> {
        codec::from_value(self.request("nvim_get_current_line", Vec::new()).await?)
    }

    /// Replace the line the cursor is on.
    pub async fn set_current_line(&self, line: &str) -> Result<()> {
        self.request("nvim_set_current_line", vec![Value::from(line)])
            .await?;
        Ok(())
    }

    /// Evaluate a Vimscript expression.
    pub async fn eval(&self, expr: &str) -> Result<Value> {
        self.request("nvim_eval", vec![Value::from(expr)]).await
    }

    /// Call a Vimscript function with the given arguments.
    pub async fn call_function(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        self.request(
            "nvim_call_function",
            vec![Value::from(function), Value::Array(args)],
        )
        .await
    }

    /// Get a highlight definition by name.
    pub async fn get_hl_by_name(&self, name: &str, rgb: bool) -> Result<Value> {
        self.request(
            "nvim_get_hl_by_name",
            vec![Value::from(name), Value::from(rgb)],
        )
        .await
    }

    /// Whether the dispatcher still considers the connection up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Number of calls currently awaiting a response.
    pub async fn pending_calls(&self) -> usize {
        self.shared.conn.lock().await.calls.pending_count()
    }

    /// Tear down the connection.
    ///
    /// Shuts the write half, stops the dispatcher, and fails every call
    /// still pending with [`ClientError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        let mut conn = self.shared.conn.lock().await;
        if let Some(mut writer) = conn.writer.take() {
            let _ = writer.shutdown().await;
        }
        conn.calls.fail_all(|| ClientError::ConnectionClosed);
        drop(conn);

        self.shared.connected.store(false, Ordering::Release);
        self.dispatcher.abort();
    }

    /// Wait until the dispatcher stops (peer closed the connection or
    /// [`Client::disconnect`] was called).
    pub async fn wait_for_shutdown(&mut self) {
        if let Some(rx) = self.shutdown_rx.take() {
            let _ = rx.await;
        }
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}
