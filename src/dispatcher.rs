//! Dispatcher loop - the receive side of one connection.
//!
//! A single background task owns the read half of the transport for the
//! connection's lifetime: read whatever bytes are available, peel complete
//! frames off the decode buffer, and resolve the matching pending calls.
//! Notifications route to a pluggable sink. The loop stops when the
//! transport reports end of stream or the byte stream becomes undecodable;
//! at that point every call still pending is failed with
//! [`ClientError::ConnectionClosed`] so no waiter is left hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmpv::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, trace, warn};

use crate::error::ClientError;
use crate::protocol::{DecodeBuffer, Message};
use crate::registry::PendingCalls;

/// Read chunk size for the receive loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Receiver for server-initiated notifications.
///
/// Registered through the client builder; absent by default, in which case
/// notifications are logged at debug level and dropped. A sink runs on the
/// dispatcher task, so it must not block: a stalled sink delays response
/// resolution for every pending call.
///
/// Any `Fn(&str, Vec<Value>)` closure is a sink:
///
/// ```ignore
/// let client = Client::builder()
///     .notification_sink(|method: &str, _params: Vec<Value>| {
///         println!("notification: {method}");
///     })
///     .connect(&config)
///     .await?;
/// ```
pub trait NotificationSink: Send + Sync + 'static {
    /// Handle one notification frame.
    fn notify(&self, method: &str, params: Vec<Value>);
}

impl<F> NotificationSink for F
where
    F: Fn(&str, Vec<Value>) + Send + Sync + 'static,
{
    fn notify(&self, method: &str, params: Vec<Value>) {
        self(method, params)
    }
}

/// Connection state shared between callers and the dispatcher.
///
/// The write half and the call table live behind one mutex: registering an
/// id and putting the request bytes on the wire happen in the same critical
/// section, so the dispatcher can never observe a response whose id has not
/// been recorded yet.
pub(crate) struct Shared {
    pub(crate) conn: Mutex<ConnState>,
    pub(crate) connected: AtomicBool,
}

pub(crate) struct ConnState {
    pub(crate) writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub(crate) calls: PendingCalls,
}

impl Shared {
    pub(crate) fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            conn: Mutex::new(ConnState {
                writer: Some(writer),
                calls: PendingCalls::new(),
            }),
            connected: AtomicBool::new(true),
        }
    }
}

/// Run the receive loop until the connection goes down.
pub(crate) async fn run<R>(
    mut reader: R,
    shared: Arc<Shared>,
    sink: Option<Arc<dyn NotificationSink>>,
    max_frame_size: usize,
    shutdown_tx: oneshot::Sender<()>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = DecodeBuffer::with_max_frame_size(max_frame_size);
    let mut chunk = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("transport closed by peer");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "transport read failed");
                break;
            }
        };

        let decoded = match frames.push(&chunk[..n]) {
            Ok(values) => values,
            Err(err) => {
                error!(error = %err, "byte stream is undecodable, stopping dispatcher");
                break;
            }
        };

        for value in decoded {
            match Message::from_value(value) {
                Ok(message) => dispatch(message, &shared, sink.as_deref()).await,
                // One bad frame gets dropped; the stream itself is still framed.
                Err(err) => warn!(error = %err, "skipping malformed frame"),
            }
        }
    }

    shutdown(&shared).await;
    let _ = shutdown_tx.send(());
}

/// Route one decoded frame.
async fn dispatch(message: Message, shared: &Shared, sink: Option<&dyn NotificationSink>) {
    match message {
        Message::Response { id, error, result } => {
            let outcome = match error {
                Some(remote) => Err(ClientError::Remote(remote)),
                None => Ok(result),
            };
            let mut conn = shared.conn.lock().await;
            match conn.calls.resolve(id, outcome) {
                Ok(()) => trace!(id, "call resolved"),
                // Registry integrity violations are reported, never fatal.
                Err(err) => warn!(id, error = %err, "dropping response frame"),
            }
        }
        Message::Notification { method, params } => match sink {
            Some(sink) => sink.notify(&method, params),
            None => debug!(%method, "no notification sink registered, dropping notification"),
        },
        Message::Request { id, method, .. } => {
            warn!(id, %method, "unexpected request frame on a client connection");
        }
    }
}

/// Transition to the terminal stopped state: drop the write half and fail
/// every call still pending so no waiter hangs.
async fn shutdown(shared: &Shared) {
    let mut conn = shared.conn.lock().await;
    conn.writer = None;
    let pending = conn.calls.pending_count();
    if pending > 0 {
        debug!(pending, "failing calls left pending at disconnect");
    }
    conn.calls.fail_all(|| ClientError::ConnectionClosed);
    shared.connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_response, RemoteError, DEFAULT_MAX_FRAME_SIZE};
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncWriteExt;

    fn empty_shared() -> Arc<Shared> {
        Arc::new(Shared::new(Box::new(tokio::io::sink())))
    }

    #[tokio::test]
    async fn test_response_resolves_pending_call() {
        let shared = empty_shared();
        let handle = shared.conn.lock().await.calls.register(0).unwrap();

        let message = Message::Response {
            id: 0,
            error: None,
            result: Value::from("pong"),
        };
        dispatch(message, &shared, None).await;

        assert_eq!(handle.wait().await.unwrap(), Value::from("pong"));
    }

    #[tokio::test]
    async fn test_remote_error_response_fails_call() {
        let shared = empty_shared();
        let handle = shared.conn.lock().await.calls.register(5).unwrap();

        let message = Message::Response {
            id: 5,
            error: Some(RemoteError {
                code: 1,
                message: "div by zero".to_string(),
            }),
            result: Value::Nil,
        };
        dispatch(message, &shared, None).await;

        match handle.wait().await {
            Err(ClientError::Remote(err)) => {
                assert_eq!(err.code, 1);
                assert_eq!(err.message, "div by zero");
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_response_id_is_not_fatal() {
        let shared = empty_shared();
        let handle = shared.conn.lock().await.calls.register(0).unwrap();

        let message = Message::Response {
            id: 99,
            error: None,
            result: Value::Nil,
        };
        dispatch(message, &shared, None).await;

        // The unrelated pending call is untouched.
        assert_eq!(shared.conn.lock().await.calls.pending_count(), 1);
        drop(handle);
    }

    #[tokio::test]
    async fn test_notification_routed_to_sink() {
        let shared = empty_shared();
        let seen: Arc<StdMutex<Vec<(String, Vec<Value>)>>> = Arc::new(StdMutex::new(Vec::new()));

        let log = seen.clone();
        let sink: Arc<dyn NotificationSink> = Arc::new(move |method: &str, params: Vec<Value>| {
            log.lock().unwrap().push((method.to_string(), params));
        });

        let message = Message::Notification {
            method: "redraw".to_string(),
            params: vec![Value::from("grid_line")],
        };
        dispatch(message, &shared, Some(&*sink)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![("redraw".to_string(), vec![Value::from("grid_line")])]
        );
    }

    #[tokio::test]
    async fn test_notification_without_sink_is_dropped() {
        let shared = empty_shared();
        let message = Message::Notification {
            method: "redraw".to_string(),
            params: Vec::new(),
        };
        // Must not panic or disturb the connection state.
        dispatch(message, &shared, None).await;
        assert!(shared.connected.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_request_frame_is_ignored() {
        let shared = empty_shared();
        let message = Message::Request {
            id: 0,
            method: "nvim_command".to_string(),
            params: Vec::new(),
        };
        dispatch(message, &shared, None).await;
        assert!(shared.conn.lock().await.calls.is_empty());
    }

    #[tokio::test]
    async fn test_run_resolves_calls_from_stream() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (reader, _client_write) = tokio::io::split(client_io);
        let (_server_read, mut server_write) = tokio::io::split(server_io);

        let shared = empty_shared();
        let handle = shared.conn.lock().await.calls.register(0).unwrap();

        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            reader,
            shared.clone(),
            None,
            DEFAULT_MAX_FRAME_SIZE,
            shutdown_tx,
        ));

        let bytes = encode_response(0, None, Value::from("pong")).unwrap();
        server_write.write_all(&bytes).await.unwrap();

        assert_eq!(handle.wait().await.unwrap(), Value::from("pong"));
        task.abort();
    }

    #[tokio::test]
    async fn test_run_fails_pending_on_eof() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (reader, _client_write) = tokio::io::split(client_io);

        let shared = empty_shared();
        let handle = shared.conn.lock().await.calls.register(7).unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            reader,
            shared.clone(),
            None,
            DEFAULT_MAX_FRAME_SIZE,
            shutdown_tx,
        ));

        drop(server_io);
        shutdown_rx.await.unwrap();

        assert!(matches!(
            handle.wait().await,
            Err(ClientError::ConnectionClosed)
        ));
        assert!(!shared.connected.load(Ordering::Acquire));
        assert!(shared.conn.lock().await.writer.is_none());
        task.await.unwrap();
    }
}
