//! Pending-call registry and caller-facing handles.
//!
//! One entry per outstanding request, keyed by message id. The waiter gets a
//! [`CallHandle`] backed by a oneshot channel; the dispatcher resolves the
//! entry when the matching response arrives, which evicts it from the map.
//!
//! Ids come from a monotonically increasing counter and are never reused, so
//! the counter doubles as a watermark: an absent id below it belonged to a
//! call that was already fulfilled, while an absent id at or above it was
//! never placed at all.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use rmpv::Value;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::debug;

use crate::codec;
use crate::error::{ClientError, Result};

/// Outcome delivered to a waiting caller.
pub type CallResult = Result<Value>;

/// Table of in-flight calls.
///
/// Holds no lock of its own; the owning connection serializes access in the
/// same critical section that puts request bytes on the wire.
pub struct PendingCalls {
    next_id: u64,
    slots: HashMap<u64, oneshot::Sender<CallResult>>,
}

impl PendingCalls {
    /// Create an empty table with the id counter at zero.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            slots: HashMap::new(),
        }
    }

    /// Claim the next message id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert a pending slot for `id` and hand back the matching handle.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::DuplicateId`] if a call with this id is
    /// still pending; the existing call is unaffected.
    pub fn register(&mut self, id: u64) -> Result<CallHandle> {
        match self.slots.entry(id) {
            Entry::Occupied(_) => Err(ClientError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                // Ids placed directly (not via `next_id`) still move the
                // watermark, keeping the fulfilled/unknown distinction valid.
                if id >= self.next_id {
                    self.next_id = id + 1;
                }
                Ok(CallHandle { id, rx })
            }
        }
    }

    /// Deliver a response outcome to the call with this id.
    ///
    /// The slot is evicted on delivery. A waiter that already gave up (its
    /// handle timed out and was dropped) is discarded silently.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::DuplicateResponse`] if the id was already
    /// fulfilled, or [`ClientError::UnknownCall`] if it was never placed.
    /// Neither indicates a broken connection.
    pub fn resolve(&mut self, id: u64, outcome: CallResult) -> Result<()> {
        match self.slots.remove(&id) {
            Some(slot) => {
                if slot.send(outcome).is_err() {
                    debug!(id, "call waiter gone, discarding tardy response");
                }
                Ok(())
            }
            None if id < self.next_id => Err(ClientError::DuplicateResponse(id)),
            None => Err(ClientError::UnknownCall(id)),
        }
    }

    /// Remove a slot without resolving it (the request never hit the wire).
    pub fn abandon(&mut self, id: u64) {
        self.slots.remove(&id);
    }

    /// Fail every pending call, draining the table.
    pub fn fail_all(&mut self, mut make_error: impl FnMut() -> ClientError) {
        for (id, slot) in self.slots.drain() {
            if slot.send(Err(make_error())).is_err() {
                debug!(id, "call waiter gone while failing pending calls");
            }
        }
    }

    /// Number of calls currently pending.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Check if no calls are pending.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

/// Future-like token for one outstanding call.
///
/// Returned by the client when a call is placed; awaiting it yields the
/// decoded result or the failure that resolved the call.
pub struct CallHandle {
    id: u64,
    rx: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    /// The message id this handle is bound to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Suspend until the response arrives.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Suspend with a deadline.
    ///
    /// On timeout the handle reports [`ClientError::Timeout`]; the registry
    /// entry stays pending, and a tardy response arriving later is discarded
    /// without error.
    pub async fn wait_timeout(self, deadline: Duration) -> Result<Value> {
        match tokio::time::timeout(deadline, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Wait for the response and decode the result into a typed value.
    pub async fn wait_decoded<T: DeserializeOwned>(self) -> Result<T> {
        codec::from_value(self.wait().await?)
    }
}
