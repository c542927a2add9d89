//! Asynchronous operation dispatcher.
//!
//! A single owner task holds the correlation table (`RequestId` →
//! [`ReplyHandle`]). `dispatch()` registers the handle and spawns the
//! transport send; the send future reports back through the same command
//! queue, so registration always precedes completion for a given id and the
//! table is only ever touched by the owner task.
//!
//! ```text
//!  dispatch() ──Register──▶ ┌────────────┐
//!  send task ──Complete──▶  │ owner task │──▶ resolve ──▶ handlers / completions()
//!  shutdown() ──Shutdown──▶ └────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::{broadcast, mpsc};

use crate::codec::RequestCodec;
use crate::error::{ErrorKind, LinkError, Result};
use crate::event_handlers::ReplyHandlers;
use crate::models::OperationDescriptor;
use crate::reply::{ReplyError, ReplyHandle, RequestId};
use crate::transport::{Transport, TransportRequest, TransportResponse};

const COMPLETIONS_CAPACITY: usize = 256;

enum DispatchCmd {
    Register(ReplyHandle),
    Complete {
        id: RequestId,
        outcome: Result<TransportResponse>,
    },
    Shutdown,
}

/// Issues backend operations and resolves their [`ReplyHandle`]s.
///
/// Must be created inside a tokio runtime; the owner task is spawned on
/// construction and lives until [`shutdown`](Self::shutdown) or drop.
pub struct OperationDispatcher {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    cmd_tx: mpsc::UnboundedSender<DispatchCmd>,
    completions: broadcast::Sender<ReplyHandle>,
}

impl OperationDispatcher {
    pub fn new(transport: Arc<dyn Transport>, handlers: ReplyHandlers) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (completions, _) = broadcast::channel(COMPLETIONS_CAPACITY);

        tokio::spawn(owner_task(cmd_rx, handlers, completions.clone()));

        Self {
            transport,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            cmd_tx,
            completions,
        }
    }

    /// Encode and send `op`, returning its pending reply handle.
    ///
    /// Encoding errors are returned here, before any I/O. Every handle that
    /// is returned is eventually resolved, at the latest on shutdown.
    pub fn dispatch(&self, op: OperationDescriptor) -> Result<ReplyHandle> {
        let request = RequestCodec::encode(&op)?;
        if self.is_shut_down() {
            return Err(LinkError::InvalidState("dispatcher has been shut down".to_string()));
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = ReplyHandle::new(id, op.kind(), op.object_type());
        debug!(
            "[LINK_DISPATCH] Dispatching request={} {} {}",
            id,
            request.method,
            request.path()
        );

        self.cmd_tx
            .send(DispatchCmd::Register(handle.clone()))
            .map_err(|_| LinkError::InvalidState("dispatcher has been shut down".to_string()))?;

        let send = self.transport.send(TransportRequest { id, request });
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                outcome = send => {
                    let _ = cmd_tx.send(DispatchCmd::Complete { id, outcome });
                }
                // Owner task is gone; the handle was already resolved.
                _ = cmd_tx.closed() => {}
            }
        });

        Ok(handle)
    }

    /// Stream of every handle resolved from now on.
    pub fn completions(&self) -> broadcast::Receiver<ReplyHandle> {
        self.completions.subscribe()
    }

    /// Resolve every pending handle as a transport error and stop the owner
    /// task. Further dispatches fail with `InvalidState`.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            let _ = self.cmd_tx.send(DispatchCmd::Shutdown);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire) || self.cmd_tx.is_closed()
    }
}

impl Drop for OperationDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for OperationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDispatcher")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

async fn owner_task(
    mut cmd_rx: mpsc::UnboundedReceiver<DispatchCmd>,
    handlers: ReplyHandlers,
    completions: broadcast::Sender<ReplyHandle>,
) {
    let mut pending: HashMap<RequestId, ReplyHandle> = HashMap::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DispatchCmd::Register(handle) => {
                pending.insert(handle.id(), handle);
            },
            DispatchCmd::Complete { id, outcome } => {
                let Some(handle) = pending.remove(&id) else {
                    error!("[LINK_DISPATCH] Completion for unknown request={}; dropped", id);
                    continue;
                };
                resolve(&handle, outcome);
                notify(&handle, &handlers, &completions);
            },
            DispatchCmd::Shutdown => break,
        }
    }

    // Stop accepting commands, then pick up whatever was queued behind Shutdown.
    cmd_rx.close();
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DispatchCmd::Register(handle) => {
                pending.insert(handle.id(), handle);
            },
            DispatchCmd::Complete { id, outcome } => {
                if let Some(handle) = pending.remove(&id) {
                    resolve(&handle, outcome);
                    notify(&handle, &handlers, &completions);
                }
            },
            DispatchCmd::Shutdown => {},
        }
    }
    if !pending.is_empty() {
        debug!("[LINK_DISPATCH] Shutting down with {} pending request(s)", pending.len());
    }
    for (_, handle) in pending.drain() {
        handle.resolve_errored(ReplyError {
            kind: ErrorKind::TransportError,
            backend_status: None,
            message: "Dispatcher shut down before a response arrived".to_string(),
            body: None,
        });
        notify(&handle, &handlers, &completions);
    }
}

fn resolve(handle: &ReplyHandle, outcome: Result<TransportResponse>) {
    match outcome {
        Ok(response) => {
            let decoded = RequestCodec::decode(&response.body, response.status);
            match decoded.error {
                None => {
                    handle.resolve_finished(decoded.document, decoded.status);
                },
                Some(kind) => {
                    let message = decoded.error_message();
                    warn!(
                        "[LINK_DISPATCH] request={} failed: {} status={} message=\"{}\"",
                        handle.id(),
                        kind,
                        decoded.status,
                        message
                    );
                    handle.resolve_errored(ReplyError {
                        kind,
                        backend_status: Some(decoded.status),
                        message,
                        body: Some(decoded.document),
                    });
                },
            }
        },
        Err(err) => {
            warn!("[LINK_DISPATCH] request={} transport failure: {}", handle.id(), err);
            let mut reply_error = ReplyError::from_link_error(&err);
            reply_error.kind = ErrorKind::TransportError;
            handle.resolve_errored(reply_error);
        },
    }
}

fn notify(handle: &ReplyHandle, handlers: &ReplyHandlers, completions: &broadcast::Sender<ReplyHandle>) {
    handlers.emit_resolved(handle);
    // No subscribers is fine.
    let _ = completions.send(handle.clone());
}
