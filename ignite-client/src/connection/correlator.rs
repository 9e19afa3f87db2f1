//! Request/response correlation over one connection.
//!
//! Many callers share one byte stream. Each request gets a fresh id, is
//! registered as pending, and is written as one frame. A dedicated reader
//! task drains inbound frames and hands each payload to the pending request
//! with the same id.
//!
//! The registry (next id, pending map, closed flag) sits behind a single
//! lock. A pending request is resolved only by whoever removes it from the
//! map, so each one completes exactly once.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use ignite_core::protocol::{encode_request, OpCode, Response};
use ignite_core::{IgniteError, Result};

use super::transport::{FrameReader, FrameWriter};

/// Boxed read half handed to the reader task.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half shared by submitters.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Why a correlator stopped accepting requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport failed or the peer went away.
    Transport,
    /// The owning session was closed.
    SessionClosed,
}

impl CloseReason {
    fn to_error(self, endpoint: SocketAddr, request_id: Option<i64>) -> IgniteError {
        match self {
            Self::Transport => IgniteError::ConnectionClosed {
                endpoint: endpoint.to_string(),
                request_id,
            },
            Self::SessionClosed => IgniteError::SessionClosed,
        }
    }
}

struct PendingRequest {
    opcode: OpCode,
    sent_at: Instant,
    slot: oneshot::Sender<Result<Bytes>>,
}

struct Registry {
    next_id: i64,
    pending: HashMap<i64, PendingRequest>,
    closed: Option<CloseReason>,
}

struct Shared {
    endpoint: SocketAddr,
    registry: Mutex<Registry>,
    closed_tx: watch::Sender<bool>,
}

impl Shared {
    fn dispatch(&self, payload: Bytes) -> bool {
        let Some(request_id) = Response::peek_request_id(&payload) else {
            tracing::warn!(
                address = %self.endpoint,
                len = payload.len(),
                "inbound frame too short for a request id"
            );
            return false;
        };

        let pending = self.registry.lock().pending.remove(&request_id);
        match pending {
            Some(request) => {
                tracing::trace!(
                    address = %self.endpoint,
                    request_id,
                    opcode = request.opcode.code(),
                    elapsed = ?request.sent_at.elapsed(),
                    "response received"
                );
                let _ = request.slot.send(Ok(payload));
            }
            None => {
                tracing::debug!(
                    address = %self.endpoint,
                    request_id,
                    "dropping response for unknown request"
                );
            }
        }
        true
    }

    fn close(&self, reason: CloseReason) {
        let drained = {
            let mut registry = self.registry.lock();
            if registry.closed.is_some() {
                return;
            }
            registry.closed = Some(reason);
            std::mem::take(&mut registry.pending)
        };

        if !drained.is_empty() {
            tracing::debug!(
                address = %self.endpoint,
                count = drained.len(),
                reason = ?reason,
                "failing outstanding requests"
            );
        }
        for (request_id, request) in drained {
            let _ = request
                .slot
                .send(Err(reason.to_error(self.endpoint, Some(request_id))));
        }
        self.closed_tx.send_replace(true);
    }

    fn unregister(&self, request_id: i64) -> bool {
        self.registry.lock().pending.remove(&request_id).is_some()
    }
}

/// Multiplexes concurrent requests over one connection.
pub struct Correlator {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<FrameWriter<BoxedWriter>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("endpoint", &self.shared.endpoint)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Correlator {
    /// Takes ownership of both halves and spawns the reader task.
    pub fn start(reader: FrameReader<BoxedReader>, writer: FrameWriter<BoxedWriter>, endpoint: SocketAddr) -> Self {
        let (closed_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            endpoint,
            registry: Mutex::new(Registry {
                next_id: 1,
                pending: HashMap::new(),
                closed: None,
            }),
            closed_tx,
        });

        let task = tokio::spawn(read_loop(reader, Arc::clone(&shared)));

        Self {
            shared,
            writer: tokio::sync::Mutex::new(writer),
            reader_task: Mutex::new(Some(task)),
        }
    }

    /// Returns the remote endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.shared.endpoint
    }

    /// Registers a request and writes it.
    ///
    /// Returns once the frame is fully written. An error here means the
    /// request never reached the wire and may be retried anywhere.
    pub async fn submit(&self, opcode: OpCode, body: &[u8]) -> Result<ResponseHandle> {
        let (slot, rx) = oneshot::channel();
        let request_id = {
            let mut registry = self.shared.registry.lock();
            if let Some(reason) = registry.closed {
                return Err(reason.to_error(self.shared.endpoint, None));
            }
            let request_id = registry.next_id;
            registry.next_id += 1;
            registry.pending.insert(
                request_id,
                PendingRequest {
                    opcode,
                    sent_at: Instant::now(),
                    slot,
                },
            );
            request_id
        };

        let handle = ResponseHandle {
            request_id,
            opcode,
            shared: Arc::clone(&self.shared),
            rx,
            finished: false,
        };

        let payload = encode_request(request_id, opcode, body);
        let mut writer = self.writer.lock().await;
        let guard = WriteGuard {
            shared: &self.shared,
            armed: true,
        };
        let written = writer.send(&payload).await;
        guard.disarm();
        drop(writer);

        if let Err(e) = written {
            tracing::warn!(
                address = %self.shared.endpoint,
                request_id,
                error = %e,
                "request write failed"
            );
            self.shared.close(CloseReason::Transport);
            return Err(e);
        }

        tracing::trace!(address = %self.shared.endpoint, request_id, opcode = opcode.code(), "request sent");
        Ok(handle)
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.registry.lock().pending.len()
    }

    /// Returns `true` once the correlator stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.shared.registry.lock().closed.is_some()
    }

    /// Returns the close reason, if closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.registry.lock().closed
    }

    /// Resolves once the correlator is closed.
    pub async fn closed(&self) {
        let mut rx = self.subscribe_closed();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Returns a receiver that flips to `true` when the correlator closes.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.shared.closed_tx.subscribe()
    }

    /// Fails every pending request and stops the reader task.
    pub fn close(&self, reason: CloseReason) {
        self.shared.close(reason);
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }

    /// Closes the correlator and shuts down the write direction.
    pub async fn shutdown(&self, reason: CloseReason) {
        self.close(reason);
        self.writer.lock().await.shutdown().await;
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.close(CloseReason::Transport);
    }
}

/// Closes the correlator if a write is abandoned halfway, since the stream
/// would then hold a truncated frame.
struct WriteGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl WriteGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(address = %self.shared.endpoint, "request write cancelled mid-frame");
            self.shared.close(CloseReason::Transport);
        }
    }
}

async fn read_loop(mut reader: FrameReader<BoxedReader>, shared: Arc<Shared>) {
    loop {
        match reader.receive_frame().await {
            Ok(payload) => {
                if !shared.dispatch(payload) {
                    shared.close(CloseReason::Transport);
                    return;
                }
            }
            Err(e) => {
                if matches!(e, IgniteError::ConnectionClosed { .. }) {
                    tracing::debug!(address = %shared.endpoint, "peer closed connection");
                } else {
                    tracing::warn!(address = %shared.endpoint, error = %e, "connection read failed");
                }
                shared.close(CloseReason::Transport);
                return;
            }
        }
    }
}

/// Awaitable completion of one submitted request.
///
/// Dropping the handle before it completes unregisters the request; a late
/// response is then dropped as unmatched.
pub struct ResponseHandle {
    request_id: i64,
    opcode: OpCode,
    shared: Arc<Shared>,
    rx: oneshot::Receiver<Result<Bytes>>,
    finished: bool,
}

impl fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("request_id", &self.request_id)
            .field("opcode", &self.opcode)
            .field("endpoint", &self.shared.endpoint)
            .finish()
    }
}

impl ResponseHandle {
    /// Returns the assigned request id.
    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    /// Returns the request opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Waits for the response payload.
    ///
    /// On expiry the request is unregistered and
    /// [`IgniteError::Timeout`] is returned; the connection stays open.
    pub async fn wait(mut self, timeout: Duration) -> Result<Bytes> {
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        self.finished = true;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(IgniteError::ConnectionClosed {
                endpoint: self.shared.endpoint.to_string(),
                request_id: Some(self.request_id),
            }),
            Err(_) => {
                if self.shared.unregister(self.request_id) {
                    tracing::debug!(
                        address = %self.shared.endpoint,
                        request_id = self.request_id,
                        opcode = self.opcode.code(),
                        "request timed out"
                    );
                    return Err(IgniteError::Timeout {
                        endpoint: self.shared.endpoint.to_string(),
                        opcode: self.opcode.code(),
                        request_id: self.request_id,
                        timeout,
                    });
                }
                // resolved between the deadline and the unregister
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(IgniteError::ConnectionClosed {
                        endpoint: self.shared.endpoint.to_string(),
                        request_id: Some(self.request_id),
                    }),
                }
            }
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if !self.finished && self.shared.unregister(self.request_id) {
            tracing::trace!(
                address = %self.shared.endpoint,
                request_id = self.request_id,
                "request cancelled"
            );
        }
    }
}
