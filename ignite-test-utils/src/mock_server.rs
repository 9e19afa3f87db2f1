//! In-process server speaking the thin-client protocol.
//!
//! The server keeps caches in memory and answers every opcode the client
//! sends. Tests steer it through fault hooks: closing connections when an
//! opcode arrives, swallowing responses, failing with a status, delaying
//! replies, advertising a topology, or emitting responses for unknown ids.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use ignite_core::protocol::{
    cache_id, FrameCodec, HandshakeRequest, HandshakeResponse, OpCode, ProtocolVersion,
    RequestHeader, ResponseBuilder, TopologyHint, STATUS_CACHE_DOES_NOT_EXIST, STATUS_FAILED,
    STATUS_INVALID_OP_CODE, SUPPORTED_VERSIONS,
};
use ignite_core::serialization::{
    encode, read_value, BinaryReader, BinaryValue,
};
use ignite_core::CodecError;

use crate::error::Result;

/// Builder for [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockServerBuilder {
    bind: SocketAddr,
    versions: Vec<ProtocolVersion>,
    credentials: Option<(String, String)>,
    response_delay: Duration,
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            versions: SUPPORTED_VERSIONS.to_vec(),
            credentials: None,
            response_delay: Duration::ZERO,
        }
    }
}

impl MockServerBuilder {
    /// Creates a builder for a server on an ephemeral localhost port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen address.
    pub fn bind(mut self, address: SocketAddr) -> Self {
        self.bind = address;
        self
    }

    /// Sets the protocol versions the server accepts. The first one is
    /// offered back when a handshake is rejected.
    pub fn versions(mut self, versions: impl IntoIterator<Item = ProtocolVersion>) -> Self {
        self.versions = versions.into_iter().collect();
        self
    }

    /// Requires these credentials in the handshake.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Delays every response by `delay`.
    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Binds the listener and starts accepting connections.
    pub async fn start(self) -> Result<MockServer> {
        let listener = TcpListener::bind(self.bind).await?;
        let address = listener.local_addr()?;
        let (kill_tx, _) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(ServerState {
            versions: self.versions,
            credentials: self.credentials,
            response_delay: Mutex::new(self.response_delay),
            caches: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            topology: Mutex::new(None),
            counters: Mutex::new(HashMap::new()),
            accepted: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            kill_tx,
        });

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));
        tracing::debug!(address = %address, "mock server listening");

        Ok(MockServer {
            address,
            state,
            shutdown_tx,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }
}

/// A running in-process server.
///
/// Dropping the server stops it.
#[derive(Debug)]
pub struct MockServer {
    address: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    /// Returns a builder.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Starts a server with default settings.
    pub async fn start() -> Result<Self> {
        MockServerBuilder::new().start().await
    }

    /// Returns the listen address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Closes every open client connection. The listener keeps accepting.
    pub fn kill_connections(&self) {
        self.state.kill_tx.send_modify(|generation| *generation += 1);
        tracing::debug!(address = %self.address, "mock server killed connections");
    }

    /// Stops accepting and closes every connection.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.kill_connections();
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Closes the connection, without replying, whenever `opcode` arrives.
    /// The request is still applied.
    pub fn close_on(&self, opcode: OpCode) {
        self.state.faults.lock().close_on.insert(opcode);
    }

    /// Applies `opcode` requests but never answers them.
    pub fn drop_responses(&self, opcode: OpCode) {
        self.state.faults.lock().drop_on.insert(opcode);
    }

    /// Answers `opcode` with an error status instead of executing it.
    pub fn fail_with(&self, opcode: OpCode, status: i32, message: impl Into<String>) {
        self.state
            .faults
            .lock()
            .fail_on
            .insert(opcode, (status, message.into()));
    }

    /// Applies `opcode` requests but answers them with `body` verbatim,
    /// bypassing the value encoder.
    pub fn respond_with_body(&self, opcode: OpCode, body: impl Into<Bytes>) {
        self.state
            .faults
            .lock()
            .raw_bodies
            .insert(opcode, body.into());
    }

    /// Precedes the next `count` responses with a response for an id no
    /// client allocated.
    pub fn send_unmatched_responses(&self, count: usize) {
        self.state.faults.lock().unmatched = count;
    }

    /// Removes every fault hook.
    pub fn clear_faults(&self) {
        *self.state.faults.lock() = Faults::default();
    }

    /// Changes the delay applied to responses.
    pub fn set_response_delay(&self, delay: Duration) {
        *self.state.response_delay.lock() = delay;
    }

    /// Attaches a topology hint to every response from now on.
    pub fn advertise_topology(&self, version: i64, endpoints: impl IntoIterator<Item = SocketAddr>) {
        *self.state.topology.lock() = Some(TopologyHint {
            version,
            endpoints: endpoints.into_iter().map(|e| e.to_string()).collect(),
        });
    }

    /// Returns how many requests with `opcode` arrived.
    pub fn request_count(&self, opcode: OpCode) -> usize {
        self.state.counters.lock().get(&opcode).copied().unwrap_or(0)
    }

    /// Returns how many requests arrived in total.
    pub fn total_requests(&self) -> usize {
        self.state.counters.lock().values().sum()
    }

    /// Returns how many TCP connections were accepted.
    pub fn accepted_connections(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Returns how many handshakes succeeded.
    pub fn handshake_count(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Returns how many handshaken connections are open.
    pub fn active_connections(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Returns the names of the caches held by the server.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .caches
            .lock()
            .values()
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the number of entries in a cache, if it exists.
    pub fn cache_size(&self, name: &str) -> Option<usize> {
        self.state
            .caches
            .lock()
            .get(&cache_id(name))
            .map(|c| c.entries.len())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.state.kill_tx.send_modify(|generation| *generation += 1);
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    close_on: HashSet<OpCode>,
    drop_on: HashSet<OpCode>,
    fail_on: HashMap<OpCode, (i32, String)>,
    unmatched: usize,
    raw_bodies: HashMap<OpCode, Bytes>,
}

#[derive(Debug)]
struct CacheData {
    name: String,
    entries: BTreeMap<Vec<u8>, (BinaryValue, BinaryValue)>,
}

#[derive(Debug)]
struct ServerState {
    versions: Vec<ProtocolVersion>,
    credentials: Option<(String, String)>,
    response_delay: Mutex<Duration>,
    caches: Mutex<HashMap<i32, CacheData>>,
    faults: Mutex<Faults>,
    topology: Mutex<Option<TopologyHint>>,
    counters: Mutex<HashMap<OpCode, usize>>,
    accepted: AtomicUsize,
    handshakes: AtomicUsize,
    active: AtomicUsize,
    kill_tx: watch::Sender<u64>,
}

enum Reply {
    Send(Vec<Bytes>),
    Drop,
    Close,
}

struct Failure {
    status: i32,
    message: String,
}

impl Failure {
    fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CodecError> for Failure {
    fn from(err: CodecError) -> Self {
        Self::new(STATUS_FAILED, format!("malformed request: {}", err))
    }
}

fn encode_body(value: Option<BinaryValue>) -> std::result::Result<Bytes, Failure> {
    match value {
        Some(value) => Ok(encode(&value)?),
        None => Ok(Bytes::new()),
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    state.accepted.fetch_add(1, Ordering::SeqCst);
                    let _ = stream.set_nodelay(true);
                    tracing::trace!(peer = %peer, "mock server accepted connection");
                    let kill_rx = state.kill_tx.subscribe();
                    tokio::spawn(serve_connection(stream, Arc::clone(&state), kill_rx));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mock server accept failed");
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>, mut kill_rx: watch::Receiver<u64>) {
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, FrameCodec::default());
    let mut sink = FramedWrite::new(write_half, FrameCodec::default());

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = kill_rx.changed() => return,
        };
        let Some(Ok(payload)) = frame else {
            return;
        };
        let reply = state.handshake_reply(&payload);
        let accepted = reply == HandshakeResponse::Accepted;
        let Ok(encoded) = reply.encode() else {
            return;
        };
        if sink.send(encoded).await.is_err() {
            return;
        }
        if accepted {
            state.handshakes.fetch_add(1, Ordering::SeqCst);
            break;
        }
    }

    state.active.fetch_add(1, Ordering::SeqCst);
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = kill_rx.changed() => break,
        };
        let Some(Ok(payload)) = frame else {
            break;
        };

        match state.handle_request(payload) {
            Reply::Send(responses) => {
                let delay = *state.response_delay.lock();
                if delay.is_zero() {
                    for response in responses {
                        let _ = tx.send(response);
                    }
                } else {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        for response in responses {
                            let _ = tx.send(response);
                        }
                    });
                }
            }
            Reply::Drop => {}
            Reply::Close => break,
        }
    }

    writer.abort();
    state.active.fetch_sub(1, Ordering::SeqCst);
}

impl ServerState {
    fn handshake_reply(&self, payload: &[u8]) -> HandshakeResponse {
        let server_version = self
            .versions
            .first()
            .copied()
            .unwrap_or(ProtocolVersion::V1_0_0);

        let request = match HandshakeRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                return HandshakeResponse::Rejected {
                    server_version,
                    message: format!("malformed handshake: {}", e),
                }
            }
        };

        if !self.versions.contains(&request.version) {
            return HandshakeResponse::Rejected {
                server_version,
                message: format!("unsupported version {}", request.version),
            };
        }

        if let Some((user, password)) = &self.credentials {
            let matches = request.username.as_deref() == Some(user.as_str())
                && request.password.as_deref() == Some(password.as_str());
            if !matches {
                return HandshakeResponse::Rejected {
                    server_version: request.version,
                    message: "authentication failed".to_string(),
                };
            }
        }

        HandshakeResponse::Accepted
    }

    fn handle_request(&self, payload: Bytes) -> Reply {
        let request_id = match payload.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) {
            Some(bytes) => i64::from_le_bytes(bytes),
            None => return Reply::Close,
        };

        let (header, body) = match RequestHeader::decode(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(request_id, error = %e, "mock server rejecting request");
                return self.respond(request_id, Err(Failure::new(STATUS_INVALID_OP_CODE, e.to_string())));
            }
        };
        let opcode = header.opcode;
        *self.counters.lock().entry(opcode).or_insert(0) += 1;

        let (close, drop, failure, raw_body) = {
            let faults = self.faults.lock();
            (
                faults.close_on.contains(&opcode),
                faults.drop_on.contains(&opcode),
                faults.fail_on.get(&opcode).cloned(),
                faults.raw_bodies.get(&opcode).cloned(),
            )
        };

        if let Some((status, message)) = failure {
            return self.respond(request_id, Err(Failure::new(status, message)));
        }

        let result = self.execute(opcode, &body).and_then(|value| match raw_body {
            Some(raw) => Ok(raw),
            None => encode_body(value),
        });
        if close {
            return Reply::Close;
        }
        if drop {
            return Reply::Drop;
        }
        self.respond(request_id, result)
    }

    fn respond(&self, request_id: i64, result: std::result::Result<Bytes, Failure>) -> Reply {
        let mut builder = ResponseBuilder::new(request_id);
        if let Some(hint) = self.topology.lock().clone() {
            builder = builder.topology(hint);
        }

        let encoded = match result {
            Ok(body) => builder.build(&body),
            Err(failure) => builder.status(failure.status).build_error(&failure.message),
        };
        let Ok(response) = encoded else {
            return Reply::Close;
        };

        let mut responses = Vec::with_capacity(2);
        {
            let mut faults = self.faults.lock();
            if faults.unmatched > 0 {
                faults.unmatched -= 1;
                if let Ok(stray) = ResponseBuilder::new(i64::MAX - request_id.abs()).build(&[]) {
                    responses.push(stray);
                }
            }
        }
        responses.push(response);
        Reply::Send(responses)
    }

    fn execute(&self, opcode: OpCode, body: &[u8]) -> std::result::Result<Option<BinaryValue>, Failure> {
        let mut reader = BinaryReader::new(body);
        match opcode {
            OpCode::Heartbeat | OpCode::ResourceClose => Ok(None),
            OpCode::CacheGetNames => {
                let mut names: Vec<String> =
                    self.caches.lock().values().map(|c| c.name.clone()).collect();
                names.sort();
                Ok(Some(BinaryValue::Collection(
                    names.into_iter().map(BinaryValue::String).collect(),
                )))
            }
            OpCode::CacheGetOrCreateWithName => {
                let name = match read_value(&mut reader)? {
                    BinaryValue::String(name) => name,
                    other => {
                        return Err(Failure::new(
                            STATUS_FAILED,
                            format!("cache name must be a string, got {}", other.type_name()),
                        ))
                    }
                };
                self.caches
                    .lock()
                    .entry(cache_id(&name))
                    .or_insert_with(|| CacheData {
                        name,
                        entries: BTreeMap::new(),
                    });
                Ok(None)
            }
            OpCode::CacheDestroy => {
                let id = reader.read_i32()?;
                match self.caches.lock().remove(&id) {
                    Some(_) => Ok(None),
                    None => Err(missing_cache(id)),
                }
            }
            _ => {
                let id = reader.read_i32()?;
                let _flags = reader.read_u8()?;
                let mut caches = self.caches.lock();
                let cache = caches.get_mut(&id).ok_or_else(|| missing_cache(id))?;
                execute_cache_op(opcode, &mut cache.entries, &mut reader)
            }
        }
    }
}

fn missing_cache(id: i32) -> Failure {
    Failure::new(
        STATUS_CACHE_DOES_NOT_EXIST,
        format!("cache does not exist [cacheId={}]", id),
    )
}

fn key_bytes(key: &BinaryValue) -> std::result::Result<Vec<u8>, CodecError> {
    Ok(encode(key)?.to_vec())
}

fn or_null(value: Option<BinaryValue>) -> Option<BinaryValue> {
    Some(value.unwrap_or(BinaryValue::Null))
}

fn execute_cache_op(
    opcode: OpCode,
    entries: &mut BTreeMap<Vec<u8>, (BinaryValue, BinaryValue)>,
    reader: &mut BinaryReader<'_>,
) -> std::result::Result<Option<BinaryValue>, Failure> {
    match opcode {
        OpCode::CacheGet => {
            let key = read_value(reader)?;
            Ok(or_null(entries.get(&key_bytes(&key)?).map(|(_, v)| v.clone())))
        }
        OpCode::CachePut => {
            let key = read_value(reader)?;
            let value = read_value(reader)?;
            entries.insert(key_bytes(&key)?, (key, value));
            Ok(None)
        }
        OpCode::CachePutIfAbsent => {
            let key = read_value(reader)?;
            let value = read_value(reader)?;
            let bytes = key_bytes(&key)?;
            let absent = !entries.contains_key(&bytes);
            if absent {
                entries.insert(bytes, (key, value));
            }
            Ok(Some(BinaryValue::Bool(absent)))
        }
        OpCode::CacheGetAll => {
            let keys = match read_value(reader)? {
                BinaryValue::Collection(keys) => keys,
                other => {
                    return Err(Failure::new(
                        STATUS_FAILED,
                        format!("expected a key collection, got {}", other.type_name()),
                    ))
                }
            };
            let mut found = Vec::new();
            for key in keys {
                if let Some(entry) = entries.get(&key_bytes(&key)?) {
                    found.push(entry.clone());
                }
            }
            Ok(Some(BinaryValue::Map(found)))
        }
        OpCode::CachePutAll => {
            let pairs = match read_value(reader)? {
                BinaryValue::Map(pairs) => pairs,
                other => {
                    return Err(Failure::new(
                        STATUS_FAILED,
                        format!("expected an entry map, got {}", other.type_name()),
                    ))
                }
            };
            for (key, value) in pairs {
                entries.insert(key_bytes(&key)?, (key, value));
            }
            Ok(None)
        }
        OpCode::CacheGetAndPut => {
            let key = read_value(reader)?;
            let value = read_value(reader)?;
            let previous = entries.insert(key_bytes(&key)?, (key, value));
            Ok(or_null(previous.map(|(_, v)| v)))
        }
        OpCode::CacheGetAndRemove => {
            let key = read_value(reader)?;
            let previous = entries.remove(&key_bytes(&key)?);
            Ok(or_null(previous.map(|(_, v)| v)))
        }
        OpCode::CacheReplace => {
            let key = read_value(reader)?;
            let value = read_value(reader)?;
            let replaced = match entries.get_mut(&key_bytes(&key)?) {
                Some(entry) => {
                    entry.1 = value;
                    true
                }
                None => false,
            };
            Ok(Some(BinaryValue::Bool(replaced)))
        }
        OpCode::CacheContainsKey => {
            let key = read_value(reader)?;
            Ok(Some(BinaryValue::Bool(entries.contains_key(&key_bytes(&key)?))))
        }
        OpCode::CacheRemoveKey => {
            let key = read_value(reader)?;
            Ok(Some(BinaryValue::Bool(
                entries.remove(&key_bytes(&key)?).is_some(),
            )))
        }
        OpCode::CacheClear => {
            entries.clear();
            Ok(None)
        }
        OpCode::CacheGetSize => Ok(Some(BinaryValue::Long(entries.len() as i64))),
        OpCode::QueryScan => {
            let page_size = reader.read_i32()?.max(0) as usize;
            Ok(Some(BinaryValue::Map(
                entries.values().take(page_size).cloned().collect(),
            )))
        }
        other => Err(Failure::new(
            STATUS_INVALID_OP_CODE,
            format!("unsupported operation {}", other),
        )),
    }
}
