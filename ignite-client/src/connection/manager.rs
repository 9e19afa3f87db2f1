//! Connection pool and endpoint failover.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::instrument;

use ignite_core::protocol::{OpCode, Response, TopologyHint};
use ignite_core::{IgniteError, Result};

use super::connection::{Connection, ConnectionId};
use super::correlator::CloseReason;
use super::discovery::{ClusterDiscovery, StaticAddressDiscovery};
use super::endpoint::{Endpoint, EndpointHealth, EndpointOrigin};
use crate::config::ClientConfig;
use crate::listener::LifecycleEvent;

/// Observable state of the session's connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No live connection.
    Disconnected,
    /// Opening a connection while none is live.
    Connecting,
    /// Serving requests and every endpoint is healthy.
    Ready,
    /// Serving requests while some endpoint is in backoff or failed.
    Degraded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::Degraded => "DEGRADED",
        };
        f.write_str(name)
    }
}

/// Events emitted during connection lifecycle.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connected and handshaken with an endpoint.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
        /// The endpoint address.
        address: SocketAddr,
    },
    /// A live connection closed.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// The endpoint address.
        address: SocketAddr,
        /// The failure that closed it, if any.
        error: Option<String>,
    },
    /// An attempt to connect failed.
    ConnectFailed {
        /// The endpoint address.
        address: SocketAddr,
        /// The error from the attempt.
        error: String,
        /// The endpoint's health after the failure.
        health: EndpointHealth,
    },
    /// A topology hint introduced a new endpoint.
    EndpointAdded {
        /// The endpoint address.
        address: SocketAddr,
    },
    /// A learned endpoint is no longer advertised.
    EndpointRetired {
        /// The endpoint address.
        address: SocketAddr,
    },
}

struct EndpointSlot {
    endpoint: Mutex<Endpoint>,
    connection: Mutex<Option<Arc<Connection>>>,
    connect_gate: tokio::sync::Mutex<()>,
}

impl EndpointSlot {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint: Mutex::new(endpoint),
            connection: Mutex::new(None),
            connect_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn address(&self) -> SocketAddr {
        self.endpoint.lock().address()
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .as_ref()
            .filter(|c| !c.is_closed())
            .cloned()
    }
}

struct ManagerInner {
    config: Arc<ClientConfig>,
    discovery: Arc<dyn ClusterDiscovery>,
    endpoints: RwLock<Vec<Arc<EndpointSlot>>>,
    cursor: AtomicUsize,
    topology_version: AtomicI64,
    state: watch::Sender<SessionState>,
    event_sender: broadcast::Sender<ConnectionEvent>,
    lifecycle_sender: broadcast::Sender<LifecycleEvent>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    connected: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

/// Manages connections to server endpoints and fails requests over
/// between them.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("endpoints", &self.inner.endpoints.read().len())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new connection manager with the given configuration and discovery.
    pub fn new(config: ClientConfig, discovery: impl ClusterDiscovery + 'static) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (event_sender, _) = broadcast::channel(64);
        let (lifecycle_sender, _) = broadcast::channel(16);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ManagerInner {
                config: Arc::new(config),
                discovery: Arc::new(discovery),
                endpoints: RwLock::new(Vec::new()),
                cursor: AtomicUsize::new(0),
                topology_version: AtomicI64::new(i64::MIN),
                state,
                event_sender,
                lifecycle_sender,
                shutdown,
                closed: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                maintenance: Mutex::new(None),
            }),
        }
    }

    /// Creates a connection manager using static discovery of the configured addresses.
    pub fn from_config(config: ClientConfig) -> Self {
        let discovery = StaticAddressDiscovery::new(config.network().addresses().to_vec());
        Self::new(config, discovery)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn shared_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.inner.config)
    }

    /// Subscribes to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.event_sender.subscribe()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle_sender.subscribe()
    }

    /// Returns a receiver that tracks the session state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Discovers endpoints and opens the first connection.
    #[instrument(
        name = "connection_manager.start",
        skip(self),
        fields(configured = self.inner.config.network().addresses().len())
    )]
    pub async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    /// Sends a request, failing over to other endpoints on connection loss.
    ///
    /// Uses the configured request timeout.
    pub async fn invoke(&self, opcode: OpCode, body: &[u8]) -> Result<Response> {
        let timeout = self.inner.config.network().request_timeout();
        self.inner.invoke(opcode, body, timeout).await
    }

    /// Sends a request with an explicit timeout.
    pub async fn invoke_with_timeout(
        &self,
        opcode: OpCode,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Response> {
        self.inner.invoke(opcode, body, timeout).await
    }

    /// Applies a topology hint; older or repeated versions are ignored.
    pub async fn apply_topology(&self, hint: TopologyHint) {
        self.inner.apply_topology(hint).await
    }

    /// Returns a snapshot of every known endpoint.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner
            .endpoints
            .read()
            .iter()
            .map(|slot| slot.endpoint.lock().clone())
            .collect()
    }

    /// Clears backoff and failure state on every endpoint.
    pub fn reset_endpoints(&self) {
        for slot in self.inner.endpoints.read().iter() {
            slot.endpoint.lock().reset();
        }
        tracing::info!("endpoint health reset");
        self.inner.refresh_state();
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.live_connections().len()
    }

    /// Returns the addresses with a live connection.
    pub fn connected_addresses(&self) -> Vec<SocketAddr> {
        self.inner
            .live_connections()
            .iter()
            .map(|c| c.address())
            .collect()
    }

    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes every connection and stops background work.
    ///
    /// Pending requests fail with [`IgniteError::SessionClosed`].
    #[instrument(name = "connection_manager.shutdown", skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await;
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let _ = self.inner.shutdown.send(true);
            for slot in self.inner.endpoints.read().iter() {
                if let Some(connection) = slot.connection.lock().take() {
                    tracing::debug!(address = %connection.address(), "dropping connection with manager");
                }
            }
        }
        if let Some(task) = self.inner.maintenance.lock().take() {
            task.abort();
        }
    }
}

impl ManagerInner {
    async fn start(self: &Arc<Self>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IgniteError::SessionClosed);
        }
        let _ = self.lifecycle_sender.send(LifecycleEvent::Starting);
        tracing::debug!("client lifecycle: Starting");

        let addresses = self.discovery.discover().await?;
        if addresses.is_empty() {
            tracing::error!("no server addresses discovered");
            return Err(IgniteError::NoAvailableEndpoint(
                "no server addresses discovered".to_string(),
            ));
        }

        {
            let mut endpoints = self.endpoints.write();
            for address in addresses {
                if !endpoints.iter().any(|slot| slot.address() == address) {
                    endpoints.push(Arc::new(EndpointSlot::new(Endpoint::new(
                        address,
                        EndpointOrigin::Configured,
                    ))));
                }
            }
            tracing::info!(count = endpoints.len(), "discovered server addresses");
        }

        let mut tried = HashSet::new();
        let mut last_error = None;
        while let Some(slot) = self.select_endpoint(&tried) {
            let address = slot.address();
            match self.connection_for(&slot).await {
                Ok(_) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "failed initial connection");
                    tried.insert(address);
                    last_error = Some(e);
                }
            }
        }

        if self.live_connections().is_empty() {
            self.refresh_state();
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "every endpoint is in backoff".to_string());
            tracing::error!(reason = %reason, "failed to establish any connection");
            return Err(IgniteError::NoAvailableEndpoint(format!(
                "failed to connect to any endpoint: {}",
                reason
            )));
        }

        self.spawn_maintenance_task();

        let _ = self.lifecycle_sender.send(LifecycleEvent::Started);
        tracing::debug!("client lifecycle: Started");
        Ok(())
    }

    async fn invoke(self: &Arc<Self>, opcode: OpCode, body: &[u8], timeout: Duration) -> Result<Response> {
        let max_failovers = self.config.retry().max_failover_retries();
        let mut failovers = 0u32;
        let mut tried = HashSet::new();
        let mut last_error: Option<IgniteError> = None;
        let mut written_failure: Option<IgniteError> = None;

        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(IgniteError::SessionClosed);
            }

            let Some(slot) = self.select_endpoint(&tried) else {
                self.refresh_state();
                // a request that reached the wire keeps its own failure
                if let Some(e) = written_failure {
                    tracing::debug!(opcode = %opcode, error = %e, "no endpoint left for retry");
                    return Err(e);
                }
                let detail = match &last_error {
                    Some(e) => format!("all endpoints unavailable, last error: {}", e),
                    None => "all endpoints are in backoff or failed".to_string(),
                };
                tracing::debug!(opcode = %opcode, detail = %detail, "no endpoint for request");
                return Err(IgniteError::NoAvailableEndpoint(detail));
            };
            let address = slot.address();
            tried.insert(address);

            let connection = match self.connection_for(&slot).await {
                Ok(connection) => connection,
                Err(e) if e.triggers_failover() || matches!(e, IgniteError::NoAvailableEndpoint(_)) => {
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let handle = match connection.submit(opcode, body).await {
                Ok(handle) => handle,
                Err(e) if e.triggers_failover() => {
                    tracing::debug!(address = %address, opcode = %opcode, error = %e, "request not written, failing over");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let request_id = handle.request_id();

            match handle.wait(timeout).await {
                Ok(payload) => {
                    let response = Response::decode(payload)?;
                    if let Some(hint) = response.topology.clone() {
                        self.apply_topology(hint).await;
                    }
                    if !response.is_success() {
                        return Err(IgniteError::Server {
                            endpoint: address.to_string(),
                            opcode: opcode.code(),
                            request_id,
                            status: response.status,
                            message: response.error_message(),
                        });
                    }
                    return Ok(response);
                }
                Err(e) if e.triggers_failover() => {
                    if !opcode.is_idempotent() {
                        tracing::warn!(
                            address = %address,
                            opcode = %opcode,
                            request_id,
                            error = %e,
                            "connection lost after write, not retrying non-idempotent request"
                        );
                        return Err(e);
                    }
                    if failovers >= max_failovers {
                        tracing::warn!(
                            address = %address,
                            opcode = %opcode,
                            request_id,
                            retries = failovers,
                            error = %e,
                            "failover retries exhausted"
                        );
                        return Err(e);
                    }
                    failovers += 1;
                    tracing::info!(
                        address = %address,
                        opcode = %opcode,
                        request_id,
                        attempt = failovers,
                        "retrying request on another endpoint"
                    );
                    written_failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Picks the preferred endpoint, moving the preference round-robin to
    /// the next available endpoint when the current one is skipped.
    fn select_endpoint(&self, tried: &HashSet<SocketAddr>) -> Option<Arc<EndpointSlot>> {
        let endpoints = self.endpoints.read();
        let len = endpoints.len();
        if len == 0 {
            return None;
        }
        let now = Instant::now();
        let start = self.cursor.load(Ordering::Relaxed) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let slot = &endpoints[index];
            let eligible = {
                let endpoint = slot.endpoint.lock();
                endpoint.is_available(now) && !tried.contains(&endpoint.address())
            };
            if eligible {
                if offset != 0 {
                    self.cursor.store(index, Ordering::Relaxed);
                }
                return Some(Arc::clone(slot));
            }
        }
        None
    }

    /// Returns the slot's live connection, opening one if needed.
    ///
    /// At most one connect attempt per endpoint runs at a time; callers that
    /// arrive during an attempt wait for it and share its outcome.
    async fn connection_for(self: &Arc<Self>, slot: &Arc<EndpointSlot>) -> Result<Arc<Connection>> {
        if let Some(connection) = slot.live_connection() {
            return Ok(connection);
        }

        let _gate = slot.connect_gate.lock().await;
        if let Some(connection) = slot.live_connection() {
            return Ok(connection);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(IgniteError::SessionClosed);
        }

        let address = slot.address();
        if !slot.endpoint.lock().is_available(Instant::now()) {
            return Err(IgniteError::NoAvailableEndpoint(format!(
                "{} is in backoff or failed",
                address
            )));
        }

        if self.live_connections().is_empty() {
            self.set_state(SessionState::Connecting);
        }
        tracing::debug!(address = %address, timeout = ?self.config.network().connection_timeout(), "attempting connection");

        match Connection::connect(address, &self.config).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                slot.endpoint.lock().record_success();
                *slot.connection.lock() = Some(Arc::clone(&connection));
                self.watch_connection(slot, &connection);

                let id = connection.id();
                let _ = self.event_sender.send(ConnectionEvent::Connected { id, address });
                tracing::info!(id = %id, address = %address, "connected to server");
                self.refresh_state();
                Ok(connection)
            }
            Err(e) => {
                let health = {
                    let mut endpoint = slot.endpoint.lock();
                    if matches!(e, IgniteError::Handshake { .. }) {
                        endpoint.mark_failed();
                        endpoint.health()
                    } else {
                        endpoint.record_failure(self.config.retry(), Instant::now())
                    }
                };
                tracing::warn!(address = %address, error = %e, health = ?health, "connection attempt failed");
                let _ = self.event_sender.send(ConnectionEvent::ConnectFailed {
                    address,
                    error: e.to_string(),
                    health,
                });
                self.refresh_state();
                Err(e)
            }
        }
    }

    /// Spawns a task that reacts when `connection` closes.
    fn watch_connection(self: &Arc<Self>, slot: &Arc<EndpointSlot>, connection: &Arc<Connection>) {
        let manager = Arc::downgrade(self);
        let slot = Arc::downgrade(slot);
        let weak_connection = Arc::downgrade(connection);
        let id = connection.id();
        let address = connection.address();
        let mut closed_rx = connection.subscribe_closed();

        tokio::spawn(async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
            let reason = weak_connection.upgrade().and_then(|c| c.close_reason());
            let (Some(manager), Some(slot)) = (manager.upgrade(), slot.upgrade()) else {
                return;
            };
            manager.on_connection_closed(&slot, id, address, reason);
        });
    }

    fn on_connection_closed(
        &self,
        slot: &EndpointSlot,
        id: ConnectionId,
        address: SocketAddr,
        reason: Option<CloseReason>,
    ) {
        {
            let mut current = slot.connection.lock();
            if current.as_ref().map(|c| c.id()) == Some(id) {
                *current = None;
            }
        }

        let shutting_down = self.closed.load(Ordering::Acquire);
        let error = match reason {
            Some(CloseReason::SessionClosed) => None,
            _ => Some("connection lost".to_string()),
        };

        if error.is_some() && !shutting_down {
            let mut endpoint = slot.endpoint.lock();
            if !endpoint.is_retired() {
                let health = endpoint.record_failure(self.config.retry(), Instant::now());
                tracing::warn!(id = %id, address = %address, health = ?health, "connection lost");
            }
        }

        let _ = self
            .event_sender
            .send(ConnectionEvent::Disconnected { id, address, error });
        tracing::info!(id = %id, address = %address, "disconnected from server");
        self.refresh_state();
    }

    async fn apply_topology(self: &Arc<Self>, hint: TopologyHint) {
        let previous = self.topology_version.fetch_max(hint.version, Ordering::AcqRel);
        if hint.version <= previous {
            return;
        }

        let mut advertised = Vec::with_capacity(hint.endpoints.len());
        for raw in &hint.endpoints {
            match raw.parse::<SocketAddr>() {
                Ok(address) => advertised.push(address),
                Err(_) => tracing::warn!(endpoint = %raw, "ignoring unparsable topology endpoint"),
            }
        }

        let mut added = Vec::new();
        let mut retired = Vec::new();
        {
            let mut endpoints = self.endpoints.write();
            for address in &advertised {
                match endpoints.iter().find(|slot| slot.address() == *address) {
                    Some(slot) => {
                        let mut endpoint = slot.endpoint.lock();
                        if endpoint.is_retired()
                            || matches!(endpoint.health(), EndpointHealth::Failed { .. })
                        {
                            endpoint.reset();
                        }
                    }
                    None => {
                        endpoints.push(Arc::new(EndpointSlot::new(Endpoint::new(
                            *address,
                            EndpointOrigin::Discovered,
                        ))));
                        added.push(*address);
                    }
                }
            }

            for slot in endpoints.iter() {
                let mut endpoint = slot.endpoint.lock();
                if endpoint.origin() == EndpointOrigin::Discovered
                    && !endpoint.is_retired()
                    && !advertised.contains(&endpoint.address())
                {
                    endpoint.set_retired(true);
                    retired.push((endpoint.address(), slot.connection.lock().take()));
                }
            }
        }

        tracing::info!(
            version = hint.version,
            advertised = advertised.len(),
            added = added.len(),
            retired = retired.len(),
            "applied topology update"
        );

        for address in added {
            let _ = self.event_sender.send(ConnectionEvent::EndpointAdded { address });
        }
        for (address, connection) in retired {
            let _ = self.event_sender.send(ConnectionEvent::EndpointRetired { address });
            if let Some(connection) = connection {
                connection.close(CloseReason::Transport).await;
            }
        }
        self.refresh_state();
    }

    fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.endpoints
            .read()
            .iter()
            .filter_map(|slot| slot.live_connection())
            .collect()
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::debug!(state = %state, "session state changed");
        }
    }

    fn refresh_state(&self) {
        let live = !self.live_connections().is_empty();
        let state = if self.closed.load(Ordering::Acquire) || !live {
            SessionState::Disconnected
        } else {
            let all_healthy = self.endpoints.read().iter().all(|slot| {
                let endpoint = slot.endpoint.lock();
                endpoint.is_retired() || endpoint.health() == EndpointHealth::Healthy
            });
            if all_healthy {
                SessionState::Ready
            } else {
                SessionState::Degraded
            }
        };
        self.set_state(state);

        let was_connected = self.connected.swap(live, Ordering::AcqRel);
        if live && !was_connected {
            let _ = self.lifecycle_sender.send(LifecycleEvent::ClientConnected);
            tracing::debug!("client lifecycle: ClientConnected");
        } else if !live && was_connected {
            let _ = self.lifecycle_sender.send(LifecycleEvent::ClientDisconnected);
            tracing::debug!("client lifecycle: ClientDisconnected");
        }
    }

    fn spawn_maintenance_task(self: &Arc<Self>) {
        let heartbeat_interval = self.config.network().heartbeat_interval();
        if heartbeat_interval.is_zero() {
            tracing::debug!("heartbeats disabled");
            return;
        }

        let manager = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.maintain().await;
                    }
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("maintenance task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        *self.maintenance.lock() = Some(task);
    }

    /// Heartbeats every live connection and reconnects when none is left.
    async fn maintain(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let heartbeat_timeout = self
            .config
            .network()
            .request_timeout()
            .min(self.config.network().heartbeat_interval());

        for connection in self.live_connections() {
            match connection.send_heartbeat(heartbeat_timeout).await {
                Ok(response) => {
                    if let Some(hint) = response.topology {
                        self.apply_topology(hint).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        address = %connection.address(),
                        error = %e,
                        "heartbeat failed"
                    );
                    connection.close(CloseReason::Transport).await;
                }
            }
        }

        if self.live_connections().is_empty() {
            let mut tried = HashSet::new();
            while let Some(slot) = self.select_endpoint(&tried) {
                let address = slot.address();
                tried.insert(address);
                match self.connection_for(&slot).await {
                    Ok(_) => {
                        tracing::info!(address = %address, "background reconnect succeeded");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(address = %address, error = %e, "background reconnect failed")
                    }
                }
            }
        }
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.lifecycle_sender.send(LifecycleEvent::ShuttingDown);
        tracing::debug!("client lifecycle: ShuttingDown");

        let _ = self.shutdown.send(true);
        if let Some(task) = self.maintenance.lock().take() {
            task.abort();
        }

        let connections: Vec<Arc<Connection>> = self
            .endpoints
            .read()
            .iter()
            .filter_map(|slot| slot.connection.lock().take())
            .collect();
        tracing::debug!(connection_count = connections.len(), "closing all connections");

        for connection in connections {
            connection.close(CloseReason::SessionClosed).await;
        }

        self.refresh_state();

        let _ = self.lifecycle_sender.send(LifecycleEvent::Shutdown);
        tracing::debug!("client lifecycle: Shutdown");
        tracing::info!("connection manager shut down");
    }
}
