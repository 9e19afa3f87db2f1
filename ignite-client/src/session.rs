//! Client session entry point.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use ignite_core::protocol::{cache_id, OpCode};
use ignite_core::serialization::{encode, BinaryValue, BinaryWriter, FromBinary, ToBinary};
use ignite_core::{IgniteError, Result};

use crate::cache::{decode_body, Cache};
use crate::config::ClientConfig;
use crate::connection::{
    ClusterDiscovery, ConnectionEvent, ConnectionManager, Endpoint, SessionState,
};
use crate::listener::LifecycleEvent;

/// A logical session with an Ignite cluster over the thin-client protocol.
///
/// The session multiplexes requests over a small pool of connections and
/// fails over to another endpoint when one goes away.
///
/// # Example
///
/// ```ignore
/// use ignite_client::{ClientConfig, ClientSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .add_address("127.0.0.1:10800".parse()?)
///         .build()?;
///
///     let session = ClientSession::connect(config).await?;
///     let cache = session.get_or_create_cache::<i32, String>("people").await?;
///
///     cache.put(&1, &"x".to_string()).await?;
///     assert_eq!(cache.get(&1).await?, Some("x".to_string()));
///
///     session.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ClientSession {
    config: Arc<ClientConfig>,
    connection_manager: Arc<ConnectionManager>,
}

impl ClientSession {
    /// Connects to the configured addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if no addresses are configured or no endpoint
    /// accepts a connection.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::start(ConnectionManager::from_config(config)).await
    }

    /// Connects using a custom source for the initial endpoint list.
    pub async fn with_discovery(
        config: ClientConfig,
        discovery: impl ClusterDiscovery + 'static,
    ) -> Result<Self> {
        Self::start(ConnectionManager::new(config, discovery)).await
    }

    async fn start(connection_manager: ConnectionManager) -> Result<Self> {
        connection_manager.start().await?;

        tracing::info!(
            addresses = ?connection_manager.connected_addresses(),
            "connected to Ignite cluster"
        );

        Ok(Self {
            config: connection_manager.shared_config(),
            connection_manager: Arc::new(connection_manager),
        })
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connection manager.
    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    /// Returns a handle to a cache without contacting the server.
    pub fn cache<K, V>(&self, name: &str) -> Cache<K, V>
    where
        K: ToBinary + FromBinary,
        V: ToBinary + FromBinary,
    {
        Cache::new(name.to_string(), Arc::clone(&self.connection_manager))
    }

    /// Creates the cache if it does not exist and returns a handle to it.
    pub async fn get_or_create_cache<K, V>(&self, name: &str) -> Result<Cache<K, V>>
    where
        K: ToBinary + FromBinary,
        V: ToBinary + FromBinary,
    {
        let body = encode(&BinaryValue::String(name.to_string()))?;
        self.connection_manager
            .invoke(OpCode::CacheGetOrCreateWithName, &body)
            .await?;
        tracing::debug!(cache = %name, "cache ready");
        Ok(self.cache(name))
    }

    /// Lists the names of all caches.
    pub async fn cache_names(&self) -> Result<Vec<String>> {
        let response = self.connection_manager.invoke(OpCode::CacheGetNames, &[]).await?;
        match decode_body(&response)? {
            BinaryValue::Collection(items) => items
                .into_iter()
                .map(|item| String::from_binary(item).map_err(IgniteError::from))
                .collect(),
            BinaryValue::Null => Ok(Vec::new()),
            other => Err(IgniteError::Protocol(format!(
                "expected a collection of cache names, got {}",
                other.type_name()
            ))),
        }
    }

    /// Destroys a cache and all of its entries.
    pub async fn destroy_cache(&self, name: &str) -> Result<()> {
        let mut body = BinaryWriter::new();
        body.write_i32(cache_id(name));
        self.connection_manager
            .invoke(OpCode::CacheDestroy, body.as_bytes())
            .await?;
        tracing::debug!(cache = %name, "cache destroyed");
        Ok(())
    }

    /// Returns the current connectivity state.
    pub fn state(&self) -> SessionState {
        self.connection_manager.state()
    }

    /// Returns a receiver that tracks connectivity state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.connection_manager.watch_state()
    }

    /// Returns a snapshot of the known endpoints.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.connection_manager.endpoints()
    }

    /// Subscribes to session lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.connection_manager.subscribe_lifecycle()
    }

    /// Subscribes to per-connection events.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_manager.subscribe()
    }

    /// Closes every connection.
    ///
    /// Pending requests fail with [`IgniteError::SessionClosed`], as does
    /// every later operation. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        tracing::info!("closing Ignite session");
        self.connection_manager.shutdown().await
    }
}
