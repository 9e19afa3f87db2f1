//! Single connection to a server endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use ignite_core::protocol::{OpCode, ProtocolVersion, Response};
use ignite_core::{IgniteError, Result, TransportErrorKind};

use super::correlator::{BoxedReader, BoxedWriter, CloseReason, Correlator, ResponseHandle};
use super::transport::{handshake, FrameReader, FrameWriter};
use crate::config::ClientConfig;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A handshaken connection to one endpoint.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    version: ProtocolVersion,
    correlator: Correlator,
    created_at: Instant,
}

impl Connection {
    /// Opens a TCP connection and performs the handshake.
    ///
    /// The configured connection timeout bounds both steps together.
    pub async fn connect(address: SocketAddr, config: &ClientConfig) -> Result<Self> {
        let connect_timeout = config.network().connection_timeout();
        let attempt = async {
            let stream = TcpStream::connect(address)
                .await
                .map_err(|e| IgniteError::transport(address, &e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| IgniteError::transport(address, &e))?;
            Self::establish(stream, address, config).await
        };

        match tokio::time::timeout(connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(IgniteError::Transport {
                endpoint: address.to_string(),
                kind: TransportErrorKind::Timeout,
                message: format!("connect timed out after {:?}", connect_timeout),
            }),
        }
    }

    /// Performs the handshake over an already open stream.
    pub async fn establish<S>(stream: S, address: SocketAddr, config: &ClientConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let max_frame_length = config.network().max_frame_length();
        let (read_half, write_half) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);
        let mut reader = FrameReader::new(reader, address, max_frame_length);
        let mut writer = FrameWriter::new(writer, address, max_frame_length);

        let version = handshake(
            &mut reader,
            &mut writer,
            config.protocol_versions(),
            config.security(),
        )
        .await?;

        let connection = Self {
            id: ConnectionId::new(),
            address,
            version,
            correlator: Correlator::start(reader, writer, address),
            created_at: Instant::now(),
        };
        tracing::debug!(id = %connection.id, address = %address, version = %version, "established connection");
        Ok(connection)
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address of this connection.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the negotiated protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Writes a request; see [`Correlator::submit`].
    pub async fn submit(&self, opcode: OpCode, body: &[u8]) -> Result<ResponseHandle> {
        self.correlator.submit(opcode, body).await
    }

    /// Sends a request and waits for a successful response.
    pub async fn request(&self, opcode: OpCode, body: &[u8], timeout: Duration) -> Result<Response> {
        let handle = self.submit(opcode, body).await?;
        let request_id = handle.request_id();
        let response = Response::decode(handle.wait(timeout).await?)?;
        if !response.is_success() {
            return Err(IgniteError::Server {
                endpoint: self.address.to_string(),
                opcode: opcode.code(),
                request_id,
                status: response.status,
                message: response.error_message(),
            });
        }
        Ok(response)
    }

    /// Sends a heartbeat and returns its acknowledgement, which may carry a
    /// topology hint.
    pub async fn send_heartbeat(&self, timeout: Duration) -> Result<Response> {
        self.request(OpCode::Heartbeat, &[], timeout).await
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Returns `true` once the connection can no longer carry requests.
    pub fn is_closed(&self) -> bool {
        self.correlator.is_closed()
    }

    /// Resolves once the connection is closed for any reason.
    pub async fn closed(&self) {
        self.correlator.closed().await
    }

    /// Returns a receiver that flips to `true` when the connection closes.
    pub fn subscribe_closed(&self) -> tokio::sync::watch::Receiver<bool> {
        self.correlator.subscribe_closed()
    }

    /// Returns why the connection closed, if it did.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.correlator.close_reason()
    }

    /// Closes this connection, failing outstanding requests per `reason`.
    pub async fn close(&self, reason: CloseReason) {
        self.correlator.shutdown(reason).await;
        tracing::debug!(id = %self.id, address = %self.address, "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignite_core::protocol::{HandshakeRequest, HandshakeResponse, RequestHeader, ResponseBuilder};
    use tokio::io::duplex;

    #[test]
    fn test_connection_id_uniqueness() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        let id3 = ConnectionId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(42);
        assert_eq!(id.to_string(), "conn-42");
    }

    #[tokio::test]
    async fn test_establish_and_request_over_duplex() {
        let address: SocketAddr = "127.0.0.1:10800".parse().unwrap();
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);

        tokio::spawn(async move {
            let mut reader = FrameReader::new(server_read, address, 4096);
            let mut writer = FrameWriter::new(server_write, address, 4096);
            let hello = reader.receive_frame().await.unwrap();
            HandshakeRequest::decode(&hello).unwrap();
            writer
                .send(&HandshakeResponse::Accepted.encode().unwrap())
                .await
                .unwrap();

            while let Ok(frame) = reader.receive_frame().await {
                let (header, _) = RequestHeader::decode(frame).unwrap();
                let reply = if header.opcode == OpCode::Heartbeat {
                    ResponseBuilder::new(header.request_id).build(&[]).unwrap()
                } else {
                    ResponseBuilder::new(header.request_id)
                        .status(1)
                        .build_error("nope")
                        .unwrap()
                };
                writer.send(&reply).await.unwrap();
            }
        });

        let connection = Connection::establish(client, address, &ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(connection.protocol_version(), ProtocolVersion::V1_2_0);

        let ack = connection
            .send_heartbeat(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(ack.is_success());
        assert!(ack.topology.is_none());

        match connection
            .request(OpCode::CacheGet, &[], Duration::from_secs(1))
            .await
        {
            Err(IgniteError::Server { status, message, .. }) => {
                assert_eq!(status, 1);
                assert_eq!(message, "nope");
            }
            other => panic!("expected server error, got {:?}", other),
        }

        connection.close(CloseReason::SessionClosed).await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(address, &ClientConfig::default())
            .await
            .unwrap_err();
        assert!(err.triggers_failover());
    }
}
