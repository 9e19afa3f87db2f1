//! Frame transport over one byte stream.
//!
//! [`FrameReader`] and [`FrameWriter`] own the two halves of a socket and
//! move whole frames. The handshake runs over them before the halves are
//! handed to the correlator.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;

use ignite_core::protocol::{
    frame, FrameCodec, FrameError, HandshakeRequest, HandshakeResponse, ProtocolVersion,
};
use ignite_core::{IgniteError, Result, TransportErrorKind};

use crate::config::SecurityConfig;

fn frame_error(endpoint: SocketAddr, err: FrameError) -> IgniteError {
    match err {
        FrameError::Io(e) => IgniteError::transport(endpoint, &e),
        FrameError::PartialFrame { .. } => IgniteError::Transport {
            endpoint: endpoint.to_string(),
            kind: TransportErrorKind::PartialFrame,
            message: err.to_string(),
        },
        FrameError::TooLarge { .. } => IgniteError::Transport {
            endpoint: endpoint.to_string(),
            kind: TransportErrorKind::FrameTooLarge,
            message: err.to_string(),
        },
    }
}

/// Reads length-prefixed frames from the read half of a connection.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
    endpoint: SocketAddr,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a reader, rejecting frames longer than `max_frame_length`.
    pub fn new(reader: R, endpoint: SocketAddr, max_frame_length: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, FrameCodec::with_max_length(max_frame_length)),
            endpoint,
        }
    }

    /// Waits for the next complete frame payload.
    ///
    /// A clean end of stream between frames yields
    /// [`IgniteError::ConnectionClosed`]; one inside a frame yields a
    /// [`TransportErrorKind::PartialFrame`] transport error.
    pub async fn receive_frame(&mut self) -> Result<Bytes> {
        match self.inner.next().await {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(frame_error(self.endpoint, e)),
            None => Err(IgniteError::ConnectionClosed {
                endpoint: self.endpoint.to_string(),
                request_id: None,
            }),
        }
    }
}

/// Writes length-prefixed frames to the write half of a connection.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    endpoint: SocketAddr,
    max_frame_length: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps a writer.
    pub fn new(writer: W, endpoint: SocketAddr, max_frame_length: usize) -> Self {
        Self {
            inner: writer,
            endpoint,
            max_frame_length,
        }
    }

    /// Writes one frame and flushes it.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_frame_length {
            return Err(frame_error(
                self.endpoint,
                FrameError::TooLarge {
                    length: payload.len(),
                    max: self.max_frame_length,
                },
            ));
        }
        let framed = frame(payload);
        self.inner
            .write_all(&framed)
            .await
            .map_err(|e| IgniteError::transport(self.endpoint, &e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| IgniteError::transport(self.endpoint, &e))
    }

    /// Shuts down the write direction.
    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

/// Negotiates a protocol version.
///
/// Offers the first of `versions`. When the server rejects it but names a
/// version that is also in `versions`, the handshake is retried once with
/// that version on the same stream.
pub async fn handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    versions: &[ProtocolVersion],
    security: &SecurityConfig,
) -> Result<ProtocolVersion>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let endpoint = reader.endpoint;
    let mut proposed = *versions.first().ok_or_else(|| {
        IgniteError::Configuration("no protocol versions configured".to_string())
    })?;
    let mut retried = false;

    loop {
        let mut request = HandshakeRequest::new(proposed);
        if let (Some(user), Some(password)) = (security.username(), security.password()) {
            request = request.with_credentials(user, password);
        }
        writer.send(&request.encode()?).await?;

        let reply = reader.receive_frame().await?;
        match HandshakeResponse::decode(&reply)? {
            HandshakeResponse::Accepted => {
                tracing::debug!(address = %endpoint, version = %proposed, "handshake accepted");
                return Ok(proposed);
            }
            HandshakeResponse::Rejected {
                server_version,
                message,
            } => {
                tracing::debug!(
                    address = %endpoint,
                    proposed = %proposed,
                    server_version = %server_version,
                    message = %message,
                    "handshake rejected"
                );
                if !retried && server_version != proposed && versions.contains(&server_version) {
                    retried = true;
                    proposed = server_version;
                    continue;
                }
                return Err(IgniteError::Handshake {
                    endpoint: endpoint.to_string(),
                    reason: format!(
                        "server rejected {} and offers {}: {}",
                        proposed, server_version, message
                    ),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, AsyncReadExt};

    fn endpoint() -> SocketAddr {
        "127.0.0.1:10800".parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive_frames() {
        let (client, server) = duplex(1024);
        let mut writer = FrameWriter::new(client, endpoint(), 1024);
        let mut reader = FrameReader::new(server, endpoint(), 1024);

        writer.send(b"first").await.unwrap();
        writer.send(b"").await.unwrap();

        assert_eq!(&reader.receive_frame().await.unwrap()[..], b"first");
        assert!(reader.receive_frame().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let (client, server) = duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, endpoint(), 1024);
        assert!(matches!(
            reader.receive_frame().await,
            Err(IgniteError::ConnectionClosed { request_id: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_partial_frame() {
        let (mut client, server) = duplex(64);
        client.write_all(&[10, 0, 0, 0, 1, 2]).await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server, endpoint(), 1024);
        match reader.receive_frame().await {
            Err(IgniteError::Transport { kind, .. }) => {
                assert_eq!(kind, TransportErrorKind::PartialFrame)
            }
            other => panic!("expected partial frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, server) = duplex(64);
        client.write_all(&1000u32.to_le_bytes()).await.unwrap();

        let mut reader = FrameReader::new(server, endpoint(), 100);
        match reader.receive_frame().await {
            Err(IgniteError::Transport { kind, .. }) => {
                assert_eq!(kind, TransportErrorKind::FrameTooLarge)
            }
            other => panic!("expected frame too large, got {:?}", other),
        }
    }

    async fn run_handshake(
        versions: &[ProtocolVersion],
        replies: Vec<HandshakeResponse>,
    ) -> (Result<ProtocolVersion>, Vec<HandshakeRequest>) {
        let (client, server) = duplex(4096);
        let (client_read, client_write) = split(client);
        let (server_read, server_write) = split(server);

        let server_task = tokio::spawn(async move {
            let mut reader = FrameReader::new(server_read, endpoint(), 4096);
            let mut writer = FrameWriter::new(server_write, endpoint(), 4096);
            let mut seen = Vec::new();
            for reply in replies {
                let Ok(frame) = reader.receive_frame().await else {
                    break;
                };
                seen.push(HandshakeRequest::decode(&frame).unwrap());
                writer.send(&reply.encode().unwrap()).await.unwrap();
            }
            seen
        });

        let mut reader = FrameReader::new(client_read, endpoint(), 4096);
        let mut writer = FrameWriter::new(client_write, endpoint(), 4096);
        let result = handshake(&mut reader, &mut writer, versions, &SecurityConfig::default()).await;
        drop(writer);
        (result, server_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (result, seen) = run_handshake(
            &[ProtocolVersion::V1_2_0],
            vec![HandshakeResponse::Accepted],
        )
        .await;
        assert_eq!(result.unwrap(), ProtocolVersion::V1_2_0);
        assert_eq!(seen[0].version, ProtocolVersion::V1_2_0);
    }

    #[tokio::test]
    async fn test_handshake_falls_back_to_server_version() {
        let (result, seen) = run_handshake(
            &[ProtocolVersion::V1_2_0, ProtocolVersion::V1_0_0],
            vec![
                HandshakeResponse::Rejected {
                    server_version: ProtocolVersion::V1_0_0,
                    message: "too new".to_string(),
                },
                HandshakeResponse::Accepted,
            ],
        )
        .await;
        assert_eq!(result.unwrap(), ProtocolVersion::V1_0_0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].version, ProtocolVersion::V1_0_0);
    }

    #[tokio::test]
    async fn test_handshake_mismatch_fails() {
        let (result, _) = run_handshake(
            &[ProtocolVersion::V1_2_0],
            vec![HandshakeResponse::Rejected {
                server_version: ProtocolVersion::new(9, 0, 0),
                message: "unsupported".to_string(),
            }],
        )
        .await;
        assert!(matches!(result, Err(IgniteError::Handshake { .. })));
    }

    #[tokio::test]
    async fn test_writer_emits_length_prefix() {
        let (client, mut server) = duplex(64);
        let mut writer = FrameWriter::new(client, endpoint(), 64);
        writer.send(b"xy").await.unwrap();

        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [2, 0, 0, 0, b'x', b'y']);
    }
}
