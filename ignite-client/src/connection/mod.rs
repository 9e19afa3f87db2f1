//! Connection management for the thin client.

mod connection;
mod correlator;
mod discovery;
mod endpoint;
mod manager;
mod transport;

pub use connection::{Connection, ConnectionId};
pub use correlator::{CloseReason, Correlator, ResponseHandle};
pub use discovery::{ClusterDiscovery, StaticAddressDiscovery};
pub use endpoint::{Endpoint, EndpointHealth, EndpointOrigin};
pub use manager::{ConnectionEvent, ConnectionManager, SessionState};
pub use transport::{handshake, FrameReader, FrameWriter};
