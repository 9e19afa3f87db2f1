//! Endpoint discovery.

use std::net::SocketAddr;

use async_trait::async_trait;
use ignite_core::Result;

/// Source of the initial server endpoint list.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync + std::fmt::Debug {
    /// Returns the endpoints to seed the session with.
    async fn discover(&self) -> Result<Vec<SocketAddr>>;
}

/// Static address discovery using a pre-configured list of addresses.
#[derive(Debug, Clone)]
pub struct StaticAddressDiscovery {
    addresses: Vec<SocketAddr>,
}

impl StaticAddressDiscovery {
    /// Creates a new static discovery with the given addresses.
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self { addresses }
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }
}

#[async_trait]
impl ClusterDiscovery for StaticAddressDiscovery {
    async fn discover(&self) -> Result<Vec<SocketAddr>> {
        Ok(self.addresses.clone())
    }
}

impl<T> From<T> for StaticAddressDiscovery
where
    T: IntoIterator<Item = SocketAddr>,
{
    fn from(addresses: T) -> Self {
        Self::new(addresses.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_discovery_returns_addresses() {
        let addr1: SocketAddr = "192.168.1.1:10800".parse().unwrap();
        let addr2: SocketAddr = "192.168.1.2:10800".parse().unwrap();

        let discovery = StaticAddressDiscovery::new(vec![addr1, addr2]);
        let result = discovery.discover().await.unwrap();

        assert_eq!(result, vec![addr1, addr2]);
    }

    #[tokio::test]
    async fn test_static_discovery_empty_addresses() {
        let discovery = StaticAddressDiscovery::new(vec![]);
        assert!(discovery.discover().await.unwrap().is_empty());
    }

    #[test]
    fn test_static_discovery_from_array() {
        let addrs: [SocketAddr; 2] = [
            "192.168.1.1:10800".parse().unwrap(),
            "192.168.1.2:10800".parse().unwrap(),
        ];

        let discovery: StaticAddressDiscovery = addrs.into();
        assert_eq!(discovery.addresses(), &addrs[..]);
    }
}
