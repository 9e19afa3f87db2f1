//! Session lifecycle events.

use std::fmt;

/// Events emitted during session lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The session is discovering endpoints and opening its first connection.
    Starting,
    /// The session has started and accepts operations.
    Started,
    /// The session is closing.
    ShuttingDown,
    /// The session is closed.
    Shutdown,
    /// The session went from no live connection to at least one.
    ClientConnected,
    /// The session lost its last live connection.
    ClientDisconnected,
}

impl LifecycleEvent {
    /// Returns a human-readable name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
            Self::ClientConnected => "CLIENT_CONNECTED",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
        }
    }

    /// Returns `true` for events emitted while the session is closing.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Shutdown)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
