use std::fmt;

use thiserror::Error;

cfg_if! {
    if #[cfg(feature = "transport_tcp")] {
        pub mod tcp;
    }
}

/// Identifies one transport-level connection for its whole lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(ConnectionId),
    /// One complete frame
    Data(ConnectionId, Vec<u8>),
    Disconnected(ConnectionId),
}

#[derive(Debug, Error)]
#[error("Transport send error")]
pub struct SendError;

#[derive(Debug, Error)]
#[error("Transport receive error")]
pub struct RecvError;

pub trait Socket {
    /// Starts accepting connections, handing back the two halves the server
    /// reads and writes through
    fn listen(self: Box<Self>) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>);
}

/// Used to send frames from the Server Socket
pub trait PacketSender: Send + Sync {
    fn send(&self, connection: ConnectionId, payload: &[u8]) -> Result<(), SendError>;
    /// Closes the connection; frames already queued may still be flushed
    fn disconnect(&self, connection: ConnectionId);
}

/// Used to receive connection lifecycle events and frames from the Server
/// Socket
pub trait PacketReceiver: Send + Sync {
    fn receive(&mut self) -> Result<Option<TransportEvent>, RecvError>;
}
