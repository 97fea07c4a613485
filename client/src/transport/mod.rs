use thiserror::Error;

cfg_if! {
    if #[cfg(feature = "transport_tcp")] {
        pub mod tcp;
    }
}

#[derive(Debug, Error)]
#[error("Transport send error")]
pub struct SendError;

/// The connection to the rail is gone
#[derive(Debug, Error)]
#[error("Transport receive error")]
pub struct RecvError;

pub trait Socket {
    /// Opens the connection, handing back the two halves the client writes
    /// and reads through
    fn connect(self: Box<Self>) -> (Box<dyn PacketSender>, Box<dyn PacketReceiver>);
}

/// Used to send frames from the Client Socket
pub trait PacketSender: Send + Sync {
    fn send(&self, payload: &[u8]) -> Result<(), SendError>;
    /// Whether the connection is still open
    fn connected(&self) -> bool;
}

/// Used to receive frames from the Client Socket
pub trait PacketReceiver: Send + Sync {
    /// One complete frame, `None` when nothing is pending, or `RecvError`
    /// once the connection has closed and every frame has been read
    fn receive(&mut self) -> Result<Option<Vec<u8>>, RecvError>;
}
