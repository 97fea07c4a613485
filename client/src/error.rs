use thiserror::Error;

use rail_shared::CodecError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No socket has been connected
    #[error("Client is not connected")]
    NotConnected,

    /// Messages and phase reports need an accepted join
    #[error("Client has not joined the rail")]
    NotJoined,

    #[error("Failed to send frame to the rail")]
    Send,

    #[error("Transport receive error")]
    Recv,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
