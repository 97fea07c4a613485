use thiserror::Error;

use rail_shared::CodecError;

use crate::{
    admission::AdmissionError, auth::AuthError, plugins::PluginError, routing::RoutingError,
    sync::SyncError, trace_store::TraceStoreError, transport::ConnectionId, vault::VaultError,
};

#[derive(Debug, Error)]
pub enum RailServerError {
    /// The periodic tick cannot be scheduled; the only fatal error
    #[error("Synchronization tick scheduler could not be initialized: {reason}")]
    SchedulerInit { reason: String },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Frame from {connection} rejected: {source}")]
    Codec {
        connection: ConnectionId,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    TraceStore(#[from] TraceStoreError),

    #[error("Failed to send to {connection}")]
    Send { connection: ConnectionId },

    #[error("Transport receive error")]
    Recv,
}
