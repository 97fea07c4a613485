use rail_shared::{AgentId, AuthTokenError};
use thiserror::Error;

/// Reasons an auth token is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No shared secret is registered for the agent
    #[error("No secret registered for agent {agent_id}")]
    UnknownAgent { agent_id: AgentId },

    /// Signature field is not valid hex
    #[error("Malformed signature from agent {agent_id}")]
    MalformedSignature { agent_id: AgentId },

    /// Signature does not verify against the registered secret
    #[error("Bad signature from agent {agent_id}")]
    BadSignature { agent_id: AgentId },

    /// Token timestamp is outside the freshness window
    #[error("Auth token from agent {agent_id} is {age_ms}ms away from the server clock")]
    Expired { agent_id: AgentId, age_ms: u64 },

    /// Reconnect token could not be minted
    #[error("System random source unavailable")]
    RandomUnavailable,
}

impl From<AuthTokenError> for AuthError {
    fn from(err: AuthTokenError) -> Self {
        match err {
            AuthTokenError::RandomUnavailable => AuthError::RandomUnavailable,
            AuthTokenError::MalformedSignature { agent_id } => {
                AuthError::MalformedSignature { agent_id }
            }
            AuthTokenError::BadSignature { agent_id } => AuthError::BadSignature { agent_id },
        }
    }
}
