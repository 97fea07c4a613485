use rail_shared::AgentId;
use thiserror::Error;

/// Errors that can occur in the global synchronization engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Phase reported for an agent that was never added (or was pruned)
    #[error("Agent {agent_id} is not registered with the synchronization engine")]
    UnknownAgent { agent_id: AgentId },
}
