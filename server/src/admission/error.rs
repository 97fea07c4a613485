use rail_shared::{AdmissionStage, AgentId, SimilarityError};
use thiserror::Error;

/// Errors that can occur while moving candidates through absorption
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// No candidate record exists for the agent
    #[error("No admission candidate for agent {agent_id}")]
    UnknownCandidate { agent_id: AgentId },

    /// Requested transition is not allowed from the candidate's current stage
    #[error("Agent {agent_id} cannot move from stage {from} to {to}")]
    InvalidTransition {
        agent_id: AgentId,
        from: AdmissionStage,
        to: AdmissionStage,
    },

    /// Embedding does not match the centroid it is assessed against
    #[error("Alignment embedding error: {0}")]
    Similarity(#[from] SimilarityError),

    /// Capability token could not be minted
    #[error("Capability token for agent {agent_id} could not be minted: random source unavailable")]
    TokenUnavailable { agent_id: AgentId },
}
