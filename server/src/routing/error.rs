use rail_shared::SimilarityError;
use thiserror::Error;

/// Errors that can occur while routing a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Route called with an empty candidate set
    #[error("No routing candidates available")]
    NoCandidates,

    /// Message and candidate embeddings have different lengths
    #[error("Routing embedding error: {0}")]
    Similarity(#[from] SimilarityError),
}
