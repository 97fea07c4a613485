use log::warn;
use thiserror::Error;

use rail_shared::{cosine_similarity, AgentId, Embedding};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceStoreError {
    #[error("Trace store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Trace query failed: {reason}")]
    Query { reason: String },
}

/// A persisted record of one message on the rail
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub message_id: String,
    pub agent_id: AgentId,
    pub content: String,
    pub timestamp: u64,
    pub embedding: Option<Embedding>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceQuery {
    /// Rank by similarity to this embedding; most recent first when absent
    pub embedding: Option<Embedding>,
    pub limit: usize,
}

pub trait TraceStore: Send {
    fn record(&mut self, trace: Trace) -> Result<(), TraceStoreError>;

    fn search_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, TraceStoreError>;
}

/// Keeps traces in memory and ranks them by embedding similarity
#[derive(Clone, Debug, Default)]
pub struct MemoryTraceStore {
    traces: Vec<Trace>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

impl TraceStore for MemoryTraceStore {
    fn record(&mut self, trace: Trace) -> Result<(), TraceStoreError> {
        self.insert(trace);
        Ok(())
    }

    fn search_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, TraceStoreError> {
        let Some(target) = &query.embedding else {
            return Ok(self.traces.iter().rev().take(query.limit).cloned().collect());
        };

        let mut scored: Vec<(f32, &Trace)> = Vec::new();
        for trace in &self.traces {
            let Some(embedding) = &trace.embedding else {
                continue;
            };
            match cosine_similarity(target, embedding) {
                Ok(score) => scored.push((score, trace)),
                Err(e) => warn!("trace store: skipping {}: {}", trace.message_id, e),
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(query.limit)
            .map(|(_, trace)| trace.clone())
            .collect())
    }
}
