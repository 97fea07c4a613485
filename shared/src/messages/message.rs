use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Embedding};

/// Closed set of message kinds understood by routing and admission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Think,
    Act,
    Invoke,
    Halt,
    Percept,
}

/// Message body, either free text or structured JSON
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
}

impl Payload {
    /// Textual rendering used for traces
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Structured(value) => Cow::Owned(value.to_string()),
        }
    }
}

/// Addressee of a message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    /// Delivered to exactly this agent
    Agent(AgentId),
    /// Routed to the best candidate advertising this topic
    Topic(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RailMessage {
    pub id: String,
    pub kind: MessageKind,
    pub from: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Recipient>,
    pub payload: Payload,
    /// Milliseconds since UNIX epoch
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl RailMessage {
    pub fn new(
        id: impl Into<String>,
        kind: MessageKind,
        from: AgentId,
        payload: Payload,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            from,
            to: None,
            payload,
            timestamp,
            embedding: None,
        }
    }

    pub fn to(mut self, recipient: Recipient) -> Self {
        self.to = Some(recipient);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().map_or(false, |e| !e.is_empty())
    }

    /// The embedding if one is present and non-empty
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }
}
