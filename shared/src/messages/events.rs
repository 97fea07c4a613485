use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthToken,
    messages::message::RailMessage,
    types::{AdmissionStage, AgentId, Embedding},
};

/// Proof of identity presented on join
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Freshly signed token over the shared secret
    Token { token: AuthToken },
    /// Single-use token handed out on a previous successful join
    Reconnect { token: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub credential: Credential,
    /// Topics this agent is willing to be routed for
    #[serde(default)]
    pub topics: Vec<String>,
    /// Embedding describing what this agent is good at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attractor: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<f64>,
}

/// Events sent from an agent to the rail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Join(JoinRequest),
    Message(RailMessage),
    Broadcast(RailMessage),
    PhaseReport { phase: f64, timestamp: u64 },
    Leave,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AuthFailed,
    RateLimited,
    Adversarial,
    Superseded,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NotJoined,
    RateLimited,
    NoRoute,
    UnknownRecipient,
    /// Embedding dimension does not match the one it is compared against
    InvalidEmbedding,
}

/// Events sent from the rail to an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Accepted {
        stage: AdmissionStage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capability_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reconnect_token: Option<String>,
    },
    Rejected {
        reason: RejectReason,
    },
    StageChanged {
        stage: AdmissionStage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capability_token: Option<String>,
    },
    /// An operator invited this agent; rejoining completes the transition
    Invited,
    Message(RailMessage),
    Broadcast(RailMessage),
    Coherence {
        coherence: f64,
        coupling: f64,
    },
    Dropped {
        message_id: String,
        reason: DropReason,
    },
    ReauthRequired,
}
