use rail_shared::{AdmissionStage, AgentId, Embedding};

use crate::transport::ConnectionId;

/// Sessions are keyed by the connection they live on
pub type SessionKey = ConnectionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no valid credential presented yet
    Unauthenticated,
    /// Credential accepted, admission stage below `Connected`
    Joined,
    /// Admission stage `Connected` or beyond
    Active,
}

impl SessionState {
    pub fn for_stage(stage: AdmissionStage) -> Self {
        if stage.is_trusted() {
            SessionState::Active
        } else {
            SessionState::Joined
        }
    }

    pub fn is_joined(&self) -> bool {
        !matches!(self, SessionState::Unauthenticated)
    }
}

/// Per-connection record kept by the rail server
#[derive(Clone, Debug)]
pub struct Session {
    pub key: SessionKey,
    pub state: SessionState,
    pub agent_id: Option<AgentId>,
    pub agent_name: String,
    pub topics: Vec<String>,
    pub attractor: Option<Embedding>,
    /// Decaying count of messages recently delivered to this agent
    pub load: f32,
    pub connected_at: u64,
}

impl Session {
    pub fn new(key: SessionKey, now: u64) -> Self {
        Self {
            key,
            state: SessionState::Unauthenticated,
            agent_id: None,
            agent_name: String::new(),
            topics: Vec::new(),
            attractor: None,
            load: 0.0,
            connected_at: now,
        }
    }

    /// Identifier used for per-connection defenses and security events
    pub fn client_id(&self) -> String {
        match &self.agent_id {
            Some(agent_id) => agent_id.to_string(),
            None => self.key.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_joined(&self) -> bool {
        self.state.is_joined()
    }

    pub fn advertises(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Back to unauthenticated on the same connection
    pub(crate) fn reset(&mut self) {
        self.state = SessionState::Unauthenticated;
        self.agent_id = None;
        self.load = 0.0;
    }
}
