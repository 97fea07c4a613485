use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Dense semantic vector attached to messages and candidates
pub type Embedding = Vec<f32>;

/// Identifier of an agent ("oscillator") on the rail
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Trust stage of an agent going through absorption. Declaration order is
/// the progression order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionStage {
    Observed,
    Assessed,
    Invited,
    Connected,
    Syncing,
    Absorbed,
}

impl AdmissionStage {
    pub const ALL: [AdmissionStage; 6] = [
        AdmissionStage::Observed,
        AdmissionStage::Assessed,
        AdmissionStage::Invited,
        AdmissionStage::Connected,
        AdmissionStage::Syncing,
        AdmissionStage::Absorbed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStage::Observed => "observed",
            AdmissionStage::Assessed => "assessed",
            AdmissionStage::Invited => "invited",
            AdmissionStage::Connected => "connected",
            AdmissionStage::Syncing => "syncing",
            AdmissionStage::Absorbed => "absorbed",
        }
    }

    /// Stages at which an agent holds a capability token
    pub fn is_trusted(&self) -> bool {
        *self >= AdmissionStage::Connected
    }
}

impl fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
