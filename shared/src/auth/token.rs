use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{backends::Timestamp, types::AgentId};

/// Number of random bytes in a shared secret (rendered as 64 hex chars)
pub const SECRET_BYTES: usize = 32;

/// Errors that can occur while minting or checking auth tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthTokenError {
    /// The system random source could not be read
    #[error("System random source unavailable")]
    RandomUnavailable,

    /// Signature field is not valid lowercase hex
    #[error("Auth token signature for agent {agent_id} is not valid hex")]
    MalformedSignature { agent_id: AgentId },

    /// Signature does not match the secret
    #[error("Auth token signature for agent {agent_id} does not verify")]
    BadSignature { agent_id: AgentId },
}

/// Short-lived credential proving possession of an agent's shared secret
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub agent_id: AgentId,
    /// Milliseconds since UNIX epoch at signing time
    pub timestamp: u64,
    /// Lowercase hex HMAC-SHA256 over `agent_id:timestamp`
    pub signature: String,
}

impl AuthToken {
    /// Signs a token for `agent_id` at the current wall-clock time
    pub fn generate(agent_id: &AgentId, secret: &str) -> Self {
        Self::sign(agent_id, secret, Timestamp::now_millis())
    }

    /// Signs a token for `agent_id` at `timestamp`
    pub fn sign(agent_id: &AgentId, secret: &str, timestamp: u64) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let tag = hmac::sign(&key, signing_payload(agent_id, timestamp).as_bytes());
        Self {
            agent_id: agent_id.clone(),
            timestamp,
            signature: hex::encode(tag.as_ref()),
        }
    }

    /// Recomputes the MAC over this token's own agent id and timestamp and
    /// compares it with the carried signature in constant time.
    pub fn verify_signature(&self, secret: &str) -> Result<(), AuthTokenError> {
        let tag = hex::decode(&self.signature).map_err(|_| AuthTokenError::MalformedSignature {
            agent_id: self.agent_id.clone(),
        })?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        hmac::verify(
            &key,
            signing_payload(&self.agent_id, self.timestamp).as_bytes(),
            &tag,
        )
        .map_err(|_| AuthTokenError::BadSignature {
            agent_id: self.agent_id.clone(),
        })
    }

    /// Absolute distance between the token timestamp and `now`, in ms
    pub fn age_ms(&self, now: u64) -> u64 {
        now.abs_diff(self.timestamp)
    }
}

fn signing_payload(agent_id: &AgentId, timestamp: u64) -> String {
    format!("{}:{}", agent_id, timestamp)
}

/// Fresh 256-bit secret rendered as 64 lowercase hex characters
pub fn generate_secret() -> Result<String, AuthTokenError> {
    random_hex(SECRET_BYTES)
}

/// `bytes` random bytes from the system CSPRNG, hex encoded
pub fn random_hex(bytes: usize) -> Result<String, AuthTokenError> {
    let mut buffer = vec![0u8; bytes];
    SystemRandom::new()
        .fill(&mut buffer)
        .map_err(|_| AuthTokenError::RandomUnavailable)?;
    Ok(hex::encode(buffer))
}
