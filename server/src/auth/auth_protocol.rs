use std::collections::HashMap;

use log::{debug, info, warn};
use ring::hmac;

use rail_shared::{random_hex, AgentId, AuthToken, Timestamp};

use crate::auth::{AuthConfig, AuthError};

const RECONNECT_TOKEN_BYTES: usize = 32;

/// One-time credential letting an agent rejoin without re-signing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectToken {
    pub agent_id: AgentId,
    pub token: String,
    pub issued_at: u64,
}

/// Shared-secret registry plus validation of signed auth tokens and
/// single-use reconnect tokens
pub struct AuthProtocol {
    config: AuthConfig,
    secrets: HashMap<AgentId, String>,
    reconnect_tokens: HashMap<AgentId, ReconnectToken>,
}

impl AuthProtocol {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            secrets: HashMap::new(),
            reconnect_tokens: HashMap::new(),
        }
    }

    /// Registers or replaces the shared secret for an agent
    pub fn register_agent(&mut self, agent_id: &AgentId, secret: &str) {
        if self
            .secrets
            .insert(agent_id.clone(), secret.to_string())
            .is_some()
        {
            info!("auth: replaced secret for {}", agent_id);
        } else {
            info!("auth: registered {}", agent_id);
        }
    }

    /// Forgets the agent's secret and any outstanding reconnect token
    pub fn unregister_agent(&mut self, agent_id: &str) -> bool {
        self.reconnect_tokens.remove(agent_id);
        self.secrets.remove(agent_id).is_some()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.secrets.contains_key(agent_id)
    }

    pub fn registered_count(&self) -> usize {
        self.secrets.len()
    }

    pub fn generate_auth_token(&self, agent_id: &AgentId, secret: &str) -> AuthToken {
        AuthToken::generate(agent_id, secret)
    }

    pub fn validate_auth_token(&self, token: &AuthToken) -> Result<(), AuthError> {
        self.validate_auth_token_at(token, Timestamp::now_millis())
    }

    pub fn validate_auth_token_at(&self, token: &AuthToken, now: u64) -> Result<(), AuthError> {
        let secret = self
            .secrets
            .get(&token.agent_id)
            .ok_or_else(|| AuthError::UnknownAgent {
                agent_id: token.agent_id.clone(),
            })?;

        token.verify_signature(secret)?;

        let age_ms = token.age_ms(now);
        if u128::from(age_ms) > self.config.token_freshness.as_millis() {
            return Err(AuthError::Expired {
                agent_id: token.agent_id.clone(),
                age_ms,
            });
        }

        debug!("auth: token for {} validated", token.agent_id);
        Ok(())
    }

    /// Mints a reconnect token, replacing any outstanding one. Returns `None`
    /// for unregistered agents.
    pub fn issue_reconnect_token(&mut self, agent_id: &AgentId) -> Result<Option<String>, AuthError> {
        self.issue_reconnect_token_at(agent_id, Timestamp::now_millis())
    }

    pub fn issue_reconnect_token_at(
        &mut self,
        agent_id: &AgentId,
        now: u64,
    ) -> Result<Option<String>, AuthError> {
        if !self.secrets.contains_key(agent_id) {
            return Ok(None);
        }
        let token = random_hex(RECONNECT_TOKEN_BYTES)?;
        self.reconnect_tokens.insert(
            agent_id.clone(),
            ReconnectToken {
                agent_id: agent_id.clone(),
                token: token.clone(),
                issued_at: now,
            },
        );
        Ok(Some(token))
    }

    /// Succeeds at most once per issued token. Expired tokens are dropped.
    pub fn validate_reconnect_token(&mut self, agent_id: &str, token: &str) -> bool {
        self.validate_reconnect_token_at(agent_id, token, Timestamp::now_millis())
    }

    pub fn validate_reconnect_token_at(&mut self, agent_id: &str, token: &str, now: u64) -> bool {
        self.check_reconnect_token_at(agent_id, token, now) && self.consume_reconnect_token(agent_id)
    }

    /// Validates without consuming, so a join refused later on can still be
    /// retried with the same token. Expired tokens are dropped.
    pub fn check_reconnect_token_at(&mut self, agent_id: &str, token: &str, now: u64) -> bool {
        let issued = match self.reconnect_tokens.get(agent_id) {
            Some(issued) => issued,
            None => {
                debug!("auth: no reconnect token outstanding for {}", agent_id);
                return false;
            }
        };

        let age = now.saturating_sub(issued.issued_at);
        if u128::from(age) > self.config.reconnect_token_ttl.as_millis() {
            warn!("auth: reconnect token for {} expired after {}ms", agent_id, age);
            self.reconnect_tokens.remove(agent_id);
            return false;
        }

        let Some(secret) = self.secrets.get(agent_id) else {
            return false;
        };
        // Compare MACs of the tokens rather than the tokens themselves
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let expected = hmac::sign(&key, issued.token.as_bytes());
        hmac::verify(&key, token.as_bytes(), expected.as_ref()).is_ok()
    }

    pub fn consume_reconnect_token(&mut self, agent_id: &str) -> bool {
        if self.reconnect_tokens.remove(agent_id).is_some() {
            info!("auth: reconnect token for {} consumed", agent_id);
            true
        } else {
            false
        }
    }

    pub fn has_reconnect_token(&self, agent_id: &str) -> bool {
        self.reconnect_tokens.contains_key(agent_id)
    }
}
