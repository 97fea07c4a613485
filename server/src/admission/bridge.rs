use std::collections::HashMap;

use log::{info, warn};

use rail_shared::{random_hex, AdmissionStage, AgentId, Timestamp};

use crate::admission::{
    Absorption, AbsorptionStats, AdmissionConfig, AdmissionError, AdversarialSignals,
};

const CAPABILITY_RANDOM_BYTES: usize = 8;

/// Outcome of a join as seen by the admission layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinDecision {
    pub accepted: bool,
    pub stage: AdmissionStage,
    pub capability_token: Option<String>,
}

/// Stage movement caused by a recorded interaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageChange {
    pub agent_id: AgentId,
    pub from: AdmissionStage,
    pub to: AdmissionStage,
    pub capability_token: Option<String>,
}

/// Turns absorption stages into join decisions and owns the capability
/// tokens handed to trusted agents.
pub struct AdmissionBridge {
    absorption: Absorption,
    capability_tokens: HashMap<AgentId, String>,
}

impl AdmissionBridge {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            absorption: Absorption::new(config),
            capability_tokens: HashMap::new(),
        }
    }

    pub fn absorption(&self) -> &Absorption {
        &self.absorption
    }

    pub fn handle_join(
        &mut self,
        agent_id: &AgentId,
        agent_name: &str,
    ) -> Result<JoinDecision, AdmissionError> {
        self.handle_join_at(agent_id, agent_name, Timestamp::now_millis())
    }

    pub fn handle_join_at(
        &mut self,
        agent_id: &AgentId,
        agent_name: &str,
        now: u64,
    ) -> Result<JoinDecision, AdmissionError> {
        let stage = match self.absorption.stage(agent_id.as_str()) {
            None => self.absorption.assess_at(agent_id, agent_name, None, now)?,
            Some(AdmissionStage::Invited) => {
                self.absorption.accept_invitation(agent_id.as_str())?;
                AdmissionStage::Connected
            }
            Some(stage) => stage,
        };

        let capability_token = if stage.is_trusted() {
            Some(self.mint_capability_token(agent_id)?)
        } else {
            None
        };

        info!("bridge: {} joined at stage {}", agent_id, stage);
        Ok(JoinDecision {
            accepted: true,
            stage,
            capability_token,
        })
    }

    /// Feeds one interaction into absorption and reports a stage change, if
    /// any.
    pub fn record_interaction(
        &mut self,
        agent_id: &AgentId,
        embedding: Option<&[f32]>,
    ) -> Result<Option<StageChange>, AdmissionError> {
        self.record_interaction_at(agent_id, embedding, Timestamp::now_millis())
    }

    pub fn record_interaction_at(
        &mut self,
        agent_id: &AgentId,
        embedding: Option<&[f32]>,
        now: u64,
    ) -> Result<Option<StageChange>, AdmissionError> {
        let (from, name) = match self.absorption.candidate(agent_id.as_str()) {
            Some(candidate) => (Some(candidate.stage), candidate.name.clone()),
            None => (None, agent_id.to_string()),
        };
        let to = self.absorption.assess_at(agent_id, &name, embedding, now)?;

        match from {
            Some(from) if from != to => Ok(Some(StageChange {
                agent_id: agent_id.clone(),
                from,
                to,
                capability_token: self.capability_tokens.get(agent_id).cloned(),
            })),
            _ => Ok(None),
        }
    }

    pub fn capability_token(&self, agent_id: &str) -> Option<&str> {
        self.capability_tokens.get(agent_id).map(String::as_str)
    }

    /// Forgets the agent's capability token. Its trust record is kept.
    pub fn remove_agent(&mut self, agent_id: &str) -> bool {
        self.capability_tokens.remove(agent_id).is_some()
    }

    pub fn invite_candidate(&mut self, agent_id: &str) -> Result<(), AdmissionError> {
        self.absorption.invite_candidate(agent_id)
    }

    /// Resets the candidate to `Observed` and revokes its capability token.
    pub fn release(&mut self, agent_id: &str) -> Result<(), AdmissionError> {
        self.absorption.release(agent_id)?;
        self.capability_tokens.remove(agent_id);
        Ok(())
    }

    /// Removes the candidate and revokes its capability token when any signal
    /// is raised.
    pub fn detect_adversarial(&mut self, agent_id: &str, signals: AdversarialSignals) -> bool {
        let removed = self.absorption.detect_adversarial(agent_id, signals);
        if removed && self.capability_tokens.remove(agent_id).is_some() {
            warn!("bridge: revoked capability token of {}", agent_id);
        }
        removed
    }

    pub fn stage(&self, agent_id: &str) -> Option<AdmissionStage> {
        self.absorption.stage(agent_id)
    }

    pub fn get_stats(&self) -> AbsorptionStats {
        self.absorption.get_stats()
    }

    fn mint_capability_token(&mut self, agent_id: &AgentId) -> Result<String, AdmissionError> {
        let suffix = random_hex(CAPABILITY_RANDOM_BYTES).map_err(|_| {
            AdmissionError::TokenUnavailable {
                agent_id: agent_id.clone(),
            }
        })?;
        let token = format!("cap_{}_{}", agent_id, suffix);
        self.capability_tokens.insert(agent_id.clone(), token.clone());
        Ok(token)
    }
}
