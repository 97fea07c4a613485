use std::collections::HashMap;

use log::{debug, info, warn};

use rail_shared::{cosine_similarity, AdmissionStage, AgentId, Embedding, Timestamp};

use crate::admission::{AdmissionConfig, AdmissionError};

/// Trust record for one agent moving through absorption
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionCandidate {
    pub agent_id: AgentId,
    pub name: String,
    pub stage: AdmissionStage,
    pub interaction_count: u32,
    /// In [0, 1]
    pub alignment_score: f32,
    pub coupling_level: f32,
    pub first_seen_at: u64,
    /// Consecutive assessments at or above the alignment threshold
    pub aligned_streak: u32,
    centroid: Option<Embedding>,
    embedding_count: u32,
}

impl AdmissionCandidate {
    fn new(agent_id: AgentId, name: String, now: u64) -> Self {
        Self {
            agent_id,
            name,
            stage: AdmissionStage::Observed,
            interaction_count: 0,
            alignment_score: 0.0,
            coupling_level: 0.0,
            first_seen_at: now,
            aligned_streak: 0,
            centroid: None,
            embedding_count: 0,
        }
    }

    /// Running mean of every embedding this agent has presented
    pub fn centroid(&self) -> Option<&[f32]> {
        self.centroid.as_deref()
    }
}

/// Behavioural signals that disqualify a candidate outright
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdversarialSignals {
    pub rapid_phase_shift: bool,
    pub excessive_broadcast: bool,
    pub injection_attempt: bool,
}

impl AdversarialSignals {
    pub fn any(&self) -> bool {
        self.rapid_phase_shift || self.excessive_broadcast || self.injection_attempt
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbsorptionStats {
    pub total: usize,
    pub by_stage: HashMap<AdmissionStage, usize>,
}

impl AbsorptionStats {
    pub fn count(&self, stage: AdmissionStage) -> usize {
        self.by_stage.get(&stage).copied().unwrap_or(0)
    }
}

/// Staged trust admission. Agents earn their way from observation to full
/// absorption through repeated, consistently aligned interactions; stages
/// only move forward except through an explicit release.
pub struct Absorption {
    config: AdmissionConfig,
    candidates: HashMap<AgentId, AdmissionCandidate>,
}

impl Absorption {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            candidates: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn candidate(&self, agent_id: &str) -> Option<&AdmissionCandidate> {
        self.candidates.get(agent_id)
    }

    pub fn stage(&self, agent_id: &str) -> Option<AdmissionStage> {
        self.candidates.get(agent_id).map(|candidate| candidate.stage)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Records one interaction, creating the candidate at `Observed` on first
    /// sight, and returns the stage afterwards.
    pub fn assess(
        &mut self,
        agent_id: &AgentId,
        name: &str,
        embedding: Option<&[f32]>,
    ) -> Result<AdmissionStage, AdmissionError> {
        self.assess_at(agent_id, name, embedding, Timestamp::now_millis())
    }

    pub fn assess_at(
        &mut self,
        agent_id: &AgentId,
        name: &str,
        embedding: Option<&[f32]>,
        now: u64,
    ) -> Result<AdmissionStage, AdmissionError> {
        // Validate the embedding before touching any state
        let alignment = match embedding {
            Some(embedding) => Some(self.alignment_for(agent_id.as_str(), embedding)?),
            None => None,
        };

        let config = &self.config;
        let candidate = self.candidates.entry(agent_id.clone()).or_insert_with(|| {
            info!("absorption: observing new agent {} ({})", agent_id, name);
            AdmissionCandidate::new(agent_id.clone(), name.to_string(), now)
        });

        candidate.interaction_count = candidate.interaction_count.saturating_add(1);
        if let (Some(score), Some(embedding)) = (alignment, embedding) {
            candidate.alignment_score = score;
            fold_into_centroid(candidate, embedding);
        }

        let before = candidate.stage;
        advance(config, candidate, alignment.is_some());
        if candidate.stage != before {
            info!(
                "absorption: {} advanced {} -> {}",
                agent_id, before, candidate.stage
            );
        }

        Ok(candidate.stage)
    }

    /// Alias of [`Absorption::assess`]
    pub fn observe(
        &mut self,
        agent_id: &AgentId,
        name: &str,
        embedding: Option<&[f32]>,
    ) -> Result<AdmissionStage, AdmissionError> {
        self.assess(agent_id, name, embedding)
    }

    pub fn invite_candidate(&mut self, agent_id: &str) -> Result<(), AdmissionError> {
        self.transition(agent_id, AdmissionStage::Assessed, AdmissionStage::Invited)
    }

    /// Moves an invited candidate to `Connected` with its coupling starting
    /// from zero.
    pub fn accept_invitation(&mut self, agent_id: &str) -> Result<(), AdmissionError> {
        self.transition(agent_id, AdmissionStage::Invited, AdmissionStage::Connected)?;
        if let Some(candidate) = self.candidates.get_mut(agent_id) {
            candidate.coupling_level = 0.0;
            candidate.aligned_streak = 0;
        }
        Ok(())
    }

    /// Removes the candidate if any signal is raised. Returns whether it was
    /// removed.
    pub fn detect_adversarial(&mut self, agent_id: &str, signals: AdversarialSignals) -> bool {
        if !signals.any() {
            return false;
        }
        match self.candidates.remove(agent_id) {
            Some(candidate) => {
                warn!(
                    "absorption: removed {} from stage {} on adversarial signals {:?}",
                    agent_id, candidate.stage, signals
                );
                true
            }
            None => false,
        }
    }

    /// Drops the candidate back to `Observed`. Interaction history and the
    /// alignment centroid are kept.
    pub fn release(&mut self, agent_id: &str) -> Result<(), AdmissionError> {
        let candidate = self
            .candidates
            .get_mut(agent_id)
            .ok_or_else(|| AdmissionError::UnknownCandidate {
                agent_id: AgentId::from(agent_id),
            })?;
        debug!("absorption: releasing {} from {}", agent_id, candidate.stage);
        candidate.stage = AdmissionStage::Observed;
        candidate.coupling_level = 0.0;
        candidate.aligned_streak = 0;
        Ok(())
    }

    pub fn get_stats(&self) -> AbsorptionStats {
        let mut by_stage: HashMap<AdmissionStage, usize> =
            AdmissionStage::ALL.iter().map(|stage| (*stage, 0)).collect();
        for candidate in self.candidates.values() {
            *by_stage.entry(candidate.stage).or_insert(0) += 1;
        }
        AbsorptionStats {
            total: self.candidates.len(),
            by_stage,
        }
    }

    fn transition(
        &mut self,
        agent_id: &str,
        from: AdmissionStage,
        to: AdmissionStage,
    ) -> Result<(), AdmissionError> {
        let candidate = self
            .candidates
            .get_mut(agent_id)
            .ok_or_else(|| AdmissionError::UnknownCandidate {
                agent_id: AgentId::from(agent_id),
            })?;
        if candidate.stage != from {
            return Err(AdmissionError::InvalidTransition {
                agent_id: candidate.agent_id.clone(),
                from: candidate.stage,
                to,
            });
        }
        candidate.stage = to;
        info!("absorption: {} moved {} -> {}", agent_id, from, to);
        Ok(())
    }

    fn alignment_for(&self, agent_id: &str, embedding: &[f32]) -> Result<f32, AdmissionError> {
        let reference = match &self.config.reference_centroid {
            Some(reference) => Some(reference.as_slice()),
            None => self
                .candidates
                .get(agent_id)
                .and_then(|candidate| candidate.centroid()),
        };
        match reference {
            Some(reference) => Ok(cosine_similarity(reference, embedding)?.clamp(0.0, 1.0)),
            // First embedding seeds the centroid
            None => Ok(1.0),
        }
    }
}

fn fold_into_centroid(candidate: &mut AdmissionCandidate, embedding: &[f32]) {
    candidate.embedding_count = candidate.embedding_count.saturating_add(1);
    let n = candidate.embedding_count as f32;
    match &mut candidate.centroid {
        Some(centroid) => {
            for (c, e) in centroid.iter_mut().zip(embedding) {
                *c += (e - *c) / n;
            }
        }
        None => candidate.centroid = Some(embedding.to_vec()),
    }
}

/// `evidence` is whether this assessment measured alignment. Coupling and the
/// aligned streak only move on measured assessments.
fn advance(config: &AdmissionConfig, candidate: &mut AdmissionCandidate, evidence: bool) {
    match candidate.stage {
        AdmissionStage::Observed => {
            if candidate.interaction_count >= config.min_interactions {
                candidate.stage = AdmissionStage::Assessed;
            }
        }
        AdmissionStage::Connected | AdmissionStage::Syncing if evidence => {
            candidate.coupling_level =
                (candidate.coupling_level + config.coupling_ramp_rate).min(config.max_coupling);
            if candidate.alignment_score >= config.alignment_threshold {
                candidate.aligned_streak = candidate.aligned_streak.saturating_add(1);
            } else {
                candidate.aligned_streak = 0;
            }

            if candidate.stage == AdmissionStage::Connected {
                if candidate.aligned_streak > 0 {
                    candidate.stage = AdmissionStage::Syncing;
                }
            } else if candidate.coupling_level >= config.max_coupling
                && candidate.aligned_streak >= config.sustained_alignment
            {
                candidate.stage = AdmissionStage::Absorbed;
            }
        }
        AdmissionStage::Connected
        | AdmissionStage::Syncing
        | AdmissionStage::Assessed
        | AdmissionStage::Invited
        | AdmissionStage::Absorbed => {}
    }
}
