use log::{debug, trace};

use rail_shared::{cosine_similarity, AgentId, Embedding, RailMessage};

use crate::routing::{AnnealingSchedule, EnergyWeights, RouterConfig, RoutingError};

/// Snapshot of a possible recipient, built per routing decision
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingCandidate {
    pub agent_id: AgentId,
    /// Normalized load, 0 = idle
    pub current_load: f32,
    /// Phase alignment with the rail, in [0, 1]
    pub coherence: f32,
    pub attractor_embedding: Embedding,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub agent_id: AgentId,
    pub energy: f32,
    pub probability: f32,
}

/// Energy of assigning a message with `embedding` to `candidate`. Lower is
/// better: similar, lightly loaded, coherent candidates score lowest. A
/// missing embedding counts as zero similarity for every candidate.
pub fn compute_energy(
    embedding: Option<&[f32]>,
    candidate: &RoutingCandidate,
    weights: &EnergyWeights,
) -> Result<f32, RoutingError> {
    let similarity = match embedding {
        Some(embedding) => cosine_similarity(embedding, &candidate.attractor_embedding)?,
        None => 0.0,
    };
    Ok(weights.similarity * (1.0 - similarity) + weights.load * candidate.current_load
        - weights.coherence * candidate.coherence)
}

/// Boltzmann distribution over energies: p_i ∝ exp(−E_i / T).
///
/// A non-positive temperature degenerates to a one-hot pick of the minimum.
pub fn softmax(energies: &[f32], temperature: f32) -> Vec<f32> {
    if energies.is_empty() {
        return Vec::new();
    }

    if temperature <= 0.0 || !temperature.is_finite() {
        let mut probabilities = vec![0.0; energies.len()];
        if let Some(best) = argmin(energies) {
            probabilities[best] = 1.0;
        }
        return probabilities;
    }

    // Shift by the minimum energy for numerical stability
    let min_energy = energies.iter().copied().fold(f32::INFINITY, f32::min);
    let weights: Vec<f32> = energies
        .iter()
        .map(|&e| (-(e - min_energy) / temperature).exp())
        .collect();

    let sum: f32 = weights.iter().sum();
    if sum <= f32::EPSILON || !sum.is_finite() {
        let n = weights.len() as f32;
        return vec![1.0 / n; weights.len()];
    }
    weights.iter().map(|&w| w / sum).collect()
}

fn argmin(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

/// Picks message recipients by sampling a temperature-controlled
/// distribution over candidate energies, annealing the temperature as it goes.
pub struct EnergyRouter {
    config: RouterConfig,
    temperature: f32,
    rng: fastrand::Rng,
}

impl EnergyRouter {
    pub fn new(config: RouterConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            temperature: config.initial_temperature,
            config,
            rng,
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn reset_temperature(&mut self) {
        self.temperature = self.config.initial_temperature;
    }

    pub fn compute_energy(
        &self,
        message: &RailMessage,
        candidate: &RoutingCandidate,
    ) -> Result<f32, RoutingError> {
        compute_energy(message.embedding(), candidate, &self.config.weights)
    }

    /// Chooses a recipient for `message`. A single candidate is returned
    /// directly, without sampling or annealing.
    pub fn route(
        &mut self,
        message: &RailMessage,
        candidates: &[RoutingCandidate],
    ) -> Result<RouteDecision, RoutingError> {
        match candidates {
            [] => Err(RoutingError::NoCandidates),
            [only] => Ok(RouteDecision {
                agent_id: only.agent_id.clone(),
                energy: self.compute_energy(message, only)?,
                probability: 1.0,
            }),
            _ => {
                let energies = candidates
                    .iter()
                    .map(|candidate| self.compute_energy(message, candidate))
                    .collect::<Result<Vec<f32>, RoutingError>>()?;
                let probabilities = softmax(&energies, self.temperature);
                let chosen = self.sample(&probabilities);
                trace!(
                    "router: energies {:?} at T = {:.4} -> picked {}",
                    energies,
                    self.temperature,
                    candidates[chosen].agent_id
                );

                self.anneal();

                Ok(RouteDecision {
                    agent_id: candidates[chosen].agent_id.clone(),
                    energy: energies[chosen],
                    probability: probabilities[chosen],
                })
            }
        }
    }

    fn sample(&mut self, probabilities: &[f32]) -> usize {
        let roll = self.rng.f32();
        let mut cumulative = 0.0;
        for (index, p) in probabilities.iter().enumerate() {
            cumulative += p;
            if roll < cumulative {
                return index;
            }
        }
        // Rounding left the cumulative sum just under 1
        probabilities.len() - 1
    }

    fn anneal(&mut self) {
        if let AnnealingSchedule::Exponential { decay } = self.config.annealing {
            self.temperature = (self.temperature * decay).max(self.config.min_temperature);
            debug!("router: temperature annealed to {:.5}", self.temperature);
        }
    }
}
