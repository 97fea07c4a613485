use std::default::Default;

/// How the router temperature evolves across routing calls
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnnealingSchedule {
    /// Multiply the temperature by `decay` (< 1) after every
    /// multi-candidate routing call. Cooling is strict until the temperature
    /// reaches `RouterConfig::min_temperature`, where it stays; set that to
    /// 0 for unbounded cooling.
    Exponential { decay: f32 },
    /// Temperature never changes
    None,
}

/// Relative weights of the energy terms. Similarity is the dominant term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyWeights {
    pub similarity: f32,
    pub load: f32,
    pub coherence: f32,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            similarity: 1.0,
            load: 0.25,
            coherence: 0.1,
        }
    }
}

/// Contains Config properties which will be used by the energy router
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub initial_temperature: f32,
    /// Annealing never pushes the temperature below this value
    pub min_temperature: f32,
    pub annealing: AnnealingSchedule,
    pub weights: EnergyWeights,
    /// Fixed seed for the sampling RNG; random when `None`
    pub seed: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 1.0,
            min_temperature: 1e-3,
            annealing: AnnealingSchedule::Exponential { decay: 0.995 },
            weights: EnergyWeights::default(),
            seed: None,
        }
    }
}
