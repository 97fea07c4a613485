use std::{default::Default, time::Duration};

/// Contains Config properties which will be used by the global
/// synchronization engine
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Number of synchronization ticks per second
    pub broadcast_hz: f64,
    /// Coupling strength K at startup
    pub initial_coupling: f64,
    pub min_coupling: f64,
    pub max_coupling: f64,
    /// Amount the coupling moves per tick when adjusting
    pub coupling_step: f64,
    /// Below this coherence the coupling is raised
    pub coherence_threshold: f64,
    /// Above this coherence the coupling is lowered (over-synchronization)
    pub groupthink_threshold: f64,
    /// Below this coherence the engine reports it needs intervention
    pub intervention_threshold: f64,
    /// Agents silent for longer than this are pruned
    pub stale_ttl: Duration,
    /// Sliding window used for flood detection
    pub flood_window: Duration,
    /// Reports tolerated inside one flood window
    pub flood_limit: usize,
    /// Trust removed per flooding report
    pub flood_penalty: f64,
    /// Trust score given to a newly added agent
    pub initial_trust: f64,
    /// Natural frequency (rad/s) for agents that do not declare one
    pub default_natural_frequency: f64,
}

impl SyncConfig {
    /// `None` unless `broadcast_hz` is positive and finite
    pub fn tick_interval(&self) -> Option<Duration> {
        if !(self.broadcast_hz.is_finite() && self.broadcast_hz > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.broadcast_hz).ok()
    }

    /// Integration step in seconds for one tick
    pub fn dt(&self) -> f64 {
        1.0 / self.broadcast_hz
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broadcast_hz: 10.0,
            initial_coupling: 1.0,
            min_coupling: 0.1,
            max_coupling: 4.0,
            coupling_step: 0.05,
            coherence_threshold: 0.5,
            groupthink_threshold: 0.95,
            intervention_threshold: 0.3,
            stale_ttl: Duration::from_secs(30),
            flood_window: Duration::from_secs(1),
            flood_limit: 10,
            flood_penalty: 0.1,
            initial_trust: 1.0,
            default_natural_frequency: 1.0,
        }
    }
}
