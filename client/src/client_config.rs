use std::default::Default;

use rail_shared::Embedding;

/// Contains Config properties which will be used by a Client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Display name sent on join. Empty means the agent id is used.
    pub agent_name: String,
    /// Topics this agent can be routed messages for
    pub topics: Vec<String>,
    /// What this agent is good at, compared against message embeddings
    pub attractor: Option<Embedding>,
    /// Radians per second of the local oscillator
    pub natural_frequency: f64,
    /// Starting phase; random when `None`
    pub initial_phase: Option<f64>,
    /// Use a stored reconnect token instead of signing a fresh auth token
    pub prefer_reconnect: bool,
    /// Rejoin with a freshly signed token when the rail demands it
    pub auto_reauth: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent_name: String::new(),
            topics: Vec::new(),
            attractor: None,
            natural_frequency: 1.0,
            initial_phase: None,
            prefer_reconnect: true,
            auto_reauth: true,
        }
    }
}
