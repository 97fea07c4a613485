use std::{default::Default, time::Duration};

use crate::{
    admission::AdmissionConfig,
    auth::AuthConfig,
    defense::{RateLimitConfig, SecurityMonitorConfig},
    routing::RouterConfig,
    sync::SyncConfig,
};

/// Contains Config properties which will be used by the Rail Server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Phase synchronization and the tick cadence
    pub sync: SyncConfig,
    /// Energy weights and annealing for topic routing
    pub router: RouterConfig,
    /// Absorption progression thresholds
    pub admission: AdmissionConfig,
    /// Auth token freshness and reconnect token lifetime
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityMonitorConfig,
    /// How often stale agents are swept
    pub stale_sweep_interval: Duration,
    /// Per-batch time budget for plugin delivery
    pub plugin_budget: Duration,
    /// Factor applied to every session's load on each tick
    pub load_decay: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            router: RouterConfig::default(),
            admission: AdmissionConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityMonitorConfig::default(),
            stale_sweep_interval: Duration::from_secs(5),
            plugin_budget: Duration::from_millis(250),
            load_decay: 0.5,
        }
    }
}
