use std::collections::{HashMap, VecDeque};

use log::{debug, info, warn};

use rail_shared::{wrap_phase, AgentId, Oscillator, OscillatorEngine, Timestamp};

use crate::sync::{SyncConfig, SyncError};

/// Network bookkeeping kept alongside each oscillator
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkOscillatorMeta {
    pub id: AgentId,
    /// Local receive time of the last accepted report, ms since epoch
    pub last_reported_at: u64,
    /// Receive time minus the agent's own report timestamp, in ms
    pub observed_latency: u64,
    /// In [0, 1]
    pub trust_score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PhaseReportOutcome {
    Applied { latency_ms: u64 },
    /// Report suppressed as part of a flood; carries the penalized trust
    Flooded { trust_score: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CouplingAdjustment {
    Raised,
    Lowered,
    Held,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncTick {
    pub coherence: f64,
    pub coupling: f64,
    pub adjustment: CouplingAdjustment,
    pub phases: HashMap<String, f64>,
}

/// Wraps an [`OscillatorEngine`] with per-agent network semantics: report
/// latency, trust, flood detection, adaptive coupling and stale pruning.
pub struct GlobalSyncEngine {
    config: SyncConfig,
    engine: OscillatorEngine,
    metas: HashMap<AgentId, NetworkOscillatorMeta>,
    report_windows: HashMap<AgentId, VecDeque<u64>>,
    last_coherence: f64,
}

impl GlobalSyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        let engine = OscillatorEngine::new(config.initial_coupling, config.intervention_threshold);
        Self {
            config,
            engine,
            metas: HashMap::new(),
            report_windows: HashMap::new(),
            last_coherence: 0.0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // Membership

    /// Adds an agent's oscillator. Returns false if it is already present.
    pub fn add_agent(&mut self, agent_id: &AgentId, natural_frequency: Option<f64>, phase: f64) -> bool {
        self.add_agent_at(agent_id, natural_frequency, phase, Timestamp::now_millis())
    }

    pub fn add_agent_at(
        &mut self,
        agent_id: &AgentId,
        natural_frequency: Option<f64>,
        phase: f64,
        now: u64,
    ) -> bool {
        if self.metas.contains_key(agent_id) {
            return false;
        }
        let frequency = natural_frequency.unwrap_or(self.config.default_natural_frequency);
        self.engine
            .insert(Oscillator::new(agent_id.as_str(), phase, frequency));
        self.metas.insert(
            agent_id.clone(),
            NetworkOscillatorMeta {
                id: agent_id.clone(),
                last_reported_at: now,
                observed_latency: 0,
                trust_score: self.config.initial_trust,
            },
        );
        debug!("sync: added agent {} (ω = {})", agent_id, frequency);
        true
    }

    pub fn remove_agent(&mut self, agent_id: &str) -> bool {
        self.report_windows.remove(agent_id);
        let had_oscillator = self.engine.remove(agent_id).is_some();
        let had_meta = self.metas.remove(agent_id).is_some();
        had_oscillator || had_meta
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.metas.contains_key(agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.metas.len()
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.metas.keys()
    }

    // Reports

    pub fn report_phase(
        &mut self,
        agent_id: &str,
        phase: f64,
        reported_at: u64,
    ) -> Result<PhaseReportOutcome, SyncError> {
        self.report_phase_at(agent_id, phase, reported_at, Timestamp::now_millis())
    }

    /// Accepts an externally reported phase. Reports are ground truth from
    /// the remote side and overwrite the phase directly, unless they are part
    /// of a flood, in which case nothing is written.
    pub fn report_phase_at(
        &mut self,
        agent_id: &str,
        phase: f64,
        reported_at: u64,
        now: u64,
    ) -> Result<PhaseReportOutcome, SyncError> {
        if !self.metas.contains_key(agent_id) {
            return Err(SyncError::UnknownAgent {
                agent_id: AgentId::new(agent_id),
            });
        }

        if self.detect_flood_attack(agent_id, now) {
            let trust_score = self.trust_score(agent_id).unwrap_or(0.0);
            return Ok(PhaseReportOutcome::Flooded { trust_score });
        }

        self.engine.set_phase(agent_id, wrap_phase(phase));
        let latency_ms = now.saturating_sub(reported_at);
        if let Some(meta) = self.metas.get_mut(agent_id) {
            meta.last_reported_at = now;
            meta.observed_latency = latency_ms;
        }
        Ok(PhaseReportOutcome::Applied { latency_ms })
    }

    /// Records a report at `now` in the agent's sliding window. Returns true
    /// when the window holds more reports than allowed, penalizing trust.
    pub fn detect_flood_attack(&mut self, agent_id: &str, now: u64) -> bool {
        let window_ms = self.config.flood_window.as_millis() as u64;
        let window = self
            .report_windows
            .entry(AgentId::new(agent_id))
            .or_insert_with(VecDeque::new);

        while window
            .front()
            .map_or(false, |&t| now.saturating_sub(t) >= window_ms)
        {
            window.pop_front();
        }
        window.push_back(now);

        if window.len() <= self.config.flood_limit {
            return false;
        }

        if let Some(meta) = self.metas.get_mut(agent_id) {
            meta.trust_score = (meta.trust_score - self.config.flood_penalty).max(0.0);
            warn!(
                "sync: flood from {} ({} reports in window), trust now {:.2}",
                agent_id,
                window.len(),
                meta.trust_score
            );
        }
        true
    }

    // Ticking

    /// Advances all oscillators one step, then nudges the coupling: up when
    /// coherence is too low, down when the group is over-synchronized.
    pub fn tick(&mut self) -> SyncTick {
        let engine_tick = self.engine.tick(self.config.dt());
        let coherence = engine_tick.coherence;
        let coupling = self.engine.coupling();

        let adjustment = if coherence < self.config.coherence_threshold {
            self.engine
                .set_coupling((coupling + self.config.coupling_step).min(self.config.max_coupling));
            CouplingAdjustment::Raised
        } else if coherence > self.config.groupthink_threshold {
            self.engine
                .set_coupling((coupling - self.config.coupling_step).max(self.config.min_coupling));
            CouplingAdjustment::Lowered
        } else {
            CouplingAdjustment::Held
        };

        self.last_coherence = coherence;
        debug!(
            "sync: tick r = {:.3}, K = {:.2} ({:?})",
            coherence,
            self.engine.coupling(),
            adjustment
        );

        SyncTick {
            coherence,
            coupling: self.engine.coupling(),
            adjustment,
            phases: engine_tick.phases,
        }
    }

    /// Removes every agent whose last accepted report is older than the
    /// stale TTL. Returns the removed ids.
    pub fn prune_stale(&mut self, now: u64) -> Vec<AgentId> {
        let ttl_ms = self.config.stale_ttl.as_millis() as u64;
        let stale: Vec<AgentId> = self
            .metas
            .values()
            .filter(|meta| now.saturating_sub(meta.last_reported_at) > ttl_ms)
            .map(|meta| meta.id.clone())
            .collect();

        for agent_id in &stale {
            self.remove_agent(agent_id.as_str());
            info!("sync: pruned stale agent {}", agent_id);
        }
        stale
    }

    // Queries

    pub fn coherence(&self) -> f64 {
        self.engine.coherence()
    }

    /// Coherence measured at the most recent tick
    pub fn last_coherence(&self) -> f64 {
        self.last_coherence
    }

    pub fn coupling(&self) -> f64 {
        self.engine.coupling()
    }

    pub fn needs_intervention(&self) -> bool {
        self.engine.needs_intervention()
    }

    pub fn force_synchronize(&mut self, strength: f64) -> f64 {
        let coherence = self.engine.force_synchronize(strength);
        info!("sync: forced synchronization, r = {:.3}", coherence);
        coherence
    }

    pub fn meta(&self, agent_id: &str) -> Option<&NetworkOscillatorMeta> {
        self.metas.get(agent_id)
    }

    pub fn phase(&self, agent_id: &str) -> Option<f64> {
        self.engine.get(agent_id).map(|o| o.phase)
    }

    pub fn trust_score(&self, agent_id: &str) -> Option<f64> {
        self.metas.get(agent_id).map(|m| m.trust_score)
    }

    /// How well this agent's phase matches the population mean, in [0, 1]
    pub fn agent_alignment(&self, agent_id: &str) -> Option<f64> {
        self.engine.alignment(agent_id)
    }
}
