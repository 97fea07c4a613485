use std::{collections::HashMap, f64::consts::TAU, mem, time::Duration};

use log::{debug, info, warn};

use rail_shared::{
    decode, encode, generate_secret, AdmissionStage, AgentId, ClientEvent, Credential,
    DropReason, JoinRequest, RailMessage, Recipient, RejectReason, ServerEvent, Timestamp,
};

use crate::{
    admission::{AbsorptionStats, AdmissionBridge, AdmissionError, AdversarialSignals, StageChange},
    auth::{AuthError, AuthProtocol},
    defense::{
        DefaultEscalationPolicy, EscalationAction, EscalationPolicy, EventClass, RateLimiter,
        SecurityEvent, SecurityEventType, SecurityMonitor, SecurityStats,
    },
    events::{DisconnectReason, RailEvents},
    plugins::{PluginBatch, PluginError, PluginHub, PluginNotification, PluginSink},
    routing::{EnergyRouter, RoutingCandidate, RoutingError},
    session::{Session, SessionKey, SessionState},
    sync::{GlobalSyncEngine, PhaseReportOutcome},
    time_manager::{TimeManager, Timer},
    trace_store::{Trace, TraceQuery, TraceStore},
    transport::{PacketReceiver, PacketSender, Socket, TransportEvent},
    vault::{MemoryVault, Vault},
    RailServerError, ServerConfig,
};

/// Vault key prefix under which agent secrets are kept
pub const VAULT_SECRET_PREFIX: &str = "rail/secret/";

fn vault_key(agent_id: &str) -> String {
    format!("{}{}", VAULT_SECRET_PREFIX, agent_id)
}

/// The rail: authenticates agents, admits them into trust, keeps their phases
/// synchronized and routes their messages. All state is owned here and
/// mutated only from [`RailServer::receive`] and the operator methods.
pub struct RailServer {
    config: ServerConfig,
    // Transport
    io: Option<(Box<dyn PacketSender>, Box<dyn PacketReceiver>)>,
    // Core
    sync: GlobalSyncEngine,
    router: EnergyRouter,
    bridge: AdmissionBridge,
    auth: AuthProtocol,
    // Defenses
    rate_limiter: RateLimiter,
    monitor: SecurityMonitor,
    escalation: Box<dyn EscalationPolicy>,
    // Sessions
    sessions: HashMap<SessionKey, Session>,
    agent_sessions: HashMap<AgentId, SessionKey>,
    // Collaborators
    plugins: PluginHub,
    vault: Box<dyn Vault>,
    trace_store: Option<Box<dyn TraceStore>>,
    // Timers
    time_manager: TimeManager,
    // Events
    incoming_events: RailEvents,
}

impl RailServer {
    /// Create a new RailServer. Fails only if the periodic timers cannot be
    /// scheduled.
    pub fn new(config: ServerConfig) -> Result<Self, RailServerError> {
        let tick_interval =
            config
                .sync
                .tick_interval()
                .ok_or_else(|| RailServerError::SchedulerInit {
                    reason: format!(
                        "broadcast rate must be positive and finite, got {}",
                        config.sync.broadcast_hz
                    ),
                })?;
        let time_manager = TimeManager::new(tick_interval, config.stale_sweep_interval)?;

        Ok(Self {
            sync: GlobalSyncEngine::new(config.sync.clone()),
            router: EnergyRouter::new(config.router.clone()),
            bridge: AdmissionBridge::new(config.admission.clone()),
            auth: AuthProtocol::new(config.auth.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            monitor: SecurityMonitor::new(config.security.clone()),
            escalation: Box::new(DefaultEscalationPolicy),
            io: None,
            sessions: HashMap::new(),
            agent_sessions: HashMap::new(),
            plugins: PluginHub::new(config.plugin_budget),
            vault: Box::new(MemoryVault::new()),
            trace_store: None,
            time_manager,
            incoming_events: RailEvents::new(),
            config,
        })
    }

    /// Listen through the given socket
    pub fn listen<S: Into<Box<dyn Socket>>>(&mut self, socket: S) {
        let boxed_socket: Box<dyn Socket> = socket.into();
        self.io = Some(boxed_socket.listen());
    }

    /// Returns whether or not the Server has a socket to listen on
    pub fn is_listening(&self) -> bool {
        self.io.is_some()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn set_vault(&mut self, vault: Box<dyn Vault>) {
        self.vault = vault;
    }

    pub fn set_trace_store(&mut self, trace_store: Box<dyn TraceStore>) {
        self.trace_store = Some(trace_store);
    }

    pub fn set_escalation_policy(&mut self, policy: Box<dyn EscalationPolicy>) {
        self.escalation = policy;
    }

    pub fn add_plugin(&mut self, sink: Box<dyn PluginSink>) {
        self.plugins.add_sink(sink);
    }

    /// Must be called regularly: drains the socket, runs whatever periodic
    /// work is due and reacts to security alerts
    pub fn receive(&mut self) -> RailEvents {
        self.receive_at(Timestamp::now_millis())
    }

    pub fn receive_at(&mut self, now: u64) -> RailEvents {
        self.maintain_socket(now);

        for timer in self.time_manager.poll(now) {
            match timer {
                Timer::SyncTick => self.sync_tick(),
                Timer::StaleSweep => self.sweep_stale(now),
            }
        }

        self.process_security();

        // return all received events and reset the buffer
        mem::replace(&mut self.incoming_events, RailEvents::new())
    }

    // Registration

    /// Generates and registers a secret for the agent, keeping a copy in the
    /// vault. Returns the secret to hand to the agent.
    pub fn register_agent(&mut self, agent_id: &AgentId) -> Result<String, RailServerError> {
        let secret = generate_secret().map_err(AuthError::from)?;
        self.register_agent_with_secret(agent_id, &secret);
        Ok(secret)
    }

    pub fn register_agent_with_secret(&mut self, agent_id: &AgentId, secret: &str) {
        self.auth.register_agent(agent_id, secret);
        if let Err(e) = self.vault.store(&vault_key(agent_id.as_str()), secret) {
            warn!("vault: could not persist secret for {}: {}", agent_id, e);
        }
    }

    pub fn unregister_agent(&mut self, agent_id: &str) -> bool {
        if let Err(e) = self.vault.delete(&vault_key(agent_id)) {
            warn!("vault: could not delete secret for {}: {}", agent_id, e);
        }
        self.auth.unregister_agent(agent_id)
    }

    /// Registers every secret found in the vault. Returns how many were
    /// restored.
    pub fn restore_registrations(&mut self) -> Result<usize, RailServerError> {
        let keys = self.vault.list(VAULT_SECRET_PREFIX)?;
        let mut restored = 0;
        for key in keys {
            let Some(agent_id) = key.strip_prefix(VAULT_SECRET_PREFIX) else {
                continue;
            };
            match self.vault.retrieve(&key) {
                Ok(Some(secret)) => {
                    self.auth.register_agent(&AgentId::from(agent_id), &secret);
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("vault: could not read {}: {}", key, e),
            }
        }
        info!("restored {} agent registrations from the vault", restored);
        Ok(restored)
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.auth.is_registered(agent_id)
    }

    // Operators

    /// Invites an assessed candidate; if it is connected, it is told so and
    /// completes the transition on its next join
    pub fn invite_candidate(&mut self, agent_id: &str) -> Result<(), RailServerError> {
        self.bridge.invite_candidate(agent_id)?;
        if let Some(key) = self.agent_sessions.get(agent_id).copied() {
            self.send(key, &ServerEvent::Invited);
        }
        Ok(())
    }

    /// Drops the candidate back to `Observed`, revoking its capability token
    pub fn release_candidate(&mut self, agent_id: &str) -> Result<(), RailServerError> {
        self.bridge.release(agent_id)?;
        self.demote_session(agent_id);
        Ok(())
    }

    pub fn admission_stats(&self) -> AbsorptionStats {
        self.bridge.get_stats()
    }

    pub fn agent_stage(&self, agent_id: &str) -> Option<AdmissionStage> {
        self.bridge.stage(agent_id)
    }

    pub fn capability_token(&self, agent_id: &str) -> Option<&str> {
        self.bridge.capability_token(agent_id)
    }

    /// Pulls every phase toward the mean; returns the resulting coherence
    pub fn force_synchronize(&mut self, strength: f64) -> f64 {
        self.sync.force_synchronize(strength)
    }

    pub fn coherence(&self) -> f64 {
        self.sync.coherence()
    }

    pub fn coupling(&self) -> f64 {
        self.sync.coupling()
    }

    pub fn sync(&self) -> &GlobalSyncEngine {
        &self.sync
    }

    pub fn router_temperature(&self) -> f32 {
        self.router.temperature()
    }

    /// Trace search for plugin queries. Store failures are logged and yield
    /// no results.
    pub fn search_traces(&self, query: &TraceQuery) -> Vec<Trace> {
        let Some(store) = self.trace_store.as_ref() else {
            return Vec::new();
        };
        store.search_traces(query).unwrap_or_else(|e| {
            warn!("trace store: search failed: {}", e);
            Vec::new()
        })
    }

    /// Delivers queued plugin notifications on the calling thread
    pub fn flush_plugins(&mut self) -> Vec<PluginError> {
        self.plugins.flush()
    }

    /// Takes queued plugin notifications for delivery elsewhere
    pub fn take_plugin_batch(&mut self) -> PluginBatch {
        self.plugins.take_batch()
    }

    pub fn plugin_budget(&self) -> Duration {
        self.plugins.budget()
    }

    pub fn security_stats(&self, window: Duration) -> SecurityStats {
        self.monitor.get_stats(window)
    }

    pub fn security_stats_at(&self, window: Duration, now: u64) -> SecurityStats {
        self.monitor.get_stats_at(window, now)
    }

    pub fn security_events_for(&self, client_id: &str, limit: usize) -> Vec<&SecurityEvent> {
        self.monitor.get_events_for_client(client_id, limit)
    }

    // Sessions

    pub fn session(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn session_for_agent(&self, agent_id: &str) -> Option<&Session> {
        self.agent_sessions
            .get(agent_id)
            .and_then(|key| self.sessions.get(key))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Closes an agent's session from the operator side
    pub fn disconnect_agent(&mut self, agent_id: &str) -> bool {
        match self.agent_sessions.get(agent_id).copied() {
            Some(key) => {
                self.close_session(key, DisconnectReason::Escalated);
                true
            }
            None => false,
        }
    }

    // Private methods

    fn maintain_socket(&mut self, now: u64) {
        loop {
            let received = match self.io.as_mut() {
                Some((_, receiver)) => receiver.receive(),
                None => return,
            };
            match received {
                Ok(Some(TransportEvent::Connected(key))) => {
                    debug!("connection {} opened", key);
                    self.sessions.insert(key, Session::new(key, now));
                }
                Ok(Some(TransportEvent::Data(key, frame))) => {
                    self.handle_frame(key, &frame, now);
                }
                Ok(Some(TransportEvent::Disconnected(key))) => {
                    self.close_session(key, DisconnectReason::Closed);
                }
                Ok(None) => {
                    // No more events, break loop
                    break;
                }
                Err(_) => {
                    self.incoming_events.push_error(RailServerError::Recv);
                    break;
                }
            }
        }
    }

    fn handle_frame(&mut self, key: SessionKey, frame: &[u8], now: u64) {
        self.sessions
            .entry(key)
            .or_insert_with(|| Session::new(key, now));

        let event: ClientEvent = match decode(frame) {
            Ok(event) => event,
            Err(source) => {
                warn!("malformed frame from {}: {}", key, source);
                let client_id = self.client_id(key);
                self.monitor.record_at(
                    SecurityEventType::MalformedFrame,
                    &client_id,
                    Some(source.to_string()),
                    now,
                );
                self.incoming_events.push_error(RailServerError::Codec {
                    connection: key,
                    source,
                });
                return;
            }
        };

        match event {
            ClientEvent::Join(request) => self.handle_join(key, request, now),
            ClientEvent::Message(message) => self.handle_message(key, message, now),
            ClientEvent::Broadcast(message) => self.handle_broadcast(key, message, now),
            ClientEvent::PhaseReport { phase, timestamp } => {
                self.handle_phase_report(key, phase, timestamp, now)
            }
            ClientEvent::Leave => {
                info!("{} left", self.client_id(key));
                self.close_session(key, DisconnectReason::Left);
            }
        }
    }

    fn handle_join(&mut self, key: SessionKey, request: JoinRequest, now: u64) {
        let agent_id = request.agent_id.clone();

        // A joined session may only re-join as itself
        if let Some(current) = self.sessions.get(&key).and_then(|s| s.agent_id.clone()) {
            if current != agent_id {
                warn!("{} tried to re-join as {}", current, agent_id);
                self.monitor.record_at(
                    SecurityEventType::Impersonation,
                    current.as_str(),
                    Some(format!("claimed {}", agent_id)),
                    now,
                );
                self.reject(key, RejectReason::AuthFailed);
                return;
            }
        }

        // Credential
        match &request.credential {
            Credential::Token { token } => {
                let validated = if token.agent_id != agent_id {
                    Err(AuthError::BadSignature {
                        agent_id: token.agent_id.clone(),
                    })
                } else {
                    self.auth.validate_auth_token_at(token, now)
                };
                if let Err(e) = validated {
                    warn!("join from {} refused: {}", agent_id, e);
                    self.monitor.record_at(
                        SecurityEventType::AuthFailure,
                        agent_id.as_str(),
                        Some(e.to_string()),
                        now,
                    );
                    self.reject(key, RejectReason::AuthFailed);
                    return;
                }
            }
            Credential::Reconnect { token } => {
                if !self
                    .auth
                    .check_reconnect_token_at(agent_id.as_str(), token, now)
                {
                    warn!("join from {} refused: invalid reconnect token", agent_id);
                    self.monitor.record_at(
                        SecurityEventType::InvalidReconnect,
                        agent_id.as_str(),
                        None,
                        now,
                    );
                    self.reject(key, RejectReason::AuthFailed);
                    return;
                }
            }
        }

        // Join rate, keyed by agent so reconnecting does not reset it
        if !self
            .rate_limiter
            .check_at(EventClass::Join, agent_id.as_str(), now)
        {
            self.reject(key, RejectReason::RateLimited);
            return;
        }
        if let Credential::Reconnect { .. } = &request.credential {
            self.auth.consume_reconnect_token(agent_id.as_str());
        }

        // Only one live session per agent
        if let Some(previous) = self.agent_sessions.get(&agent_id).copied() {
            if previous != key {
                info!("{} superseded by a join on {}", previous, key);
                self.send(
                    previous,
                    &ServerEvent::Rejected {
                        reason: RejectReason::Superseded,
                    },
                );
                self.close_session(previous, DisconnectReason::Superseded);
            }
        }

        let decision = match self.bridge.handle_join_at(&agent_id, &request.agent_name, now) {
            Ok(decision) if decision.accepted => decision,
            Ok(_) => {
                self.reject(key, RejectReason::Adversarial);
                return;
            }
            Err(e) => {
                self.incoming_events.push_error(e.into());
                self.reject(key, RejectReason::AuthFailed);
                return;
            }
        };

        let phase = request.phase.unwrap_or_else(|| fastrand::f64() * TAU);
        self.sync
            .add_agent_at(&agent_id, request.natural_frequency, phase, now);

        let reconnect_token = match self.auth.issue_reconnect_token_at(&agent_id, now) {
            Ok(token) => token,
            Err(e) => {
                warn!("no reconnect token for {}: {}", agent_id, e);
                self.incoming_events.push_error(e.into());
                None
            }
        };

        if let Some(session) = self.sessions.get_mut(&key) {
            session.state = SessionState::for_stage(decision.stage);
            session.agent_id = Some(agent_id.clone());
            session.agent_name = request.agent_name;
            session.topics = request.topics;
            session.attractor = request.attractor;
        }
        self.agent_sessions.insert(agent_id.clone(), key);

        info!("{} joined on {} at stage {}", agent_id, key, decision.stage);
        self.send(
            key,
            &ServerEvent::Accepted {
                stage: decision.stage,
                capability_token: decision.capability_token,
                reconnect_token,
            },
        );
        self.incoming_events
            .push_connection(key, &agent_id, decision.stage);
    }

    fn handle_message(&mut self, key: SessionKey, message: RailMessage, now: u64) {
        let Some(agent_id) = self.check_sender(key, &message, now) else {
            return;
        };

        if !self
            .rate_limiter
            .check_at(EventClass::Message, &key.to_string(), now)
        {
            self.drop_message(key, &message, DropReason::RateLimited);
            return;
        }

        if let Err(e) = self.record_interaction(key, &agent_id, message.embedding(), now) {
            self.drop_message(key, &message, DropReason::InvalidEmbedding);
            self.incoming_events.push_error(e.into());
            return;
        }

        self.record_trace(&agent_id, &message);
        self.plugins
            .push(PluginNotification::Trace(message.clone()));

        match message.to.clone() {
            Some(Recipient::Agent(target)) => self.deliver(key, &target, message),
            Some(Recipient::Topic(topic)) => self.route_topic(key, &agent_id, &topic, message),
            None => self.incoming_events.push_message(&agent_id, message),
        }
    }

    fn handle_broadcast(&mut self, key: SessionKey, message: RailMessage, now: u64) {
        let Some(agent_id) = self.check_sender(key, &message, now) else {
            return;
        };

        if !self
            .rate_limiter
            .check_at(EventClass::Broadcast, &key.to_string(), now)
        {
            self.flag_adversarial(
                &agent_id,
                AdversarialSignals {
                    excessive_broadcast: true,
                    ..Default::default()
                },
                now,
            );
            self.drop_message(key, &message, DropReason::RateLimited);
            return;
        }

        if let Err(e) = self.record_interaction(key, &agent_id, message.embedding(), now) {
            self.drop_message(key, &message, DropReason::InvalidEmbedding);
            self.incoming_events.push_error(e.into());
            return;
        }

        let mut targets: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(target, session)| **target != key && session.is_active())
            .map(|(target, _)| *target)
            .collect();
        targets.sort();
        debug!("broadcast {} from {} to {} agents", message.id, agent_id, targets.len());

        let event = ServerEvent::Broadcast(message.clone());
        for target in targets {
            self.send(target, &event);
        }

        self.plugins
            .push(PluginNotification::Broadcast(message.clone()));
        self.incoming_events.push_broadcast(&agent_id, message);
    }

    fn handle_phase_report(&mut self, key: SessionKey, phase: f64, reported_at: u64, now: u64) {
        let Some(agent_id) = self.joined_agent(key) else {
            debug!("phase report from {} before join, ignored", key);
            return;
        };

        match self
            .sync
            .report_phase_at(agent_id.as_str(), phase, reported_at, now)
        {
            Ok(PhaseReportOutcome::Applied { .. }) => {}
            Ok(PhaseReportOutcome::Flooded { trust_score }) => {
                self.monitor.record_at(
                    SecurityEventType::FloodDetected,
                    agent_id.as_str(),
                    Some(format!("trust {:.2}", trust_score)),
                    now,
                );
                if trust_score <= 0.0 {
                    self.flag_adversarial(
                        &agent_id,
                        AdversarialSignals {
                            rapid_phase_shift: true,
                            ..Default::default()
                        },
                        now,
                    );
                }
            }
            Err(e) => self.incoming_events.push_error(e.into()),
        }
    }

    /// Returns the session's agent if it is joined and `message.from`
    /// matches it. A mismatch is treated as an injection attempt.
    fn check_sender(&mut self, key: SessionKey, message: &RailMessage, now: u64) -> Option<AgentId> {
        let Some(agent_id) = self.joined_agent(key) else {
            self.drop_message(key, message, DropReason::NotJoined);
            return None;
        };

        if message.from != agent_id {
            warn!("{} sent a message claiming to be {}", agent_id, message.from);
            self.monitor.record_at(
                SecurityEventType::Impersonation,
                agent_id.as_str(),
                Some(format!("claimed {}", message.from)),
                now,
            );
            self.reject(key, RejectReason::Adversarial);
            self.flag_adversarial(
                &agent_id,
                AdversarialSignals {
                    injection_attempt: true,
                    ..Default::default()
                },
                now,
            );
            return None;
        }

        Some(agent_id)
    }

    fn record_interaction(
        &mut self,
        key: SessionKey,
        agent_id: &AgentId,
        embedding: Option<&[f32]>,
        now: u64,
    ) -> Result<(), AdmissionError> {
        if let Some(change) = self.bridge.record_interaction_at(agent_id, embedding, now)? {
            self.apply_stage_change(key, change);
        }
        Ok(())
    }

    fn apply_stage_change(&mut self, key: SessionKey, change: StageChange) {
        if let Some(session) = self.sessions.get_mut(&key) {
            session.state = SessionState::for_stage(change.to);
        }
        self.send(
            key,
            &ServerEvent::StageChanged {
                stage: change.to,
                capability_token: change.capability_token.clone(),
            },
        );
        self.incoming_events.push_stage_change(change);
    }

    /// Runs adversarial detection; on removal, records it and demotes any live
    /// session of the agent
    fn flag_adversarial(&mut self, agent_id: &AgentId, signals: AdversarialSignals, now: u64) {
        if !self.bridge.detect_adversarial(agent_id.as_str(), signals) {
            return;
        }
        self.monitor.record_at(
            SecurityEventType::AdversarialDetected,
            agent_id.as_str(),
            Some(format!("{:?}", signals)),
            now,
        );
        self.demote_session(agent_id.as_str());
    }

    /// Tells a live session it is back at `Observed` with no capabilities
    fn demote_session(&mut self, agent_id: &str) {
        let Some(key) = self.agent_sessions.get(agent_id).copied() else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(&key) {
            if session.is_joined() {
                session.state = SessionState::Joined;
            }
        }
        self.send(
            key,
            &ServerEvent::StageChanged {
                stage: AdmissionStage::Observed,
                capability_token: None,
            },
        );
    }

    fn deliver(&mut self, from: SessionKey, target: &AgentId, message: RailMessage) {
        let target_key = self
            .agent_sessions
            .get(target)
            .copied()
            .filter(|key| self.sessions.get(key).map_or(false, Session::is_joined));
        let Some(target_key) = target_key else {
            self.drop_message(from, &message, DropReason::UnknownRecipient);
            return;
        };

        if let Some(session) = self.sessions.get_mut(&target_key) {
            session.load += 1.0;
        }
        self.send(target_key, &ServerEvent::Message(message));
    }

    fn route_topic(&mut self, from: SessionKey, sender: &AgentId, topic: &str, message: RailMessage) {
        let dimension = message.embedding().map(<[f32]>::len);
        let mut candidates: Vec<RoutingCandidate> = self
            .sessions
            .values()
            .filter(|session| {
                session.is_active()
                    && session.agent_id.as_ref() != Some(sender)
                    && session.advertises(topic)
            })
            .filter_map(|session| {
                let agent_id = session.agent_id.clone()?;
                let attractor = session.attractor.clone()?;
                if dimension.map_or(false, |d| d != attractor.len()) {
                    return None;
                }
                let coherence = self.sync.agent_alignment(agent_id.as_str()).unwrap_or(0.0);
                Some(RoutingCandidate {
                    agent_id,
                    current_load: session.load,
                    coherence: coherence as f32,
                    attractor_embedding: attractor,
                })
            })
            .collect();
        candidates.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        match self.router.route(&message, &candidates) {
            Ok(decision) => {
                debug!(
                    "routed {} on '{}' to {} (p = {:.3})",
                    message.id, topic, decision.agent_id, decision.probability
                );
                self.deliver(from, &decision.agent_id, message);
            }
            Err(RoutingError::NoCandidates) => {
                self.drop_message(from, &message, DropReason::NoRoute);
            }
            Err(e) => {
                self.drop_message(from, &message, DropReason::InvalidEmbedding);
                self.incoming_events.push_error(e.into());
            }
        }
    }

    fn sync_tick(&mut self) {
        let tick = self.sync.tick();

        let decay = self.config.load_decay;
        for session in self.sessions.values_mut() {
            session.load *= decay;
        }

        if self.sync.needs_intervention() && self.sync.agent_count() > 1 {
            warn!("coherence {:.3} below intervention threshold", tick.coherence);
        }

        let mut joined: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_joined())
            .map(|(key, _)| *key)
            .collect();
        joined.sort();

        let event = ServerEvent::Coherence {
            coherence: tick.coherence,
            coupling: tick.coupling,
        };
        for key in joined {
            self.send(key, &event);
        }

        self.plugins.push(PluginNotification::Coherence {
            coherence: tick.coherence,
            coupling: tick.coupling,
        });
        self.incoming_events.push_tick(tick);
    }

    fn sweep_stale(&mut self, now: u64) {
        for agent_id in self.sync.prune_stale(now) {
            info!("{} timed out", agent_id);
            match self.agent_sessions.get(&agent_id).copied() {
                Some(key) => {
                    self.send(
                        key,
                        &ServerEvent::Rejected {
                            reason: RejectReason::Stale,
                        },
                    );
                    self.close_session(key, DisconnectReason::Stale);
                }
                None => {
                    self.bridge.remove_agent(agent_id.as_str());
                }
            }
            self.incoming_events.push_stale(agent_id);
        }
    }

    fn process_security(&mut self) {
        for violation in self.rate_limiter.take_violations() {
            self.monitor.record_at(
                SecurityEventType::RateLimitExceeded,
                &violation.client_id,
                Some(violation.class.to_string()),
                violation.at,
            );
        }

        for alert in self.monitor.take_alerts() {
            for action in self.escalation.escalate(&alert) {
                match action {
                    EscalationAction::ForceReauth { client_id } => {
                        if let Some(key) = self.resolve_client(&client_id) {
                            self.force_reauth(key);
                            self.monitor.rearm(&client_id);
                        }
                    }
                    EscalationAction::Disconnect { client_id } => {
                        if let Some(key) = self.resolve_client(&client_id) {
                            self.close_session(key, DisconnectReason::Escalated);
                            self.monitor.rearm(&client_id);
                        }
                    }
                }
            }
            self.incoming_events.push_alert(alert);
        }
    }

    /// Security events name either an agent or a connection
    fn resolve_client(&self, client_id: &str) -> Option<SessionKey> {
        if let Some(key) = self.agent_sessions.get(client_id) {
            return Some(*key);
        }
        self.sessions
            .keys()
            .find(|key| key.to_string() == client_id)
            .copied()
    }

    fn force_reauth(&mut self, key: SessionKey) {
        let Some(session) = self.sessions.get_mut(&key) else {
            return;
        };
        if !session.is_joined() {
            return;
        }
        let agent_id = session.agent_id.clone();
        session.reset();

        if let Some(agent_id) = agent_id {
            self.release_agent_state(key, &agent_id);
            info!("{} must re-authenticate", agent_id);
        }
        self.send(key, &ServerEvent::ReauthRequired);
    }

    fn reject(&mut self, key: SessionKey, reason: RejectReason) {
        self.send(key, &ServerEvent::Rejected { reason });
        self.incoming_events.push_rejection(key, reason);
        self.close_session(key, DisconnectReason::Rejected);
    }

    /// Removes the session and, in the same step, the agent's oscillator,
    /// capability token and the connection's rate windows. Trust history and
    /// any reconnect token survive.
    fn close_session(&mut self, key: SessionKey, reason: DisconnectReason) {
        let Some(session) = self.sessions.remove(&key) else {
            return;
        };
        if let Some(agent_id) = &session.agent_id {
            self.release_agent_state(key, agent_id);
        }
        self.rate_limiter.remove_client(&key.to_string());

        if reason != DisconnectReason::Closed {
            if let Some((sender, _)) = self.io.as_ref() {
                sender.disconnect(key);
            }
        }

        info!("session {} closed ({:?})", key, reason);
        self.incoming_events
            .push_disconnection(key, session.agent_id, reason);
    }

    fn release_agent_state(&mut self, key: SessionKey, agent_id: &AgentId) {
        if self.agent_sessions.get(agent_id) != Some(&key) {
            return;
        }
        self.agent_sessions.remove(agent_id);
        self.sync.remove_agent(agent_id.as_str());
        self.bridge.remove_agent(agent_id.as_str());
    }

    fn joined_agent(&self, key: SessionKey) -> Option<AgentId> {
        self.sessions
            .get(&key)
            .filter(|session| session.is_joined())
            .and_then(|session| session.agent_id.clone())
    }

    fn client_id(&self, key: SessionKey) -> String {
        self.sessions
            .get(&key)
            .map(Session::client_id)
            .unwrap_or_else(|| key.to_string())
    }

    fn drop_message(&mut self, key: SessionKey, message: &RailMessage, reason: DropReason) {
        debug!("dropping {} from {}: {:?}", message.id, key, reason);
        self.send(
            key,
            &ServerEvent::Dropped {
                message_id: message.id.clone(),
                reason,
            },
        );
    }

    fn record_trace(&mut self, agent_id: &AgentId, message: &RailMessage) {
        let Some(store) = self.trace_store.as_mut() else {
            return;
        };
        let trace = Trace {
            message_id: message.id.clone(),
            agent_id: agent_id.clone(),
            content: message.payload.content().into_owned(),
            timestamp: message.timestamp,
            embedding: message.embedding().map(<[f32]>::to_vec),
        };
        if let Err(e) = store.record(trace) {
            warn!("trace store: could not record {}: {}", message.id, e);
        }
    }

    fn send(&mut self, key: SessionKey, event: &ServerEvent) {
        let Some((sender, _)) = self.io.as_ref() else {
            warn!("Server Error: not listening, cannot send to {}", key);
            return;
        };
        match encode(event) {
            Ok(frame) => {
                if sender.send(key, &frame).is_err() {
                    warn!("Server Error: cannot send to {}", key);
                    self.incoming_events
                        .push_error(RailServerError::Send { connection: key });
                }
            }
            Err(source) => {
                self.incoming_events.push_error(RailServerError::Codec {
                    connection: key,
                    source,
                });
            }
        }
    }
}
