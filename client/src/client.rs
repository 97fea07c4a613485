use std::{f64::consts::TAU, mem};

use log::{debug, info, warn};

use rail_shared::{
    decode, encode, AdmissionStage, AgentId, AuthToken, ClientEvent, Credential, Embedding,
    JoinRequest, MessageKind, Oscillator, Payload, RailMessage, Recipient, RejectReason,
    ServerEvent, Timestamp,
};

use crate::{
    transport::{PacketReceiver, PacketSender, Socket},
    ClientConfig, ClientError, ClientEvents,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No open connection
    Disconnected,
    /// Connected but not (or no longer) joined
    Connected,
    /// Join sent, waiting for the verdict
    Joining,
    Joined,
}

/// An agent's connection to the rail
pub struct Client {
    config: ClientConfig,
    agent_id: AgentId,
    secret: String,
    oscillator: Oscillator,
    io: Option<(Box<dyn PacketSender>, Box<dyn PacketReceiver>)>,
    state: ClientState,
    stage: Option<AdmissionStage>,
    capability_token: Option<String>,
    reconnect_token: Option<String>,
    // Token presented by the join in flight, restored if the join is only
    // rate limited
    pending_reconnect: Option<String>,
    last_coherence: Option<(f64, f64)>,
    next_message_seq: u64,
    incoming_events: ClientEvents,
}

impl Client {
    /// Create a new client for the given agent and its shared secret
    pub fn new(config: ClientConfig, agent_id: AgentId, secret: impl Into<String>) -> Self {
        let phase = config
            .initial_phase
            .unwrap_or_else(|| fastrand::f64() * TAU);
        let oscillator = Oscillator::new(agent_id.as_str(), phase, config.natural_frequency);

        Self {
            config,
            agent_id,
            secret: secret.into(),
            oscillator,
            io: None,
            state: ClientState::Disconnected,
            stage: None,
            capability_token: None,
            reconnect_token: None,
            pending_reconnect: None,
            last_coherence: None,
            next_message_seq: 1,
            incoming_events: ClientEvents::new(),
        }
    }

    /// Connect to the rail through the given socket. Does not join.
    pub fn connect<S: Into<Box<dyn Socket>>>(&mut self, socket: S) {
        let boxed_socket: Box<dyn Socket> = socket.into();
        self.io = Some(boxed_socket.connect());
        self.state = ClientState::Connected;
    }

    pub fn is_connected(&self) -> bool {
        match self.io.as_ref() {
            Some((sender, _)) => sender.connected(),
            None => false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == ClientState::Joined
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn stage(&self) -> Option<AdmissionStage> {
        self.stage
    }

    pub fn capability_token(&self) -> Option<&str> {
        self.capability_token.as_deref()
    }

    pub fn has_reconnect_token(&self) -> bool {
        self.reconnect_token.is_some()
    }

    pub fn reconnect_token(&self) -> Option<&str> {
        self.reconnect_token.as_deref()
    }

    /// `(coherence, coupling)` from the last tick received
    pub fn last_coherence(&self) -> Option<(f64, f64)> {
        self.last_coherence
    }

    pub fn phase(&self) -> f64 {
        self.oscillator.phase
    }

    /// Advance the local oscillator by `dt` seconds
    pub fn advance(&mut self, dt: f64) {
        self.oscillator.advance(dt);
    }

    // Join

    pub fn join(&mut self) -> Result<(), ClientError> {
        self.join_at(Timestamp::now_millis())
    }

    /// Sends a join, using the stored reconnect token when allowed and
    /// available and otherwise a token signed at `now`
    pub fn join_at(&mut self, now: u64) -> Result<(), ClientError> {
        let request = self.join_request_at(now);
        self.send_event(&ClientEvent::Join(request))?;
        self.state = ClientState::Joining;
        Ok(())
    }

    /// Builds the join request. A reconnect token is single-use, so taking
    /// it here spends it unless the rail refuses the join for its rate.
    pub fn join_request_at(&mut self, now: u64) -> JoinRequest {
        let reconnect = if self.config.prefer_reconnect {
            self.reconnect_token.take()
        } else {
            None
        };
        self.pending_reconnect = reconnect.clone();
        let credential = match reconnect {
            Some(token) => Credential::Reconnect { token },
            None => Credential::Token {
                token: AuthToken::sign(&self.agent_id, &self.secret, now),
            },
        };
        let agent_name = if self.config.agent_name.is_empty() {
            self.agent_id.to_string()
        } else {
            self.config.agent_name.clone()
        };

        JoinRequest {
            agent_id: self.agent_id.clone(),
            agent_name,
            credential,
            topics: self.config.topics.clone(),
            attractor: self.config.attractor.clone(),
            natural_frequency: Some(self.oscillator.natural_frequency),
            phase: Some(self.oscillator.phase),
        }
    }

    pub fn leave(&mut self) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::Leave)?;
        self.state = ClientState::Connected;
        self.stage = None;
        self.capability_token = None;
        Ok(())
    }

    // Messages

    /// A new message from this agent with a fresh id
    pub fn new_message(&mut self, kind: MessageKind, payload: Payload) -> RailMessage {
        let id = format!("{}-{}", self.agent_id, self.next_message_seq);
        self.next_message_seq += 1;
        RailMessage::new(id, kind, self.agent_id.clone(), payload, Timestamp::now_millis())
    }

    /// Sends a message to one agent, to the best agent for a topic, or (with
    /// no recipient) to the application hosting the rail. Returns the id.
    pub fn send_message(
        &mut self,
        kind: MessageKind,
        to: Option<Recipient>,
        payload: Payload,
        embedding: Option<Embedding>,
    ) -> Result<String, ClientError> {
        let mut message = self.new_message(kind, payload);
        message.to = to;
        message.embedding = embedding;
        self.send(message)
    }

    pub fn send(&mut self, message: RailMessage) -> Result<String, ClientError> {
        self.require_joined()?;
        let id = message.id.clone();
        self.send_event(&ClientEvent::Message(message))?;
        Ok(id)
    }

    pub fn broadcast(&mut self, message: RailMessage) -> Result<String, ClientError> {
        self.require_joined()?;
        let id = message.id.clone();
        self.send_event(&ClientEvent::Broadcast(message))?;
        Ok(id)
    }

    pub fn report_phase(&mut self) -> Result<(), ClientError> {
        self.report_phase_at(Timestamp::now_millis())
    }

    pub fn report_phase_at(&mut self, now: u64) -> Result<(), ClientError> {
        self.require_joined()?;
        self.send_event(&ClientEvent::PhaseReport {
            phase: self.oscillator.phase,
            timestamp: now,
        })
    }

    // Receive

    /// Must be called regularly: reads every pending frame from the rail
    pub fn receive(&mut self) -> ClientEvents {
        loop {
            let received = match self.io.as_mut() {
                Some((_, receiver)) => receiver.receive(),
                None => break,
            };
            match received {
                Ok(Some(frame)) => match decode::<ServerEvent>(&frame) {
                    Ok(event) => self.handle_server_event(event),
                    Err(e) => {
                        warn!("Client Error: undecodable frame from the rail: {}", e);
                        self.incoming_events.push_error(e.into());
                    }
                },
                Ok(None) => break,
                Err(_) => {
                    self.on_disconnect();
                    break;
                }
            }
        }

        // return all received events and reset the buffer
        mem::replace(&mut self.incoming_events, ClientEvents::new())
    }

    // Private methods

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Accepted {
                stage,
                capability_token,
                reconnect_token,
            } => {
                info!("{} joined the rail at stage {}", self.agent_id, stage);
                self.state = ClientState::Joined;
                self.stage = Some(stage);
                self.capability_token = capability_token;
                self.pending_reconnect = None;
                if reconnect_token.is_some() {
                    self.reconnect_token = reconnect_token;
                }
                self.incoming_events.push_accepted(stage);
            }
            ServerEvent::Rejected { reason } => {
                warn!("{} rejected by the rail: {:?}", self.agent_id, reason);
                match reason {
                    RejectReason::AuthFailed => {
                        self.reconnect_token = None;
                        self.pending_reconnect = None;
                    }
                    RejectReason::RateLimited => {
                        if let Some(token) = self.pending_reconnect.take() {
                            self.reconnect_token.get_or_insert(token);
                        }
                    }
                    _ => self.pending_reconnect = None,
                }
                self.state = ClientState::Connected;
                self.stage = None;
                self.capability_token = None;
                self.incoming_events.push_rejected(reason);
            }
            ServerEvent::StageChanged {
                stage,
                capability_token,
            } => {
                debug!("{} moved to stage {}", self.agent_id, stage);
                self.stage = Some(stage);
                self.capability_token = capability_token;
                self.incoming_events.push_stage_change(stage);
            }
            ServerEvent::Invited => self.incoming_events.push_invitation(),
            ServerEvent::Message(message) => self.incoming_events.push_message(message),
            ServerEvent::Broadcast(message) => self.incoming_events.push_broadcast(message),
            ServerEvent::Coherence {
                coherence,
                coupling,
            } => {
                self.last_coherence = Some((coherence, coupling));
                self.incoming_events.push_coherence(coherence, coupling);
            }
            ServerEvent::Dropped { message_id, reason } => {
                debug!("{} dropped by the rail: {:?}", message_id, reason);
                self.incoming_events.push_dropped(message_id, reason);
            }
            ServerEvent::ReauthRequired => {
                info!("{} must re-authenticate", self.agent_id);
                self.state = ClientState::Connected;
                self.stage = None;
                self.capability_token = None;
                self.reconnect_token = None;
                self.pending_reconnect = None;
                self.incoming_events.push_reauth();
                if self.config.auto_reauth {
                    if let Err(e) = self.join() {
                        self.incoming_events.push_error(e);
                    }
                }
            }
        }
    }

    fn on_disconnect(&mut self) {
        if self.state == ClientState::Disconnected {
            return;
        }
        info!("{} disconnected from the rail", self.agent_id);
        self.io = None;
        self.state = ClientState::Disconnected;
        self.stage = None;
        self.capability_token = None;
        self.incoming_events.push_disconnection();
    }

    fn require_joined(&self) -> Result<(), ClientError> {
        match self.state {
            ClientState::Joined => Ok(()),
            ClientState::Disconnected => Err(ClientError::NotConnected),
            _ => Err(ClientError::NotJoined),
        }
    }

    fn send_event(&self, event: &ClientEvent) -> Result<(), ClientError> {
        let (sender, _) = self.io.as_ref().ok_or(ClientError::NotConnected)?;
        let frame = encode(event)?;
        sender.send(&frame).map_err(|_| ClientError::Send)
    }
}
