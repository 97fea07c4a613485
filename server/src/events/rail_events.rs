use std::{mem, vec::IntoIter};

use rail_shared::{AdmissionStage, AgentId, RailMessage, RejectReason};

use crate::{
    admission::StageChange, defense::SecurityAlert, sync::SyncTick, transport::ConnectionId,
    RailServerError,
};

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The agent sent `leave`
    Left,
    /// The transport connection closed
    Closed,
    Stale,
    Superseded,
    /// Escalation policy closed it
    Escalated,
    Rejected,
}

/// Everything that happened during one `receive` cycle
pub struct RailEvents {
    connections: Vec<(ConnectionId, AgentId, AdmissionStage)>,
    disconnections: Vec<(ConnectionId, Option<AgentId>, DisconnectReason)>,
    rejections: Vec<(ConnectionId, RejectReason)>,
    messages: Vec<(AgentId, RailMessage)>,
    broadcasts: Vec<(AgentId, RailMessage)>,
    ticks: Vec<SyncTick>,
    stale: Vec<AgentId>,
    stage_changes: Vec<StageChange>,
    alerts: Vec<SecurityAlert>,
    errors: Vec<RailServerError>,

    empty: bool,
}

impl RailEvents {
    pub(crate) fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            rejections: Vec::new(),
            messages: Vec::new(),
            broadcasts: Vec::new(),
            ticks: Vec::new(),
            stale: Vec::new(),
            stage_changes: Vec::new(),
            alerts: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: RailEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: RailEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_connection(&mut self, key: ConnectionId, agent_id: &AgentId, stage: AdmissionStage) {
        self.connections.push((key, agent_id.clone(), stage));
        self.empty = false;
    }

    pub(crate) fn push_disconnection(
        &mut self,
        key: ConnectionId,
        agent_id: Option<AgentId>,
        reason: DisconnectReason,
    ) {
        self.disconnections.push((key, agent_id, reason));
        self.empty = false;
    }

    pub(crate) fn push_rejection(&mut self, key: ConnectionId, reason: RejectReason) {
        self.rejections.push((key, reason));
        self.empty = false;
    }

    pub(crate) fn push_message(&mut self, from: &AgentId, message: RailMessage) {
        self.messages.push((from.clone(), message));
        self.empty = false;
    }

    pub(crate) fn push_broadcast(&mut self, from: &AgentId, message: RailMessage) {
        self.broadcasts.push((from.clone(), message));
        self.empty = false;
    }

    pub(crate) fn push_tick(&mut self, tick: SyncTick) {
        self.ticks.push(tick);
        self.empty = false;
    }

    pub(crate) fn push_stale(&mut self, agent_id: AgentId) {
        self.stale.push(agent_id);
        self.empty = false;
    }

    pub(crate) fn push_stage_change(&mut self, change: StageChange) {
        self.stage_changes.push(change);
        self.empty = false;
    }

    pub(crate) fn push_alert(&mut self, alert: SecurityAlert) {
        self.alerts.push(alert);
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: RailServerError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait RailEvent {
    type Iter;

    fn iter(events: &mut RailEvents) -> Self::Iter;

    fn has(events: &RailEvents) -> bool;
}

macro_rules! rail_event {
    ($(#[$meta:meta])* $name:ident, $field:ident, $item:ty) => {
        $(#[$meta])*
        pub struct $name;
        impl RailEvent for $name {
            type Iter = IntoIter<$item>;

            fn iter(events: &mut RailEvents) -> Self::Iter {
                IntoIterator::into_iter(mem::take(&mut events.$field))
            }

            fn has(events: &RailEvents) -> bool {
                !events.$field.is_empty()
            }
        }
    };
}

rail_event!(
    /// An agent completed a join
    ConnectEvent, connections, (ConnectionId, AgentId, AdmissionStage)
);
rail_event!(DisconnectEvent, disconnections, (ConnectionId, Option<AgentId>, DisconnectReason));
rail_event!(RejectEvent, rejections, (ConnectionId, RejectReason));
rail_event!(
    /// Messages without a recipient, left to the application
    MessageEvent, messages, (AgentId, RailMessage)
);
rail_event!(BroadcastEvent, broadcasts, (AgentId, RailMessage));
rail_event!(TickEvent, ticks, SyncTick);
rail_event!(StaleTimeoutEvent, stale, AgentId);
rail_event!(StageChangeEvent, stage_changes, StageChange);
rail_event!(AlertEvent, alerts, SecurityAlert);
rail_event!(ErrorEvent, errors, RailServerError);
