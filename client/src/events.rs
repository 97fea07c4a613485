use std::{mem, vec::IntoIter};

use rail_shared::{AdmissionStage, DropReason, RailMessage, RejectReason};

use crate::ClientError;

/// Everything received during one `receive` call
pub struct ClientEvents {
    accepted: Vec<AdmissionStage>,
    rejected: Vec<RejectReason>,
    stage_changes: Vec<AdmissionStage>,
    invitations: Vec<()>,
    messages: Vec<RailMessage>,
    broadcasts: Vec<RailMessage>,
    coherence: Vec<(f64, f64)>,
    dropped: Vec<(String, DropReason)>,
    reauths: Vec<()>,
    disconnections: Vec<()>,
    errors: Vec<ClientError>,

    empty: bool,
}

impl ClientEvents {
    pub(crate) fn new() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
            stage_changes: Vec::new(),
            invitations: Vec::new(),
            messages: Vec::new(),
            broadcasts: Vec::new(),
            coherence: Vec::new(),
            dropped: Vec::new(),
            reauths: Vec::new(),
            disconnections: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: Event>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: Event>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_accepted(&mut self, stage: AdmissionStage) {
        self.accepted.push(stage);
        self.empty = false;
    }

    pub(crate) fn push_rejected(&mut self, reason: RejectReason) {
        self.rejected.push(reason);
        self.empty = false;
    }

    pub(crate) fn push_stage_change(&mut self, stage: AdmissionStage) {
        self.stage_changes.push(stage);
        self.empty = false;
    }

    pub(crate) fn push_invitation(&mut self) {
        self.invitations.push(());
        self.empty = false;
    }

    pub(crate) fn push_message(&mut self, message: RailMessage) {
        self.messages.push(message);
        self.empty = false;
    }

    pub(crate) fn push_broadcast(&mut self, message: RailMessage) {
        self.broadcasts.push(message);
        self.empty = false;
    }

    pub(crate) fn push_coherence(&mut self, coherence: f64, coupling: f64) {
        self.coherence.push((coherence, coupling));
        self.empty = false;
    }

    pub(crate) fn push_dropped(&mut self, message_id: String, reason: DropReason) {
        self.dropped.push((message_id, reason));
        self.empty = false;
    }

    pub(crate) fn push_reauth(&mut self) {
        self.reauths.push(());
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self) {
        self.disconnections.push(());
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: ClientError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait Event {
    type Iter;

    fn iter(events: &mut ClientEvents) -> Self::Iter;

    fn has(events: &ClientEvents) -> bool;
}

macro_rules! client_event {
    ($(#[$meta:meta])* $name:ident, $field:ident, $item:ty) => {
        $(#[$meta])*
        pub struct $name;
        impl Event for $name {
            type Iter = IntoIter<$item>;

            fn iter(events: &mut ClientEvents) -> Self::Iter {
                IntoIterator::into_iter(mem::take(&mut events.$field))
            }

            fn has(events: &ClientEvents) -> bool {
                !events.$field.is_empty()
            }
        }
    };
}

client_event!(
    /// The rail accepted a join, at the given stage
    AcceptedEvent, accepted, AdmissionStage
);
client_event!(RejectedEvent, rejected, RejectReason);
client_event!(StageChangedEvent, stage_changes, AdmissionStage);
client_event!(
    /// An operator invited this agent; joining again completes it
    InvitedEvent, invitations, ()
);
client_event!(MessageEvent, messages, RailMessage);
client_event!(BroadcastEvent, broadcasts, RailMessage);
client_event!(
    /// `(coherence, coupling)` as of the rail's last tick
    CoherenceEvent, coherence, (f64, f64)
);
client_event!(DroppedEvent, dropped, (String, DropReason));
client_event!(ReauthEvent, reauths, ());
client_event!(DisconnectEvent, disconnections, ());
client_event!(ErrorEvent, errors, ClientError);
