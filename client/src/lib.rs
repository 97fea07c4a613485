//! # Rail Client
//! Agent-side connector for the coherence rail. Holds the agent's identity
//! and shared secret, signs join credentials, keeps a local oscillator whose
//! phase is reported to the rail, and sends/receives rail messages.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod transport;

mod client;
mod client_config;
mod error;
mod events;

pub use client::{Client, ClientState};
pub use client_config::ClientConfig;
pub use error::ClientError;
pub use events::{
    AcceptedEvent, BroadcastEvent, ClientEvents, CoherenceEvent, DisconnectEvent, DroppedEvent,
    ErrorEvent, Event, InvitedEvent, MessageEvent, ReauthEvent, RejectedEvent, StageChangedEvent,
};

pub mod shared {
    pub use rail_shared::{
        AdmissionStage, AgentId, DropReason, Embedding, MessageKind, Payload, RailMessage,
        Recipient, RejectReason,
    };
}
