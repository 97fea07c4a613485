//! # Rail Server
//! A coordination rail that authenticates agents, admits them into trust
//! through staged absorption, keeps their phases synchronized and routes
//! their messages by semantic energy.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod admission;
pub mod auth;
pub mod defense;
pub mod plugins;
pub mod routing;
pub mod session;
pub mod sync;
pub mod trace_store;
pub mod transport;
pub mod vault;

cfg_if! {
    if #[cfg(feature = "transport_tcp")] {
        mod runtime;
        pub use runtime::run;
    }
}

mod error;
mod events;
mod server;
mod time_manager;

pub use error::RailServerError;
pub use events::{
    AlertEvent, BroadcastEvent, ConnectEvent, DisconnectEvent, DisconnectReason, ErrorEvent,
    MessageEvent, RailEvent, RailEvents, RejectEvent, StageChangeEvent, StaleTimeoutEvent,
    TickEvent,
};
pub use server::{RailServer, ServerConfig, VAULT_SECRET_PREFIX};
pub use time_manager::{TimeManager, Timer};

pub mod shared {
    pub use rail_shared::{
        AdmissionStage, AgentId, AuthToken, ClientEvent, Credential, DropReason, Embedding,
        JoinRequest, MessageKind, Payload, RailMessage, Recipient, RejectReason, ServerEvent,
        Timestamp,
    };
}
