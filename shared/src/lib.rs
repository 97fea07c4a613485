//! # Rail Shared
//! Common functionality shared between rail-server & rail-client crates:
//! the wire message model and codec, Kuramoto oscillator math, embedding
//! similarity and auth token primitives.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod backends;
mod messages;
mod similarity;
mod types;

pub mod auth;
#[cfg(feature = "transport_tcp")]
pub mod framing;
pub mod oscillator;

pub use auth::{generate_secret, random_hex, AuthToken, AuthTokenError};
pub use backends::{TimeError, Timestamp};
pub use messages::{
    codec::{decode, encode},
    constants::MAX_FRAME_BYTES,
    error::CodecError,
    events::{ClientEvent, Credential, DropReason, JoinRequest, RejectReason, ServerEvent},
    message::{MessageKind, Payload, RailMessage, Recipient},
};
pub use oscillator::{
    compute_coherence, evolve_phase, mean_phase, phase_alignment, wrap_phase, EngineTick,
    Oscillator, OscillatorEngine,
};
pub use similarity::{cosine_similarity, SimilarityError};
pub use types::{AdmissionStage, AgentId, Embedding};
