mod absorption;
mod admission_config;
mod bridge;
mod error;

pub use absorption::{Absorption, AbsorptionStats, AdmissionCandidate, AdversarialSignals};
pub use admission_config::AdmissionConfig;
pub use bridge::{AdmissionBridge, JoinDecision, StageChange};
pub use error::AdmissionError;
