mod energy_router;
mod error;
mod router_config;

pub use energy_router::{compute_energy, softmax, EnergyRouter, RouteDecision, RoutingCandidate};
pub use error::RoutingError;
pub use router_config::{AnnealingSchedule, EnergyWeights, RouterConfig};
