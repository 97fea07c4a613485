mod error;
mod global_sync;
mod sync_config;

pub use error::SyncError;
pub use global_sync::{
    CouplingAdjustment, GlobalSyncEngine, NetworkOscillatorMeta, PhaseReportOutcome, SyncTick,
};
pub use sync_config::SyncConfig;
