mod defense_config;
mod escalation;
mod rate_limiter;
mod security_monitor;

pub use defense_config::{AlertThreshold, RateLimitConfig, SecurityMonitorConfig, WindowLimit};
pub use escalation::{DefaultEscalationPolicy, EscalationAction, EscalationPolicy};
pub use rate_limiter::{EventClass, RateLimiter, RateViolation};
pub use security_monitor::{
    SecurityAlert, SecurityEvent, SecurityEventType, SecurityMonitor, SecurityStats,
};
