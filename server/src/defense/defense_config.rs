use std::{collections::HashMap, default::Default, time::Duration};

use crate::defense::SecurityEventType;

/// At most `limit` events inside any `window`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowLimit {
    pub window: Duration,
    pub limit: usize,
}

impl WindowLimit {
    pub const fn new(window: Duration, limit: usize) -> Self {
        Self { window, limit }
    }
}

/// Contains Config properties which will be used by the rate limiter
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub message: WindowLimit,
    pub broadcast: WindowLimit,
    pub join: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            message: WindowLimit::new(Duration::from_secs(1), 10),
            broadcast: WindowLimit::new(Duration::from_secs(60), 100),
            join: WindowLimit::new(Duration::from_secs(3600), 3),
        }
    }
}

/// Alert once `count` events of one type land inside `window`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertThreshold {
    pub count: usize,
    pub window: Duration,
}

/// Contains Config properties which will be used by the security monitor
#[derive(Clone, Debug)]
pub struct SecurityMonitorConfig {
    /// Hard cap on the event log; exceeding it keeps only the newest half
    pub max_events: usize,
    /// Event types without an entry never alert
    pub thresholds: HashMap<SecurityEventType, AlertThreshold>,
}

impl Default for SecurityMonitorConfig {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        let thresholds = [
            (SecurityEventType::AuthFailure, 5),
            (SecurityEventType::RateLimitExceeded, 10),
            (SecurityEventType::AdversarialDetected, 1),
            (SecurityEventType::FloodDetected, 3),
            (SecurityEventType::InvalidReconnect, 5),
            (SecurityEventType::MalformedFrame, 20),
        ]
        .into_iter()
        .map(|(event_type, count)| {
            (
                event_type,
                AlertThreshold {
                    count,
                    window: minute,
                },
            )
        })
        .collect();

        Self {
            max_events: 10_000,
            thresholds,
        }
    }
}
