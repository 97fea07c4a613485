use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    time::Duration,
};

use log::{debug, warn};

use rail_shared::Timestamp;

use crate::defense::SecurityMonitorConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecurityEventType {
    AuthFailure,
    RateLimitExceeded,
    AdversarialDetected,
    FloodDetected,
    InvalidReconnect,
    MalformedFrame,
    Impersonation,
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityEventType::AuthFailure => "auth_failure",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::AdversarialDetected => "adversarial_detected",
            SecurityEventType::FloodDetected => "flood_detected",
            SecurityEventType::InvalidReconnect => "invalid_reconnect",
            SecurityEventType::MalformedFrame => "malformed_frame",
            SecurityEventType::Impersonation => "impersonation",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub client_id: String,
    pub timestamp: u64,
    pub details: Option<String>,
}

/// Raised once when one client's events of a type reach the type's threshold
/// inside its window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityAlert {
    pub event_type: SecurityEventType,
    pub count: usize,
    pub window: Duration,
    /// Client whose events crossed the threshold
    pub client_id: String,
    pub at: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityStats {
    pub total: usize,
    pub by_type: HashMap<SecurityEventType, usize>,
}

/// Bounded log of security events with per-client threshold alerts
pub struct SecurityMonitor {
    config: SecurityMonitorConfig,
    events: VecDeque<SecurityEvent>,
    // (type, client) pairs whose last alert has not yet been followed by a dip
    // below threshold
    tripped: HashSet<(SecurityEventType, String)>,
    alerts: VecDeque<SecurityAlert>,
}

impl SecurityMonitor {
    pub fn new(config: SecurityMonitorConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
            tripped: HashSet::new(),
            alerts: VecDeque::new(),
        }
    }

    pub fn record(
        &mut self,
        event_type: SecurityEventType,
        client_id: &str,
        details: Option<String>,
    ) -> Option<SecurityAlert> {
        self.record_at(event_type, client_id, details, Timestamp::now_millis())
    }

    /// Appends an event and returns the alert it raised, if any. The alert is
    /// also queued for [`SecurityMonitor::take_alerts`].
    pub fn record_at(
        &mut self,
        event_type: SecurityEventType,
        client_id: &str,
        details: Option<String>,
        now: u64,
    ) -> Option<SecurityAlert> {
        debug!(
            "security: {} from {}{}",
            event_type,
            client_id,
            details
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        );

        let latch = (event_type, client_id.to_string());
        let threshold = self.config.thresholds.get(&event_type).copied();
        if let Some(threshold) = threshold {
            if self.count_in_window(event_type, client_id, threshold.window, now)
                < threshold.count
            {
                self.tripped.remove(&latch);
            }
        }

        self.events.push_back(SecurityEvent {
            event_type,
            client_id: client_id.to_string(),
            timestamp: now,
            details,
        });
        self.trim();

        let threshold = threshold?;
        let count = self.count_in_window(event_type, client_id, threshold.window, now);
        if count < threshold.count || self.tripped.contains(&latch) {
            return None;
        }

        self.tripped.insert(latch);
        let alert = SecurityAlert {
            event_type,
            count,
            window: threshold.window,
            client_id: client_id.to_string(),
            at: now,
        };
        warn!(
            "security: alert {} x{} within {:?} from {}",
            event_type, count, threshold.window, client_id
        );
        self.alerts.push_back(alert.clone());
        Some(alert)
    }

    /// Lets the client's next event above a threshold alert again. Called once
    /// an alert against the client has been acted on.
    pub fn rearm(&mut self, client_id: &str) {
        self.tripped.retain(|(_, tripped)| tripped != client_id);
    }

    pub fn take_alerts(&mut self) -> Vec<SecurityAlert> {
        self.alerts.drain(..).collect()
    }

    pub fn get_stats(&self, window: Duration) -> SecurityStats {
        self.get_stats_at(window, Timestamp::now_millis())
    }

    pub fn get_stats_at(&self, window: Duration, now: u64) -> SecurityStats {
        let mut stats = SecurityStats::default();
        for event in self.events_in_window(window, now) {
            stats.total += 1;
            *stats.by_type.entry(event.event_type).or_insert(0) += 1;
        }
        stats
    }

    /// Up to `limit` most recent events for the client, oldest first
    pub fn get_events_for_client(&self, client_id: &str, limit: usize) -> Vec<&SecurityEvent> {
        let mut events: Vec<&SecurityEvent> = self
            .events
            .iter()
            .rev()
            .filter(|event| event.client_id == client_id)
            .take(limit)
            .collect();
        events.reverse();
        events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn events_in_window(
        &self,
        window: Duration,
        now: u64,
    ) -> impl Iterator<Item = &SecurityEvent> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.events
            .iter()
            .rev()
            .take_while(move |event| now.saturating_sub(event.timestamp) < window_ms)
    }

    fn count_in_window(
        &self,
        event_type: SecurityEventType,
        client_id: &str,
        window: Duration,
        now: u64,
    ) -> usize {
        self.events_in_window(window, now)
            .filter(|event| event.event_type == event_type && event.client_id == client_id)
            .count()
    }

    fn trim(&mut self) {
        if self.events.len() > self.config.max_events {
            let keep = self.config.max_events / 2;
            let excess = self.events.len() - keep;
            self.events.drain(..excess);
            debug!("security: event log trimmed to {}", keep);
        }
    }
}
