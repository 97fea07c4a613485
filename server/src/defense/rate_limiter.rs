use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use log::warn;

use rail_shared::Timestamp;

use crate::defense::{RateLimitConfig, WindowLimit};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventClass {
    Message,
    Broadcast,
    Join,
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventClass::Message => "message",
            EventClass::Broadcast => "broadcast",
            EventClass::Join => "join",
        };
        f.write_str(name)
    }
}

/// Queued whenever a check is refused
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateViolation {
    pub client_id: String,
    pub class: EventClass,
    pub count: usize,
    pub limit: usize,
    pub at: u64,
}

#[derive(Default)]
struct ClientWindow {
    message: VecDeque<u64>,
    broadcast: VecDeque<u64>,
    join: VecDeque<u64>,
}

impl ClientWindow {
    fn timestamps_mut(&mut self, class: EventClass) -> &mut VecDeque<u64> {
        match class {
            EventClass::Message => &mut self.message,
            EventClass::Broadcast => &mut self.broadcast,
            EventClass::Join => &mut self.join,
        }
    }
}

/// Sliding-window limiter with independent windows per client and per event
/// class
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: HashMap<String, ClientWindow>,
    violations: VecDeque<RateViolation>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            violations: VecDeque::new(),
        }
    }

    pub fn check_message(&mut self, client_id: &str) -> bool {
        self.check_at(EventClass::Message, client_id, Timestamp::now_millis())
    }

    pub fn check_broadcast(&mut self, client_id: &str) -> bool {
        self.check_at(EventClass::Broadcast, client_id, Timestamp::now_millis())
    }

    pub fn check_join(&mut self, client_id: &str) -> bool {
        self.check_at(EventClass::Join, client_id, Timestamp::now_millis())
    }

    /// Prunes the client's window for `class`, then either records the event
    /// and allows it or refuses it and queues a [`RateViolation`].
    pub fn check_at(&mut self, class: EventClass, client_id: &str, now: u64) -> bool {
        let WindowLimit { window, limit } = self.limit_for(class);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);

        let timestamps = self
            .clients
            .entry(client_id.to_string())
            .or_default()
            .timestamps_mut(class);

        while let Some(oldest) = timestamps.front() {
            if now.saturating_sub(*oldest) < window_ms {
                break;
            }
            timestamps.pop_front();
        }

        if timestamps.len() >= limit {
            let count = timestamps.len();
            warn!(
                "rate limit: {} refused for {} ({} in {:?}, limit {})",
                class, client_id, count, window, limit
            );
            self.violations.push_back(RateViolation {
                client_id: client_id.to_string(),
                class,
                count,
                limit,
                at: now,
            });
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Number of events currently counted against the client for `class`
    pub fn count(&self, class: EventClass, client_id: &str) -> usize {
        self.clients
            .get(client_id)
            .map(|client| match class {
                EventClass::Message => client.message.len(),
                EventClass::Broadcast => client.broadcast.len(),
                EventClass::Join => client.join.len(),
            })
            .unwrap_or(0)
    }

    pub fn remove_client(&mut self, client_id: &str) -> bool {
        self.clients.remove(client_id).is_some()
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn take_violations(&mut self) -> Vec<RateViolation> {
        self.violations.drain(..).collect()
    }

    fn limit_for(&self, class: EventClass) -> WindowLimit {
        match class {
            EventClass::Message => self.config.message,
            EventClass::Broadcast => self.config.broadcast,
            EventClass::Join => self.config.join,
        }
    }
}
