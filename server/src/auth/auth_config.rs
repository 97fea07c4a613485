use std::{default::Default, time::Duration};

/// Contains Config properties which will be used by the auth protocol
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Maximum distance between an auth token's timestamp and the server
    /// clock, in either direction
    pub token_freshness: Duration,
    /// Reconnect tokens older than this are rejected and dropped
    pub reconnect_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_freshness: Duration::from_secs(30),
            reconnect_token_ttl: Duration::from_secs(5 * 60),
        }
    }
}
