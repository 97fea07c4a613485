use log::info;

use crate::defense::{SecurityAlert, SecurityEventType};

/// What the rail does to a client in response to a security alert
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscalationAction {
    /// Drop the client's session back to unauthenticated and ask it to
    /// present a fresh credential
    ForceReauth { client_id: String },
    /// Close the client's connection
    Disconnect { client_id: String },
}

/// Maps security alerts to actions. Implement this to change how the rail
/// tightens policy under attack.
pub trait EscalationPolicy: Send {
    fn escalate(&mut self, alert: &SecurityAlert) -> Vec<EscalationAction>;
}

/// Re-authenticates on credential and rate alerts, disconnects on
/// adversarial and flood alerts
#[derive(Clone, Debug, Default)]
pub struct DefaultEscalationPolicy;

impl EscalationPolicy for DefaultEscalationPolicy {
    fn escalate(&mut self, alert: &SecurityAlert) -> Vec<EscalationAction> {
        let client_id = alert.client_id.clone();
        let action = match alert.event_type {
            SecurityEventType::AuthFailure
            | SecurityEventType::InvalidReconnect
            | SecurityEventType::RateLimitExceeded => EscalationAction::ForceReauth { client_id },
            SecurityEventType::AdversarialDetected
            | SecurityEventType::FloodDetected
            | SecurityEventType::Impersonation
            | SecurityEventType::MalformedFrame => EscalationAction::Disconnect { client_id },
        };
        info!("escalation: {} alert -> {:?}", alert.event_type, action);
        vec![action]
    }
}
