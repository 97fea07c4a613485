use log::{info, warn};

use rail_server::{
    shared::AdmissionStage, AlertEvent, BroadcastEvent, ConnectEvent, DisconnectEvent, ErrorEvent,
    MessageEvent, RailEvents, RailServer, RejectEvent, StageChangeEvent, StaleTimeoutEvent,
    TickEvent,
};

const TICKS_PER_REPORT: u64 = 50;

/// Logs everything the rail reports and plays operator: every assessed agent
/// is invited straight away
#[derive(Default)]
pub struct App {
    tick_count: u64,
}

impl App {
    pub fn handle(&mut self, server: &mut RailServer, mut events: RailEvents) {
        for (connection, agent_id, stage) in events.read::<ConnectEvent>() {
            info!("{} joined on {} at {}", agent_id, connection, stage);
        }
        for (connection, reason) in events.read::<RejectEvent>() {
            info!("rejected {}: {:?}", connection, reason);
        }
        for (connection, agent_id, reason) in events.read::<DisconnectEvent>() {
            match agent_id {
                Some(agent_id) => info!("{} left {} ({:?})", agent_id, connection, reason),
                None => info!("{} closed ({:?})", connection, reason),
            }
        }
        for (agent_id, message) in events.read::<MessageEvent>() {
            info!("{} says: {}", agent_id, message.payload.content());
        }
        for (agent_id, message) in events.read::<BroadcastEvent>() {
            info!("{} broadcast {}", agent_id, message.id);
        }
        for change in events.read::<StageChangeEvent>() {
            info!("{}: {} -> {}", change.agent_id, change.from, change.to);
            if change.to == AdmissionStage::Assessed {
                if let Err(e) = server.invite_candidate(change.agent_id.as_str()) {
                    warn!("could not invite {}: {}", change.agent_id, e);
                }
            }
        }
        for agent_id in events.read::<StaleTimeoutEvent>() {
            info!("{} timed out", agent_id);
        }
        for alert in events.read::<AlertEvent>() {
            warn!(
                "security alert: {} x{} from {}",
                alert.event_type, alert.count, alert.client_id
            );
        }
        for tick in events.read::<TickEvent>() {
            self.tick_count += 1;
            if self.tick_count % TICKS_PER_REPORT == 0 {
                info!(
                    "coherence {:.3}, coupling {:.3}, {} agents",
                    tick.coherence,
                    tick.coupling,
                    tick.phases.len()
                );
            }
        }
        for error in events.read::<ErrorEvent>() {
            warn!("Server Error: {}", error);
        }
    }
}
