mod rail_events;

pub use rail_events::{
    AlertEvent, BroadcastEvent, ConnectEvent, DisconnectEvent, DisconnectReason, ErrorEvent,
    MessageEvent, RailEvent, RailEvents, RejectEvent, StageChangeEvent, StaleTimeoutEvent,
    TickEvent,
};
