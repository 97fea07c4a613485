//! Rate limits, adversarial signals, security alerts and their escalation

use std::time::Duration;

use rail_client::{
    ClientConfig, DisconnectEvent as ClientDisconnectEvent, DroppedEvent, ReauthEvent,
    RejectedEvent, StageChangedEvent,
};
use rail_server::{
    defense::{EscalationAction, EscalationPolicy, SecurityAlert, SecurityEventType, WindowLimit},
    session::SessionState,
    AlertEvent, DisconnectEvent, DisconnectReason, ErrorEvent, MessageEvent, RailServerError,
    ServerConfig,
};
use rail_shared::{
    AdmissionStage, AgentId, DropReason, MessageKind, Payload, RejectReason, Timestamp,
};
use rail_test::{TestClient, TestServer};

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn manual_reauth() -> ClientConfig {
    ClientConfig {
        auto_reauth: false,
        ..Default::default()
    }
}

fn send_plain(client: &mut TestClient, count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let message = client
                .client_mut()
                .new_message(MessageKind::Act, Payload::Text("work".into()));
            client.client_mut().send(message).unwrap()
        })
        .collect()
}

#[test]
fn eleventh_message_in_a_second_is_dropped() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);
    alpha.receive();

    let ids = send_plain(&mut alpha, 11);
    let mut server_events = harness.receive();

    assert_eq!(server_events.read::<MessageEvent>().count(), 10);
    let dropped: Vec<_> = alpha.receive().read::<DroppedEvent>().collect();
    assert_eq!(dropped, vec![(ids[10].clone(), DropReason::RateLimited)]);

    // A second later the window has moved on
    harness.advance(1_000);
    send_plain(&mut alpha, 1);
    let mut server_events = harness.receive();
    assert_eq!(server_events.read::<MessageEvent>().count(), 1);
}

#[test]
fn clients_are_limited_independently() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    let mut beta = harness.connect("beta", ClientConfig::default());
    harness.join(&mut alpha);
    harness.join(&mut beta);

    send_plain(&mut alpha, 10);
    send_plain(&mut beta, 10);
    let mut server_events = harness.receive();
    assert_eq!(server_events.read::<MessageEvent>().count(), 20);
}

#[test]
fn repeated_rate_violations_force_reauthentication() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", manual_reauth());
    harness.join(&mut alpha);
    alpha.receive();

    send_plain(&mut alpha, 21);
    let mut server_events = harness.receive();

    let alerts: Vec<_> = server_events.read::<AlertEvent>().collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].event_type, SecurityEventType::RateLimitExceeded);
    assert_eq!(alerts[0].client_id, alpha.connection().to_string());

    let mut client_events = alpha.receive();
    assert_eq!(client_events.read::<DroppedEvent>().count(), 11);
    assert_eq!(client_events.read::<ReauthEvent>().count(), 1);
    assert!(!alpha.client().is_joined());

    let session = harness.server().session(&alpha.connection()).unwrap();
    assert_eq!(session.state, SessionState::Unauthenticated);
    assert!(!harness.server().sync().contains("alpha"));

    let stats = harness
        .server()
        .security_stats_at(Duration::from_secs(60), harness.now());
    assert_eq!(
        stats.by_type.get(&SecurityEventType::RateLimitExceeded),
        Some(&11)
    );
}

#[test]
fn escalation_follows_the_client_that_crossed_the_threshold() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", manual_reauth());
    let mut beta = harness.connect("beta", manual_reauth());
    harness.join(&mut alpha);
    harness.join(&mut beta);
    alpha.receive();
    beta.receive();

    // Ten violations overall, but nine from alpha and one from beta
    send_plain(&mut alpha, 19);
    send_plain(&mut beta, 11);
    let mut server_events = harness.receive();
    assert!(!server_events.has::<AlertEvent>());
    assert!(!alpha.receive().has::<ReauthEvent>());
    assert!(!beta.receive().has::<ReauthEvent>());

    harness.advance(100);
    send_plain(&mut alpha, 5);
    let mut server_events = harness.receive();
    let alerts: Vec<_> = server_events.read::<AlertEvent>().collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].client_id, alpha.connection().to_string());

    assert!(alpha.receive().has::<ReauthEvent>());
    assert!(!beta.receive().has::<ReauthEvent>());
    assert!(!harness.server().sync().contains("alpha"));
    assert!(harness.server().sync().contains("beta"));

    // Back in and still flooding: escalated again
    harness.advance(100);
    harness.join(&mut alpha);
    assert!(alpha.client().is_joined());
    send_plain(&mut alpha, 11);
    let mut server_events = harness.receive();
    let alerts: Vec<_> = server_events.read::<AlertEvent>().collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].client_id, alpha.connection().to_string());
    assert!(alpha.receive().has::<ReauthEvent>());
    assert!(harness.server().sync().contains("beta"));
}

#[test]
fn reauthentication_is_automatic_when_enabled() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);
    alpha.receive();

    send_plain(&mut alpha, 21);
    harness.receive();
    // The client signs its automatic join with the wall clock
    let wall_clock = Timestamp::now_millis();
    harness.advance(wall_clock.saturating_sub(harness.now()));
    let mut client_events = alpha.receive();
    assert!(client_events.has::<ReauthEvent>());
    harness.receive();
    alpha.receive();

    assert!(alpha.client().is_joined());
    assert!(harness.server().sync().contains("alpha"));
}

#[test]
fn impersonation_is_an_injection_attempt() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.activate("alpha", ClientConfig::default());
    alpha.receive();

    let mut message = alpha
        .client_mut()
        .new_message(MessageKind::Act, Payload::Text("as beta".into()));
    message.from = AgentId::new("beta");
    alpha.client_mut().send(message).unwrap();
    let mut server_events = harness.receive();

    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(disconnects[0].2, DisconnectReason::Rejected);
    assert_eq!(harness.server().agent_stage("alpha"), None);
    assert_eq!(harness.server().capability_token("alpha"), None);

    let kinds: Vec<_> = harness
        .server()
        .security_events_for("alpha", 10)
        .into_iter()
        .map(|event| event.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            SecurityEventType::Impersonation,
            SecurityEventType::AdversarialDetected
        ]
    );

    let mut client_events = alpha.receive();
    assert_eq!(
        client_events.read::<RejectedEvent>().collect::<Vec<_>>(),
        vec![RejectReason::Adversarial]
    );
    assert!(client_events.has::<ClientDisconnectEvent>());
}

#[test]
fn phase_flood_escalates_to_disconnect() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);

    for _ in 0..15 {
        alpha.client_mut().report_phase_at(harness.now()).unwrap();
    }
    let mut server_events = harness.receive();

    let alerts: Vec<_> = server_events.read::<AlertEvent>().collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].event_type, SecurityEventType::FloodDetected);

    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(
        disconnects,
        vec![(
            alpha.connection(),
            Some(AgentId::new("alpha")),
            DisconnectReason::Escalated
        )]
    );
    // Five reports over the limit, none of them adversarial yet
    assert_eq!(
        harness.server().agent_stage("alpha"),
        Some(AdmissionStage::Observed)
    );
}

struct Lenient;

impl EscalationPolicy for Lenient {
    fn escalate(&mut self, _alert: &SecurityAlert) -> Vec<EscalationAction> {
        Vec::new()
    }
}

#[test]
fn exhausted_trust_is_a_rapid_phase_shift() {
    init_logging();
    let mut harness = TestServer::new();
    harness
        .server_mut()
        .set_escalation_policy(Box::new(Lenient));
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);

    for _ in 0..25 {
        alpha.client_mut().report_phase_at(harness.now()).unwrap();
    }
    let mut server_events = harness.receive();

    // Policy did nothing, so the session survives, without trust
    assert!(!server_events.has::<DisconnectEvent>());
    assert_eq!(harness.server().agent_stage("alpha"), None);
    let meta = harness.server().sync().meta("alpha").unwrap();
    assert_eq!(meta.trust_score, 0.0);
    let adversarial = harness
        .server()
        .security_events_for("alpha", 100)
        .into_iter()
        .filter(|event| event.event_type == SecurityEventType::AdversarialDetected)
        .count();
    assert_eq!(adversarial, 1);
}

#[test]
fn excessive_broadcast_demotes_then_disconnects() {
    init_logging();
    let mut config = ServerConfig::default();
    config.rate_limit.broadcast = WindowLimit {
        window: Duration::from_secs(60),
        limit: 2,
    };
    let mut harness = TestServer::with_config(config);
    let mut alpha = harness.activate("alpha", ClientConfig::default());
    alpha.receive();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let message = alpha
            .client_mut()
            .new_message(MessageKind::Percept, Payload::Text("all hands".into()));
        ids.push(alpha.client_mut().broadcast(message).unwrap());
    }
    let mut server_events = harness.receive();

    let alerts: Vec<_> = server_events.read::<AlertEvent>().collect();
    assert!(alerts
        .iter()
        .any(|alert| alert.event_type == SecurityEventType::AdversarialDetected));
    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(disconnects[0].2, DisconnectReason::Escalated);
    assert_eq!(harness.server().agent_stage("alpha"), None);

    let mut client_events = alpha.receive();
    assert_eq!(
        client_events.read::<StageChangedEvent>().collect::<Vec<_>>(),
        vec![AdmissionStage::Observed]
    );
    assert_eq!(
        client_events.read::<DroppedEvent>().collect::<Vec<_>>(),
        vec![(ids[2].clone(), DropReason::RateLimited)]
    );
}

#[test]
fn malformed_frames_are_recorded() {
    init_logging();
    let mut harness = TestServer::new();
    let alpha = harness.connect("alpha", ClientConfig::default());
    harness.receive();

    harness.hub().inject(alpha.connection(), b"{not json");
    let mut server_events = harness.receive();

    let errors: Vec<_> = server_events.read::<ErrorEvent>().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        RailServerError::Codec { connection, .. } if *connection == alpha.connection()
    ));
    let client_id = alpha.connection().to_string();
    let events = harness.server().security_events_for(&client_id, 10);
    assert_eq!(events[0].event_type, SecurityEventType::MalformedFrame);
    // Still connected
    assert!(harness.server().session(&alpha.connection()).is_some());
}

#[test]
fn repeated_auth_failures_raise_one_alert() {
    init_logging();
    let mut harness = TestServer::new();
    harness
        .server_mut()
        .register_agent(&AgentId::new("alpha"))
        .unwrap();

    let mut alerts = 0;
    for _ in 0..7 {
        let mut client =
            TestClient::connect(harness.hub(), "alpha", "guess", ClientConfig::default());
        client.client_mut().join_at(harness.now()).unwrap();
        alerts += harness.receive().read::<AlertEvent>().count();
        harness.advance(10);
    }
    assert_eq!(alerts, 1);
}
