//! Join handling: credentials, reconnect tokens, join rate and supersession

use rail_client::{
    AcceptedEvent, Client, ClientConfig, DisconnectEvent as ClientDisconnectEvent, RejectedEvent,
};
use std::time::Duration;

use rail_server::{
    defense::{SecurityEventType, WindowLimit},
    ConnectEvent, DisconnectEvent, DisconnectReason, RejectEvent, ServerConfig,
};
use rail_shared::{encode, AdmissionStage, AgentId, ClientEvent, Credential, RejectReason};
use rail_test::{TestClient, TestServer};

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn no_reconnect() -> ClientConfig {
    ClientConfig {
        prefer_reconnect: false,
        ..Default::default()
    }
}

#[test]
fn first_join_is_observed() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());

    let (mut server_events, mut client_events) = harness.join(&mut client);

    let connects: Vec<_> = server_events.read::<ConnectEvent>().collect();
    assert_eq!(
        connects,
        vec![(
            client.connection(),
            AgentId::new("alpha"),
            AdmissionStage::Observed
        )]
    );
    let accepted: Vec<_> = client_events.read::<AcceptedEvent>().collect();
    assert_eq!(accepted, vec![AdmissionStage::Observed]);

    assert!(client.client().is_joined());
    assert_eq!(client.client().capability_token(), None);
    let reconnect = client.client().reconnect_token().unwrap();
    assert_eq!(reconnect.len(), 64);
    assert!(reconnect.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(harness.server().sync().contains("alpha"));
}

#[test]
fn wrong_secret_is_rejected_and_closed() {
    init_logging();
    let mut harness = TestServer::new();
    harness
        .server_mut()
        .register_agent(&AgentId::new("alpha"))
        .unwrap();
    let mut client = TestClient::connect(
        harness.hub(),
        "alpha",
        "not-the-registered-secret",
        ClientConfig::default(),
    );

    let (mut server_events, mut client_events) = harness.join(&mut client);

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(
        rejections,
        vec![(client.connection(), RejectReason::AuthFailed)]
    );
    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(disconnects[0].2, DisconnectReason::Rejected);

    let rejected: Vec<_> = client_events.read::<RejectedEvent>().collect();
    assert_eq!(rejected, vec![RejectReason::AuthFailed]);
    assert!(client_events.has::<ClientDisconnectEvent>());
    assert!(!harness.hub().is_open(client.connection()));

    let security = harness.server().security_events_for("alpha", 10);
    assert_eq!(security.len(), 1);
    assert_eq!(security[0].event_type, SecurityEventType::AuthFailure);
    assert!(!harness.server().sync().contains("alpha"));
}

#[test]
fn unknown_agent_is_rejected() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = TestClient::connect(harness.hub(), "ghost", "secret", ClientConfig::default());

    let (mut server_events, _) = harness.join(&mut client);

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::AuthFailed);
}

#[test]
fn stale_auth_token_is_rejected() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());

    let signed_at = harness.now() - 31_000;
    client.client_mut().join_at(signed_at).unwrap();
    let mut server_events = harness.receive();

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::AuthFailed);
}

#[test]
fn slightly_skewed_clock_is_accepted() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());

    // Client clock 10 s ahead of the rail
    client.client_mut().join_at(harness.now() + 10_000).unwrap();
    let mut server_events = harness.receive();
    assert!(server_events.has::<ConnectEvent>());
    assert!(!server_events.has::<RejectEvent>());
}

#[test]
fn reconnect_token_survives_disconnect_and_is_single_use() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut client);
    let spent = client.client().reconnect_token().unwrap().to_string();

    // Peer goes away
    harness.hub().drop_connection(client.connection());
    let mut server_events = harness.receive();
    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(disconnects[0].2, DisconnectReason::Closed);
    assert!(!harness.server().sync().contains("alpha"));
    client.receive();

    // Rejoin with the stored token on a new connection
    client.reconnect(harness.hub());
    let (mut server_events, mut client_events) = harness.join(&mut client);
    assert!(server_events.has::<ConnectEvent>());
    assert_eq!(client_events.read::<AcceptedEvent>().count(), 1);
    assert_ne!(client.client().reconnect_token(), Some(spent.as_str()));

    // Replaying the spent token from elsewhere fails
    let socket = harness.hub().client_socket();
    let replay_connection = socket.connection();
    let mut replayer = Client::new(
        ClientConfig::default(),
        AgentId::new("alpha"),
        "unknown-secret",
    );
    replayer.connect(socket);
    let mut request = replayer.join_request_at(harness.now());
    request.credential = Credential::Reconnect { token: spent };
    harness
        .hub()
        .inject(replay_connection, &encode(&ClientEvent::Join(request)).unwrap());
    let mut server_events = harness.receive();

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(
        rejections,
        vec![(replay_connection, RejectReason::AuthFailed)]
    );
    let invalid = harness
        .server()
        .security_events_for("alpha", 10)
        .into_iter()
        .filter(|event| event.event_type == SecurityEventType::InvalidReconnect)
        .count();
    assert_eq!(invalid, 1);

    // The legitimate session is untouched
    let session = harness.server().session_for_agent("alpha").unwrap();
    assert_eq!(session.key, client.connection());
}

#[test]
fn expired_reconnect_token_is_rejected() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut client);
    harness.hub().drop_connection(client.connection());
    harness.receive();
    client.receive();

    harness.advance(5 * 60 * 1000 + 1);
    client.reconnect(harness.hub());
    let (mut server_events, mut client_events) = harness.join(&mut client);

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::AuthFailed);
    assert_eq!(
        client_events.read::<RejectedEvent>().collect::<Vec<_>>(),
        vec![RejectReason::AuthFailed]
    );
    assert!(!client.client().has_reconnect_token());
}

#[test]
fn fourth_join_within_the_hour_is_rate_limited() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", no_reconnect());

    for _ in 0..3 {
        let (mut server_events, _) = harness.join(&mut client);
        assert!(server_events.has::<ConnectEvent>());
        harness.advance(1_000);
    }

    let (mut server_events, mut client_events) = harness.join(&mut client);
    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::RateLimited);
    assert_eq!(
        client_events.read::<RejectedEvent>().collect::<Vec<_>>(),
        vec![RejectReason::RateLimited]
    );
}

#[test]
fn rate_limited_reconnect_keeps_its_token() {
    init_logging();
    let mut config = ServerConfig::default();
    config.rate_limit.join = WindowLimit::new(Duration::from_secs(60), 1);
    let mut harness = TestServer::with_config(config);
    let mut client = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut client);
    let token = client.client().reconnect_token().unwrap().to_string();

    harness.hub().drop_connection(client.connection());
    harness.receive();
    client.receive();

    // Second join inside the window is refused for its rate only
    client.reconnect(harness.hub());
    let (mut server_events, mut client_events) = harness.join(&mut client);
    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::RateLimited);
    assert_eq!(
        client_events.read::<RejectedEvent>().collect::<Vec<_>>(),
        vec![RejectReason::RateLimited]
    );
    assert_eq!(client.client().reconnect_token(), Some(token.as_str()));

    // Once the window has passed the same token still works
    harness.advance(61_000);
    harness.receive();
    client.reconnect(harness.hub());
    let (mut server_events, mut client_events) = harness.join(&mut client);
    assert!(server_events.has::<ConnectEvent>());
    assert_eq!(client_events.read::<AcceptedEvent>().count(), 1);
    let invalid = harness
        .server()
        .security_events_for("alpha", 10)
        .into_iter()
        .filter(|event| event.event_type == SecurityEventType::InvalidReconnect)
        .count();
    assert_eq!(invalid, 0);
}

#[test]
fn second_session_supersedes_the_first() {
    init_logging();
    let mut harness = TestServer::new();
    let mut first = harness.connect("alpha", no_reconnect());
    harness.join(&mut first);

    let mut second = harness.connect("alpha", no_reconnect());
    let (mut server_events, _) = harness.join(&mut second);

    let disconnects: Vec<_> = server_events.read::<DisconnectEvent>().collect();
    assert_eq!(
        disconnects,
        vec![(
            first.connection(),
            Some(AgentId::new("alpha")),
            DisconnectReason::Superseded
        )]
    );
    let connects: Vec<_> = server_events.read::<ConnectEvent>().collect();
    assert_eq!(connects[0].0, second.connection());

    let mut first_events = first.receive();
    assert_eq!(
        first_events.read::<RejectedEvent>().collect::<Vec<_>>(),
        vec![RejectReason::Superseded]
    );
    assert_eq!(harness.server().session_count(), 1);
    assert!(harness.server().sync().contains("alpha"));
}

#[test]
fn rejoin_as_another_agent_on_the_same_connection_is_refused() {
    init_logging();
    let mut harness = TestServer::new();
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);
    // Registered so the credential itself would be valid
    let beta_secret = harness
        .server_mut()
        .register_agent(&AgentId::new("beta"))
        .unwrap();

    let mut beta = Client::new(ClientConfig::default(), AgentId::new("beta"), beta_secret);
    let request = beta.join_request_at(harness.now());
    harness
        .hub()
        .inject(alpha.connection(), &encode(&ClientEvent::Join(request)).unwrap());
    let mut server_events = harness.receive();

    let rejections: Vec<_> = server_events.read::<RejectEvent>().collect();
    assert_eq!(rejections[0].1, RejectReason::AuthFailed);
    let security = harness.server().security_events_for("alpha", 10);
    assert_eq!(security[0].event_type, SecurityEventType::Impersonation);
    assert!(harness.server().session_for_agent("beta").is_none());
}
