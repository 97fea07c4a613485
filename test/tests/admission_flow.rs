//! Absorption stages as seen through the rail: assessment, invitation,
//! sustained alignment, release

use rail_client::{ClientConfig, StageChangedEvent};
use rail_server::{session::SessionState, StageChangeEvent};
use rail_shared::{AdmissionStage, AgentId, MessageKind, Payload};
use rail_test::{TestClient, TestServer};

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn send_embedded(harness: &mut TestServer, client: &mut TestClient, embedding: Vec<f32>) {
    let message = client
        .client_mut()
        .new_message(MessageKind::Think, Payload::Text("thinking".into()))
        .with_embedding(embedding);
    client.client_mut().send(message).unwrap();
    harness.receive();
}

#[test]
fn second_interaction_assesses() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut client);
    assert_eq!(
        harness.server().agent_stage("alpha"),
        Some(AdmissionStage::Observed)
    );

    let message = client
        .client_mut()
        .new_message(MessageKind::Percept, Payload::Text("hi".into()));
    client.client_mut().send(message).unwrap();
    let mut server_events = harness.receive();

    let changes: Vec<_> = server_events.read::<StageChangeEvent>().collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].agent_id, AgentId::new("alpha"));
    assert_eq!(changes[0].from, AdmissionStage::Observed);
    assert_eq!(changes[0].to, AdmissionStage::Assessed);
    assert_eq!(changes[0].capability_token, None);

    let mut client_events = client.receive();
    assert_eq!(
        client_events.read::<StageChangedEvent>().collect::<Vec<_>>(),
        vec![AdmissionStage::Assessed]
    );
}

#[test]
fn invitation_grants_a_capability_token() {
    init_logging();
    let mut harness = TestServer::new();
    let client = harness.activate("alpha", ClientConfig::default());

    let token = client.client().capability_token().unwrap().to_string();
    let suffix = token.strip_prefix("cap_alpha_").unwrap();
    assert_eq!(suffix.len(), 16);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(harness.server().capability_token("alpha"), Some(token.as_str()));

    let session = harness.server().session(&client.connection()).unwrap();
    assert_eq!(session.state, SessionState::Active);
}

#[test]
fn inviting_an_observed_agent_fails() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut client);

    assert!(harness.server_mut().invite_candidate("alpha").is_err());
    assert!(harness.server_mut().invite_candidate("nobody").is_err());
}

#[test]
fn sustained_alignment_absorbs() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.activate("alpha", ClientConfig::default());

    for _ in 0..4 {
        send_embedded(&mut harness, &mut client, vec![0.6, 0.8]);
    }

    let mut client_events = client.receive();
    let stages: Vec<_> = client_events.read::<StageChangedEvent>().collect();
    assert_eq!(
        stages,
        vec![AdmissionStage::Syncing, AdmissionStage::Absorbed]
    );
    assert_eq!(client.client().stage(), Some(AdmissionStage::Absorbed));
    // Token kept across trusted stages
    assert!(client.client().capability_token().is_some());

    let stats = harness.server().admission_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.count(AdmissionStage::Absorbed), 1);
}

#[test]
fn misaligned_embedding_breaks_the_streak() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.activate("alpha", ClientConfig::default());

    send_embedded(&mut harness, &mut client, vec![1.0, 0.0]);
    send_embedded(&mut harness, &mut client, vec![1.0, 0.0]);
    // Orthogonal to the running centroid
    send_embedded(&mut harness, &mut client, vec![0.0, 1.0]);
    send_embedded(&mut harness, &mut client, vec![1.0, 0.0]);

    assert_eq!(
        harness.server().agent_stage("alpha"),
        Some(AdmissionStage::Syncing)
    );
}

#[test]
fn mismatched_embedding_is_dropped_without_state_change() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.activate("alpha", ClientConfig::default());
    send_embedded(&mut harness, &mut client, vec![1.0, 0.0]);
    client.receive();

    let before = harness.server().admission_stats();
    send_embedded(&mut harness, &mut client, vec![1.0, 0.0, 0.0]);
    let mut client_events = client.receive();

    let dropped: Vec<_> = client_events
        .read::<rail_client::DroppedEvent>()
        .collect();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].1, rail_shared::DropReason::InvalidEmbedding);
    assert_eq!(harness.server().admission_stats(), before);
}

#[test]
fn release_demotes_and_revokes() {
    init_logging();
    let mut harness = TestServer::new();
    let mut client = harness.activate("alpha", ClientConfig::default());

    harness.server_mut().release_candidate("alpha").unwrap();
    let mut client_events = client.receive();

    assert_eq!(
        client_events.read::<StageChangedEvent>().collect::<Vec<_>>(),
        vec![AdmissionStage::Observed]
    );
    assert_eq!(client.client().capability_token(), None);
    assert_eq!(harness.server().capability_token("alpha"), None);
    assert_eq!(
        harness.server().agent_stage("alpha"),
        Some(AdmissionStage::Observed)
    );
    let session = harness.server().session(&client.connection()).unwrap();
    assert_eq!(session.state, SessionState::Joined);
}
