//! Collaborators around the rail: plugin sinks, trace store and vault

use std::sync::{Arc, Mutex};

use rail_client::ClientConfig;
use rail_server::{
    plugins::{PluginError, PluginSink},
    trace_store::{MemoryTraceStore, TraceQuery},
    vault::{MemoryVault, Vault, VaultError},
    ConnectEvent, RejectEvent, VAULT_SECRET_PREFIX,
};
use rail_shared::{AgentId, MessageKind, Payload, RailMessage};
use rail_test::{TestClient, TestServer};

fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
}

impl PluginSink for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_broadcast(&mut self, message: &RailMessage) -> Result<(), PluginError> {
        self.log.lock().unwrap().push(format!("broadcast {}", message.id));
        Ok(())
    }

    fn on_coherence(&mut self, _coherence: f64, _coupling: f64) -> Result<(), PluginError> {
        self.log.lock().unwrap().push("coherence".to_string());
        Ok(())
    }

    fn on_trace(&mut self, message: &RailMessage) -> Result<(), PluginError> {
        self.log.lock().unwrap().push(format!("trace {}", message.id));
        Ok(())
    }
}

struct Broken;

impl PluginSink for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn on_broadcast(&mut self, _message: &RailMessage) -> Result<(), PluginError> {
        panic!("broadcast hook exploded");
    }

    fn on_coherence(&mut self, _coherence: f64, _coupling: f64) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_trace(&mut self, message: &RailMessage) -> Result<(), PluginError> {
        Err(PluginError::Failed {
            plugin: self.name().to_string(),
            reason: format!("cannot index {}", message.id),
        })
    }
}

#[test]
fn sinks_see_traces_broadcasts_and_coherence_in_order() {
    init_logging();
    let mut harness = TestServer::new();
    let log: Log = Arc::default();
    harness.server_mut().add_plugin(Box::new(Broken));
    harness
        .server_mut()
        .add_plugin(Box::new(Recorder { log: log.clone() }));

    let mut alpha = harness.activate("alpha", ClientConfig::default());
    // Activation traffic is not under test
    harness.server_mut().flush_plugins();
    log.lock().unwrap().clear();

    let note = alpha
        .client_mut()
        .send_message(MessageKind::Percept, None, Payload::Text("note".into()), None)
        .unwrap();
    let message = alpha
        .client_mut()
        .new_message(MessageKind::Halt, Payload::Text("stop".into()));
    let shout = alpha.client_mut().broadcast(message).unwrap();
    harness.advance(100);
    harness.receive();

    let failures = harness.server_mut().flush_plugins();
    assert_eq!(
        failures,
        vec![
            PluginError::Failed {
                plugin: "broken".into(),
                reason: format!("cannot index {}", note),
            },
            PluginError::Panicked {
                plugin: "broken".into(),
            },
        ]
    );
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            format!("trace {}", note),
            format!("broadcast {}", shout),
            "coherence".to_string(),
        ]
    );

    // Nothing is delivered twice
    assert!(harness.server_mut().flush_plugins().is_empty());
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn plugin_batches_can_be_delivered_elsewhere() {
    init_logging();
    let mut harness = TestServer::new();
    let log: Log = Arc::default();
    harness
        .server_mut()
        .add_plugin(Box::new(Recorder { log: log.clone() }));
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);

    alpha
        .client_mut()
        .send_message(MessageKind::Act, None, Payload::Text("work".into()), None)
        .unwrap();
    harness.receive();

    let batch = harness.server_mut().take_plugin_batch();
    assert_eq!(batch.len(), 1);
    let failures = std::thread::spawn(move || batch.deliver()).join().unwrap();
    assert!(failures.is_empty());
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn traces_are_searchable_by_similarity() {
    init_logging();
    let mut harness = TestServer::new();
    harness
        .server_mut()
        .set_trace_store(Box::new(MemoryTraceStore::new()));
    let mut alpha = harness.connect("alpha", ClientConfig::default());
    harness.join(&mut alpha);

    let mut send = |text: &str, embedding: Option<Vec<f32>>| {
        alpha
            .client_mut()
            .send_message(MessageKind::Think, None, Payload::Text(text.into()), embedding)
            .unwrap()
    };
    let east = send("east", Some(vec![1.0, 0.0]));
    let north = send("north", Some(vec![0.0, 1.0]));
    let plain = send("plain", None);
    harness.receive();

    let ranked = harness.server().search_traces(&TraceQuery {
        embedding: Some(vec![1.0, 0.1]),
        limit: 5,
    });
    let ids: Vec<_> = ranked.iter().map(|trace| trace.message_id.clone()).collect();
    assert_eq!(ids, vec![east, north]);
    assert_eq!(ranked[0].content, "east");
    assert_eq!(ranked[0].agent_id, AgentId::new("alpha"));

    let recent = harness.server().search_traces(&TraceQuery {
        embedding: None,
        limit: 1,
    });
    assert_eq!(recent[0].message_id, plain);
}

#[test]
fn search_without_a_store_finds_nothing() {
    let harness = TestServer::new();
    let found = harness.server().search_traces(&TraceQuery {
        embedding: None,
        limit: 10,
    });
    assert!(found.is_empty());
}

#[derive(Clone, Default)]
struct SharedVault(Arc<Mutex<MemoryVault>>);

impl Vault for SharedVault {
    fn store(&mut self, key: &str, value: &str) -> Result<(), VaultError> {
        self.0.lock().unwrap().store(key, value)
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>, VaultError> {
        self.0.lock().unwrap().retrieve(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, VaultError> {
        self.0.lock().unwrap().list(prefix)
    }

    fn delete(&mut self, key: &str) -> Result<bool, VaultError> {
        self.0.lock().unwrap().delete(key)
    }
}

#[test]
fn registrations_survive_a_restart_through_the_vault() {
    init_logging();
    let vault = SharedVault::default();

    let mut first = TestServer::new();
    first.server_mut().set_vault(Box::new(vault.clone()));
    let secret = first
        .server_mut()
        .register_agent(&AgentId::new("alpha"))
        .unwrap();
    let stored = vault.list(VAULT_SECRET_PREFIX).unwrap();
    assert_eq!(stored, vec![format!("{}alpha", VAULT_SECRET_PREFIX)]);

    let mut second = TestServer::new();
    second.server_mut().set_vault(Box::new(vault.clone()));
    assert!(!second.server().is_registered("alpha"));
    assert_eq!(second.server_mut().restore_registrations().unwrap(), 1);
    assert!(second.server().is_registered("alpha"));

    let mut client = TestClient::connect(second.hub(), "alpha", &secret, ClientConfig::default());
    let (mut server_events, _) = second.join(&mut client);
    assert!(server_events.has::<ConnectEvent>());
    assert!(!server_events.has::<RejectEvent>());

    assert!(second.server_mut().unregister_agent("alpha"));
    assert!(vault.list(VAULT_SECRET_PREFIX).unwrap().is_empty());
}
