use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::{debug, warn};

use rail_shared::RailMessage;

use crate::plugins::PluginError;

/// External notification layer. Every hook is fire-and-forget from the rail's
/// point of view: errors and panics are logged and never reach a client.
pub trait PluginSink: Send {
    fn name(&self) -> &str;

    fn on_broadcast(&mut self, message: &RailMessage) -> Result<(), PluginError>;

    fn on_coherence(&mut self, coherence: f64, coupling: f64) -> Result<(), PluginError>;

    /// Called for every accepted directed or undirected message
    fn on_trace(&mut self, message: &RailMessage) -> Result<(), PluginError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum PluginNotification {
    Broadcast(RailMessage),
    Coherence { coherence: f64, coupling: f64 },
    Trace(RailMessage),
}

type SinkList = Arc<Mutex<Vec<Box<dyn PluginSink>>>>;

fn lock_sinks(sinks: &SinkList) -> MutexGuard<'_, Vec<Box<dyn PluginSink>>> {
    sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Queues notifications in order and hands them to every registered sink in
/// batches
pub struct PluginHub {
    sinks: SinkList,
    pending: VecDeque<PluginNotification>,
    budget: Duration,
}

impl PluginHub {
    pub fn new(budget: Duration) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(Vec::new())),
            pending: VecDeque::new(),
            budget,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn PluginSink>) {
        debug!("plugins: registered {}", sink.name());
        lock_sinks(&self.sinks).push(sink);
    }

    pub fn sink_count(&self) -> usize {
        lock_sinks(&self.sinks).len()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub(crate) fn push(&mut self, notification: PluginNotification) {
        self.pending.push_back(notification);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Takes every queued notification as a batch that can be delivered on
    /// another thread
    pub fn take_batch(&mut self) -> PluginBatch {
        PluginBatch {
            sinks: self.sinks.clone(),
            notifications: self.pending.drain(..).collect(),
            budget: self.budget,
        }
    }

    /// Delivers everything queued on the calling thread
    pub fn flush(&mut self) -> Vec<PluginError> {
        self.take_batch().deliver()
    }
}

pub struct PluginBatch {
    sinks: SinkList,
    notifications: Vec<PluginNotification>,
    budget: Duration,
}

impl PluginBatch {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Delivers each notification to each sink in order, isolating failures
    /// per call. Returns the failures, which have already been logged.
    pub fn deliver(self) -> Vec<PluginError> {
        let mut failures = Vec::new();
        if self.notifications.is_empty() {
            return failures;
        }

        let started = Instant::now();
        let mut sinks = lock_sinks(&self.sinks);
        for notification in &self.notifications {
            for sink in sinks.iter_mut() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| match notification {
                    PluginNotification::Broadcast(message) => sink.on_broadcast(message),
                    PluginNotification::Coherence {
                        coherence,
                        coupling,
                    } => sink.on_coherence(*coherence, *coupling),
                    PluginNotification::Trace(message) => sink.on_trace(message),
                }));
                let error = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => error,
                    Err(_) => PluginError::Panicked {
                        plugin: sink.name().to_string(),
                    },
                };
                warn!("plugins: {}", error);
                failures.push(error);
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            warn!(
                "plugins: batch of {} took {:?}, budget {:?}",
                self.notifications.len(),
                elapsed,
                self.budget
            );
        }
        failures
    }
}
