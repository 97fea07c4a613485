use std::{future::Future, time::Duration};

use log::{info, warn};

use crate::{RailEvents, RailServer};

/// Drives the server from a tokio runtime until `shutdown` resolves.
///
/// Every `poll_interval` the server is drained with [`RailServer::receive`]
/// and the resulting events are handed to `on_events`. Queued plugin
/// notifications are then delivered on the blocking pool; a batch that runs
/// past the plugin budget is logged and left to finish on its own, it never
/// holds up the rail.
pub async fn run<F, S>(mut server: RailServer, poll_interval: Duration, mut on_events: F, shutdown: S)
where
    F: FnMut(&mut RailServer, RailEvents),
    S: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("rail running, polling every {:?}", poll_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("rail shutting down");
                break;
            }
        }

        let events = server.receive();
        if !events.is_empty() {
            on_events(&mut server, events);
        }

        let batch = server.take_plugin_batch();
        if batch.is_empty() {
            continue;
        }
        let budget = server.plugin_budget();
        let delivery = tokio::task::spawn_blocking(move || batch.deliver());
        match tokio::time::timeout(budget, delivery).await {
            Ok(Ok(failures)) => {
                if !failures.is_empty() {
                    warn!("plugins: {} notifications failed", failures.len());
                }
            }
            Ok(Err(e)) => warn!("plugins: delivery task failed: {}", e),
            Err(_) => warn!("plugins: delivery exceeded {:?}, continuing", budget),
        }
    }

    // Last notifications, on the way out
    let failures = server.flush_plugins();
    if !failures.is_empty() {
        warn!("plugins: {} notifications failed during shutdown", failures.len());
    }
}
