//! Periodic feed synchronization

use crate::directory::FeedDirectory;
use crate::endpoint::EndpointRegistry;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Reconcile the endpoint set against the directory every `sync_interval`
///
/// The first cycle runs immediately. A failed cycle keeps the current
/// endpoints and waits for the next tick. Runs until `cancel` fires.
pub async fn sync_scheduler_task(
    registry: Arc<EndpointRegistry>,
    directory: Arc<dyn FeedDirectory>,
    sync_interval: Duration,
    cancel: CancellationToken,
) {
    log::info!("⏰ Starting feed sync scheduler (interval: {}s)", sync_interval.as_secs());

    let mut timer = interval(sync_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles: u64 = 0;
    let mut failures: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        cycles += 1;
        let ok = tokio::select! {
            _ = cancel.cancelled() => break,
            ok = registry.reconcile(directory.as_ref()) => ok,
        };
        if !ok {
            failures += 1;
            log::warn!("⚠️  Feed sync cycle {} failed ({} failures so far)", cycles, failures);
        }
    }

    log::info!("⏰ Feed sync scheduler stopped after {} cycles", cycles);
}
