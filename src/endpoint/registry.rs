use super::feed_endpoint::{EndpointContext, EndpointStatus, FeedEndpoint};
use crate::directory::{FeedDirectory, FeedSpec};
use crate::queue::FeedId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of applying a desired feed list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.failed == 0
    }
}

/// Set of live endpoints, kept in sync with the feed directory
///
/// `live` maps each feed to its current endpoint. `created` owns every
/// endpoint built and not yet torn down, keyed by instance id; anything in
/// `created` but not reachable from `live` is an orphan. Both maps are only
/// locked for lookups and inserts, never across network calls. Membership
/// changes are serialized by `ops`.
pub struct EndpointRegistry {
    context: EndpointContext,
    live: Mutex<HashMap<FeedId, Arc<FeedEndpoint>>>,
    created: Mutex<HashMap<u64, Arc<FeedEndpoint>>>,
    ops: tokio::sync::Mutex<()>,
}

impl EndpointRegistry {
    pub fn new(context: EndpointContext) -> Self {
        Self {
            context,
            live: Mutex::new(HashMap::new()),
            created: Mutex::new(HashMap::new()),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<FeedId, Arc<FeedEndpoint>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn created(&self) -> MutexGuard<'_, HashMap<u64, Arc<FeedEndpoint>>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &EndpointContext {
        &self.context
    }

    /// Ensure an endpoint exists for `feed`. False only if building it failed.
    pub async fn add(&self, feed: &FeedId, concept: Option<&str>) -> bool {
        let _ops = self.ops.lock().await;
        self.add_unlocked(feed, concept).await
    }

    async fn add_unlocked(&self, feed: &FeedId, concept: Option<&str>) -> bool {
        if self.live().contains_key(feed) {
            log::debug!("Endpoint for {} already exists", feed);
            return true;
        }

        match FeedEndpoint::open(&self.context, feed.clone(), concept).await {
            Ok(endpoint) => {
                self.created().insert(endpoint.instance_id(), endpoint.clone());
                self.live().insert(feed.clone(), endpoint);
                log::info!("➕ Added endpoint for {}", feed);
                true
            }
            Err(e) => {
                log::error!("❌ Failed to add endpoint for {}: {}", feed, e);
                false
            }
        }
    }

    /// Tear down the endpoint for `feed` and drop its queue
    ///
    /// Absent feeds are a successful no-op. The endpoint is forgotten even if
    /// teardown reports an error; the return value says whether it was clean.
    pub async fn remove(&self, feed: &FeedId) -> bool {
        let _ops = self.ops.lock().await;
        self.remove_unlocked(feed).await
    }

    async fn remove_unlocked(&self, feed: &FeedId) -> bool {
        let Some(endpoint) = self.live().remove(feed) else {
            log::debug!("No endpoint for {}, nothing to remove", feed);
            return true;
        };

        let clean = endpoint.shutdown().await;
        self.context.queues.unregister(feed);
        self.created().remove(&endpoint.instance_id());
        log::info!("➖ Removed endpoint for {}", feed);
        clean
    }

    /// Replace the endpoint for `feed` with a fresh one built from the
    /// current preferences, then clean up the replaced instance
    ///
    /// The directory concept of the replaced endpoint is kept. Returns false
    /// when there is nothing to regenerate or the new endpoint fails to build.
    pub async fn regenerate(&self, feed: &FeedId) -> bool {
        let _ops = self.ops.lock().await;

        let Some(old) = self.live().remove(feed) else {
            log::warn!("⚠️  No endpoint for {} to regenerate", feed);
            return false;
        };
        if let Err(e) = old.disconnect().await {
            log::warn!("⚠️  Disconnect of replaced endpoint for {} failed: {}", feed, e);
        }

        let added = self.add_unlocked(feed, old.requested_concept()).await;
        drop(old);

        let orphans = self.detect_orphans_unlocked().await;
        log::info!(
            "♻️  Regenerated endpoint for {} (ok: {}, orphans cleaned: {})",
            feed,
            added,
            orphans
        );
        added
    }

    /// Tear down endpoints that were created but are no longer live
    pub async fn detect_orphans(&self) -> usize {
        let _ops = self.ops.lock().await;
        self.detect_orphans_unlocked().await
    }

    async fn detect_orphans_unlocked(&self) -> usize {
        let live_ids: HashSet<u64> = self.live().values().map(|e| e.instance_id()).collect();
        let orphans: Vec<Arc<FeedEndpoint>> = self
            .created()
            .values()
            .filter(|e| !live_ids.contains(&e.instance_id()))
            .cloned()
            .collect();

        for orphan in &orphans {
            log::warn!(
                "🧹 Cleaning orphan endpoint #{} for {}",
                orphan.instance_id(),
                orphan.feed()
            );
            orphan.shutdown().await;
            self.created().remove(&orphan.instance_id());

            let owned_by_live = self.live().contains_key(orphan.feed());
            if !owned_by_live {
                self.context.queues.unregister(orphan.feed());
            }
        }

        orphans.len()
    }

    /// Pull the desired feeds and apply them
    ///
    /// A directory failure leaves the current endpoints untouched and returns false.
    pub async fn reconcile(&self, directory: &dyn FeedDirectory) -> bool {
        log::info!("🔄 Synchronizing feeds with directory");
        let desired = match directory.desired_feeds().await {
            Ok(desired) => desired,
            Err(e) => {
                log::error!("❌ Feed sync aborted: {}", e);
                return false;
            }
        };

        let report = self.apply(&desired).await;
        if report.is_noop() {
            log::debug!("Feed set unchanged ({} feeds)", desired.len());
        } else {
            log::info!(
                "✅ Feed sync: {} added, {} removed, {} failed",
                report.added,
                report.removed,
                report.failed
            );
        }
        true
    }

    /// Add missing feeds and remove feeds not in `desired`
    pub async fn apply(&self, desired: &[FeedSpec]) -> ReconcileReport {
        let _ops = self.ops.lock().await;
        let mut report = ReconcileReport::default();

        let wanted: HashSet<&FeedId> = desired.iter().map(|spec| &spec.feed).collect();
        for spec in desired {
            if self.live().contains_key(&spec.feed) {
                continue;
            }
            if self.add_unlocked(&spec.feed, spec.concept.as_deref()).await {
                report.added += 1;
            } else {
                report.failed += 1;
            }
        }

        let extra: Vec<FeedId> = self
            .live()
            .keys()
            .filter(|feed| !wanted.contains(feed))
            .cloned()
            .collect();
        for feed in extra {
            self.remove_unlocked(&feed).await;
            report.removed += 1;
        }

        report
    }

    /// Shut down every endpoint, live or orphaned
    pub async fn shutdown_all(&self) {
        let _ops = self.ops.lock().await;
        let feeds: Vec<FeedId> = self.live().keys().cloned().collect();
        log::info!("🛑 Shutting down {} endpoints", feeds.len());

        for feed in feeds {
            self.remove_unlocked(&feed).await;
        }
        self.detect_orphans_unlocked().await;
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        let mut statuses: Vec<EndpointStatus> = self.live().values().map(|e| e.status()).collect();
        statuses.sort_by_key(|s| s.feed.to_string());
        statuses
    }

    pub fn get(&self, feed: &FeedId) -> Option<Arc<FeedEndpoint>> {
        self.live().get(feed).cloned()
    }

    pub fn contains(&self, feed: &FeedId) -> bool {
        self.live().contains_key(feed)
    }

    pub fn feeds(&self) -> Vec<FeedId> {
        self.live().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    /// Endpoints created and not yet torn down, orphans included
    pub fn tracked_count(&self) -> usize {
        self.created().len()
    }
}
