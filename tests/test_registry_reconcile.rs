//! Integration tests for endpoint registry reconciliation
//!
//! Key properties tested:
//! - Applying the same desired list twice is a no-op the second time
//! - Feeds dropped from the directory lose their endpoint and queue
//! - A failing directory leaves the endpoint set untouched
//! - Regenerating an endpoint cleans up the replaced instance
//! - A replaced endpoint never publishes while its successor connects
//! - Unreachable feeds are reported as failed without affecting others

mod common;

#[cfg(test)]
mod registry_reconcile_tests {
    use super::common::*;
    use adflow::endpoint::ReconcileReport;
    use adflow::queue::DetectionEvent;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let h = harness(test_preferences(90));
        let desired = vec![spec("cam1", Some("fruit")), spec("cam2", None)];

        let first = h.registry.apply(&desired).await;
        assert_eq!(first, ReconcileReport { added: 2, removed: 0, failed: 0 });
        assert_eq!(h.registry.len(), 2);
        assert_eq!(h.queues.len(), 2);

        let second = h.registry.apply(&desired).await;
        assert!(second.is_noop());
        assert_eq!(h.connector.connects(), 2);

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_dropped_feed_is_removed_with_its_queue() {
        let h = harness(test_preferences(90));
        let directory = ScriptedDirectory::default();
        directory.set(vec![spec("t1", None), spec("t2", None)]);
        assert!(h.registry.reconcile(&directory).await);

        directory.set(vec![spec("t1", None)]);
        assert!(h.registry.reconcile(&directory).await);

        assert!(h.registry.contains(&feed("t1")));
        assert!(!h.registry.contains(&feed("t2")));
        assert!(h.queues.get(&feed("t2")).is_none());
        assert!(h.queues.get(&feed("t1")).is_some());
        assert_eq!(h.registry.tracked_count(), 1);

        let removed = h.connector.link(&feed("t2"));
        assert_eq!(removed.unsubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(removed.disconnects.load(Ordering::SeqCst), 1);

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_directory_failure_keeps_endpoints() {
        let h = harness(test_preferences(90));
        let directory = ScriptedDirectory::default();
        directory.set(vec![spec("cam1", None)]);
        assert!(h.registry.reconcile(&directory).await);

        directory.set(Vec::new());
        directory.failing.store(true, Ordering::SeqCst);
        assert!(!h.registry.reconcile(&directory).await);

        assert!(h.registry.contains(&feed("cam1")));
        assert_eq!(h.connector.link(&feed("cam1")).disconnects.load(Ordering::SeqCst), 0);

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_unreachable_feed_counts_as_failed() {
        let h = harness(test_preferences(90));
        h.connector.set_unreachable(&feed("down"));

        let report = h
            .registry
            .apply(&[spec("cam1", None), spec("down", None)])
            .await;
        assert_eq!(report, ReconcileReport { added: 1, removed: 0, failed: 1 });
        assert!(!h.registry.contains(&feed("down")));
        assert!(h.queues.get(&feed("down")).is_none());

        // Retried on the next cycle
        let report = h
            .registry
            .apply(&[spec("cam1", None), spec("down", None)])
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.added, 0);

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_regenerate_cleans_up_replaced_endpoint() {
        let h = harness(test_preferences(90));
        let cam = feed("cam1");
        assert!(h.registry.add(&cam, Some("fruit")).await);
        let old = h.registry.get(&cam).unwrap();

        // New preferences only reach endpoints built afterwards
        h.preferences.replace(test_preferences(30));
        assert!(h.registry.regenerate(&cam).await);

        let fresh = h.registry.get(&cam).unwrap();
        assert_ne!(fresh.instance_id(), old.instance_id());
        assert_eq!(fresh.min_interval(), Duration::from_secs(30));
        assert_eq!(fresh.concept(), "fruit");
        assert!(!old.monitor_running());
        assert!(fresh.monitor_running());

        // Orphan gone, queue kept for the live endpoint
        assert_eq!(h.registry.tracked_count(), 1);
        assert_eq!(h.registry.detect_orphans().await, 0);
        assert!(h.queues.get(&cam).is_some());

        let links = h.connector.links_for(&cam);
        assert_eq!(links.len(), 2);
        assert!(links[0].disconnects.load(Ordering::SeqCst) >= 1);
        assert_eq!(links[1].disconnects.load(Ordering::SeqCst), 0);

        h.registry.shutdown_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_with_slow_reconnect_keeps_events_for_successor() {
        let h = harness(test_preferences(90));
        let cam = feed("cam1");
        assert!(h.registry.add(&cam, None).await);
        let old = h.connector.link(&cam);
        h.connector.set_connect_delay(Duration::from_secs(5));

        // Detection arrives while the replacement is still connecting
        let (regenerated, queued) = tokio::join!(h.registry.regenerate(&cam), async {
            sleep(Duration::from_secs(1)).await;
            let event = DetectionEvent::new("7", "apple", 0.9, json!([0, 0, 10, 10]));
            h.queues.put(&cam, event)
        });
        assert!(regenerated);
        assert!(queued);

        assert_eq!(old.published().len(), 0);
        assert!(old.disconnects.load(Ordering::SeqCst) >= 1);
        assert!(!h.registry.get(&cam).unwrap().start_monitor());

        let fresh = h.connector.link(&cam);
        assert!(!std::sync::Arc::ptr_eq(&old, &fresh));
        assert!(wait_until(|| fresh.published().len() == 1, Duration::from_secs(10)).await);
        assert_eq!(fresh.published()[0].body["item"]["label_id"], "7");
        assert_eq!(old.published().len(), 0);

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_queue_survives_regenerate() {
        let h = harness(test_preferences(90));
        let cam = feed("cam1");
        assert!(h.registry.add(&cam, None).await);

        h.services.produce_ads.store(false, Ordering::SeqCst);
        h.connector.link(&cam).inject_detection("7", "apple");
        h.connector.link(&cam).inject_detection("7", "apple");
        let queued = h.queues.get(&cam).unwrap();

        assert!(h.registry.regenerate(&cam).await);
        // Same queue instance is still registered
        assert!(std::sync::Arc::ptr_eq(&queued, &h.queues.get(&cam).unwrap()));

        h.registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_statuses_and_shutdown_all() {
        let h = harness(test_preferences(90));
        h.registry
            .apply(&[spec("b", None), spec("a", Some("snacks"))])
            .await;

        let statuses = h.registry.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].feed, feed("a"));
        assert_eq!(statuses[0].concept, "snacks");
        assert_eq!(statuses[1].output_topic, "b_output");

        h.registry.shutdown_all().await;
        assert!(h.registry.is_empty());
        assert_eq!(h.registry.tracked_count(), 0);
        assert!(h.queues.is_empty());
    }
}
