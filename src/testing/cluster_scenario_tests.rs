//! End-to-end scenarios against a three-node cluster.
//!
//! These tests drive the public `DistributedCache` API and check membership
//! transitions, replica placement and backing-store fallback together.

#[cfg(test)]
mod tests {
    use crate::config::{ClusterConfig, MembershipConfig, PlacementPolicy};
    use crate::error::Error;
    use crate::replication::MemoryBackingStore;
    use crate::testing::TestCluster;
    use crate::types::{NodeId, NodeState, ReadSource};
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ringcache=debug")
            .with_test_writer()
            .try_init();
    }

    fn three_nodes() -> TestCluster {
        TestCluster::new(
            ClusterConfig::new(2).with_vnodes_per_node(64),
            &["A", "B", "C"],
            64,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_survives_primary_failure() {
        init_tracing();
        let cluster = three_nodes();
        let cache = &cluster.cache;

        cache.put("user1", "Alice").unwrap();
        cache.put("user2", "Bob").unwrap();
        assert_eq!(cache.get("user1").await.unwrap(), Some(Bytes::from("Alice")));

        let replicas = cache.replicas_for("user1").unwrap();
        assert_eq!(replicas.len(), 2);
        let (primary, secondary) = (replicas[0].clone(), replicas[1].clone());

        cache.mark_failed(primary.clone()).unwrap();
        assert_eq!(
            cache.membership().node_state(&primary),
            Some(NodeState::Failed)
        );

        // The old secondary is now first in ring order.
        assert_eq!(cache.replicas_for("user1").unwrap()[0], secondary);
        assert_eq!(cache.get("user1").await.unwrap(), Some(Bytes::from("Alice")));

        cache.remove("user1").unwrap();
        assert_eq!(cache.get("user1").await.unwrap(), None);
        assert_eq!(cache.get("user2").await.unwrap(), Some(Bytes::from("Bob")));

        // Only the removed key fell through to the backing store.
        assert_eq!(cluster.store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_keeps_warm_cache() {
        let cluster = three_nodes();
        let cache = &cluster.cache;

        cache.put("k", "v").unwrap();
        let primary = cache.replicas_for("k").unwrap()[0].clone();

        cache.mark_failed(primary.clone()).unwrap();
        assert!(!cache.replicas_for("k").unwrap().contains(&primary));
        assert!(cluster.holds(&primary, "k"));

        cache.rejoin(primary.clone()).unwrap();
        let report = cache.router().handle_get("k").await.unwrap();
        assert_eq!(report.outcome.value, Some(Bytes::from("v")));
        assert_eq!(report.nodes, vec![primary]);
        assert_eq!(cluster.store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_decommissioned_node_drops_out() {
        let cluster = three_nodes();
        let cache = &cluster.cache;

        cache.put("k", "v").unwrap();
        let primary = cache.replicas_for("k").unwrap()[0].clone();
        cache.remove_node(primary.clone()).unwrap();

        assert!(!cache.membership().contains(&primary));
        assert_eq!(cache.status().nodes.len(), 2);
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from("v")));
        assert!(matches!(
            cache.rejoin(primary),
            Err(Error::Membership(_))
        ));
    }

    #[tokio::test]
    async fn test_all_nodes_failed() {
        let store = MemoryBackingStore::new();
        store.insert("k", "from-store");
        let cluster = TestCluster::with_store(
            ClusterConfig::new(2).with_vnodes_per_node(16),
            &["A", "B", "C"],
            8,
            store,
        )
        .unwrap();
        let cache = &cluster.cache;

        for node in ["A", "B", "C"] {
            cache.mark_failed(node).unwrap();
        }

        assert!(cache.replicas_for("k").unwrap().is_empty());
        assert!(matches!(
            cache.put("k", "v"),
            Err(Error::WriteUnavailable { .. })
        ));
        assert!(cache.remove("k").is_ok());

        // Reads still reach the backing store, with nowhere to fill.
        let report = cache.router().handle_get("k").await.unwrap();
        assert_eq!(report.outcome.value, Some(Bytes::from("from-store")));
        assert_eq!(report.outcome.source, ReadSource::BackingStore);
        assert!(report.outcome.served_by.is_none());

        assert_eq!(cache.metrics().snapshot().put_unavailable, 1);
        assert_eq!(cache.metrics().errors.get("write_unavailable"), 1);
    }

    #[tokio::test]
    async fn test_empty_cluster() {
        let cluster = TestCluster::new(ClusterConfig::new(2), &[], 8).unwrap();
        assert!(matches!(
            cluster.cache.put("k", "v"),
            Err(Error::NoNodesAvailable)
        ));
        assert!(matches!(
            cluster.cache.get("k").await,
            Err(Error::NoNodesAvailable)
        ));
        assert_eq!(cluster.store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_health_checks_confirm_failure() {
        let config = ClusterConfig::new(2)
            .with_vnodes_per_node(32)
            .with_membership_config(MembershipConfig {
                failure_confirmations: 3,
            });
        let cluster = TestCluster::new(config, &["A", "B", "C"], 8).unwrap();
        let membership = cluster.cache.membership();
        let a = NodeId::from("A");

        for _ in 0..2 {
            assert_eq!(membership.record_failed_check(&a).unwrap(), NodeState::Active);
        }
        assert_eq!(membership.record_failed_check(&a).unwrap(), NodeState::Failed);

        for i in 0..50 {
            let key = format!("key-{i}");
            assert!(!cluster.cache.replicas_for(&key).unwrap().contains(&a));
        }
    }

    #[tokio::test]
    async fn test_ttl_expires_across_replicas() {
        let cluster = three_nodes();
        let cache = &cluster.cache;

        cache
            .put_with_ttl("session", "token", Duration::from_millis(30))
            .unwrap();
        assert!(cache.get("session").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rendezvous_placement() {
        let cluster = TestCluster::new(
            ClusterConfig::new(2)
                .with_vnodes_per_node(16)
                .with_placement(PlacementPolicy::Rendezvous),
            &["A", "B", "C", "D"],
            64,
        )
        .unwrap();
        let cache = &cluster.cache;

        let mut primaries = HashSet::new();
        for i in 0..40 {
            let key = format!("key-{i}");
            cache.put(&key, i.to_string()).unwrap();
            let replicas = cache.replicas_for(&key).unwrap();
            assert_eq!(replicas.len(), 2);
            assert_ne!(replicas[0], replicas[1]);
            primaries.insert(replicas[0].clone());
        }
        assert!(primaries.len() > 1);

        cache.mark_failed("A").unwrap();
        for i in 0..40 {
            let key = format!("key-{i}");
            assert_eq!(
                cache.get(&key).await.unwrap(),
                Some(Bytes::from(i.to_string()))
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients() {
        let cluster = Arc::new(
            TestCluster::new(
                ClusterConfig::new(2).with_vnodes_per_node(64),
                &["A", "B", "C"],
                1024,
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for client in 0..8 {
            let cluster = cluster.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("c{client}-k{}", i % 10);
                    cluster.cache.put(&key, format!("{i}")).unwrap();
                    assert!(cluster.cache.get(&key).await.unwrap().is_some());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = cluster.cache.metrics().snapshot();
        assert_eq!(snapshot.put_total, 400);
        assert_eq!(snapshot.get_hits, 400);
        // 80 distinct keys, two replicas each.
        assert_eq!(cluster.cache.status().total_entries(), 160);
    }
}
