//! Walk a three-node cluster through a failure, a rejoin and a backing-store
//! fallback.
//!
//! Run with `RUST_LOG=ringcache=debug cargo run --example basic`.

use ringcache::{ClusterConfig, DistributedCache, MemoryBackingStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringcache=info")),
        )
        .init();

    let store = Arc::new(MemoryBackingStore::new().with_latency(Duration::from_millis(20)));
    store.insert("user2", "Bob");

    let config = ClusterConfig::new(2)
        .with_default_node_capacity(1000)
        .with_backing_store_timeout(Duration::from_millis(200));
    let cache = DistributedCache::with_backing_store(config, store.clone())?;

    for node in ["A", "B", "C"] {
        cache.add_node(node)?;
    }

    let put = cache.router().handle_put("user1", "Alice")?;
    println!("put user1 -> {:?}", put.nodes);

    let primary = put.nodes[0].clone();
    cache.mark_failed(primary.clone())?;
    let get = cache.router().handle_get("user1").await?;
    println!(
        "get user1 with {primary} down -> {:?} from {:?}",
        get.outcome.value, get.nodes
    );

    cache.rejoin(primary)?;

    let get = cache.router().handle_get("user2").await?;
    println!(
        "get user2 -> {:?} via {} (store reads: {})",
        get.outcome.value,
        get.outcome.source.as_str(),
        store.read_count()
    );

    cache.remove("user1")?;
    println!("get user1 after remove -> {:?}", cache.get("user1").await?);

    let status = cache.status();
    for node in &status.nodes {
        println!(
            "{} {} positions={} entries={} hit_rate={:.2}",
            node.node_id,
            node.state,
            node.ring_positions,
            node.stats.entry_count,
            node.stats.hit_rate()
        );
    }

    print!("{}", cache.metrics().to_prometheus());
    Ok(())
}
