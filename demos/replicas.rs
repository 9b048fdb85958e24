//! Replica Example
//!
//! Three replicas edit the same keys, then converge through operation
//! relay and state merge.
//!
//! Run with: cargo run --example replicas

use std::sync::Arc;

use lwwdict_core::{ReplicaManager, ReplicaName};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("lwwdict Replica Example\n");

    println!("=== Operation Relay ===\n");
    relay_example().await?;

    println!("\n=== State Merge ===\n");
    merge_example()?;

    Ok(())
}

async fn relay_example() -> Result<(), Box<dyn std::error::Error>> {
    let manager: Arc<ReplicaManager<String>> = Arc::new(ReplicaManager::new());

    let laptop = ReplicaName::new("laptop")?;
    let phone = ReplicaName::new("phone")?;
    manager.create(laptop.clone())?;
    manager.create(phone.clone())?;

    // Deliver every recorded operation to the other replicas
    let mut deltas = manager.subscribe();
    let relay = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut applied = 0;
            for _ in 0..3 {
                match deltas.recv().await {
                    Ok(delta) => applied += manager.relay(&delta),
                    Err(_) => break,
                }
            }
            applied
        })
    };

    manager.add(&laptop, "title", "Draft".to_string())?;
    manager.add(&phone, "author", "Sam".to_string())?;
    manager.remove(&laptop, "author", "Sam".to_string())?;

    println!("Relayed operations changed {} replicas", relay.await?);

    for meta in manager.list(None) {
        let replica = manager.get(&meta.name)?;
        println!("  {} -> {:?}", meta.name, replica.projection());
    }

    Ok(())
}

fn merge_example() -> Result<(), Box<dyn std::error::Error>> {
    let manager: ReplicaManager<String> = ReplicaManager::new();

    for (name, title) in [("eu:1", "Bonjour"), ("eu:2", "Hallo"), ("us:1", "Hello")] {
        let name = ReplicaName::new(name)?;
        manager.get_or_create(name.clone());
        manager.add(&name, "greeting", title.to_string())?;
    }

    let summary = manager.sync_all();
    println!(
        "sync_all applied {} additions, {} removals",
        summary.additions_applied, summary.removals_applied
    );

    // Every replica now sees the most recent greeting
    for meta in manager.list(Some("*")) {
        let replica = manager.get(&meta.name)?;
        println!("  {} -> {:?}", meta.name, replica.get("greeting"));
    }

    let stats = manager.stats();
    println!("\n{} replicas, {} subscribers", stats.replica_count, stats.subscriber_count);

    Ok(())
}
