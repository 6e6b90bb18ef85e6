//! Basic Usage Example
//!
//! Demonstrates the core tiercache workflow:
//! 1. Build a coordinator from the default three-tier config
//! 2. Write and read values, including JSON
//! 3. Invalidate by tag and cascade through dependencies
//! 4. Use an advisory lock and a transaction
//! 5. Inspect statistics and shut down
//!
//! Set `TIERCACHE_LOG=debug` to see the coordinator's tracing output.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiercache_engine::{
    init_tracing, CacheConfig, CacheCoordinator, CacheResult, GetOptions, InvalidateRequest,
    KeyMatcher, PatternRule, SetOptions, TransactionOp,
};

#[derive(Debug, Serialize, Deserialize)]
struct Profile {
    name: String,
    plan: String,
}

#[tokio::main]
async fn main() -> CacheResult<()> {
    init_tracing();
    println!("=== tiercache Basic Usage Example ===\n");

    // Step 1: Coordinator with memory, remote and disk tiers
    let config = CacheConfig::default().with_encryption(true);
    let cache = CacheCoordinator::new(config).await?;
    println!("✓ Coordinator started");
    println!("  Tiers: {}", cache.tier_names().join(" -> "));
    println!("  Strategy: {}", cache.config().strategy);

    // Step 2: Values and JSON
    cache.add_pattern(
        PatternRule::new("sessions", KeyMatcher::regex("^session:")?)
            .with_ttl(Duration::from_secs(900))
            .with_tags(["session"]),
    );
    cache
        .set("session:abc", b"token", SetOptions::new())
        .await?;
    cache
        .set_json(
            "profile:1",
            &Profile {
                name: "ada".to_string(),
                plan: "pro".to_string(),
            },
            SetOptions::new()
                .with_tags(["profile"])
                .with_dependencies(["session:abc"]),
        )
        .await?;

    let profile: Option<Profile> = cache.get_json("profile:1", GetOptions::new()).await?;
    println!("\n✓ Values written");
    println!("  profile:1 = {:?}", profile);

    // Step 3: Tag invalidation removes the session and its dependent profile
    let removed = cache
        .invalidate(InvalidateRequest::tags(["session"]))
        .await?;
    println!("\n✓ Invalidated by tag: {} tier entries", removed);
    println!(
        "  profile:1 after cascade = {:?}",
        cache.get("profile:1", GetOptions::new()).await
    );

    // Step 4: Lock and transaction
    let lock_id = cache.lock("report", Duration::from_secs(5)).await?;
    let tx = cache.begin_transaction().await;
    cache
        .add_to_transaction(tx, TransactionOp::set("report", b"v1".to_vec()))
        .await?;
    cache
        .add_to_transaction(tx, TransactionOp::set("report:meta", b"draft".to_vec()))
        .await?;
    cache.commit_transaction(tx).await?;
    cache.unlock("report", lock_id).await?;
    println!("\n✓ Transaction {} committed", tx);

    // Step 5: Statistics
    let stats = cache.get_statistics().await;
    println!("\n✓ Statistics");
    println!("  Hits: {}  Misses: {}", stats.hits, stats.misses);
    println!("  Hit rate: {:.2}", stats.hit_rate);
    println!("  Items: {}  Bytes: {}", stats.item_count, stats.total_size);

    cache.shutdown().await;
    println!("\n=== Example Complete ===");
    Ok(())
}
