//! Basic usage example demonstrating cache operations.
//!
//! Run with: `cargo run --example basic_usage`
//!
//! Requires an Ignite node with the thin-client connector on localhost:10800.

use std::time::Duration;

use ignite_client::{ClientConfigBuilder, ClientSession, ConnectionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Ignite Thin Client Basic Usage Example ===\n");

    let config = ClientConfigBuilder::new()
        .add_address("127.0.0.1:10800".parse()?)
        .connection_timeout(Duration::from_secs(10))
        .build()?;

    println!("Connecting...");
    let session = ClientSession::connect(config).await?;
    println!(
        "Connected to {:?} (state {})\n",
        session.connection_manager().connected_addresses(),
        session.state()
    );

    let mut events = session.subscribe_connection_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ConnectionEvent::Disconnected { address, error, .. } => {
                    println!("[event] lost {} ({:?})", address, error)
                }
                other => println!("[event] {:?}", other),
            }
        }
    });

    println!("--- Cache Operations ---\n");
    let cache = session
        .get_or_create_cache::<i32, String>("example-cache")
        .await?;

    for (key, value) in [(1, "one"), (2, "two"), (3, "three")] {
        cache.put(&key, &value.to_string()).await?;
    }
    println!("Cache size: {}", cache.size().await?);

    for key in [1, 2, 3, 42] {
        match cache.get(&key).await? {
            Some(v) => println!("  {} -> {}", key, v),
            None => println!("  {} -> (not found)", key),
        }
    }

    println!(
        "\nput_if_absent(1): {}",
        cache.put_if_absent(&1, &"uno".to_string()).await?
    );
    println!(
        "replace(2): {}",
        cache.replace(&2, &"dos".to_string()).await?
    );
    println!("get_and_remove(3): {:?}", cache.get_and_remove(&3).await?);

    println!("\nScan:");
    for (key, value) in cache.scan().await? {
        println!("  {} -> {}", key, value);
    }

    println!("\nCaches: {:?}", session.cache_names().await?);

    cache.clear().await?;
    session.destroy_cache("example-cache").await?;
    session.close().await?;
    println!("\nSession closed.");
    Ok(())
}
