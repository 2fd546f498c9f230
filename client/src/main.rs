//! roost-tail - follow a BaaS collection and log every change.
//!
//! Reads `ROOST_*` variables (see `ClientConfig::from_env`) plus
//! `ROOST_COLLECTION`, `ROOST_FILTER` and `ROOST_EXPAND`, then runs until
//! Ctrl-C.

use std::env;

use roost_client::{BaasClient, ClientConfig, LiveQuery, LiveQueryConfig};
use roost_engine::CollectionChange;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roost_client=debug,roost_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = ClientConfig::from_env()?;
    let query = query_from_env();

    tracing::info!(
        base_url = %config.base_url,
        collection = %query.collection,
        "Starting roost-tail"
    );

    let client = BaasClient::new(config)?;

    // Listen before starting so the seed and early changes are logged too.
    let collection = query.new_collection();
    collection.on_change(|change| match change {
        CollectionChange::Inserted(record) => {
            tracing::info!(record_id = %record.id, "Inserted")
        }
        CollectionChange::Updated { current, .. } => {
            tracing::info!(record_id = %current.id, "Updated")
        }
        CollectionChange::Removed(record) => {
            tracing::info!(record_id = %record.id, "Removed")
        }
        CollectionChange::Reset { len } => tracing::info!(total = len, "Reset"),
    });

    let mut live = LiveQuery::start_with(&client, query, collection).await?;

    for record in live.records() {
        let fields = serde_json::Value::Object(record.fields);
        tracing::info!(record_id = %record.id, fields = %fields, "Seeded");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    live.stop();

    Ok(())
}

fn query_from_env() -> LiveQueryConfig {
    let collection = env::var("ROOST_COLLECTION").unwrap_or_else(|_| "messages".to_string());
    let mut query = LiveQueryConfig::new(collection).sort("created");

    if let Ok(filter) = env::var("ROOST_FILTER") {
        query = query.filter(filter);
    }
    if let Ok(expand) = env::var("ROOST_EXPAND") {
        query = query.expand(expand);
    }
    query
}
