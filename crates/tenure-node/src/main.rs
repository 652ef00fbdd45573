//! Tenure Node binary
//!
//! Runs the tier reconciliation daemon against the configured space.

use tenure_node::{NodeConfig, TenureNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenure_node=info,tenure=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tenure Node");

    let config = NodeConfig::from_env()?;

    let node = TenureNode::new(config).await?;
    node.run().await?;

    Ok(())
}
