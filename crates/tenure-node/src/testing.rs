//! Fixtures shared by unit tests.

use crate::config::{NodeConfig, RetryPolicy};
use crate::context::NodeContext;
use crate::memory::MemorySpace;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tenure_registry::Registry;
use tenure_tiers::TierTable;
use tempfile::TempDir;

pub(crate) fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub(crate) fn days(n: i64) -> DateTime<Utc> {
    t0() + Duration::days(n)
}

pub(crate) fn space() -> Arc<MemorySpace> {
    Arc::new(MemorySpace::with_tiers(&TierTable::default(), ["Member", "Moderator"]))
}

pub(crate) struct Harness {
    pub dir: TempDir,
    pub space: Arc<MemorySpace>,
    pub ctx: Arc<NodeContext>,
}

pub(crate) async fn harness() -> Harness {
    harness_with(NodeConfig::default()).await
}

pub(crate) async fn harness_with(mut config: NodeConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    config.data_dir = dir.path().to_path_buf();
    config.retry = RetryPolicy::immediate();

    let registry = Arc::new(Registry::open(config.registry_path()).await.unwrap());
    let space = space();
    let ctx = Arc::new(NodeContext::new(registry, space.clone(), config));
    Harness { dir, space, ctx }
}
