//! Shared node context.
//!
//! Built once at startup and handed to the scheduler, the ingestor and the
//! admin socket. Holds the registry, the space client, the reconciler built
//! from the configured tier table, and the transition broadcaster.

use crate::config::NodeConfig;
use crate::events::TierTransition;
use crate::space::SpaceClient;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tenure_registry::{MemberRecord, Registry};
use tenure_tiers::{elapsed_days, Reconciler, Tier};
use tokio::sync::broadcast;

/// Capacity of the transition channel.
const TRANSITION_CAPACITY: usize = 256;

/// What classification decided for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Converge on this tier, or on no tier.
    Tier(Option<Tier>),
    /// Eligible, but the join time is unknown; leave tier labels alone.
    Unknown,
}

pub struct NodeContext {
    pub registry: Arc<Registry>,
    pub client: Arc<dyn SpaceClient>,
    pub config: NodeConfig,
    reconciler: Reconciler,
    transitions: broadcast::Sender<TierTransition>,
}

impl NodeContext {
    pub fn new(registry: Arc<Registry>, client: Arc<dyn SpaceClient>, config: NodeConfig) -> Self {
        let reconciler = Reconciler::new(config.tiers.clone());
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            registry,
            client,
            config,
            reconciler,
            transitions,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Subscribe to tier transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<TierTransition> {
        self.transitions.subscribe()
    }

    pub(crate) fn publish(&self, transition: TierTransition) {
        // No subscribers is fine.
        let _ = self.transitions.send(transition);
    }

    /// Whether the record satisfies the eligibility gate.
    pub fn prerequisite_present(&self, record: &MemberRecord) -> bool {
        match &self.config.prerequisite_label {
            Some(label) => record.has_label(label),
            None => true,
        }
    }

    /// Classify a record as of `now`.
    pub fn target(&self, record: &MemberRecord, now: DateTime<Utc>) -> Target {
        if !self.prerequisite_present(record) {
            return Target::Tier(None);
        }
        match record.joined_at {
            Some(joined_at) => Target::Tier(
                self.reconciler
                    .table()
                    .classify(elapsed_days(joined_at, now), true),
            ),
            None => Target::Unknown,
        }
    }
}
