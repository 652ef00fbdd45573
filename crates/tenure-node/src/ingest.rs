//! Space event ingestion.
//!
//! Folds [`SpaceEvent`]s into the registry as they arrive. Joins are
//! optionally converged straight away so a newcomer does not wait for the
//! next tick; role changes only update the stored labels and are acted on
//! by the next pass.

use crate::apply::{converge_member, MemberOutcome, MutationGate};
use crate::context::NodeContext;
use crate::error::Result;
use crate::space::SpaceEvent;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct EventIngestor {
    ctx: Arc<NodeContext>,
}

impl EventIngestor {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }

    /// Apply one event to the registry.
    pub async fn handle(&self, event: SpaceEvent) -> Result<()> {
        let registry = &self.ctx.registry;
        let id = event.member_id().clone();

        match event {
            SpaceEvent::MemberJoined(snapshot) => {
                if snapshot.is_bot {
                    debug!(member = %id, "Ignoring bot join");
                    return Ok(());
                }
                let replaced = registry
                    .upsert(&id, |record| snapshot.absorb_into(record))
                    .await;
                match replaced {
                    Some(previous) => info!(
                        member = %id,
                        %previous,
                        current = ?snapshot.joined_at,
                        "Member rejoined, join time replaced"
                    ),
                    None => info!(member = %id, name = %snapshot.display_name, "Member joined"),
                }
                registry.flush().await?;

                if self.ctx.config.reconcile_on_join {
                    let mut gate = MutationGate::new();
                    let outcome = converge_member(&self.ctx, &id, Utc::now(), &mut gate).await;
                    if let MemberOutcome::Skipped(reason) = &outcome {
                        debug!(member = %id, ?reason, "Join not converged");
                    }
                }
            }

            SpaceEvent::RolesChanged {
                display_name,
                roles,
                is_bot,
                ..
            } => {
                if is_bot {
                    return Ok(());
                }
                registry
                    .upsert(&id, |record| {
                        record.set_roles(roles);
                        if let Some(name) = display_name {
                            record.display_name = name;
                        }
                    })
                    .await;
                debug!(member = %id, "Roles updated");
            }

            SpaceEvent::MemberLeft { .. } => {
                if registry.mark_departed(&id, Utc::now()).await {
                    info!(member = %id, "Member left");
                } else {
                    debug!(member = %id, "Departure of unknown member");
                }
            }
        }

        registry.flush().await?;
        Ok(())
    }

    /// Consume events until the channel closes or shutdown is signaled.
    ///
    /// Events already queued when shutdown arrives are still recorded.
    pub async fn run(self, mut events: mpsc::Receiver<SpaceEvent>, mut shutdown: watch::Receiver<bool>) {
        info!("Event ingestor started");
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.ingest(event).await;
                }
            }
        }

        events.close();
        let mut drained = 0;
        while let Ok(event) = events.try_recv() {
            self.ingest(event).await;
            drained += 1;
        }
        info!(drained, "Event ingestor stopped");
    }

    async fn ingest(&self, event: SpaceEvent) {
        if let Err(e) = self.handle(event).await {
            warn!(error = %e, "Failed to ingest event");
        }
    }
}
