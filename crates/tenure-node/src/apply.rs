//! Applying mutation plans to the space.
//!
//! Shared by the scheduler and the ingestor. Error handling per call:
//!
//! - transient: retried per [`RetryPolicy`]; if it still fails the rest of
//!   the member's plan is skipped until the next pass
//! - not found: that single mutation is skipped
//! - forbidden: the [`MutationGate`] closes and no further mutations are
//!   attempted through it
//!
//! Whatever was applied is merged into the registry record as a delta, so a
//! role change recorded concurrently by the ingestor is never overwritten.

use crate::config::RetryPolicy;
use crate::context::{NodeContext, Target};
use crate::events::TierTransition;
use crate::space::ClientError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::future::Future;
use tenure_registry::MemberId;
use tenure_tiers::MutationPlan;
use tracing::{debug, error, info, warn};

/// Run `op` under the retry policy, timing out each attempt.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Transient(format!(
                "timed out after {:?}",
                policy.call_timeout()
            ))),
        };

        match result {
            Err(ClientError::Transient(reason)) if attempt < policy.attempts => {
                debug!(what, attempt, %reason, "Transient failure, retrying");
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Closes for the rest of a pass once the space refuses a mutation.
#[derive(Debug, Default)]
pub struct MutationGate {
    forbidden: Option<String>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.forbidden.is_none()
    }

    fn close(&mut self, reason: String) {
        if self.forbidden.is_none() {
            error!(%reason, "Space refused a role mutation; no further mutations this pass");
            self.forbidden = Some(reason);
        }
    }
}

/// Why a member was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Not in the registry
    Unknown,
    /// Has left the space
    Departed,
    /// Eligible, but no join time is known yet
    NoJoinTime,
    /// Transient failures outlasted the retry policy
    Unreachable(String),
}

/// Result of converging one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Labels already matched the canonical tier.
    Converged,
    /// Some or all of the plan was applied.
    Applied {
        added: BTreeSet<String>,
        removed: BTreeSet<String>,
        /// Mutations skipped because the role does not exist
        missing: usize,
    },
    /// A plan exists but the gate is closed.
    Pending(MutationPlan),
    Skipped(SkipReason),
}

/// Classify, reconcile and apply for one member as of `now`.
pub async fn converge_member(
    ctx: &NodeContext,
    id: &MemberId,
    now: DateTime<Utc>,
    gate: &mut MutationGate,
) -> MemberOutcome {
    let Some(record) = ctx.registry.get(id).await else {
        return MemberOutcome::Skipped(SkipReason::Unknown);
    };
    if record.is_departed() {
        return MemberOutcome::Skipped(SkipReason::Departed);
    }

    let target = match ctx.target(&record, now) {
        Target::Tier(tier) => tier,
        Target::Unknown => return MemberOutcome::Skipped(SkipReason::NoJoinTime),
    };

    let reconciler = ctx.reconciler();
    let plan = reconciler.reconcile(&record.role_labels, target);
    if plan.is_empty() {
        return MemberOutcome::Converged;
    }
    if !gate.is_open() {
        return MemberOutcome::Pending(plan);
    }

    debug!(member = %id, ?target, add = ?plan.add, remove = ?plan.remove, "Applying plan");

    let mut added = BTreeSet::new();
    let mut removed = BTreeSet::new();
    let mut missing = 0;
    let mut unreachable = None;

    let removals = plan.remove.iter().map(|label| (false, label));
    let additions = plan.add.iter().map(|label| (true, label));
    for (grant, label) in removals.chain(additions) {
        let client = &ctx.client;
        let result = with_retry(&ctx.config.retry, label, || async move {
            if grant {
                client.add_role(id, label).await
            } else {
                client.remove_role(id, label).await
            }
        })
        .await;

        match result {
            Ok(()) => {
                if grant {
                    added.insert(label.clone());
                } else {
                    removed.insert(label.clone());
                }
            }
            Err(ClientError::NotFound(reason)) => {
                warn!(member = %id, label = %label, %reason, "Role missing from space, skipping");
                missing += 1;
            }
            Err(ClientError::Forbidden(reason)) => {
                gate.close(reason);
                break;
            }
            Err(ClientError::Transient(reason)) => {
                warn!(member = %id, label = %label, %reason, "Space unreachable, skipping member this pass");
                unreachable = Some(reason);
                break;
            }
        }
    }

    if !added.is_empty() || !removed.is_empty() {
        record_applied(ctx, id, &added, &removed, now).await;
    }

    match unreachable {
        Some(reason) if added.is_empty() && removed.is_empty() => {
            MemberOutcome::Skipped(SkipReason::Unreachable(reason))
        }
        _ if added.is_empty() && removed.is_empty() && !gate.is_open() => {
            MemberOutcome::Pending(plan)
        }
        _ => MemberOutcome::Applied {
            added,
            removed,
            missing,
        },
    }
}

/// Merge applied mutations into the registry and announce a tier change.
///
/// The transition is judged against the record as it stands at merge time,
/// so a concurrent writer that already granted the same tier does not cause
/// a second announcement.
async fn record_applied(
    ctx: &NodeContext,
    id: &MemberId,
    added: &BTreeSet<String>,
    removed: &BTreeSet<String>,
    now: DateTime<Utc>,
) {
    let reconciler = ctx.reconciler();
    let merged = ctx
        .registry
        .update(id, |record| {
            let from = reconciler.held_tier(&record.role_labels);
            record.apply_delta(added, removed);
            let to = reconciler.held_tier(&record.role_labels);
            (record.display_name.clone(), from, to)
        })
        .await;

    let Some((display_name, from, to)) = merged else {
        return;
    };

    if from != to {
        let transition = TierTransition {
            member_id: id.clone(),
            display_name,
            from,
            to,
            at: now,
        };
        info!(member = %id, ?from, ?to, "{}", transition);
        ctx.publish(transition);
    }
}
