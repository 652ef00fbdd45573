//! Periodic reconciliation passes.
//!
//! A pass refreshes the registry from a full member listing, then walks a
//! snapshot of registry ids and converges each member. Passes never overlap:
//! the [`PassRunner`] holds a pass lock for the duration of a pass, and the
//! timer loop skips ticks missed while a pass ran.
//!
//! The [`Scheduler`] owns the timer task. `start()` spawns it and `stop()`
//! signals shutdown and waits for it. A pass that is running when shutdown
//! is signaled finishes the member it is on and returns.

use crate::apply::{converge_member, with_retry, MemberOutcome, MutationGate, SkipReason};
use crate::context::NodeContext;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Instant the pass classified against
    pub as_of: DateTime<Utc>,
    /// Members returned by the listing, or `None` if it failed
    pub listed: Option<usize>,
    /// Registry members visited
    pub visited: usize,
    pub converged: usize,
    pub changed: usize,
    pub skipped: usize,
    /// Members with a plan that could not be applied because mutations were refused
    pub pending: usize,
    pub labels_added: usize,
    pub labels_removed: usize,
    /// Mutations skipped because the role does not exist in the space
    pub labels_missing: usize,
    /// Members newly marked as departed
    pub departed: usize,
    /// The space refused mutations during this pass
    pub forbidden: bool,
    /// Shutdown stopped the pass early
    pub interrupted: bool,
}

/// Runs reconciliation passes, one at a time.
#[derive(Clone)]
pub struct PassRunner {
    ctx: Arc<NodeContext>,
    pass_lock: Arc<Mutex<()>>,
    last_report: Arc<RwLock<Option<PassReport>>>,
}

impl PassRunner {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self {
            ctx,
            pass_lock: Arc::new(Mutex::new(())),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    /// Report of the most recent completed pass.
    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().await.clone()
    }

    /// Run a pass as of `now`, waiting for any pass in flight to finish.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;
        self.execute(now, None).await
    }

    /// Run a pass now unless one is already in flight.
    pub async fn try_run_pass(&self) -> Result<PassReport> {
        let _pass = self.pass_lock.try_lock().map_err(|_| Error::PassInProgress)?;
        self.execute(Utc::now(), None).await
    }

    async fn run_until(&self, now: DateTime<Utc>, shutdown: &watch::Receiver<bool>) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;
        self.execute(now, Some(shutdown)).await
    }

    async fn execute(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<PassReport> {
        let mut report = PassReport {
            as_of: now,
            ..Default::default()
        };

        let stopping = || shutdown.is_some_and(|rx| *rx.borrow());

        if stopping() {
            info!("Shutdown requested before pass started");
            report.interrupted = true;
            self.ctx.registry.flush().await?;
            return Ok(report);
        }

        if self.ctx.config.full_scan {
            self.sync_listing(now, &mut report).await;
            if let Err(e) = self.ctx.registry.flush().await {
                warn!(error = %e, "Registry flush after listing failed, continuing pass");
            }
        }

        let mut gate = MutationGate::new();
        for id in self.ctx.registry.ids().await {
            if stopping() {
                info!(visited = report.visited, "Shutdown requested, ending pass early");
                report.interrupted = true;
                break;
            }

            let outcome = converge_member(&self.ctx, &id, now, &mut gate).await;
            match outcome {
                MemberOutcome::Skipped(SkipReason::Departed) => continue,
                MemberOutcome::Skipped(reason) => {
                    debug!(member = %id, ?reason, "Member skipped");
                    report.skipped += 1;
                }
                MemberOutcome::Converged => report.converged += 1,
                MemberOutcome::Pending(_) => report.pending += 1,
                MemberOutcome::Applied {
                    added,
                    removed,
                    missing,
                } => {
                    report.changed += 1;
                    report.labels_added += added.len();
                    report.labels_removed += removed.len();
                    report.labels_missing += missing;
                }
            }
            report.visited += 1;
        }
        report.forbidden = !gate.is_open();

        self.ctx.registry.flush().await?;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Refresh the registry from the space's own member list.
    ///
    /// On failure the pass carries on with last-known registry data.
    async fn sync_listing(&self, now: DateTime<Utc>, report: &mut PassReport) {
        let client = &self.ctx.client;
        let listing = with_retry(&self.ctx.config.retry, "list_members", || async move {
            client.list_members().await
        })
        .await;

        let members = match listing {
            Ok(members) => members,
            Err(e) => {
                warn!(error = %e, "Member listing failed, using last-known registry data");
                return;
            }
        };
        report.listed = Some(members.len());

        let registry = &self.ctx.registry;
        let mut present = BTreeSet::new();
        for snapshot in members {
            present.insert(snapshot.id.clone());
            if snapshot.is_bot {
                continue;
            }
            let replaced = registry
                .upsert(&snapshot.id, |record| snapshot.absorb_into(record))
                .await;
            if let Some(previous) = replaced {
                info!(
                    member = %snapshot.id,
                    %previous,
                    current = ?snapshot.joined_at,
                    "Join time corrected from space record"
                );
            }
        }

        for id in registry.ids().await {
            if present.contains(&id) {
                continue;
            }
            let newly_departed = registry
                .update(&id, |record| {
                    let fresh = record.departed_at.is_none();
                    if fresh {
                        record.departed_at = Some(now);
                    }
                    fresh
                })
                .await
                .unwrap_or(false);
            if newly_departed {
                info!(member = %id, "Member no longer in space, marked departed");
                report.departed += 1;
            }
        }
    }
}

/// Lifecycle state of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
        }
    }
}

/// Drives passes on a fixed interval.
pub struct Scheduler {
    runner: PassRunner,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runner: PassRunner, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runner,
            interval,
            shutdown_tx,
            task: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.task {
            Some(task) if !task.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Spawn the timer loop. The first pass runs immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.state() == SchedulerState::Running {
            return Err(Error::AlreadyRunning);
        }

        self.shutdown_tx.send_replace(false);
        let shutdown = self.shutdown_tx.subscribe();
        let runner = self.runner.clone();
        let interval = self.interval;

        info!(interval = ?interval, "Scheduler starting");
        self.task = Some(tokio::spawn(run_loop(runner, interval, shutdown)));
        Ok(())
    }

    /// Signal shutdown and wait for the loop to exit.
    ///
    /// No new pass starts once this is called; a pass in flight stops after
    /// the member it is working on.
    pub async fn stop(&mut self) -> Result<()> {
        let task = match self.task.take() {
            Some(task) if !task.is_finished() => task,
            _ => return Err(Error::NotRunning),
        };

        self.shutdown_tx.send_replace(true);
        if let Err(e) = task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        info!("Scheduler stopped");
        Ok(())
    }
}

async fn run_loop(runner: PassRunner, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                match runner.run_until(Utc::now(), &shutdown).await {
                    Ok(report) => info!(
                        visited = report.visited,
                        changed = report.changed,
                        added = report.labels_added,
                        removed = report.labels_removed,
                        skipped = report.skipped,
                        pending = report.pending,
                        "Reconciliation pass complete"
                    ),
                    Err(e) => error!(error = %e, "Reconciliation pass failed"),
                }
            }
        }
    }
}
