//! Tenure node - wires the components together.
//!
//! Architecture:
//! - One shared registry and space client, held by [`NodeContext`]
//! - Scheduler task running periodic passes
//! - Event ingestor fed by an mpsc channel from the platform adapter
//! - Unix admin socket for local inspection (tenure-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::context::NodeContext;
use crate::error::{Error, Result};
use crate::events::TierTransition;
use crate::ingest::EventIngestor;
use crate::memory::MemorySpace;
use crate::scheduler::{PassRunner, Scheduler};
use crate::space::{SpaceClient, SpaceEvent};
use crate::NodeConfig;
use std::future::Future;
use std::sync::Arc;
use tenure_registry::Registry;
use tokio::sync::{broadcast, mpsc, watch};

/// Buffered space events awaiting ingestion.
const EVENT_CAPACITY: usize = 1024;

/// A Tenure node instance.
pub struct TenureNode {
    ctx: Arc<NodeContext>,
    events_tx: mpsc::Sender<SpaceEvent>,
    events_rx: mpsc::Receiver<SpaceEvent>,
}

impl TenureNode {
    /// Create a node backed by the fixture named in the config.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let fixture = config.space_fixture.clone().ok_or_else(|| {
            Error::Config("no space configured; set TENURE_SPACE_FIXTURE".into())
        })?;
        let space = MemorySpace::load_fixture(&fixture)?;
        tracing::info!(fixture = %fixture.display(), "Loaded space fixture");
        Self::with_client(config, Arc::new(space)).await
    }

    /// Create a node talking to `client`.
    pub async fn with_client(config: NodeConfig, client: Arc<dyn SpaceClient>) -> Result<Self> {
        config.validate()?;

        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let registry = Arc::new(Registry::open(config.registry_path()).await?);
        let ctx = Arc::new(NodeContext::new(registry, client, config));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        Ok(Self {
            ctx,
            events_tx,
            events_rx,
        })
    }

    pub fn context(&self) -> Arc<NodeContext> {
        Arc::clone(&self.ctx)
    }

    /// Sender for platform events.
    pub fn events(&self) -> mpsc::Sender<SpaceEvent> {
        self.events_tx.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Run until `signal` completes, then stop every task and flush.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = &self.ctx.config;
        tracing::info!("Tenure node starting");
        tracing::info!("  Data: {:?}", config.data_dir);
        tracing::info!("  Admin: {:?}", config.admin_socket_path());
        tracing::info!("  Tick: {:?}", config.tick_interval());
        tracing::info!("  Prerequisite: {:?}", config.prerequisite_label);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = PassRunner::new(Arc::clone(&self.ctx));

        let admin_socket = AdminSocket::new(
            Arc::clone(&self.ctx),
            runner.clone(),
            config.admin_socket_path(),
        );
        let admin_task = tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!(error = %e, "Admin socket error");
            }
        });

        let announcer = tokio::spawn(log_transitions(self.ctx.subscribe(), shutdown_rx.clone()));

        let ingestor = EventIngestor::new(Arc::clone(&self.ctx));
        let ingest_task = tokio::spawn(ingestor.run(self.events_rx, shutdown_rx));

        let mut scheduler = Scheduler::new(runner, config.tick_interval());
        scheduler.start()?;

        signal.await;
        tracing::info!("Shutdown requested");

        let _ = shutdown_tx.send(true);
        if let Err(e) = scheduler.stop().await {
            tracing::warn!(error = %e, "Scheduler was not running at shutdown");
        }
        for task in [ingest_task, announcer] {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Task ended abnormally");
            }
        }
        admin_task.abort();
        let _ = std::fs::remove_file(config.admin_socket_path());

        self.ctx.registry.flush().await?;
        tracing::info!("Tenure node stopped");
        Ok(())
    }
}

/// Short description of a transition for the log.
fn headline(transition: &TierTransition) -> &'static str {
    if transition.is_welcome() {
        "Member welcomed"
    } else if transition.is_promotion() {
        "Member promoted"
    } else if transition.to.is_none() {
        "Member tier removed"
    } else {
        "Member tier lowered"
    }
}

/// Log tier transitions until shutdown.
async fn log_transitions(
    mut transitions: broadcast::Receiver<TierTransition>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = transitions.recv() => match received {
                Ok(transition) if transition.is_promotion() => tracing::info!(
                    member = %transition.member_id,
                    name = %transition.display_name,
                    to = ?transition.to,
                    "{}",
                    headline(&transition)
                ),
                Ok(transition) => tracing::debug!(
                    member = %transition.member_id,
                    to = ?transition.to,
                    "{}",
                    headline(&transition)
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Transition log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
