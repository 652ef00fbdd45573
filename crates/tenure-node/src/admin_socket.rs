//! Unix socket server for admin commands.
//!
//! Line-delimited JSON: one [`AdminCommand`] per line in, one
//! [`AdminResponse`] per line out. Used by `tenure-admin` to inspect members
//! and trigger passes on a running node.

use crate::context::{NodeContext, Target};
use crate::error::{Error, Result};
use crate::scheduler::{PassReport, PassRunner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tenure_registry::{MemberId, MemberRecord};
use tenure_tiers::Tier;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Stored record and tier for one member
    MemberInfo { id: MemberId },
    /// Every stored member
    ListMembers,
    /// Run a pass now
    ReconcileNow,
    /// Registry and last pass summary
    Status,
    /// Ping (health check)
    Ping,
}

/// A member as reported over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub id: MemberId,
    pub display_name: String,
    pub joined_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub role_labels: BTreeSet<String>,
    /// Tier label currently held, per stored labels
    pub held_tier: Option<Tier>,
    /// Tier the member qualifies for as of the request
    pub target_tier: Option<Tier>,
}

/// Response from admin command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Error { error: String },
    Member { member: MemberView },
    Members { items: Vec<MemberView> },
    Pass { report: PassReport },
    Status {
        members: usize,
        departed: usize,
        dirty: bool,
        tick_interval_secs: u64,
        prerequisite_label: Option<String>,
        last_pass: Option<PassReport>,
    },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    ctx: Arc<NodeContext>,
    runner: PassRunner,
    socket_path: PathBuf,
}

impl AdminSocket {
    pub fn new(ctx: Arc<NodeContext>, runner: PassRunner, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            runner,
            socket_path: socket_path.into(),
        }
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        // A stale socket from a previous run blocks bind.
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(path = %self.socket_path.display(), "Admin socket listening");

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    let runner = self.runner.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx, runner).await {
                            tracing::error!(error = %e, "Admin connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept admin connection");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: Arc<NodeContext>, runner: PassRunner) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &ctx, &runner).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn view(ctx: &NodeContext, record: MemberRecord, now: DateTime<Utc>) -> MemberView {
    let held_tier = ctx.reconciler().held_tier(&record.role_labels);
    let target_tier = match ctx.target(&record, now) {
        Target::Tier(tier) => tier,
        Target::Unknown => None,
    };
    MemberView {
        id: record.id,
        display_name: record.display_name,
        joined_at: record.joined_at,
        departed_at: record.departed_at,
        role_labels: record.role_labels,
        held_tier,
        target_tier,
    }
}

async fn execute_command(cmd: AdminCommand, ctx: &NodeContext, runner: &PassRunner) -> AdminResponse {
    let now = Utc::now();
    match cmd {
        AdminCommand::MemberInfo { id } => match ctx.registry.get(&id).await {
            Some(record) => AdminResponse::Member {
                member: view(ctx, record, now),
            },
            None => AdminResponse::Error {
                error: format!("Unknown member: {}", id),
            },
        },

        AdminCommand::ListMembers => {
            let items = ctx
                .registry
                .load_all()
                .await
                .into_iter()
                .map(|record| view(ctx, record, now))
                .collect();
            AdminResponse::Members { items }
        }

        AdminCommand::ReconcileNow => match runner.try_run_pass().await {
            Ok(report) => {
                tracing::info!(changed = report.changed, "Pass triggered over admin socket");
                AdminResponse::Pass { report }
            }
            Err(e @ Error::PassInProgress) => AdminResponse::Error {
                error: e.to_string(),
            },
            Err(e) => {
                tracing::error!(error = %e, "Admin-triggered pass failed");
                AdminResponse::Error {
                    error: e.to_string(),
                }
            }
        },

        AdminCommand::Status => {
            let mut members = 0;
            let mut departed = 0;
            ctx.registry
                .for_each(|record| {
                    members += 1;
                    if record.is_departed() {
                        departed += 1;
                    }
                })
                .await;
            AdminResponse::Status {
                members,
                departed,
                dirty: ctx.registry.is_dirty(),
                tick_interval_secs: ctx.config.tick_interval_secs,
                prerequisite_label: ctx.config.prerequisite_label.clone(),
                last_pass: runner.last_report().await,
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}
