//! Tenure Node - membership tier daemon
//!
//! Keeps each member's tier role in a community space in step with how long
//! they have belonged to it.
//!
//! # Architecture
//!
//! - **Space**: the [`SpaceClient`] seam and an in-memory implementation
//! - **Scheduler**: periodic full passes (list, classify, reconcile, apply)
//! - **Ingest**: join, role-change and leave events folded into the registry
//! - **Events**: tier transitions broadcast to announcers
//! - **Admin Socket**: Unix socket for local inspection (tenure-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use tenure_node::{NodeConfig, TenureNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = TenureNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod apply;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ingest;
pub mod memory;
pub mod node;
pub mod scheduler;
pub mod space;

#[cfg(test)]
mod testing;

pub use config::{NodeConfig, RetryPolicy};
pub use context::NodeContext;
pub use error::{Error, Result};
pub use events::TierTransition;
pub use ingest::EventIngestor;
pub use memory::{MemorySpace, RoleCall};
pub use node::TenureNode;
pub use scheduler::{PassReport, PassRunner, Scheduler, SchedulerState};
pub use space::{ClientError, MemberSnapshot, SpaceClient, SpaceEvent};
