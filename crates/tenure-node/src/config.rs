//! Node configuration.
//!
//! Loaded from an optional TOML file named by `TENURE_CONFIG`, then
//! overridden by environment variables:
//!
//! | variable                   | field                |
//! |----------------------------|----------------------|
//! | `TENURE_DATA_DIR`          | `data_dir`           |
//! | `TENURE_TICK_SECS`         | `tick_interval_secs` |
//! | `TENURE_PREREQUISITE_ROLE` | `prerequisite_label` (empty disables the gate) |
//! | `TENURE_ADMIN_SOCKET`      | `admin_socket`       |
//! | `TENURE_SPACE_FIXTURE`     | `space_fixture`      |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tenure_tiers::TierTable;

/// Retry and timeout policy for calls into the space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub attempts: u32,

    /// Pause before a retry, multiplied by the attempt number
    pub backoff_ms: u64,

    /// Upper bound on a single call
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff_ms: 500,
            call_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. For tests and fixtures.
    pub fn immediate() -> Self {
        Self {
            backoff_ms: 0,
            call_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Configuration for a Tenure node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory for the member store and admin socket
    pub data_dir: PathBuf,

    /// Member store file name inside `data_dir`
    pub registry_file: String,

    /// Seconds between reconciliation passes
    pub tick_interval_secs: u64,

    /// Label a member must hold before any tier is granted
    pub prerequisite_label: Option<String>,

    /// Thresholds and labels for each tier
    pub tiers: TierTable,

    /// Policy for calls into the space
    pub retry: RetryPolicy,

    /// Classify and apply as soon as a member joins
    pub reconcile_on_join: bool,

    /// Refresh the registry from a full member listing at the start of a pass
    pub full_scan: bool,

    /// Admin socket path (defaults to `data_dir/admin.sock`)
    pub admin_socket: Option<PathBuf>,

    /// JSON member list served by the in-memory space
    pub space_fixture: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tenure-data"),
            registry_file: "members.json".to_string(),
            tick_interval_secs: 24 * 60 * 60,
            prerequisite_label: Some("Member".to_string()),
            tiers: TierTable::default(),
            retry: RetryPolicy::default(),
            reconcile_on_join: true,
            full_scan: true,
            admin_socket: None,
            space_fixture: None,
        }
    }
}

impl NodeConfig {
    /// Load from `TENURE_CONFIG` (if set) and the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("TENURE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        // TOML has no null; a blank label disables the gate.
        config.prerequisite_label = config
            .prerequisite_label
            .filter(|label| !label.trim().is_empty());
        Ok(config)
    }

    /// Apply `TENURE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TENURE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(secs) = lookup("TENURE_TICK_SECS") {
            self.tick_interval_secs = secs
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid TENURE_TICK_SECS: {:?}", secs)))?;
        }

        if let Some(label) = lookup("TENURE_PREREQUISITE_ROLE") {
            let label = label.trim();
            self.prerequisite_label = (!label.is_empty()).then(|| label.to_string());
        }

        if let Some(path) = lookup("TENURE_ADMIN_SOCKET") {
            self.admin_socket = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("TENURE_SPACE_FIXTURE") {
            self.space_fixture = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(Error::Config("tick_interval_secs must be positive".into()));
        }
        if self.retry.attempts == 0 {
            return Err(Error::Config("retry.attempts must be at least 1".into()));
        }
        if self.registry_file.trim().is_empty() {
            return Err(Error::Config("registry_file must not be empty".into()));
        }
        if let Some(label) = &self.prerequisite_label {
            if self.tiers.is_tier_label(label) {
                return Err(Error::Config(format!(
                    "prerequisite label {:?} is also a tier label",
                    label
                )));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(&self.registry_file)
    }

    pub fn admin_socket_path(&self) -> PathBuf {
        self.admin_socket
            .clone()
            .unwrap_or_else(|| self.data_dir.join("admin.sock"))
    }
}
