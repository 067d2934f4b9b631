//! Autopilot configuration.

use crate::error::{HelmsmanError, Result};
use crate::types::Ext;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All the tunables of the autopilot.
///
/// The embedding application owns loading and hot-reloading this; the
/// autopilot re-reads it through [`Application::autopilot_config`] on every
/// pass, so changes take effect at the next tick.
///
/// [`Application::autopilot_config`]: crate::application::Application::autopilot_config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Whether to prune dead servers from the cluster.
    pub cleanup_dead_servers: bool,

    /// How long a server can go without leader contact before being
    /// considered unhealthy.
    pub last_contact_threshold: Duration,

    /// How many log entries a server can trail the leader by before being
    /// considered unhealthy.
    pub max_trailing_logs: u64,

    /// Minimum number of voters that must remain in the cluster. Pruning
    /// never removes a server below this number.
    pub min_quorum: u32,

    /// How long a server must be continuously healthy before it can be
    /// promoted to voter.
    pub server_stabilization_time: Duration,

    /// Policy-owned extension value.
    #[serde(skip)]
    pub ext: Ext,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cleanup_dead_servers: true,
            last_contact_threshold: Duration::from_millis(200),
            max_trailing_logs: 250,
            min_quorum: 0,
            server_stabilization_time: Duration::from_secs(10),
            ext: Ext::none(),
        }
    }
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.last_contact_threshold.is_zero() {
            return Err(HelmsmanError::InvalidConfig {
                field: "last_contact_threshold".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        if self.max_trailing_logs == 0 {
            return Err(HelmsmanError::InvalidConfig {
                field: "max_trailing_logs".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}
