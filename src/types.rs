//! Core value model for the autopilot.
//!
//! Everything here is plain data: identity records filled in by the embedding
//! application, per-server statistics and health, and the immutable cluster
//! [`State`] snapshot that reconciliation and pruning passes read. Snapshots
//! are built by the autopilot's state builder and published atomically; the
//! passes never mutate them.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque stable identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self(String::new())
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Liveness of a server as known to the embedding application.
///
/// This is the application's view only; it does not take Raft health, terms,
/// or log indexes into account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Alive,
    Failed,
    Left,
}

impl NodeStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, NodeStatus::Alive)
    }
}

/// Role class assigned to a server by the promotion policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// The server is eligible to hold a vote.
    #[default]
    Voter,
}

/// Role of a server within the consensus layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaftRole {
    /// Not part of the consensus configuration.
    #[default]
    None,
    Leader,
    Voter,
    NonVoter,
    Staging,
}

impl RaftRole {
    /// Whether this role can become a voter without leaving the cluster:
    /// voters and the leader already are, staging servers are on the way.
    pub fn is_potential_voter(&self) -> bool {
        matches!(self, RaftRole::Voter | RaftRole::Leader | RaftRole::Staging)
    }
}

impl fmt::Display for RaftRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaftRole::None => write!(f, "none"),
            RaftRole::Leader => write!(f, "leader"),
            RaftRole::Voter => write!(f, "voter"),
            RaftRole::NonVoter => write!(f, "non-voter"),
            RaftRole::Staging => write!(f, "staging"),
        }
    }
}

/// Opaque extension slot carried through the core for the promotion policy.
///
/// The core never inspects the payload. An unset slot means "do not update":
/// the state builder keeps the previously stored value when a policy hook
/// returns [`Ext::none`].
#[derive(Clone, Default)]
pub struct Ext(Option<Arc<dyn Any + Send + Sync>>);

impl Ext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Downcast the payload to a concrete policy type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref())
    }
}

// The payload is type-erased, so Debug can only say whether the slot is set.
impl fmt::Debug for Ext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Ext(set)"),
            None => f.write_str("Ext(unset)"),
        }
    }
}

/// Identity record for one cluster member.
///
/// The embedding application fills in everything except `node_type` and
/// `ext`, which belong to the promotion policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub address: String,
    pub node_status: NodeStatus,
    pub version: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    pub raft_version: u32,
    pub is_leader: bool,

    /// Role class assigned by the promotion policy.
    pub node_type: NodeType,
    /// Policy-owned extension value.
    #[serde(skip)]
    pub ext: Ext,
}

/// Raft replication statistics for a single server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Time since this server's last contact with the leader. `None` means
    /// the server has never been contacted.
    pub last_contact: Option<Duration>,
    /// Highest leader term this server has a record of in its Raft log.
    pub last_term: u64,
    /// Last log index this server has a record of in its Raft log.
    pub last_index: u64,
}

/// Health of a server according to the active autopilot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealth {
    pub healthy: bool,
    /// When `healthy` last changed value.
    pub stable_since: DateTime<Utc>,
}

impl ServerHealth {
    pub fn new(healthy: bool, stable_since: DateTime<Utc>) -> Self {
        Self {
            healthy,
            stable_since,
        }
    }

    /// Whether the server has been continuously healthy for at least
    /// `min_stable` as of `now`.
    pub fn is_stable(&self, now: DateTime<Utc>, min_stable: Duration) -> bool {
        if !self.healthy {
            return false;
        }
        (now - self.stable_since)
            .to_std()
            .map(|elapsed| elapsed >= min_stable)
            .unwrap_or(false)
    }
}

impl Default for ServerHealth {
    fn default() -> Self {
        Self {
            healthy: false,
            stable_since: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Composite view of one server: identity, consensus role, replication
/// statistics, and evaluated health.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerState {
    pub server: Server,
    pub role: RaftRole,
    pub stats: ServerStats,
    pub health: ServerHealth,
}

impl ServerState {
    /// Whether this server's vote currently counts toward quorum.
    pub fn has_voting_rights(&self) -> bool {
        matches!(self.role, RaftRole::Voter | RaftRole::Leader)
    }

    /// Evaluate the health predicate against the leader's view of the log.
    ///
    /// A server is healthy iff the cluster is bootstrapped, the application
    /// reports it alive, it has been contacted within the configured
    /// threshold, it is on the leader's term, and its log trails by no more
    /// than `max_trailing_logs` entries.
    pub fn is_healthy(
        &self,
        leader_last_term: u64,
        leader_last_index: u64,
        config: &Config,
    ) -> bool {
        if leader_last_index == 0 || leader_last_term == 0 {
            return false;
        }

        if !self.server.node_status.is_alive() {
            return false;
        }

        match self.stats.last_contact {
            Some(contact) if contact <= config.last_contact_threshold => {}
            _ => return false,
        }

        if self.stats.last_term != leader_last_term {
            return false;
        }

        if self.stats.last_index.saturating_add(config.max_trailing_logs) < leader_last_index {
            return false;
        }

        true
    }
}

/// Immutable snapshot of the whole cluster as the autopilot observed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// When the very first snapshot was produced after startup. Governs the
    /// stabilization grace period.
    pub(crate) first_state_time: Option<DateTime<Utc>>,
    /// Whether every tracked server is healthy.
    pub healthy: bool,
    /// How many voters the cluster can lose while retaining quorum, given
    /// current health.
    pub failure_tolerance: usize,
    pub servers: HashMap<ServerId, ServerState>,
    pub leader: Option<ServerId>,
    /// Current voters, in consensus-configuration order.
    pub voters: Vec<ServerId>,
    /// Policy-owned extension value.
    #[serde(skip)]
    pub ext: Ext,
}

impl State {
    pub fn server(&self, id: &ServerId) -> Option<&ServerState> {
        self.servers.get(id)
    }

    /// The server state of the current leader, if one is known.
    pub fn leader_server(&self) -> Option<&ServerState> {
        self.leader.as_ref().and_then(|id| self.servers.get(id))
    }

    /// Effective minimum stability window for promotions.
    ///
    /// Until the autopilot has been running for at least the configured
    /// stabilization time, the window is zero. Otherwise every server would
    /// fail its stability check right after startup, and mass-failing those
    /// checks causes leader churn.
    pub fn stabilization_time(&self, config: &Config, now: DateTime<Utc>) -> Duration {
        let Some(first) = self.first_state_time else {
            return Duration::ZERO;
        };

        let running = (now - first).to_std().unwrap_or(Duration::ZERO);
        if running > config.server_stabilization_time {
            config.server_stabilization_time
        } else {
            Duration::ZERO
        }
    }
}

/// The change set a promotion policy wants applied to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaftChanges {
    /// Servers to grant voting rights, in application order.
    pub promotions: Vec<ServerId>,
    /// Servers to strip voting rights from, in application order.
    pub demotions: Vec<ServerId>,
    /// Desired leader; `None` means no transfer.
    pub leader: Option<ServerId>,
}

impl RaftChanges {
    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.demotions.is_empty() && self.leader.is_none()
    }
}
