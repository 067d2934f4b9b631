//! Consensus-layer adapter.
//!
//! The autopilot never talks to a concrete Raft implementation directly. It
//! calls through the [`Raft`] trait, which mirrors the handful of membership
//! and introspection operations a leader-based consensus library exposes.
//! Taking a trait instead of a concrete type also allows dependency injection
//! in tests.

use crate::error::Result;
use crate::types::ServerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Suffrage of a server in the consensus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suffrage {
    Voter,
    Nonvoter,
    Staging,
}

impl Suffrage {
    pub fn is_voter(&self) -> bool {
        matches!(self, Suffrage::Voter)
    }
}

/// One entry of the consensus membership configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftServer {
    pub id: ServerId,
    pub address: String,
    pub suffrage: Suffrage,
}

/// The consensus layer's current membership configuration, in log order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfiguration {
    pub servers: Vec<RaftServer>,
}

/// Operational state of the local consensus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftNodeState {
    Follower,
    Candidate,
    Leader,
    Shutdown,
}

/// Interface over the consensus layer.
///
/// `prev_index = 0` and `timeout = Duration::ZERO` ask the implementation to
/// use its own defaults; the autopilot core always passes those unless the
/// embedder configured otherwise. Implementations should surface failures as
/// [`HelmsmanError::Raft`](crate::error::HelmsmanError::Raft).
#[async_trait]
pub trait Raft: Send + Sync {
    /// Add the server as a voting member; resolves to the config log index.
    async fn add_voter(
        &self,
        id: &ServerId,
        address: &str,
        prev_index: u64,
        timeout: Duration,
    ) -> Result<u64>;

    /// Add the server as a non-voting (replicating) member.
    async fn add_nonvoter(
        &self,
        id: &ServerId,
        address: &str,
        prev_index: u64,
        timeout: Duration,
    ) -> Result<u64>;

    /// Strip the server's voting rights, leaving it a non-voter.
    async fn demote_voter(&self, id: &ServerId, prev_index: u64, timeout: Duration) -> Result<u64>;

    /// Remove the server from the membership configuration entirely.
    async fn remove_server(&self, id: &ServerId, prev_index: u64, timeout: Duration)
        -> Result<u64>;

    /// Read the current membership configuration.
    async fn get_configuration(&self) -> Result<RaftConfiguration>;

    /// Hand leadership to the given server.
    async fn leadership_transfer_to_server(&self, id: &ServerId, address: &str) -> Result<()>;

    /// Index of the newest entry in the local log.
    fn last_index(&self) -> u64;

    /// Address of the current leader, if known.
    fn leader(&self) -> Option<String>;

    /// Free-form diagnostic counters; `last_log_term` is the one the
    /// autopilot reads.
    fn stats(&self) -> HashMap<String, String>;

    /// Operational state of the local node.
    fn state(&self) -> RaftNodeState;
}
