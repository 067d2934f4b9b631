//! Error types for helmsman.
//!
//! All fallible operations in this crate return [`Result`], which wraps the
//! unified [`HelmsmanError`] type. Adapter implementations (the consensus
//! layer, the embedding application) convert their own failures into
//! [`HelmsmanError::Raft`]; the reconciliation and pruning passes wrap those
//! into operation-specific variants carrying the server they were acting on.

use crate::types::ServerId;
use thiserror::Error;

/// Convenient result alias for helmsman operations.
pub type Result<T> = std::result::Result<T, HelmsmanError>;

/// Main error type for helmsman operations.
#[derive(Error, Debug)]
pub enum HelmsmanError {
    /// A reconciliation pass was started without an observed leader.
    #[error("cannot reconcile voting rights without a known cluster leader")]
    NoLeader,

    /// A leadership transfer was requested to a server that is not in the
    /// observed state.
    #[error("cannot transfer leadership to unknown server {0}")]
    UnknownTransferTarget(ServerId),

    /// The consensus layer rejected a promotion.
    #[error("failed promoting server {id}: {reason}")]
    Promotion { id: ServerId, reason: String },

    /// The consensus layer rejected a demotion.
    #[error("failed demoting server {id}: {reason}")]
    Demotion { id: ServerId, reason: String },

    /// The consensus layer rejected a membership removal.
    #[error("failed removing server {id}: {reason}")]
    Removal { id: ServerId, reason: String },

    /// The consensus layer rejected a leadership transfer.
    #[error("failed transferring leadership to server {id}: {reason}")]
    LeadershipTransfer { id: ServerId, reason: String },

    /// A consensus-layer call failed outside any specific membership change,
    /// e.g. while reading the current configuration.
    #[error("consensus layer error: {0}")]
    Raft(String),

    /// Invalid autopilot configuration.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl HelmsmanError {
    /// Whether the next periodic pass may succeed where this one failed.
    ///
    /// Membership changes are durable in the consensus layer, so there is
    /// nothing to undo; retry is always the driver's job, never this crate's.
    pub fn is_retryable(&self) -> bool {
        match self {
            HelmsmanError::NoLeader
            | HelmsmanError::Promotion { .. }
            | HelmsmanError::Demotion { .. }
            | HelmsmanError::Removal { .. }
            | HelmsmanError::LeadershipTransfer { .. }
            | HelmsmanError::Raft(_) => true,
            HelmsmanError::UnknownTransferTarget(_) | HelmsmanError::InvalidConfig { .. } => false,
        }
    }
}
