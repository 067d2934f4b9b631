//! Helmsman - a membership autopilot for Raft-based clusters.
//!
//! Helmsman runs alongside the leader of a replicated state machine cluster
//! and continuously reconciles cluster membership with operator intent and
//! observed node health: it promotes new servers to voting status once they
//! have proven stable, demotes or removes failed and stale servers without
//! ever sacrificing quorum, and can transfer leadership on request of the
//! promotion policy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Helmsman                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Execution Loop: periodic state update | reconcile | prune  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  State Builder: consensus config x app view x health        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Policy: Promoter trait | StablePromoter reference policy   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Adapters: Raft (consensus) | Application (embedder)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The embedding application supplies two adapters: [`raft::Raft`] over its
//! consensus library and [`application::Application`] over its own view of
//! the cluster. The autopilot periodically joins both views into an
//! immutable [`State`] snapshot, asks the pluggable [`promoter::Promoter`]
//! for the desired change set, and enacts at most one class of membership
//! change per pass to keep the cluster stable while it converges.
//!
//! Helmsman does not implement consensus, persist anything, or expose a
//! network API; it is a control loop meant to be embedded.

pub mod application;
pub mod autopilot;
pub mod config;
pub mod error;
pub mod membership;
pub mod promoter;
pub mod raft;
pub mod time;
pub mod types;

mod prune;
mod reconcile;
mod state;


// Re-exports
pub use autopilot::Autopilot;
pub use config::Config;
pub use error::{HelmsmanError, Result};
pub use types::*;
