//! Pluggable promotion policy.
//!
//! The autopilot decides *when* to apply membership changes; a [`Promoter`]
//! decides *which* changes to apply. The bundled [`StablePromoter`] promotes
//! any server that has proven stable; embedders with richer topologies
//! (read replicas, redundancy zones) supply their own implementation.

use crate::config::Config;
use crate::membership::FailedServers;
use crate::time::{Clock, SystemClock};
use crate::types::{Ext, NodeType, RaftChanges, RaftRole, ServerId, ServerState, State};
use std::collections::HashMap;
use std::sync::Arc;

/// Promotion/demotion strategy for the autopilot core.
///
/// All methods are synchronous and must not block, perform I/O, or mutate
/// their inputs: the autopilot calls them from its pass loop and treats any
/// indefinite wait as a programming error in the policy, not a condition to
/// recover from.
pub trait Promoter: Send + Sync {
    /// Per-server extension value to store on the server's state.
    /// [`Ext::none`] means "do not update".
    fn get_server_ext(&self, _config: &Config, _server: &ServerState) -> Ext {
        Ext::none()
    }

    /// Cluster-wide extension value to store on the state snapshot.
    /// [`Ext::none`] means "do not update".
    fn get_state_ext(&self, _config: &Config, _state: &State) -> Ext {
        Ext::none()
    }

    /// Node types for every server whose type should be updated in the next
    /// snapshot. Servers missing from the map keep their current type.
    fn get_node_types(&self, config: &Config, state: &State) -> HashMap<ServerId, NodeType>;

    /// The membership change set the policy wants applied.
    fn calculate_promotions_and_demotions(&self, config: &Config, state: &State) -> RaftChanges;

    /// Veto pass over pruning candidates: return the subset of `failed` that
    /// may actually be removed.
    fn filter_failed_server_removals(
        &self,
        config: &Config,
        state: &State,
        failed: FailedServers,
    ) -> FailedServers;

    /// Whether servers of this node type may ever become voters.
    fn is_potential_voter(&self, node_type: NodeType) -> bool;
}

/// Reference policy: every server is a potential voter and is promoted as
/// soon as its health has been stable for the effective stabilization window.
///
/// It never demotes, never transfers leadership, and never vetoes a removal.
pub struct StablePromoter {
    clock: Arc<dyn Clock>,
}

impl StablePromoter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use a specific clock, for deterministic stability checks in tests.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for StablePromoter {
    fn default() -> Self {
        Self::new()
    }
}

impl Promoter for StablePromoter {
    fn get_node_types(&self, _config: &Config, state: &State) -> HashMap<ServerId, NodeType> {
        state
            .servers
            .keys()
            .map(|id| (id.clone(), NodeType::Voter))
            .collect()
    }

    fn calculate_promotions_and_demotions(&self, config: &Config, state: &State) -> RaftChanges {
        let now = self.clock.now();
        let min_stable = state.stabilization_time(config, now);

        let mut promotions: Vec<ServerId> = state
            .servers
            .iter()
            .filter(|(_, srv)| {
                srv.role == RaftRole::NonVoter && srv.health.is_stable(now, min_stable)
            })
            .map(|(id, _)| id.clone())
            .collect();
        promotions.sort();

        RaftChanges {
            promotions,
            ..Default::default()
        }
    }

    fn filter_failed_server_removals(
        &self,
        _config: &Config,
        _state: &State,
        failed: FailedServers,
    ) -> FailedServers {
        failed
    }

    fn is_potential_voter(&self, node_type: NodeType) -> bool {
        node_type == NodeType::Voter
    }
}
