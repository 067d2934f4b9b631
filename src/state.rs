//! Building and publishing cluster state snapshots.
//!
//! The builder merges three views into one immutable [`State`]: the
//! consensus layer's membership configuration, the embedding application's
//! server map, and freshly fetched replication statistics. Health is
//! evaluated here and nowhere else; reconciliation and pruning only read it.

use crate::autopilot::Autopilot;
use crate::error::Result;
use crate::raft::Suffrage;
use crate::types::{
    NodeStatus, RaftRole, Server, ServerHealth, ServerId, ServerState, ServerStats, State,
};
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

impl Autopilot {
    /// Rebuild the observed cluster state and publish it atomically.
    ///
    /// A no-op when the application currently supplies no configuration.
    /// Servers present in the consensus configuration but unknown to the
    /// application are tracked with [`NodeStatus::Unknown`] so that the
    /// snapshot always covers the whole membership.
    pub async fn update_state(&self) -> Result<()> {
        let Some(config) = self.application.autopilot_config() else {
            return Ok(());
        };

        let now = self.clock.now();
        let raft_config = self.get_raft_configuration().await?;
        let known = self.application.known_servers();
        let previous = self.latest_state();

        let leader_address = self.raft.leader();
        let leader_last_index = self.raft.last_index();
        let leader_last_term = self
            .raft
            .stats()
            .get("last_log_term")
            .and_then(|term| term.parse().ok())
            .unwrap_or(0);

        // Only servers the application knows can answer a stats RPC.
        let targets: HashMap<ServerId, Server> = raft_config
            .servers
            .iter()
            .filter_map(|raft_srv| {
                known
                    .get(&raft_srv.id)
                    .map(|srv| (raft_srv.id.clone(), srv.clone()))
            })
            .collect();

        let fetched = match tokio::time::timeout(
            self.stats_fetch_timeout(),
            self.application.fetch_server_stats(&targets),
        )
        .await
        {
            Ok(stats) => stats,
            Err(_) => {
                warn!("timed out fetching server statistics; keeping previous values");
                HashMap::new()
            }
        };

        let mut servers: HashMap<ServerId, ServerState> = HashMap::new();
        let mut voters: Vec<ServerId> = Vec::new();
        let mut leader: Option<ServerId> = None;

        for raft_srv in &raft_config.servers {
            let mut server = match known.get(&raft_srv.id) {
                Some(srv) => srv.clone(),
                None => {
                    debug!(id = %raft_srv.id, "consensus configuration carries a server unknown to the application");
                    Server {
                        id: raft_srv.id.clone(),
                        address: raft_srv.address.clone(),
                        node_status: NodeStatus::Unknown,
                        ..Default::default()
                    }
                }
            };

            let is_leader = leader_address.as_deref() == Some(raft_srv.address.as_str());
            server.is_leader = is_leader;

            let role = if is_leader {
                RaftRole::Leader
            } else {
                match raft_srv.suffrage {
                    Suffrage::Voter => RaftRole::Voter,
                    Suffrage::Nonvoter => RaftRole::NonVoter,
                    Suffrage::Staging => RaftRole::Staging,
                }
            };

            let previous_server = previous.servers.get(&raft_srv.id);
            let stats: ServerStats = fetched
                .get(&raft_srv.id)
                .copied()
                .or_else(|| previous_server.map(|prev| prev.stats))
                .unwrap_or_default();

            // Carry the policy's slots forward; the promoter hooks below may
            // overwrite them.
            if let Some(prev) = previous_server {
                server.node_type = prev.server.node_type;
                if server.ext.is_none() {
                    server.ext = prev.server.ext.clone();
                }
            }

            let mut server_state = ServerState {
                server,
                role,
                stats,
                health: ServerHealth::default(),
            };

            let healthy = server_state.is_healthy(leader_last_term, leader_last_index, &config);
            let stable_since = match previous_server {
                Some(prev) if prev.health.healthy == healthy => prev.health.stable_since,
                _ => now,
            };
            server_state.health = ServerHealth::new(healthy, stable_since);

            if is_leader {
                leader = Some(raft_srv.id.clone());
            }
            if server_state.has_voting_rights() {
                voters.push(raft_srv.id.clone());
            }
            servers.insert(raft_srv.id.clone(), server_state);
        }

        let healthy_servers = servers.values().filter(|srv| srv.health.healthy).count();
        let healthy_voters = voters
            .iter()
            .filter(|id| servers.get(*id).is_some_and(|srv| srv.health.healthy))
            .count();
        let quorum = voters.len() / 2 + 1;

        let mut state = State {
            first_state_time: previous.first_state_time.or(Some(now)),
            healthy: !servers.is_empty() && healthy_servers == servers.len(),
            failure_tolerance: healthy_voters.saturating_sub(quorum),
            servers,
            leader,
            voters,
            ext: previous.ext.clone(),
        };

        // Let the promotion policy stamp node types and extension slots.
        let node_types = self.promoter.get_node_types(&config, &state);
        for (id, node_type) in node_types {
            if let Some(srv) = state.servers.get_mut(&id) {
                srv.server.node_type = node_type;
            }
        }

        let ext_updates: Vec<(ServerId, crate::types::Ext)> = state
            .servers
            .iter()
            .filter_map(|(id, srv)| {
                let ext = self.promoter.get_server_ext(&config, srv);
                (!ext.is_none()).then(|| (id.clone(), ext))
            })
            .collect();
        for (id, ext) in ext_updates {
            if let Some(srv) = state.servers.get_mut(&id) {
                srv.server.ext = ext;
            }
        }

        let state_ext = self.promoter.get_state_ext(&config, &state);
        if !state_ext.is_none() {
            state.ext = state_ext;
        }

        gauge!("helmsman_healthy_servers").set(healthy_servers as f64);
        gauge!("helmsman_failure_tolerance").set(state.failure_tolerance as f64);

        let state = Arc::new(state);
        self.state.store(Arc::clone(&state));
        self.application.notify_state(&state);

        Ok(())
    }
}
