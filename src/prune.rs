//! Pruning dead servers from the cluster.

use crate::autopilot::Autopilot;
use crate::error::{HelmsmanError, Result};
use crate::membership::{categorize_servers, FailureClass};
use metrics::counter;
use tracing::{debug, info};

impl Autopilot {
    /// Remove stale and failed servers, most expendable first.
    ///
    /// A no-op when reconciliation is disabled, no configuration is active,
    /// or dead-server cleanup is switched off. Removal proceeds in strictly
    /// increasing precedence of risk: stale non-voters, stale voters, failed
    /// non-voters, failed voters. Stale servers leave through the consensus
    /// layer; failed servers are known to the application, which is
    /// authoritative over liveness and may need side effects, so those leave
    /// through [`Application::remove_failed_server`]. Every class except
    /// stale non-voters is gated by the quorum-safety adjudication in
    /// [`CategorizedServers::adjudicate_removals`]. A hard error on any
    /// removal aborts the pass; the next tick starts over from a fresh
    /// categorization.
    ///
    /// [`Application::remove_failed_server`]: crate::application::Application::remove_failed_server
    /// [`CategorizedServers::adjudicate_removals`]: crate::membership::CategorizedServers::adjudicate_removals
    pub async fn prune_dead_servers(&self) -> Result<()> {
        if !self.reconciliation_enabled() {
            return Ok(());
        }

        let Some(config) = self.application.autopilot_config() else {
            return Ok(());
        };
        if !config.cleanup_dead_servers {
            return Ok(());
        }

        let raft_config = self.get_raft_configuration().await?;
        // One snapshot of the application's view for the whole pass, so both
        // failed classes see the same servers.
        let known = self.application.known_servers();
        let mut servers = categorize_servers(&raft_config, &known);

        let state = self.latest_state();

        // Give the promotion policy its veto over every removal candidate.
        let failed = servers.to_failed_servers(&state);
        let failed = self
            .promoter
            .filter_failed_server_removals(&config, &state, failed);
        servers.retain_filtered(&failed);

        // Stale non-voters hold no vote, so they are reaped without quorum
        // adjudication; the policy filter above was their only gate.
        let stale_non_voters: Vec<_> = servers.stale_non_voters.keys().cloned().collect();
        for id in stale_non_voters {
            debug!(%id, "removing stale non-voting server");
            self.remove_server(&id)
                .await
                .map_err(|error| HelmsmanError::Removal {
                    id: id.clone(),
                    reason: error.to_string(),
                })?;
            counter!("helmsman_removals_total").increment(1);
        }

        for id in servers.adjudicate_removals(FailureClass::StaleVoter, config.min_quorum) {
            info!(%id, "removing stale voting server");
            self.remove_server(&id)
                .await
                .map_err(|error| HelmsmanError::Removal {
                    id: id.clone(),
                    reason: error.to_string(),
                })?;
            counter!("helmsman_removals_total").increment(1);
        }

        for id in servers.adjudicate_removals(FailureClass::FailedNonVoter, config.min_quorum) {
            if let Some(srv) = known.get(&id) {
                info!(%id, "asking the application to remove failed non-voting server");
                self.application.remove_failed_server(srv);
                counter!("helmsman_removals_total").increment(1);
            }
        }

        for id in servers.adjudicate_removals(FailureClass::FailedVoter, config.min_quorum) {
            if let Some(srv) = known.get(&id) {
                info!(%id, "asking the application to remove failed voting server");
                self.application.remove_failed_server(srv);
                counter!("helmsman_removals_total").increment(1);
            }
        }

        Ok(())
    }
}
