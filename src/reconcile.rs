//! Reconciling voting rights against the promotion policy's intent.
//!
//! A reconciliation pass applies at most one class of membership change:
//! promotions, or demotions, or a leadership transfer, in that order of
//! preference. Overlapping membership changes and leader transitions
//! compound churn, so a pass that promoted anything stops there and leaves
//! demotions to a later pass, and likewise for demotions versus transfers.

use crate::autopilot::Autopilot;
use crate::error::{HelmsmanError, Result};
use crate::types::{RaftChanges, RaftRole, State};
use metrics::counter;
use tracing::{debug, info};

impl Autopilot {
    /// Calculate and apply the promotion policy's desired changes.
    ///
    /// A no-op when reconciliation is disabled or the application supplies
    /// no configuration. Fails with [`HelmsmanError::NoLeader`] when the
    /// observed state has no leader: without one there is no meaningful
    /// answer about voting rights.
    pub async fn reconcile(&self) -> Result<()> {
        if !self.reconciliation_enabled() {
            return Ok(());
        }

        let Some(config) = self.application.autopilot_config() else {
            return Ok(());
        };

        let state = self.latest_state();
        if state.leader.is_none() {
            return Err(HelmsmanError::NoLeader);
        }

        let changes = self
            .promoter
            .calculate_promotions_and_demotions(&config, &state);
        if !changes.is_empty() {
            debug!(
                promotions = changes.promotions.len(),
                demotions = changes.demotions.len(),
                leader = ?changes.leader,
                "promotion policy requested changes"
            );
        }

        // One class of change per pass: promotions shut out demotions, and
        // either shuts out a leadership transfer.
        if self.apply_promotions(&state, &changes).await? {
            return Ok(());
        }

        if self.apply_demotions(&state, &changes).await? {
            return Ok(());
        }

        let Some(target) = changes.leader else {
            return Ok(());
        };
        if Some(&target) == state.leader.as_ref() {
            return Ok(());
        }

        let Some(srv) = state.servers.get(&target) else {
            return Err(HelmsmanError::UnknownTransferTarget(target));
        };

        info!(id = %target, address = %srv.server.address, "transferring cluster leadership");
        self.leadership_transfer(&target, &srv.server.address)
            .await
            .map_err(|error| HelmsmanError::LeadershipTransfer {
                id: target.clone(),
                reason: error.to_string(),
            })?;
        counter!("helmsman_leadership_transfers_total").increment(1);

        Ok(())
    }

    /// Apply the change set's promotions in order. Returns whether at least
    /// one server was promoted.
    ///
    /// Skipped silently: servers missing from the state (the policy answered
    /// from a stale view), servers that already vote (a policy may return
    /// full target membership without diffing), and unhealthy servers.
    async fn apply_promotions(&self, state: &State, changes: &RaftChanges) -> Result<bool> {
        let mut promoted = false;

        for id in &changes.promotions {
            let Some(srv) = state.servers.get(id) else {
                debug!(%id, "ignoring promotion of server missing from the observed state");
                continue;
            };

            if srv.has_voting_rights() {
                debug!(%id, "not promoting server that already has voting rights");
                continue;
            }

            if !srv.health.healthy {
                debug!(%id, "ignoring promotion of unhealthy server");
                continue;
            }

            info!(
                %id,
                address = %srv.server.address,
                name = %srv.server.name,
                "promoting server to voter"
            );

            self.add_voter(id, &srv.server.address)
                .await
                .map_err(|error| HelmsmanError::Promotion {
                    id: id.clone(),
                    reason: error.to_string(),
                })?;

            counter!("helmsman_promotions_total").increment(1);
            promoted = true;
        }

        Ok(promoted)
    }

    /// Apply the change set's demotions in order. Returns whether at least
    /// one server was demoted.
    async fn apply_demotions(&self, state: &State, changes: &RaftChanges) -> Result<bool> {
        let mut demoted = false;

        for id in &changes.demotions {
            let Some(srv) = state.servers.get(id) else {
                debug!(%id, "ignoring demotion of server missing from the observed state");
                continue;
            };

            if srv.role == RaftRole::NonVoter {
                debug!(%id, "ignoring demotion of server that is already a non-voter");
                continue;
            }

            info!(
                %id,
                address = %srv.server.address,
                name = %srv.server.name,
                "demoting server to non-voter"
            );

            self.demote_voter(id)
                .await
                .map_err(|error| HelmsmanError::Demotion {
                    id: id.clone(),
                    reason: error.to_string(),
                })?;

            counter!("helmsman_demotions_total").increment(1);
            demoted = true;
        }

        Ok(demoted)
    }
}
