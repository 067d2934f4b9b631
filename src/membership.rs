//! Membership categorization and removal safety.
//!
//! A pruning pass starts by cross-joining two views of the cluster: the
//! consensus layer's membership configuration and the embedding
//! application's server map. Every server lands in exactly one of six
//! disjoint buckets (stale/failed/healthy x voter/non-voter), and removals
//! are then adjudicated bucket by bucket against the cluster's failure
//! tolerance and the configured minimum quorum.

use crate::raft::RaftConfiguration;
use crate::types::{NodeType, Server, ServerId, State};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Whether a server can vote now, and whether it could ever vote.
///
/// `current_voter` reflects the consensus layer's suffrage. A freshly built
/// eligibility mirrors suffrage into `potential_voter` as well: until the
/// application's view is applied, suffrage is the only available signal of
/// intent. The categorizer overwrites `potential_voter` with the promotion
/// policy's node type for every server the application knows; stale servers
/// keep the mirrored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterEligibility {
    current_voter: bool,
    potential_voter: bool,
}

impl VoterEligibility {
    pub fn new(current_voter: bool) -> Self {
        Self {
            current_voter,
            potential_voter: current_voter,
        }
    }

    pub fn is_current_voter(&self) -> bool {
        self.current_voter
    }

    pub fn is_potential_voter(&self) -> bool {
        self.potential_voter
    }

    pub fn set_potential_voter(&mut self, potential: bool) {
        self.potential_voter = potential;
    }
}

/// Bucket contents, ordered by server ID.
///
/// The ordered map is a contract, not a convenience: enumeration order is
/// observable through adapter call order and through which server survives
/// when failure tolerance runs out, so it must be reproducible across runs
/// and platforms.
pub type EligibilityMap = BTreeMap<ServerId, VoterEligibility>;

/// The four bucket classes a removal can be adjudicated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    StaleNonVoter,
    StaleVoter,
    FailedNonVoter,
    FailedVoter,
}

/// Disjoint partition of the cluster's servers for one pruning pass.
///
/// *Stale* servers appear in the consensus configuration but are unknown to
/// the application. *Failed* servers are known to both but reported not
/// alive. *Healthy* servers are known to both and alive.
#[derive(Debug, Clone, Default)]
pub struct CategorizedServers {
    pub stale_non_voters: EligibilityMap,
    pub stale_voters: EligibilityMap,
    pub failed_non_voters: EligibilityMap,
    pub failed_voters: EligibilityMap,
    pub healthy_non_voters: EligibilityMap,
    pub healthy_voters: EligibilityMap,
}

/// Flat view of the removable servers, handed to the promotion policy so it
/// can veto individual removals.
#[derive(Debug, Clone, Default)]
pub struct FailedServers {
    pub stale_non_voters: Vec<ServerId>,
    pub stale_voters: Vec<ServerId>,
    pub failed_non_voters: Vec<Server>,
    pub failed_voters: Vec<Server>,
}

/// The maximum number of voters a cluster of `nodes` voters can lose while
/// still holding elections.
pub fn failure_tolerance(nodes: usize) -> i64 {
    (nodes as i64 - 1) / 2
}

/// Whether removing one voter still leaves at least `min_quorum` voters.
pub fn is_removal_quorate(voters: usize, min_quorum: u32) -> bool {
    voters as i64 - 1 >= i64::from(min_quorum)
}

/// Cross-join the consensus configuration with the application's server map.
///
/// Servers the application reports but the consensus layer does not carry
/// are skipped entirely; membership is the consensus layer's call.
pub fn categorize_servers(
    raft_config: &RaftConfiguration,
    known: &HashMap<ServerId, Server>,
) -> CategorizedServers {
    let mut raft_servers: EligibilityMap = raft_config
        .servers
        .iter()
        .map(|srv| (srv.id.clone(), VoterEligibility::new(srv.suffrage.is_voter())))
        .collect();

    let mut categorized = CategorizedServers::default();

    for (id, srv) in known {
        let Some(mut eligibility) = raft_servers.remove(id) else {
            continue;
        };

        eligibility.set_potential_voter(srv.node_type == NodeType::Voter);

        let bucket = match (srv.node_status.is_alive(), eligibility.is_current_voter()) {
            (true, true) => &mut categorized.healthy_voters,
            (true, false) => &mut categorized.healthy_non_voters,
            (false, true) => &mut categorized.failed_voters,
            (false, false) => &mut categorized.failed_non_voters,
        };
        bucket.insert(id.clone(), eligibility);
    }

    // Whatever the application did not claim is stale.
    for (id, eligibility) in raft_servers {
        if eligibility.is_current_voter() {
            categorized.stale_voters.insert(id, eligibility);
        } else {
            categorized.stale_non_voters.insert(id, eligibility);
        }
    }

    categorized
}

impl CategorizedServers {
    /// Number of servers that vote now or that could be promoted to voting
    /// status, across every bucket.
    pub fn potential_voters(&self) -> usize {
        self.buckets()
            .flat_map(|bucket| bucket.values())
            .filter(|eligibility| eligibility.is_potential_voter())
            .count()
    }

    fn buckets(&self) -> impl Iterator<Item = &EligibilityMap> {
        [
            &self.stale_non_voters,
            &self.stale_voters,
            &self.failed_non_voters,
            &self.failed_voters,
            &self.healthy_non_voters,
            &self.healthy_voters,
        ]
        .into_iter()
    }

    fn bucket(&self, class: FailureClass) -> &EligibilityMap {
        match class {
            FailureClass::StaleNonVoter => &self.stale_non_voters,
            FailureClass::StaleVoter => &self.stale_voters,
            FailureClass::FailedNonVoter => &self.failed_non_voters,
            FailureClass::FailedVoter => &self.failed_voters,
        }
    }

    fn bucket_mut(&mut self, class: FailureClass) -> &mut EligibilityMap {
        match class {
            FailureClass::StaleNonVoter => &mut self.stale_non_voters,
            FailureClass::StaleVoter => &mut self.stale_voters,
            FailureClass::FailedNonVoter => &mut self.failed_non_voters,
            FailureClass::FailedVoter => &mut self.failed_voters,
        }
    }

    /// Project the removable buckets into the flat DTO the promotion policy
    /// filters. Healthy buckets are not removable and stay behind.
    pub fn to_failed_servers(&self, state: &State) -> FailedServers {
        FailedServers {
            stale_non_voters: self.stale_non_voters.keys().cloned().collect(),
            stale_voters: self.stale_voters.keys().cloned().collect(),
            failed_non_voters: self
                .failed_non_voters
                .keys()
                .filter_map(|id| state.servers.get(id).map(|srv| srv.server.clone()))
                .collect(),
            failed_voters: self
                .failed_voters
                .keys()
                .filter_map(|id| state.servers.get(id).map(|srv| srv.server.clone()))
                .collect(),
        }
    }

    /// Shrink the removable buckets to the entries the policy let through.
    /// Healthy buckets are untouched.
    pub fn retain_filtered(&mut self, filtered: &FailedServers) {
        let stale_non_voters: Vec<&ServerId> = filtered.stale_non_voters.iter().collect();
        self.stale_non_voters
            .retain(|id, _| stale_non_voters.contains(&id));

        let stale_voters: Vec<&ServerId> = filtered.stale_voters.iter().collect();
        self.stale_voters.retain(|id, _| stale_voters.contains(&id));

        let failed_non_voters: Vec<&ServerId> =
            filtered.failed_non_voters.iter().map(|srv| &srv.id).collect();
        self.failed_non_voters
            .retain(|id, _| failed_non_voters.contains(&id));

        let failed_voters: Vec<&ServerId> =
            filtered.failed_voters.iter().map(|srv| &srv.id).collect();
        self.failed_voters.retain(|id, _| failed_voters.contains(&id));
    }

    /// Decide which servers of the given bucket are safe to remove.
    ///
    /// Candidates are visited in server-ID order. Each accepted entry is
    /// deleted from the bucket and emitted; refused entries stay behind for
    /// a later pass. Safety gates, in order:
    ///
    /// - with no failure tolerance left, nothing is removed;
    /// - a potential voter is only removed while the remaining voter pool
    ///   stays at or above `min_quorum` (a server the policy would promote
    ///   counts against quorum even before it votes);
    /// - removing a current voter spends one unit of failure tolerance.
    pub fn adjudicate_removals(&mut self, class: FailureClass, min_quorum: u32) -> Vec<ServerId> {
        let mut tolerance = failure_tolerance(self.potential_voters());
        let candidates: Vec<ServerId> = self.bucket(class).keys().cloned().collect();
        let mut accepted = Vec::new();

        for id in candidates {
            let Some(&eligibility) = self.bucket(class).get(&id) else {
                continue;
            };

            if tolerance < 1 {
                debug!(%id, "refusing removal: losing a majority of servers is not safe");
                continue;
            }

            if eligibility.is_potential_voter()
                && !is_removal_quorate(self.potential_voters(), min_quorum)
            {
                debug!(
                    %id,
                    min_quorum,
                    "refusing removal: would leave fewer voters than the configured minimum"
                );
                continue;
            }

            if eligibility.is_current_voter() {
                tolerance -= 1;
            }
            self.bucket_mut(class).remove(&id);
            accepted.push(id);
        }

        accepted
    }
}
