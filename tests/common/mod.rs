//! Test doubles shared by the integration tests.
//!
//! These implement the public adapter traits only, so the tests exercise the
//! crate exactly the way an embedding application would.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use helmsman::application::Application;
use helmsman::config::Config;
use helmsman::error::{HelmsmanError, Result};
use helmsman::membership::FailedServers;
use helmsman::promoter::Promoter;
use helmsman::raft::{Raft, RaftConfiguration, RaftNodeState, RaftServer, Suffrage};
use helmsman::time::Clock;
use helmsman::types::{
    NodeStatus, NodeType, RaftChanges, Server, ServerId, ServerStats, State,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded membership call against [`SimRaft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipCall {
    AddVoter(ServerId),
    DemoteVoter(ServerId),
    RemoveServer(ServerId),
    LeadershipTransfer(ServerId),
}

/// Consensus adapter double. Membership calls are recorded and applied to
/// the in-memory configuration so that consecutive passes observe their own
/// effects, the way a real cluster would.
#[derive(Default)]
pub struct SimRaft {
    configuration: Mutex<RaftConfiguration>,
    calls: Mutex<Vec<MembershipCall>>,
    pub last_index: AtomicU64,
    pub last_log_term: AtomicU64,
    leader_address: Mutex<Option<String>>,
}

impl SimRaft {
    pub fn set_configuration(&self, configuration: RaftConfiguration) {
        *self.configuration.lock().expect("sim lock") = configuration;
    }

    pub fn set_leader(&self, address: &str) {
        *self.leader_address.lock().expect("sim lock") = Some(address.to_string());
    }

    pub fn bootstrap(&self, term: u64, index: u64) {
        self.last_log_term.store(term, Ordering::SeqCst);
        self.last_index.store(index, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MembershipCall> {
        self.calls.lock().expect("sim lock").clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("sim lock").clear();
    }

    pub fn suffrage_of(&self, id: &ServerId) -> Option<Suffrage> {
        self.configuration
            .lock()
            .expect("sim lock")
            .servers
            .iter()
            .find(|srv| srv.id == *id)
            .map(|srv| srv.suffrage)
    }

    fn record(&self, call: MembershipCall) {
        self.calls.lock().expect("sim lock").push(call);
    }
}

#[async_trait]
impl Raft for SimRaft {
    async fn add_voter(
        &self,
        id: &ServerId,
        address: &str,
        _prev_index: u64,
        _timeout: Duration,
    ) -> Result<u64> {
        let mut configuration = self.configuration.lock().expect("sim lock");
        match configuration.servers.iter_mut().find(|srv| srv.id == *id) {
            Some(srv) => srv.suffrage = Suffrage::Voter,
            None => configuration.servers.push(RaftServer {
                id: id.clone(),
                address: address.to_string(),
                suffrage: Suffrage::Voter,
            }),
        }
        drop(configuration);
        self.record(MembershipCall::AddVoter(id.clone()));
        Ok(self.last_index.load(Ordering::SeqCst))
    }

    async fn add_nonvoter(
        &self,
        id: &ServerId,
        address: &str,
        _prev_index: u64,
        _timeout: Duration,
    ) -> Result<u64> {
        let mut configuration = self.configuration.lock().expect("sim lock");
        if !configuration.servers.iter().any(|srv| srv.id == *id) {
            configuration.servers.push(RaftServer {
                id: id.clone(),
                address: address.to_string(),
                suffrage: Suffrage::Nonvoter,
            });
        }
        Ok(self.last_index.load(Ordering::SeqCst))
    }

    async fn demote_voter(
        &self,
        id: &ServerId,
        _prev_index: u64,
        _timeout: Duration,
    ) -> Result<u64> {
        let mut configuration = self.configuration.lock().expect("sim lock");
        match configuration.servers.iter_mut().find(|srv| srv.id == *id) {
            Some(srv) => srv.suffrage = Suffrage::Nonvoter,
            None => {
                return Err(HelmsmanError::Raft(format!(
                    "server {id} is not in the configuration"
                )))
            }
        }
        drop(configuration);
        self.record(MembershipCall::DemoteVoter(id.clone()));
        Ok(self.last_index.load(Ordering::SeqCst))
    }

    async fn remove_server(
        &self,
        id: &ServerId,
        _prev_index: u64,
        _timeout: Duration,
    ) -> Result<u64> {
        self.configuration
            .lock()
            .expect("sim lock")
            .servers
            .retain(|srv| srv.id != *id);
        self.record(MembershipCall::RemoveServer(id.clone()));
        Ok(self.last_index.load(Ordering::SeqCst))
    }

    async fn get_configuration(&self) -> Result<RaftConfiguration> {
        Ok(self.configuration.lock().expect("sim lock").clone())
    }

    async fn leadership_transfer_to_server(&self, id: &ServerId, address: &str) -> Result<()> {
        self.set_leader(address);
        self.record(MembershipCall::LeadershipTransfer(id.clone()));
        Ok(())
    }

    fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::SeqCst)
    }

    fn leader(&self) -> Option<String> {
        self.leader_address.lock().expect("sim lock").clone()
    }

    fn stats(&self) -> HashMap<String, String> {
        HashMap::from([(
            "last_log_term".to_string(),
            self.last_log_term.load(Ordering::SeqCst).to_string(),
        )])
    }

    fn state(&self) -> RaftNodeState {
        RaftNodeState::Leader
    }
}

/// Application adapter double.
pub struct SimApplication {
    config: Mutex<Option<Config>>,
    servers: Mutex<HashMap<ServerId, Server>>,
    stats: Mutex<HashMap<ServerId, ServerStats>>,
    removed: Mutex<Vec<ServerId>>,
    pub notifications: AtomicUsize,
}

impl Default for SimApplication {
    fn default() -> Self {
        Self {
            config: Mutex::new(Some(Config::default())),
            servers: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            notifications: AtomicUsize::new(0),
        }
    }
}

impl SimApplication {
    pub fn set_config(&self, config: Option<Config>) {
        *self.config.lock().expect("sim lock") = config;
    }

    pub fn add_server(&self, server: Server) {
        self.servers
            .lock()
            .expect("sim lock")
            .insert(server.id.clone(), server);
    }

    pub fn drop_server(&self, id: &ServerId) {
        self.servers.lock().expect("sim lock").remove(id);
        self.stats.lock().expect("sim lock").remove(id);
    }

    pub fn mark_failed(&self, id: &ServerId) {
        if let Some(srv) = self.servers.lock().expect("sim lock").get_mut(id) {
            srv.node_status = NodeStatus::Failed;
        }
    }

    pub fn set_stats(&self, id: &ServerId, stats: ServerStats) {
        self.stats.lock().expect("sim lock").insert(id.clone(), stats);
    }

    pub fn removed(&self) -> Vec<ServerId> {
        self.removed.lock().expect("sim lock").clone()
    }
}

#[async_trait]
impl Application for SimApplication {
    fn autopilot_config(&self) -> Option<Config> {
        self.config.lock().expect("sim lock").clone()
    }

    fn notify_state(&self, _state: &Arc<State>) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_server_stats(
        &self,
        servers: &HashMap<ServerId, Server>,
    ) -> HashMap<ServerId, ServerStats> {
        let stats = self.stats.lock().expect("sim lock");
        servers
            .keys()
            .filter_map(|id| stats.get(id).map(|s| (id.clone(), *s)))
            .collect()
    }

    fn known_servers(&self) -> HashMap<ServerId, Server> {
        self.servers.lock().expect("sim lock").clone()
    }

    fn remove_failed_server(&self, server: &Server) {
        self.removed
            .lock()
            .expect("sim lock")
            .push(server.id.clone());
    }
}

/// Promoter double returning a fixed change set.
pub struct ScriptedPromoter {
    changes: RaftChanges,
}

impl ScriptedPromoter {
    pub fn new(changes: RaftChanges) -> Self {
        Self { changes }
    }
}

impl Promoter for ScriptedPromoter {
    fn get_node_types(&self, _config: &Config, state: &State) -> HashMap<ServerId, NodeType> {
        state
            .servers
            .keys()
            .map(|id| (id.clone(), NodeType::Voter))
            .collect()
    }

    fn calculate_promotions_and_demotions(&self, _config: &Config, _state: &State) -> RaftChanges {
        self.changes.clone()
    }

    fn filter_failed_server_removals(
        &self,
        _config: &Config,
        _state: &State,
        failed: FailedServers,
    ) -> FailedServers {
        failed
    }

    fn is_potential_voter(&self, _node_type: NodeType) -> bool {
        true
    }
}

/// Manually advanced clock.
pub struct SimClock {
    now: Mutex<DateTime<Utc>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
                    .single()
                    .expect("valid timestamp"),
            ),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("sim lock");
        *now += ChronoDuration::from_std(by).expect("test duration fits");
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("sim lock")
    }
}

pub fn address(id: &str) -> String {
    format!("{id}.example.com:8300")
}

/// An alive server as the application would report it.
pub fn server(id: &str) -> Server {
    Server {
        id: ServerId::from(id),
        name: id.to_string(),
        address: address(id),
        node_status: NodeStatus::Alive,
        version: "1.0.0".to_string(),
        raft_version: 3,
        node_type: NodeType::Voter,
        ..Default::default()
    }
}

/// Fresh stats matching the given leader log position.
pub fn current_stats(term: u64, index: u64) -> ServerStats {
    ServerStats {
        last_contact: Some(Duration::from_millis(20)),
        last_term: term,
        last_index: index,
    }
}

/// A consensus configuration where `true` marks voters.
pub fn raft_configuration(servers: &[(&str, bool)]) -> RaftConfiguration {
    RaftConfiguration {
        servers: servers
            .iter()
            .map(|(id, voter)| RaftServer {
                id: ServerId::from(*id),
                address: address(id),
                suffrage: if *voter {
                    Suffrage::Voter
                } else {
                    Suffrage::Nonvoter
                },
            })
            .collect(),
    }
}
