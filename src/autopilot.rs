//! The autopilot core: wiring, execution loop, and consensus-call helpers.

use crate::application::Application;
use crate::error::Result;
use crate::promoter::{Promoter, StablePromoter};
use crate::raft::{Raft, RaftConfiguration};
use crate::time::{Clock, SystemClock};
use crate::types::{ServerId, State};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the state snapshot is rebuilt.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(2);
/// How often reconciliation and pruning run.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Membership autopilot for a Raft-based cluster.
///
/// The autopilot continuously rebuilds an observed [`State`] snapshot from
/// the consensus layer and the embedding application, then reconciles the
/// cluster against it: promoting stable servers, demoting or pruning failed
/// and stale ones under quorum-safety constraints, and transferring
/// leadership when the policy asks for it.
///
/// Run it with [`Autopilot::start`] next to the cluster leader, or drive
/// individual passes yourself with [`update_state`](Autopilot::update_state),
/// [`reconcile`](Autopilot::reconcile), and
/// [`prune_dead_servers`](Autopilot::prune_dead_servers). Passes must not run
/// concurrently; the built-in loop serializes them.
pub struct Autopilot {
    pub(crate) raft: Arc<dyn Raft>,
    pub(crate) application: Arc<dyn Application>,
    pub(crate) promoter: Arc<dyn Promoter>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Latest published snapshot. Swapped atomically so readers never block.
    pub(crate) state: ArcSwap<State>,
    reconciliation_enabled: AtomicBool,
    update_interval: Duration,
    reconcile_interval: Duration,
}

impl Autopilot {
    /// Create an autopilot with the default policy ([`StablePromoter`]),
    /// system clock, and default intervals.
    pub fn new(raft: Arc<dyn Raft>, application: Arc<dyn Application>) -> Self {
        Self {
            raft,
            application,
            promoter: Arc::new(StablePromoter::new()),
            clock: Arc::new(SystemClock),
            state: ArcSwap::from_pointee(State::default()),
            reconciliation_enabled: AtomicBool::new(true),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    /// Replace the promotion policy.
    pub fn with_promoter(mut self, promoter: Arc<dyn Promoter>) -> Self {
        self.promoter = promoter;
        self
    }

    /// Replace the time source (deterministic clocks for tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Change how often the state snapshot is rebuilt.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Change how often reconciliation and pruning run.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// The most recently published state snapshot.
    pub fn latest_state(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Whether reconcile and prune passes are allowed to make changes.
    pub fn reconciliation_enabled(&self) -> bool {
        self.reconciliation_enabled.load(Ordering::Acquire)
    }

    /// Allow membership changes again after [`disable_reconciliation`].
    ///
    /// [`disable_reconciliation`]: Autopilot::disable_reconciliation
    pub fn enable_reconciliation(&self) {
        self.reconciliation_enabled.store(true, Ordering::Release);
    }

    /// Stop making membership changes while continuing to observe the
    /// cluster and publish state snapshots.
    pub fn disable_reconciliation(&self) {
        self.reconciliation_enabled.store(false, Ordering::Release);
    }

    /// Spawn the execution loop on the current tokio runtime.
    ///
    /// The loop stops when a value (or a closed channel) arrives on
    /// `shutdown`.
    pub fn start(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Drive the autopilot until shutdown: rebuild the state snapshot every
    /// update interval and run a reconcile + prune pass every reconcile
    /// interval. Pass failures are logged and retried on the next tick;
    /// membership changes are durable in the consensus layer, so there is
    /// nothing to roll back.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut update = tokio::time::interval(self.update_interval);
        let mut reconcile = tokio::time::interval(self.reconcile_interval);
        // Both intervals fire immediately; consume those ticks and build the
        // first snapshot before any reconciliation can run against it.
        update.tick().await;
        reconcile.tick().await;

        info!("autopilot execution loop starting");

        if let Err(error) = self.update_state().await {
            warn!(%error, "failed to build initial cluster state snapshot");
        }

        loop {
            tokio::select! {
                _ = update.tick() => {
                    if let Err(error) = self.update_state().await {
                        warn!(%error, "failed to update cluster state snapshot");
                    }
                }
                _ = reconcile.tick() => {
                    if let Err(error) = self.reconcile().await {
                        warn!(%error, retryable = error.is_retryable(), "reconciliation pass failed");
                    }
                    if let Err(error) = self.prune_dead_servers().await {
                        warn!(%error, retryable = error.is_retryable(), "dead-server pruning pass failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("autopilot execution loop shutting down");
                    break;
                }
            }
        }
    }

    pub(crate) async fn get_raft_configuration(&self) -> Result<RaftConfiguration> {
        self.raft.get_configuration().await
    }

    pub(crate) async fn add_voter(&self, id: &ServerId, address: &str) -> Result<()> {
        self.raft
            .add_voter(id, address, 0, Duration::ZERO)
            .await
            .map(|_| ())
    }

    pub(crate) async fn demote_voter(&self, id: &ServerId) -> Result<()> {
        self.raft
            .demote_voter(id, 0, Duration::ZERO)
            .await
            .map(|_| ())
    }

    pub(crate) async fn remove_server(&self, id: &ServerId) -> Result<()> {
        self.raft
            .remove_server(id, 0, Duration::ZERO)
            .await
            .map(|_| ())
    }

    pub(crate) async fn leadership_transfer(&self, id: &ServerId, address: &str) -> Result<()> {
        self.raft.leadership_transfer_to_server(id, address).await
    }

    pub(crate) fn stats_fetch_timeout(&self) -> Duration {
        self.update_interval
    }
}
