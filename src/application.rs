//! Embedding-application adapter.

use crate::config::Config;
use crate::types::{Server, ServerId, ServerStats, State};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Interface the embedding application supplies to the autopilot.
///
/// The application is authoritative over node liveness and identity; the
/// consensus layer is authoritative over suffrage. The autopilot joins the
/// two views.
#[async_trait]
pub trait Application: Send + Sync {
    /// The currently active autopilot configuration, or `None` to pause all
    /// reconciliation and pruning. May change between passes.
    fn autopilot_config(&self) -> Option<Config>;

    /// Called whenever a new state snapshot has been published. The
    /// application may emit metrics or mirror the state elsewhere; it must
    /// not block.
    fn notify_state(&self, state: &Arc<State>);

    /// Fetch replication statistics for the given servers, usually via an
    /// RPC to each one. The autopilot bounds this call with a timeout;
    /// servers missing from the result keep their previously observed stats.
    async fn fetch_server_stats(
        &self,
        servers: &HashMap<ServerId, Server>,
    ) -> HashMap<ServerId, ServerStats>;

    /// All servers the application currently knows about, keyed by ID.
    fn known_servers(&self) -> HashMap<ServerId, Server>;

    /// Forcefully remove a server the autopilot has decided is dead. Must
    /// return quickly; longer-running teardown belongs in a spawned task.
    fn remove_failed_server(&self, server: &Server);
}
