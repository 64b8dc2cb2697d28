use std::sync::Arc;

use cortege_common::clock::Clock;
use cortege_common::config::RelayConfig;
use cortege_route::RouteStore;
use cortege_tracker::{EventLog, Procession, RelationshipResolver};

/// Everything a handler may touch. Built once in `main` and shared by all
/// connections.
pub struct AppContext {
    pub procession: Option<Arc<Procession>>,
    pub routes: RouteStore,
    pub relationships: Option<Arc<dyn RelationshipResolver>>,
    pub event_log: Arc<dyn EventLog>,
    pub admin_password: Option<String>,
    pub allow_participation: bool,
    pub signature_window_ms: i64,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(
        config: &RelayConfig,
        procession: Arc<Procession>,
        routes: RouteStore,
        relationships: Option<Arc<dyn RelationshipResolver>>,
        event_log: Arc<dyn EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            procession: Some(procession),
            routes,
            relationships,
            event_log,
            admin_password: config.admin_password.clone(),
            allow_participation: config.allow_participation,
            signature_window_ms: config.signature_window_ms,
            clock,
        }
    }
}
