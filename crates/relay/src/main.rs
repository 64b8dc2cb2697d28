use std::sync::Arc;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cortege_common::clock::{Clock, SystemClock};
use cortege_common::config::{load_config, RelayConfig};
use cortege_protocol::SetActiveRoute;
use cortege_route::RouteStore;
use cortege_tracker::{Procession, RelationshipResolver, RelationshipStore};

use crate::context::AppContext;
use crate::server::RelayServer;
use crate::storage::{FileEventLog, Storage};

mod context;
mod error;
mod handlers;
mod server;
mod storage;

#[derive(Parser, Debug)]
#[command(name = "cortege-relay")]
struct Args {
    #[arg(long, default_value = "config/relay.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a signed route switch payload, valid for a few seconds.
    SignRoute {
        route_name: String,
        #[arg(long, env = "CORTEGE_ADMIN_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if let Some(Command::SignRoute {
        route_name,
        password,
    }) = args.command
    {
        let command = SetActiveRoute::signed(&route_name, &password, clock.now_ms());
        println!("{}", serde_json::to_string_pretty(&command)?);
        return Ok(());
    }

    let config: RelayConfig = load_config(&args.config)?;
    let storage = Arc::new(Storage::new(&config.data_dir)?);
    let routes = RouteStore::new(storage.load_routes()?);
    info!(routes = ?routes.names(), "routes loaded");

    let active_name = match storage.last_route_change()? {
        Some(record) => record.route_name,
        None => config.initial_route.clone(),
    };
    let route = routes
        .get(&active_name)
        .or_else(|| {
            warn!(route = %active_name, "last active route unknown, using initial route");
            routes.get(&config.initial_route)
        })
        .ok_or_else(|| anyhow!("route {:?} not found in {}", config.initial_route, config.data_dir))?;
    info!(route = route.name(), length = route.length(), "active route");

    let procession = Arc::new(Procession::new(route, config.tracking.clone(), Arc::clone(&clock)));
    let relationships: Option<Arc<dyn RelationshipResolver>> = match storage.load_relationships()? {
        Some(relationships) => {
            Some(Arc::new(RelationshipStore::new(relationships)) as Arc<dyn RelationshipResolver>)
        }
        None => {
            info!("no relationships file, friend lookup disabled");
            None
        }
    };
    let event_log = Arc::new(FileEventLog::spawn(Arc::clone(&storage)));

    let ctx = AppContext::new(&config, procession, routes, relationships, event_log, clock);
    let server = RelayServer::new(config, ctx);
    server.run().await
}
