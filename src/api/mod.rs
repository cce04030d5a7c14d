mod database;
mod health;
mod stats;

pub use database::{create_tables, database_overview, drop_tables};
pub use health::health_check;
pub use stats::{log_size, memory_usage, plugin_count, processor_count};

use crate::error::Result;
use crate::plugin::PluginRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// State shared by the built-in endpoints
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PluginRegistry>,
    pub start_time: Instant,
    pub log_dir: PathBuf,
}

/// Built-in endpoints plus every route the registry aggregates.
///
/// Fails when a plugin has not been set up.
pub fn router(state: AppState) -> Result<Router> {
    let registry = state.registry.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/database/", get(database_overview))
        .route("/database/create/{pluginname}/", post(create_tables))
        .route("/database/drop/{pluginname}/", post(drop_tables))
        .route("/stats/plugincount/", get(plugin_count))
        .route("/stats/processorcount/", get(processor_count))
        .route("/stats/logsize/", get(log_size))
        .route("/stats/memory/", get(memory_usage))
        .with_state(state);

    for route in registry.routes()? {
        debug!("Registering route {}", route.path);
        app = app.route(&route.path, route.handler);
    }

    Ok(app.layer(TraceLayer::new_for_http()))
}
