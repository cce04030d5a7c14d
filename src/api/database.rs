//! Database administration endpoints
//!
//! - GET  /database/                        - Plugins with their namespaced tables
//! - POST /database/create/{pluginname}/    - Run a plugin's schema statements
//! - POST /database/drop/{pluginname}/      - Drop a plugin's tables (cascading)
//!
//! Statements are executed one by one outside a transaction; individual
//! failures are logged, not reported.

use crate::api::AppState;
use crate::error::Result;
use crate::plugin::PluginSummary;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

#[derive(Serialize)]
pub struct DatabaseOverview {
    pub categories: Vec<String>,
    pub plugins: Vec<PluginSummary>,
}

#[derive(Serialize)]
pub struct TableActionResponse {
    pub status: String,
    pub plugin: String,
    pub statements_issued: usize,
    pub execution_time_ms: u64,
}

pub async fn database_overview(State(state): State<AppState>) -> Json<DatabaseOverview> {
    Json(DatabaseOverview {
        categories: state.registry.categories(),
        plugins: state.registry.plugins().iter().map(|p| p.summary()).collect(),
    })
}

pub async fn create_tables(
    State(state): State<AppState>,
    Path(plugin_name): Path<String>,
) -> Result<Json<TableActionResponse>> {
    let start_time = Instant::now();
    let statements_issued = state.registry.create_tables_for(&plugin_name).await?;

    info!("Created tables for {} in {}ms", plugin_name, start_time.elapsed().as_millis());

    Ok(Json(TableActionResponse {
        status: "created".to_string(),
        plugin: plugin_name,
        statements_issued,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    }))
}

pub async fn drop_tables(
    State(state): State<AppState>,
    Path(plugin_name): Path<String>,
) -> Result<Json<TableActionResponse>> {
    let start_time = Instant::now();
    let statements_issued = state.registry.drop_tables_for(&plugin_name).await?;

    Ok(Json(TableActionResponse {
        status: "dropped".to_string(),
        plugin: plugin_name,
        statements_issued,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    }))
}
