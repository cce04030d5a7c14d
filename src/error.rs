use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomeError {
    #[error("Connection to the database failed: {cause}")]
    ConnectionFailed { cause: String },

    #[error("Statement failed: {cause}\n{statement}")]
    StatementFailed { statement: String, cause: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Plugin {plugin} has not been set up yet")]
    NotNamespaced { plugin: String },

    #[error("Producer of {plugin} failed: {cause}")]
    ProducerFailed { plugin: String, cause: String },

    #[error("Movie catalog request failed: {cause}")]
    Catalog { cause: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl IntoResponse for HomeError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            HomeError::ConnectionFailed { cause } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: "connection_failed".to_string(),
                    message: "Failed to reach the database".to_string(),
                    plugin: None,
                    cause: Some(cause.clone()),
                },
            ),
            HomeError::StatementFailed { cause, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "statement_failed".to_string(),
                    message: "A database statement failed".to_string(),
                    plugin: None,
                    cause: Some(cause.clone()),
                },
            ),
            HomeError::Timeout { operation, after } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse {
                    error: "timeout".to_string(),
                    message: format!("{} timed out after {}s", operation, after.as_secs()),
                    plugin: None,
                    cause: None,
                },
            ),
            HomeError::PluginNotFound { name } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "plugin_not_found".to_string(),
                    message: format!("Failed to find the plugin '{}'", name),
                    plugin: Some(name.clone()),
                    cause: None,
                },
            ),
            HomeError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "not_found".to_string(),
                    message: format!("{} not found", resource),
                    plugin: None,
                    cause: None,
                },
            ),
            HomeError::NotNamespaced { plugin } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "plugin_not_set_up".to_string(),
                    message: format!("Plugin '{}' has not been set up", plugin),
                    plugin: Some(plugin.clone()),
                    cause: None,
                },
            ),
            HomeError::ProducerFailed { plugin, cause } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: "producer_failed".to_string(),
                    message: format!("Plugin '{}' failed to produce data", plugin),
                    plugin: Some(plugin.clone()),
                    cause: Some(cause.clone()),
                },
            ),
            HomeError::Catalog { cause } => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse {
                    error: "catalog_failed".to_string(),
                    message: "Movie catalog request failed".to_string(),
                    plugin: None,
                    cause: Some(cause.clone()),
                },
            ),
            HomeError::InvalidRequest { message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "invalid_request".to_string(),
                    message: message.clone(),
                    plugin: None,
                    cause: None,
                },
            ),
            HomeError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "internal_error".to_string(),
                    message: msg.clone(),
                    plugin: None,
                    cause: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<tokio_postgres::Error> for HomeError {
    fn from(err: tokio_postgres::Error) -> Self {
        let cause = match err.as_db_error() {
            Some(db_err) => format!(
                "{} - {}",
                db_err.message(),
                db_err.detail().unwrap_or("no additional detail")
            ),
            None => err.to_string(),
        };
        HomeError::Internal(cause)
    }
}

impl From<deadpool_postgres::PoolError> for HomeError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        HomeError::ConnectionFailed {
            cause: format!("Pool error: {}", err),
        }
    }
}

impl From<std::io::Error> for HomeError {
    fn from(err: std::io::Error) -> Self {
        HomeError::Internal(format!("IO error: {}", err))
    }
}

impl From<reqwest::Error> for HomeError {
    fn from(err: reqwest::Error) -> Self {
        HomeError::Catalog {
            cause: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for HomeError {
    fn from(err: anyhow::Error) -> Self {
        HomeError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HomeError>;
