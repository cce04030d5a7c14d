//! HomeManager
//!
//! Core of a pluggable home-media dashboard: plugin namespacing and lifecycle,
//! plus a batched-write storage gateway over PostgreSQL.

pub mod api;
pub mod config;
pub mod error;
pub mod plugin;
pub mod plugins;
pub mod store;
