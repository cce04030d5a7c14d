//! Plugin descriptor
//!
//! Static metadata plus the schema, routes, data directories and producer a
//! feature module contributes. Templates are namespaced once by [`setup`],
//! after which the namespaced statements, table names and routes are available.
//!
//! [`setup`]: PluginDescriptor::setup

use crate::error::{HomeError, Result};
use crate::plugin::producer::Producer;
use crate::plugin::template::{Namespace, StatementTemplate};
use axum::routing::MethodRouter;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A path plus the handler serving it
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub handler: MethodRouter,
}

impl Route {
    pub fn new(path: impl Into<String>, handler: MethodRouter) -> Self {
        Self {
            path: path.into(),
            handler,
        }
    }

    fn prefixed(&self, prefix: &str) -> Self {
        Self {
            path: format!("{}{}", prefix, self.path),
            handler: self.handler.clone(),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("handler", &"<handler>")
            .finish()
    }
}

/// Everything that exists only after namespacing
#[derive(Debug, Clone)]
struct Namespaced {
    schema: Vec<String>,
    tables: Vec<String>,
    api_routes: Vec<Route>,
    view_routes: Vec<Route>,
}

/// Admin-facing view of a descriptor
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub description: String,
    pub category: String,
    pub tables: Vec<String>,
    pub data_dirs: Vec<String>,
}

pub struct PluginDescriptor {
    name: String,
    description: String,
    category: String,
    schema: Vec<StatementTemplate>,
    tables: Vec<StatementTemplate>,
    api_routes: Vec<Route>,
    view_routes: Vec<Route>,
    data_dirs: Vec<String>,
    producer: Arc<dyn Producer>,
    namespaced: Option<Namespaced>,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        producer: impl Producer + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            schema: Vec::new(),
            tables: Vec::new(),
            api_routes: Vec::new(),
            view_routes: Vec::new(),
            data_dirs: Vec::new(),
            producer: Arc::new(producer),
            namespaced: None,
        }
    }

    /// Schema-creation statement templates, in execution order
    pub fn with_schema<I, T>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<StatementTemplate>,
    {
        self.schema.extend(statements.into_iter().map(Into::into));
        self
    }

    /// Table-name templates, in teardown order
    pub fn with_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<StatementTemplate>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn with_api_route(mut self, path: impl Into<String>, handler: MethodRouter) -> Self {
        self.api_routes.push(Route::new(path, handler));
        self
    }

    pub fn with_view_route(mut self, path: impl Into<String>, handler: MethodRouter) -> Self {
        self.view_routes.push(Route::new(path, handler));
        self
    }

    pub fn with_data_dirs<I, T>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.data_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.name)
    }

    pub fn is_set_up(&self) -> bool {
        self.namespaced.is_some()
    }

    /// Namespaces schema statements, table names and routes, then makes sure
    /// every data directory exists under `<data_root>/<namespace>/`.
    ///
    /// Never fails: directory errors are logged and skipped.
    pub fn setup(&mut self, data_root: &Path) {
        if self.namespaced.is_some() {
            warn!(plugin = %self.name, "Plugin is already set up, skipping");
            return;
        }

        let namespace = self.namespace();

        let schema = self.schema.iter().map(|t| t.render(&namespace)).collect();
        let tables = self.tables.iter().map(|t| t.render(&namespace)).collect();

        let api_prefix = namespace.api_prefix();
        let api_routes = self.api_routes.iter().map(|r| r.prefixed(&api_prefix)).collect();

        let view_prefix = namespace.view_prefix();
        let view_routes = self.view_routes.iter().map(|r| r.prefixed(&view_prefix)).collect();

        for entry in &self.data_dirs {
            let dir = namespace.data_dir(data_root, entry);
            match fs::create_dir_all(&dir) {
                Ok(()) => debug!(plugin = %self.name, "Data directory ready: {}", dir.display()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => warn!(
                    plugin = %self.name,
                    "Failed to create folder {}: {}",
                    dir.display(),
                    e
                ),
            }
        }

        self.namespaced = Some(Namespaced {
            schema,
            tables,
            api_routes,
            view_routes,
        });
    }

    fn namespaced(&self) -> Result<&Namespaced> {
        self.namespaced.as_ref().ok_or_else(|| HomeError::NotNamespaced {
            plugin: self.name.clone(),
        })
    }

    pub fn schema_statements(&self) -> Result<&[String]> {
        Ok(&self.namespaced()?.schema)
    }

    pub fn table_names(&self) -> Result<&[String]> {
        Ok(&self.namespaced()?.tables)
    }

    pub fn api_routes(&self) -> Result<&[Route]> {
        Ok(&self.namespaced()?.api_routes)
    }

    pub fn view_routes(&self) -> Result<&[Route]> {
        Ok(&self.namespaced()?.view_routes)
    }

    /// One cascading `DROP TABLE` per table name, in table-name order.
    /// Nothing is executed here.
    pub fn drop_tables(&self) -> Result<Vec<String>> {
        Ok(self
            .table_names()?
            .iter()
            .map(|table| format!("DROP TABLE {} CASCADE;", table))
            .collect())
    }

    pub fn data_dirs(&self) -> &[String] {
        &self.data_dirs
    }

    /// `<data_root>/<namespace>/<entry>`
    pub fn data_dir(&self, data_root: &Path, entry: &str) -> PathBuf {
        self.namespace().data_dir(data_root, entry)
    }

    pub fn producer(&self) -> Arc<dyn Producer> {
        self.producer.clone()
    }

    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            tables: self
                .table_names()
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            data_dirs: self.data_dirs.clone(),
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("set_up", &self.is_set_up())
            .finish()
    }
}
