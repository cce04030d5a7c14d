//! Plugin registry
//!
//! An explicitly constructed collection of descriptors, in declaration order.
//! The order drives schema creation and route registration; it carries no
//! dependency guarantee between plugins. Plugin names are expected to be
//! unique: namespaces derive from them and collisions are not detected.

use crate::config::Config;
use crate::error::{HomeError, Result};
use crate::plugin::descriptor::{PluginDescriptor, Route};
use crate::store::{BatchWrite, StorageGateway};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Result of running one plugin's producer and applying its batches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub plugin: String,
    /// False when the producer failed or timed out
    pub produced: bool,
    pub batches: usize,
    pub rows_applied: usize,
    pub rows_failed: usize,
    pub batches_committed: usize,
}

pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
    gateway: Arc<StorageGateway>,
    data_root: PathBuf,
    producer_timeout: Duration,
}

impl PluginRegistry {
    pub fn new(gateway: Arc<StorageGateway>, data_root: impl Into<PathBuf>, producer_timeout: Duration) -> Self {
        Self {
            plugins: Vec::new(),
            gateway,
            data_root: data_root.into(),
            producer_timeout,
        }
    }

    pub fn from_config(gateway: Arc<StorageGateway>, config: &Config) -> Self {
        Self::new(gateway, config.data_dir.clone(), config.producer_timeout)
    }

    /// Appends a descriptor; declaration order is registration order
    pub fn register(&mut self, plugin: PluginDescriptor) {
        self.plugins.push(plugin);
    }

    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn gateway(&self) -> &Arc<StorageGateway> {
        &self.gateway
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Sets up every descriptor in declaration order
    pub fn setup_all(&mut self) {
        for plugin in &mut self.plugins {
            plugin.setup(&self.data_root);
            info!(plugin = %plugin.name(), "Finished setting up {}", plugin.name());
        }
    }

    /// Every descriptor's namespaced schema statements, in declaration order
    pub fn schema_statements(&self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for plugin in &self.plugins {
            statements.extend_from_slice(plugin.schema_statements()?);
        }
        Ok(statements)
    }

    /// API routes followed by view routes, per descriptor, in declaration order
    pub fn routes(&self) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        for plugin in &self.plugins {
            routes.extend_from_slice(plugin.api_routes()?);
            routes.extend_from_slice(plugin.view_routes()?);
        }
        Ok(routes)
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for plugin in &self.plugins {
            if !categories.iter().any(|c| c == plugin.category()) {
                categories.push(plugin.category().to_string());
            }
        }
        categories
    }

    /// Exact, case-sensitive match on the plugin name
    pub fn lookup(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Match on the namespace token (lower-cased name), as used on the command line
    pub fn lookup_namespace(&self, token: &str) -> Option<&PluginDescriptor> {
        let token = token.to_lowercase();
        self.plugins.iter().find(|p| p.namespace().as_str() == token)
    }

    /// Runs one producer under the producer deadline. Does not touch the store.
    pub async fn produce(&self, plugin: &PluginDescriptor) -> Result<Vec<BatchWrite>> {
        let producer = plugin.producer();
        match tokio::time::timeout(self.producer_timeout, producer.produce()).await {
            Ok(Ok(batches)) => Ok(batches),
            Ok(Err(e)) => Err(HomeError::ProducerFailed {
                plugin: plugin.name().to_string(),
                cause: e.to_string(),
            }),
            Err(_) => Err(HomeError::Timeout {
                operation: format!("producer of {}", plugin.name()),
                after: self.producer_timeout,
            }),
        }
    }

    /// Runs every producer in declaration order, applying each plugin's
    /// batches before moving on. A failing plugin never stops the next one.
    pub async fn run_all(&self) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(self.plugins.len());
        for plugin in &self.plugins {
            reports.push(self.run_descriptor(plugin).await);
        }
        reports
    }

    /// Runs a single plugin, found by exact name or by namespace token
    pub async fn run_plugin(&self, name: &str) -> Result<RunReport> {
        let plugin = self
            .lookup(name)
            .or_else(|| self.lookup_namespace(name))
            .ok_or_else(|| HomeError::PluginNotFound {
                name: name.to_string(),
            })?;

        Ok(self.run_descriptor(plugin).await)
    }

    async fn run_descriptor(&self, plugin: &PluginDescriptor) -> RunReport {
        let start_time = Instant::now();
        let mut report = RunReport {
            plugin: plugin.name().to_string(),
            ..Default::default()
        };

        let batches = match self.produce(plugin).await {
            Ok(batches) => batches,
            Err(e) => {
                error!(plugin = %plugin.name(), "Producer failed: {}", e);
                return report;
            }
        };
        report.produced = true;

        for batch in &batches {
            let outcome = self.gateway.exec_batch(batch).await;
            report.batches += 1;
            report.rows_applied += outcome.applied;
            report.rows_failed += outcome.failed;
            if outcome.committed {
                report.batches_committed += 1;
            }
        }

        info!(
            plugin = %plugin.name(),
            "Applied {} batches: {} rows written, {} rows failed in {}ms",
            report.batches,
            report.rows_applied,
            report.rows_failed,
            start_time.elapsed().as_millis()
        );

        report
    }

    /// Executes one plugin's schema statements one by one, outside a transaction
    pub async fn create_tables_for(&self, name: &str) -> Result<usize> {
        let plugin = self.find(name)?;
        let statements = plugin.schema_statements()?;
        for statement in statements {
            self.gateway.exec(statement).await;
        }
        info!(plugin = %name, "Issued {} schema statements", statements.len());
        Ok(statements.len())
    }

    /// Executes one plugin's cascading drops one by one, outside a transaction
    pub async fn drop_tables_for(&self, name: &str) -> Result<usize> {
        let plugin = self.find(name)?;
        let statements = plugin.drop_tables()?;
        for statement in &statements {
            self.gateway.exec(statement).await;
        }
        warn!(plugin = %name, "Dropped {} tables", statements.len());
        Ok(statements.len())
    }

    fn find(&self, name: &str) -> Result<&PluginDescriptor> {
        self.lookup(name).ok_or_else(|| HomeError::PluginNotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::store::testing::MemoryBackend;
    use crate::store::{SqlValue, WriteMode};
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn nothing() -> Result<Vec<BatchWrite>> {
        Ok(Vec::new())
    }

    fn producer<F, Fut>(f: F) -> F
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<BatchWrite>>> + Send,
    {
        f
    }

    fn gateway(backend: &MemoryBackend) -> Arc<StorageGateway> {
        Arc::new(StorageGateway::new(
            Arc::new(backend.clone()),
            WriteMode::BestEffort,
            Duration::from_secs(5),
        ))
    }

    fn registry(backend: &MemoryBackend, temp_dir: &TempDir) -> PluginRegistry {
        PluginRegistry::new(gateway(backend), temp_dir.path(), Duration::from_secs(5))
    }

    fn plugin(name: &str, category: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, "test plugin", category, nothing)
    }

    fn insert_batch(table: &str, values: &[&str]) -> BatchWrite {
        let mut batch = BatchWrite::new(format!("INSERT INTO {} (v) VALUES ($1)", table));
        for value in values {
            batch.push_row(row![*value]);
        }
        batch
    }

    #[test]
    fn test_aggregated_routes_are_prefixed_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let mut registry = registry(&backend, &temp_dir).with_plugins([
            plugin("YTSAMPlugin", "Entertainment")
                .with_view_route("/", get(|| async { "movies" }))
                .with_view_route("/view/{movieid}/", get(|| async { "movie" })),
            plugin("TorrentPlugin", "Internet")
                .with_api_route("/add/", get(|| async { "added" }))
                .with_view_route("/", get(|| async { "torrents" })),
        ]);

        assert!(registry.routes().is_err());
        registry.setup_all();

        let paths: Vec<String> = registry.routes().unwrap().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "/ytsamplugin/",
                "/ytsamplugin/view/{movieid}/",
                "/api/torrentplugin/add/",
                "/torrentplugin/",
            ]
        );
    }

    #[test]
    fn test_aggregated_schema_follows_declaration_order() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let mut registry = registry(&backend, &temp_dir).with_plugins([
            plugin("B", "x").with_schema(["CREATE TABLE {plugin}_one (id INT);"]),
            plugin("A", "x").with_schema([
                "CREATE TABLE {plugin}_one (id INT);",
                "CREATE TABLE {plugin}_two (id INT);",
            ]),
        ]);
        registry.setup_all();

        assert_eq!(
            registry.schema_statements().unwrap(),
            vec![
                "CREATE TABLE b_one (id INT);",
                "CREATE TABLE a_one (id INT);",
                "CREATE TABLE a_two (id INT);",
            ]
        );
    }

    #[test]
    fn test_categories_deduplicate_in_first_seen_order() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let registry = registry(&backend, &temp_dir).with_plugins([
            plugin("One", "Entertainment"),
            plugin("Two", "Internet"),
            plugin("Three", "Entertainment"),
        ]);

        assert_eq!(registry.categories(), vec!["Entertainment", "Internet"]);
    }

    #[test]
    fn test_lookup_is_exact_and_misses_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let registry = registry(&backend, &temp_dir)
            .with_plugins([plugin("YTSAMPlugin", "Entertainment"), plugin("TorrentPlugin", "Internet")]);

        assert!(registry.lookup("Nonexistent").is_none());
        assert!(registry.lookup("ytsamplugin").is_none());
        assert_eq!(registry.lookup("TorrentPlugin").unwrap().name(), "TorrentPlugin");
        assert_eq!(registry.lookup_namespace("ytsamplugin").unwrap().name(), "YTSAMPlugin");
    }

    #[tokio::test]
    async fn test_run_all_applies_batches_per_plugin_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first_order = order.clone();
        let first = PluginDescriptor::new("First", "", "x", producer(move || {
            let order = first_order.clone();
            async move {
                order.lock().unwrap().push("first");
                Ok(vec![insert_batch("first_a", &["1", "2"]), insert_batch("first_b", &["3"])])
            }
        }));

        let second_order = order.clone();
        let second = PluginDescriptor::new("Second", "", "x", producer(move || {
            let order = second_order.clone();
            async move {
                order.lock().unwrap().push("second");
                Ok(vec![insert_batch("second_a", &["4"])])
            }
        }));

        let mut registry = registry(&backend, &temp_dir).with_plugins([first, second]);
        registry.setup_all();

        let reports = registry.run_all().await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].batches, 2);
        assert_eq!(reports[0].rows_applied, 3);
        assert_eq!(reports[1].rows_applied, 1);

        let values: Vec<SqlValue> = backend.committed().into_iter().map(|e| e.params[0].clone()).collect();
        let expected: Vec<SqlValue> = vec!["1".into(), "2".into(), "3".into(), "4".into()];
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_run_all_continues_after_failures() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        backend.fail_when(|sql, _| sql.contains("doomed"));

        let calls = Arc::new(AtomicUsize::new(0));
        let broken_calls = calls.clone();
        let broken = PluginDescriptor::new("Broken", "", "x", producer(move || {
            let calls = broken_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HomeError::Catalog {
                    cause: "catalog offline".to_string(),
                })
            }
        }));
        let doomed = PluginDescriptor::new(
            "Doomed",
            "",
            "x",
            producer(|| async { Ok(vec![insert_batch("doomed", &["1"])]) }),
        );
        let healthy = PluginDescriptor::new(
            "Healthy",
            "",
            "x",
            producer(|| async { Ok(vec![insert_batch("healthy", &["ok"])]) }),
        );

        let registry = registry(&backend, &temp_dir).with_plugins([broken, doomed, healthy]);
        let reports = registry.run_all().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!reports[0].produced);
        assert_eq!(reports[1].rows_failed, 1);
        assert_eq!(reports[2].rows_applied, 1);
        assert_eq!(backend.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_run_all_on_a_spawned_task() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let movies = PluginDescriptor::new(
            "Movies",
            "",
            "x",
            producer(|| async { Ok(vec![insert_batch("movies_movie", &["Arrival", "Heat"])]) }),
        );

        let mut registry = registry(&backend, &temp_dir).with_plugins([movies]);
        registry.setup_all();
        let registry = Arc::new(registry);

        let runner = registry.clone();
        let reports = tokio::spawn(async move { runner.run_all().await }).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rows_applied, 2);
        assert_eq!(backend.committed().len(), 2);
    }

    #[tokio::test]
    async fn test_producer_deadline() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let slow = PluginDescriptor::new(
            "Slow",
            "",
            "x",
            producer(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }),
        );

        let registry = PluginRegistry::new(gateway(&backend), temp_dir.path(), Duration::from_millis(20))
            .with_plugins([slow]);

        let err = registry.produce(&registry.plugins()[0]).await.unwrap_err();
        assert!(matches!(err, HomeError::Timeout { .. }));

        let report = registry.run_plugin("slow").await.unwrap();
        assert!(!report.produced);
    }

    #[tokio::test]
    async fn test_run_plugin_unknown_name() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let registry = registry(&backend, &temp_dir).with_plugins([plugin("YTSAMPlugin", "x")]);

        let err = registry.run_plugin("Nonexistent").await.unwrap_err();
        assert!(matches!(err, HomeError::PluginNotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_and_drop_tables_for_plugin() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let mut registry = registry(&backend, &temp_dir).with_plugins([plugin("YTSAMPlugin", "x")
            .with_schema([
                "CREATE TABLE IF NOT EXISTS {plugin}_genre (id SERIAL PRIMARY KEY);",
                "CREATE TABLE IF NOT EXISTS {plugin}_movie (id SERIAL PRIMARY KEY);",
            ])
            .with_tables(["{plugin}_movie", "{plugin}_genre"])]);
        registry.setup_all();

        assert_eq!(registry.create_tables_for("YTSAMPlugin").await.unwrap(), 2);
        assert_eq!(backend.tables(), vec!["ytsamplugin_genre", "ytsamplugin_movie"]);

        assert_eq!(registry.drop_tables_for("YTSAMPlugin").await.unwrap(), 2);
        assert!(backend.tables().is_empty());

        assert!(registry.drop_tables_for("Nonexistent").await.is_err());
    }

    #[tokio::test]
    async fn test_setup_then_create_tables_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let mut registry = registry(&backend, &temp_dir).with_plugins([
            plugin("YTSAMPlugin", "Entertainment")
                .with_schema(["CREATE TABLE IF NOT EXISTS {plugin}_movie (id SERIAL PRIMARY KEY);"])
                .with_data_dirs(["torrents"]),
            plugin("TorrentPlugin", "Internet")
                .with_schema(["CREATE TABLE IF NOT EXISTS {plugin}_torrent_file (id SERIAL PRIMARY KEY);"])
                .with_data_dirs(["torrents", "downloads"]),
        ]);
        registry.setup_all();

        let outcome = registry
            .gateway()
            .create_tables(&registry.schema_statements().unwrap())
            .await;

        assert!(outcome.committed);
        assert_eq!(backend.tables(), vec!["torrentplugin_torrent_file", "ytsamplugin_movie"]);
        assert!(temp_dir.path().join("torrentplugin/downloads").is_dir());
    }
}
