//! In-memory recording backend for tests.
//!
//! Records every call, keeps transactional writes pending until commit, and
//! emulates just enough DDL (`CREATE TABLE [IF NOT EXISTS]`, `DROP TABLE`) to
//! exercise schema creation and teardown.

use crate::error::{HomeError, Result};
use crate::store::backend::{Backend, Session};
use crate::store::rows::{Row, Rows};
use crate::store::value::SqlValue;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Predicate = Box<dyn Fn(&str, &[SqlValue]) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin,
    Execute(String),
    Savepoint,
    ReleaseSavepoint,
    RollbackToSavepoint,
    Commit,
    Rollback,
    Query(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    committed: Vec<Executed>,
    tables: BTreeSet<String>,
    fail_when: Vec<Predicate>,
    stall_when: Vec<Predicate>,
    fail_commit: bool,
    responses: Vec<(String, Vec<Row>)>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Statements matching the predicate fail like a constraint violation
    pub fn fail_when(&self, predicate: impl Fn(&str, &[SqlValue]) -> bool + Send + Sync + 'static) {
        self.lock().fail_when.push(Box::new(predicate));
    }

    /// Statements matching the predicate never complete
    pub fn stall_when(&self, predicate: impl Fn(&str, &[SqlValue]) -> bool + Send + Sync + 'static) {
        self.lock().stall_when.push(Box::new(predicate));
    }

    pub fn fail_commit(&self) {
        self.lock().fail_commit = true;
    }

    /// Queries containing `needle` return `rows`
    pub fn respond(&self, needle: &str, rows: Vec<Row>) {
        self.lock().responses.push((needle.to_string(), rows));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Writes that are durable: committed transactional writes plus autocommit statements
    pub fn committed(&self) -> Vec<Executed> {
        self.lock().committed.clone()
    }

    pub fn tables(&self) -> Vec<String> {
        self.lock().tables.iter().cloned().collect()
    }

    /// Executes against `tables`, or the committed tables when `None`
    async fn run(
        &self,
        sql: &str,
        params: &[SqlValue],
        tables: Option<BTreeSet<String>>,
    ) -> Result<Vec<TableChange>> {
        let stall = {
            let mut state = self.lock();
            state.calls.push(Call::Execute(sql.to_string()));
            state.stall_when.iter().any(|p| p(sql, params))
        };

        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let state = self.lock();
        if state.fail_when.iter().any(|p| p(sql, params)) {
            return Err(HomeError::StatementFailed {
                statement: sql.to_string(),
                cause: "duplicate key value violates unique constraint".to_string(),
            });
        }

        match tables {
            Some(view) => ddl_effect(&view, sql),
            None => ddl_effect(&state.tables, sql),
        }
    }
}

#[derive(Debug, Clone)]
enum TableChange {
    Create(String),
    Drop(String),
}

fn ddl_effect(tables: &BTreeSet<String>, sql: &str) -> Result<Vec<TableChange>> {
    let words: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
    let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

    let failed = |cause: String| HomeError::StatementFailed {
        statement: sql.to_string(),
        cause,
    };

    match upper.as_slice() {
        ["CREATE", "TABLE", "IF", "NOT", "EXISTS", ..] => Ok(words
            .get(5)
            .filter(|name| !tables.contains(*name))
            .map(|name| vec![TableChange::Create(name.clone())])
            .unwrap_or_default()),
        ["CREATE", "TABLE", ..] => {
            let name = words[2].clone();
            if tables.contains(&name) {
                Err(failed(format!("relation \"{}\" already exists", name)))
            } else {
                Ok(vec![TableChange::Create(name)])
            }
        }
        ["DROP", "TABLE", ..] => {
            let name = words[2].clone();
            if tables.contains(&name) {
                Ok(vec![TableChange::Drop(name)])
            } else {
                Err(failed(format!("table \"{}\" does not exist", name)))
            }
        }
        _ => Ok(Vec::new()),
    }
}

fn apply(tables: &mut BTreeSet<String>, changes: Vec<TableChange>) {
    for change in changes {
        match change {
            TableChange::Create(name) => {
                tables.insert(name);
            }
            TableChange::Drop(name) => {
                tables.remove(&name);
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        self.lock().calls.push(Call::Begin);
        Ok(Box::new(MemorySession {
            backend: self.clone(),
            pending: Vec::new(),
            savepoints: Vec::new(),
        }))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let changes = self.run(sql, params, None).await?;
        let mut state = self.lock();
        apply(&mut state.tables, changes);
        state.committed.push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(1)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Rows> {
        let mut state = self.lock();
        state.calls.push(Call::Query(sql.to_string()));

        if state.fail_when.iter().any(|p| p(sql, params)) {
            return Err(HomeError::StatementFailed {
                statement: sql.to_string(),
                cause: "syntax error".to_string(),
            });
        }

        let rows = state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();

        Ok(Rows::from_rows(rows))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct MemorySession {
    backend: MemoryBackend,
    pending: Vec<(Executed, Vec<TableChange>)>,
    savepoints: Vec<usize>,
}

impl MemorySession {
    /// Committed tables as seen from inside this transaction
    fn view(&self) -> BTreeSet<String> {
        let mut tables = self.backend.lock().tables.clone();
        for (_, changes) in &self.pending {
            apply(&mut tables, changes.clone());
        }
        tables
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let view = self.view();
        let changes = self.backend.run(sql, params, Some(view)).await?;
        self.pending.push((
            Executed {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
            changes,
        ));
        Ok(1)
    }

    async fn savepoint(&mut self, _name: &str) -> Result<()> {
        self.backend.lock().calls.push(Call::Savepoint);
        self.savepoints.push(self.pending.len());
        Ok(())
    }

    async fn release_savepoint(&mut self, _name: &str) -> Result<()> {
        self.backend.lock().calls.push(Call::ReleaseSavepoint);
        self.savepoints.pop();
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, _name: &str) -> Result<()> {
        self.backend.lock().calls.push(Call::RollbackToSavepoint);
        if let Some(mark) = self.savepoints.last() {
            self.pending.truncate(*mark);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.backend.lock();
        state.calls.push(Call::Commit);

        if state.fail_commit {
            return Err(HomeError::Internal("could not serialize access".to_string()));
        }

        for (executed, changes) in self.pending {
            apply(&mut state.tables, changes);
            state.committed.push(executed);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.backend.lock().calls.push(Call::Rollback);
        Ok(())
    }
}
