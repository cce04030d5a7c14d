//! Storage gateway
//!
//! The only component that talks to the relational store. Schema creation and
//! batch writes run inside one transaction each, under one of two policies:
//!
//! - [`WriteMode::BestEffort`]: every statement runs inside its own savepoint.
//!   A failing statement is logged, rolled back to its savepoint and skipped;
//!   the transaction always commits. The transaction batches round-trips, it
//!   does not make the batch all-or-nothing.
//! - [`WriteMode::Atomic`]: the first failing statement rolls the whole
//!   transaction back.
//!
//! Neither policy hands an error back to the caller. The outcome is reported as
//! counts only and the details go to the log.

use crate::config::Config;
use crate::error::{HomeError, Result};
use crate::store::backend::{Backend, Session};
use crate::store::batch::BatchWrite;
use crate::store::postgres::PgBackend;
use crate::store::rows::Rows;
use crate::store::value::SqlValue;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const ROW_SAVEPOINT: &str = "homemanager_row";
const NO_PARAMS: &[SqlValue] = &[];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    #[default]
    BestEffort,
    Atomic,
}

impl FromStr for WriteMode {
    type Err = HomeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(WriteMode::BestEffort),
            "atomic" => Ok(WriteMode::Atomic),
            other => Err(HomeError::InvalidRequest {
                message: format!("Unknown write mode '{}', expected best-effort or atomic", other),
            }),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::BestEffort => f.write_str("best-effort"),
            WriteMode::Atomic => f.write_str("atomic"),
        }
    }
}

/// What happened to one transactional unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Statements (or rows) that were sent to the backend
    pub attempted: usize,
    /// Statements that succeeded and survived the end of the transaction
    pub applied: usize,
    pub failed: usize,
    pub committed: bool,
}

/// How loudly a failed commit is reported
#[derive(Debug, Clone, Copy)]
enum CommitSeverity {
    Fatal,
    Error,
}

pub struct StorageGateway {
    backend: Arc<dyn Backend>,
    write_mode: WriteMode,
    statement_timeout: Duration,
}

impl StorageGateway {
    pub fn new(backend: Arc<dyn Backend>, write_mode: WriteMode, statement_timeout: Duration) -> Self {
        Self {
            backend,
            write_mode,
            statement_timeout,
        }
    }

    /// Connects to PostgreSQL. This is the one failure the gateway propagates.
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = PgBackend::connect(&config.database_url, config.max_connections).await?;

        info!(
            "Storage gateway ready (write mode: {}, statement timeout: {:?})",
            config.write_mode, config.statement_timeout
        );

        Ok(Self::new(
            Arc::new(backend),
            config.write_mode,
            config.statement_timeout,
        ))
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Executes schema statements in order inside one transaction
    pub async fn create_tables(&self, statements: &[String]) -> BatchOutcome {
        let steps: Vec<(&str, &[SqlValue])> = statements.iter().map(|sql| (sql.as_str(), NO_PARAMS)).collect();
        let outcome = self
            .run_transaction("create tables", &steps, CommitSeverity::Fatal)
            .await;

        info!(
            "Schema creation: {} of {} statements applied, {} failed",
            outcome.applied, outcome.attempted, outcome.failed
        );

        outcome
    }

    /// Executes the batch statement once per row, in row order, inside one transaction
    pub async fn exec_batch(&self, batch: &BatchWrite) -> BatchOutcome {
        let statement = batch.statement();
        let steps: Vec<(&str, &[SqlValue])> = batch.rows().iter().map(|row| (statement, row.as_slice())).collect();
        let outcome = self
            .run_transaction("batch write", &steps, CommitSeverity::Error)
            .await;

        debug!(
            "Batch write: {} of {} rows applied, {} failed",
            outcome.applied, outcome.attempted, outcome.failed
        );

        outcome
    }

    /// Fire-and-forget execution outside any transaction
    pub async fn exec(&self, statement: &str) {
        if let Err(e) = self.bounded(self.backend.execute(statement, NO_PARAMS)).await {
            warn!(statement = %statement, "Statement failed: {}", e);
        }
    }

    /// Parameterized read. A failing query yields an empty sequence.
    pub async fn query(&self, statement: &str, params: &[SqlValue]) -> Rows {
        match self.bounded(self.backend.query(statement, params)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(statement = %statement, "Error while executing query: {}", e);
                Rows::empty()
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded(self.backend.ping()).await
    }

    async fn run_transaction(
        &self,
        operation: &str,
        steps: &[(&str, &[SqlValue])],
        commit_severity: CommitSeverity,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let mut session = match self.bounded(self.backend.begin()).await {
            Ok(session) => session,
            Err(e) => {
                error!(operation, "Failed to create a transaction: {}", e);
                return outcome;
            }
        };

        for &(sql, params) in steps {
            outcome.attempted += 1;

            let result = match self.write_mode {
                WriteMode::BestEffort => self.execute_isolated(session.as_mut(), sql, params).await,
                WriteMode::Atomic => self.bounded(session.execute(sql, params)).await.map(|_| ()),
            };

            match result {
                Ok(()) => outcome.applied += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!(operation, statement = %sql, "Statement failed: {}", e);

                    if self.write_mode == WriteMode::Atomic {
                        if let Err(e) = self.bounded(session.rollback()).await {
                            error!(operation, "Failed to roll back transaction: {}", e);
                        }
                        outcome.applied = 0;
                        return outcome;
                    }
                }
            }
        }

        match self.bounded(session.commit()).await {
            Ok(()) => outcome.committed = true,
            Err(e) => {
                // The process keeps running, whether to stop is the caller's call
                match commit_severity {
                    CommitSeverity::Fatal => {
                        error!(operation, severity = "fatal", "Failed to commit transaction: {}", e)
                    }
                    CommitSeverity::Error => {
                        error!(operation, "Failed to commit transaction: {}", e)
                    }
                }
                outcome.applied = 0;
            }
        }

        outcome
    }

    /// Runs one statement inside its own savepoint so a failure only undoes itself
    async fn execute_isolated(
        &self,
        session: &mut dyn Session,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<()> {
        self.bounded(session.savepoint(ROW_SAVEPOINT)).await?;

        match self.bounded(session.execute(sql, params)).await {
            Ok(_) => {
                self.bounded(session.release_savepoint(ROW_SAVEPOINT)).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = self.bounded(session.rollback_to_savepoint(ROW_SAVEPOINT)).await {
                    error!("Failed to roll back to savepoint: {}", rollback_err);
                } else if let Err(release_err) = self.bounded(session.release_savepoint(ROW_SAVEPOINT)).await {
                    error!("Failed to release savepoint: {}", release_err);
                }
                Err(e)
            }
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HomeError::Timeout {
                operation: "statement".to_string(),
                after: self.statement_timeout,
            }),
        }
    }
}
