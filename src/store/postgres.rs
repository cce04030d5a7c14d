use crate::error::{HomeError, Result};
use crate::store::backend::{Backend, Session};
use crate::store::rows::{Row, Rows};
use crate::store::value::SqlValue;
use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Object, Pool, Runtime};
use futures::stream::{self, StreamExt};
use postgres_types::{ToSql, Type};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// PostgreSQL backend over a `deadpool-postgres` pool
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Builds the pool and pings the server; failure here is fatal for start-up
    pub async fn connect(database_url: &str, max_size: u32) -> Result<Self> {
        let pool = create_pool(database_url, max_size)?;
        let backend = Self { pool };

        backend.ping().await.map_err(|e| HomeError::ConnectionFailed {
            cause: format!("Ping failed: {}", e),
        })?;

        info!("Connected to PostgreSQL");
        Ok(backend)
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| HomeError::ConnectionFailed {
            cause: e.to_string(),
        })
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn begin(&self) -> Result<Box<dyn Session>> {
        let client = self.client().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgSession {
            client: Some(client),
        }))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let client = self.client().await?;
        client
            .execute(sql, &bind(params))
            .await
            .map_err(|e| statement_error(sql, e))
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Rows> {
        let client = self.client().await?;
        let stream = client
            .query_raw(sql, params.iter())
            .await
            .map_err(|e| statement_error(sql, e))?;

        // The pooled connection rides along with the stream and returns to the
        // pool once the stream is exhausted or dropped.
        let rows = stream::unfold(
            (client, Box::pin(stream), None::<Arc<[String]>>),
            |(client, mut stream, mut columns)| async move {
                match stream.next().await {
                    Some(Ok(row)) => {
                        let names = columns
                            .get_or_insert_with(|| {
                                row.columns()
                                    .iter()
                                    .map(|c| c.name().to_string())
                                    .collect::<Vec<_>>()
                                    .into()
                            })
                            .clone();
                        let values = (0..row.len()).map(|idx| column_value(&row, idx)).collect();
                        Some((Ok(Row::new(names, values)), (client, stream, columns)))
                    }
                    Some(Err(e)) => Some((Err(HomeError::from(e)), (client, stream, columns))),
                    None => None,
                }
            },
        )
        .boxed();

        Ok(Rows::new(rows))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }
}

/// Transaction pinned to one pooled connection
struct PgSession {
    client: Option<Object>,
}

impl PgSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| HomeError::Internal("transaction already finished".to_string()))
    }

    async fn finish(mut self: Box<Self>, sql: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| HomeError::Internal("transaction already finished".to_string()))?;
        client.batch_execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.client()?
            .execute(sql, &bind(params))
            .await
            .map_err(|e| statement_error(sql, e))
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.client()?.batch_execute(&format!("SAVEPOINT {}", name)).await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.client()?
            .batch_execute(&format!("RELEASE SAVEPOINT {}", name))
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.client()?
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        // A connection still inside a transaction must not go back to the pool
        if let Some(client) = self.client.take() {
            debug!("Discarding connection with an unfinished transaction");
            drop(Object::take(client));
        }
    }
}

fn bind(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn statement_error(sql: &str, err: tokio_postgres::Error) -> HomeError {
    let cause = match err.as_db_error() {
        Some(db_err) => format!(
            "{} - {}",
            db_err.message(),
            db_err.detail().unwrap_or("no additional detail")
        ),
        None => err.to_string(),
    };

    HomeError::StatementFailed {
        statement: sql.to_string(),
        cause,
    }
}

fn column_value(row: &tokio_postgres::Row, idx: usize) -> SqlValue {
    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Boolean),

        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Integer(v.into())),

        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Integer(v.into())),

        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Integer),

        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Float(v.into())),

        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float),

        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string())),

        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_rfc3339())),

        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string())),

        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string())),

        // Default: try to get as string
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(SqlValue::Text),
    };

    value.unwrap_or(SqlValue::Null)
}

fn create_pool(database_url: &str, max_size: u32) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: max_size as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| HomeError::ConnectionFailed {
            cause: format!("Failed to create pool: {}", e),
        })
}
