use crate::error::Result;
use crate::store::rows::Rows;
use crate::store::value::SqlValue;
use async_trait::async_trait;

/// Connection-level access to the relational store.
///
/// Only [`StorageGateway`](crate::store::StorageGateway) talks to a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Opens a transaction on a dedicated connection
    async fn begin(&self) -> Result<Box<dyn Session>>;

    /// Runs one statement outside any transaction
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Rows>;

    async fn ping(&self) -> Result<()>;
}

/// An open transaction.
///
/// Dropping a session without calling [`Session::commit`] or
/// [`Session::rollback`] abandons the transaction.
#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn savepoint(&mut self, name: &str) -> Result<()>;

    async fn release_savepoint(&mut self, name: &str) -> Result<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
