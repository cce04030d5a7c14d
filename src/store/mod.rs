//! Storage layer
//!
//! Everything that mutates or reads the relational store goes through
//! [`StorageGateway`]. Batch writes are expressed as [`BatchWrite`] units of
//! [`SqlValue`] tuples; reads come back as [`Rows`].

mod backend;
mod batch;
mod gateway;
mod postgres;
mod rows;
mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, Session};
pub use batch::BatchWrite;
pub use gateway::{BatchOutcome, StorageGateway, WriteMode};
pub use postgres::PgBackend;
pub use rows::{Row, Rows};
pub use value::SqlValue;
