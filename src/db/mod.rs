//! Database layer - the run's single connection and the fixed table schema

pub mod connection;
pub mod schema;

pub use connection::{Connection, SqlValue, StatementExecutor};
pub use schema::{Schema, SqlType, Table};
