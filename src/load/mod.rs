//! Load strategies
//!
//! Three interchangeable ways of getting the file into the table:
//!
//! | Strategy      | Input                 | Durability                          |
//! |---------------|-----------------------|-------------------------------------|
//! | `autocommit`  | normalized records    | each row commits on its own         |
//! | `transaction` | normalized records    | all rows or none                    |
//! | `copy`        | raw file after header | single server-side COPY, all or none|
//!
//! Every strategy runs its statements one after another on the run's single
//! connection.

pub mod bulk_copy;
pub mod row_insert;
pub mod statement;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::db::{Connection, Table};
use crate::error::Result;
use crate::io::SourceFile;
use crate::normalize::NormalizedRecord;
use crate::telemetry::ProgressStats;

pub use bulk_copy::BulkCopyLoader;
pub use row_insert::RowInsertLoader;

/// How rows are written to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One INSERT per row, each committed immediately
    Autocommit,
    /// One INSERT per row inside a single transaction
    Transactional,
    /// Server-side COPY streamed from the raw file
    BulkCopy,
}

impl LoadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategy::Autocommit => "autocommit",
            LoadStrategy::Transactional => "transaction",
            LoadStrategy::BulkCopy => "copy",
        }
    }

    /// Whether the strategy consumes normalized records rather than raw bytes
    pub fn uses_records(&self) -> bool {
        !matches!(self, LoadStrategy::BulkCopy)
    }

    pub fn loader(&self, quiet: bool) -> Box<dyn Loader> {
        match self {
            LoadStrategy::Autocommit => Box::new(RowInsertLoader::autocommit(quiet)),
            LoadStrategy::Transactional => Box::new(RowInsertLoader::transactional(quiet)),
            LoadStrategy::BulkCopy => Box::new(BulkCopyLoader::new(quiet)),
        }
    }
}

impl FromStr for LoadStrategy {
    type Err = String;

    /// Parse a strategy name (case-insensitive)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "autocommit" => Ok(LoadStrategy::Autocommit),
            "transaction" => Ok(LoadStrategy::Transactional),
            "copy" => Ok(LoadStrategy::BulkCopy),
            _ => Err(format!(
                "Unsupported strategy: {s}. Supported strategies: autocommit, transaction, copy"
            )),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a loader is handed
pub enum LoadBatch {
    /// Parsed and normalized records, in file order
    Rows(Vec<NormalizedRecord>),
    /// The source file, positioned at its start
    Raw(SourceFile),
}

impl LoadBatch {
    fn kind(&self) -> &'static str {
        match self {
            LoadBatch::Rows(_) => "records",
            LoadBatch::Raw(_) => "raw file",
        }
    }
}

/// Result of a loader run
#[derive(Debug)]
pub struct LoadOutcome {
    pub rows_loaded: u64,
    pub elapsed: Duration,
    pub stats: ProgressStats,
}

#[async_trait]
pub trait Loader: Send + Sync {
    fn strategy(&self) -> LoadStrategy;

    /// Write the batch into `table`, which must already exist
    async fn load(
        &self,
        conn: &mut Connection,
        table: &Table,
        batch: LoadBatch,
    ) -> Result<LoadOutcome>;
}
