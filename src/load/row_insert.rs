//! Row-at-a-time INSERT strategies
//!
//! Both modes execute the same parameterized statement once per record, in
//! file order. They differ only in what the statements run against: the bare
//! connection (every row commits as it goes) or one transaction that is
//! committed after the last row and rolled back on the first failure.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::statement::InsertStatement;
use super::{LoadBatch, LoadOutcome, LoadStrategy, Loader};
use crate::db::{Connection, StatementExecutor, Table};
use crate::error::{Error, Result};
use crate::normalize::NormalizedRecord;
use crate::telemetry::{LoadProgress, ProgressStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitMode {
    PerRow,
    SingleTransaction,
}

pub struct RowInsertLoader {
    mode: CommitMode,
    quiet: bool,
}

impl RowInsertLoader {
    /// Rows already inserted stay in the table when a later row fails
    pub fn autocommit(quiet: bool) -> Self {
        Self {
            mode: CommitMode::PerRow,
            quiet,
        }
    }

    /// A failure anywhere leaves the table exactly as it was before the load
    pub fn transactional(quiet: bool) -> Self {
        Self {
            mode: CommitMode::SingleTransaction,
            quiet,
        }
    }
}

#[async_trait]
impl Loader for RowInsertLoader {
    fn strategy(&self) -> LoadStrategy {
        match self.mode {
            CommitMode::PerRow => LoadStrategy::Autocommit,
            CommitMode::SingleTransaction => LoadStrategy::Transactional,
        }
    }

    async fn load(
        &self,
        conn: &mut Connection,
        table: &Table,
        batch: LoadBatch,
    ) -> Result<LoadOutcome> {
        let records = match batch {
            LoadBatch::Rows(records) => records,
            other => {
                return Err(Error::load(
                    &table.name,
                    None,
                    format!("{} strategy cannot load a {}", self.strategy(), other.kind()),
                    None,
                ));
            }
        };

        let statement = InsertStatement::new(table);
        debug!(sql = statement.sql(), "Prepared insert statement");
        info!(
            strategy = %self.strategy(),
            rows = records.len(),
            table = %table.name,
            "Loading rows"
        );

        let progress = LoadProgress::rows(records.len() as u64, self.quiet);
        let start = Instant::now();

        let result = match self.mode {
            CommitMode::PerRow => insert_rows(conn, &statement, table, &records, &progress).await,
            CommitMode::SingleTransaction => {
                load_in_transaction(conn, &statement, table, &records, &progress).await
            }
        };

        let stats = match result {
            Ok(stats) => {
                progress.finish();
                stats
            }
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        };

        let elapsed = start.elapsed();
        info!(
            rows = stats.rows_loaded,
            "Data loaded. Time taken: {:.4} seconds",
            elapsed.as_secs_f64()
        );

        Ok(LoadOutcome {
            rows_loaded: stats.rows_loaded,
            elapsed,
            stats,
        })
    }
}

async fn load_in_transaction(
    conn: &mut Connection,
    statement: &InsertStatement,
    table: &Table,
    records: &[NormalizedRecord],
    progress: &LoadProgress,
) -> Result<ProgressStats> {
    let mut tx = conn.begin().await.map_err(|e| {
        Error::load(&table.name, None, "Failed to begin transaction", Some(e))
    })?;

    match insert_rows(&mut tx, statement, table, records, progress).await {
        Ok(stats) => {
            tx.commit().await.map_err(|e| {
                Error::load(&table.name, None, "Failed to commit transaction", Some(e))
            })?;
            Ok(stats)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            } else {
                info!(table = %table.name, "Transaction rolled back");
            }
            Err(e)
        }
    }
}

/// Execute the insert once per record, stopping at the first failure
async fn insert_rows<E>(
    executor: &mut E,
    statement: &InsertStatement,
    table: &Table,
    records: &[NormalizedRecord],
    progress: &LoadProgress,
) -> Result<ProgressStats>
where
    E: StatementExecutor + ?Sized,
{
    let mut stats = ProgressStats::new();

    for record in records {
        let values = statement
            .bind_values(record)
            .map_err(|message| Error::load(&table.name, Some(record.line), message, None))?;

        let started = Instant::now();
        executor
            .execute_with(statement.sql(), &values)
            .await
            .map_err(|e| {
                Error::load(&table.name, Some(record.line), "Insert failed", Some(e))
            })?;

        stats.record_row(started.elapsed());
        progress.advance(1);
    }

    Ok(stats)
}
