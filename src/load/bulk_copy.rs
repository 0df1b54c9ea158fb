//! Server-side COPY strategy
//!
//! The file is streamed to Postgres as-is after its header line. No
//! normalization happens on this path: empty fields arrive as NULL (the
//! statement declares `NULL ''`) and County values keep their quotes.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{LoadBatch, LoadOutcome, LoadStrategy, Loader};
use crate::db::{Connection, Table};
use crate::error::{Error, Result};
use crate::formats::reader::parse_header;
use crate::formats::{DelimitedConfig, validate_header};
use crate::io::SourceFile;
use crate::telemetry::{LoadProgress, ProgressStats};

/// `COPY "table" FROM STDIN` in text format with comma delimiter
pub fn copy_statement(table: &Table) -> String {
    format!(
        "COPY {} FROM STDIN WITH (FORMAT text, DELIMITER ',', NULL '')",
        table.quoted_name()
    )
}

pub struct BulkCopyLoader {
    quiet: bool,
}

impl BulkCopyLoader {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

#[async_trait]
impl Loader for BulkCopyLoader {
    fn strategy(&self) -> LoadStrategy {
        LoadStrategy::BulkCopy
    }

    async fn load(
        &self,
        conn: &mut Connection,
        table: &Table,
        batch: LoadBatch,
    ) -> Result<LoadOutcome> {
        let mut source = match batch {
            LoadBatch::Raw(source) => source,
            other => {
                return Err(Error::load(
                    &table.name,
                    None,
                    format!("{} strategy cannot load {}", self.strategy(), other.kind()),
                    None,
                ));
            }
        };

        skip_header(&mut source, table).await?;

        let Some(pg) = conn.postgres_mut() else {
            return Err(Error::load(
                &table.name,
                None,
                "Bulk copy requires a PostgreSQL connection",
                None,
            ));
        };

        let statement = copy_statement(table);
        debug!(sql = %statement, "Starting COPY");
        info!(
            file = %source.path().display(),
            table = %table.name,
            "Copying file into table"
        );

        let progress = LoadProgress::bytes(
            source.size().saturating_sub(source.bytes_read()),
            self.quiet,
        );
        let mut stats = ProgressStats::new();
        let start = Instant::now();

        let copy_error =
            |message: &str, e: sqlx::Error| Error::load(&table.name, None, message, Some(e));

        let mut copy = match pg.copy_in_raw(&statement).await {
            Ok(copy) => copy,
            Err(e) => {
                progress.abandon();
                return Err(copy_error("COPY could not start", e));
            }
        };

        loop {
            let chunk = match source.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    progress.abandon();
                    if let Err(abort_err) = copy.abort("source file read failed").await {
                        warn!(error = %abort_err, "Failed to abort COPY");
                    }
                    return Err(e);
                }
            };

            let len = chunk.len() as u64;
            // Dropping an unfinished copy aborts it on the server
            if let Err(e) = copy.send(chunk).await {
                progress.abandon();
                return Err(copy_error("COPY data rejected", e));
            }
            stats.record_bytes(len);
            progress.advance(len);
        }

        let rows = match copy.finish().await {
            Ok(rows) => rows,
            Err(e) => {
                progress.abandon();
                return Err(copy_error("COPY failed", e));
            }
        };
        progress.finish();

        stats.rows_loaded = rows;
        let elapsed = start.elapsed();
        info!(
            rows,
            bytes = stats.bytes_processed,
            "Data loaded. Time taken: {:.4} seconds",
            elapsed.as_secs_f64()
        );

        Ok(LoadOutcome {
            rows_loaded: rows,
            elapsed,
            stats,
        })
    }
}

/// Consume the header line and check it against the table layout
async fn skip_header(source: &mut SourceFile, table: &Table) -> Result<()> {
    let line = source
        .read_header()
        .await?
        .ok_or_else(|| Error::parse(1, "File has no header line"))?;
    let header = parse_header(&line, &DelimitedConfig::csv())?;
    validate_header(&header, &table.schema)
}
