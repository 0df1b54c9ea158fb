//! High-level runner API for the census loader.
//!
//! One call to [`run_load`] performs a whole run, in this order:
//!
//! 1. read the source file, check its header against the table layout and
//!    (for the row strategies) parse and normalize every record
//! 2. connect to the database
//! 3. drop and recreate the table, if requested
//! 4. hand the records or the raw file to the chosen strategy
//! 5. count what the table holds afterwards
//!
//! All input problems surface in step 1, before anything touches the
//! database, so a malformed file never costs the existing table.
//!
//! This is the primary API for external users and for the CLI.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::schema::{recreate_table, table_exists};
use crate::db::{Connection, Schema, Table};
use crate::formats::{DelimitedConfig, read_header, read_records, validate_header};
use crate::io::SourceFile;
use crate::load::LoadBatch;
use crate::normalize::{NormalizedRecord, Normalizer};
use crate::telemetry::ProgressStats;

pub use crate::config::{
    DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PASSWORD, DEFAULT_PORT, DEFAULT_TABLE_NAME,
    DEFAULT_USER, DatabaseConfig, DatabaseConfigBuilder,
};
pub use crate::error::{Error, Result};
pub use crate::load::LoadStrategy;

/// Arguments for running a load
pub struct LoadArgs {
    /// Path to the census CSV file
    pub source: PathBuf,
    pub table_name: String,
    pub strategy: LoadStrategy,

    /// Drop and recreate the table before loading
    pub recreate_table: bool,
    /// Validate and normalize the file without touching the database
    pub dry_run: bool,
    pub quiet: bool,

    pub database: DatabaseConfig,

    // Test-only: inject a pre-opened connection (for SQLite testing)
    #[cfg(test)]
    pub test_connection: Option<Connection>,
}

/// Result of a completed run
#[derive(Debug)]
pub struct LoadResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub strategy: LoadStrategy,
    pub table: String,
    /// Records parsed from the file; not known for `copy`, which never parses
    pub rows_read: Option<u64>,
    pub rows_loaded: u64,
    /// Row count of the table after the load, when it could be read
    pub table_rows: Option<i64>,
    pub duration: Duration,
    pub stats: ProgressStats,
    pub dry_run: bool,
    /// First normalized record as (column, value) pairs, filled for dry runs
    pub first_record: Option<Vec<(String, String)>>,
}

impl LoadResult {
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.rows_loaded as f64 / secs
        } else {
            0.0
        }
    }
}

/// Run a load with the specified arguments
///
/// # Example
///
/// ```no_run
/// use census_loader::runner::{DatabaseConfig, LoadArgs, LoadStrategy, run_load};
///
/// # async fn example() -> census_loader::runner::Result<()> {
/// let args = LoadArgs {
///     source: "acs2015_census_tract_data.csv".into(),
///     table_name: "census_data".to_string(),
///     strategy: LoadStrategy::Transactional,
///     recreate_table: true,
///     dry_run: false,
///     quiet: true,
///     database: DatabaseConfig::default(),
/// };
///
/// let result = run_load(args).await?;
/// println!("Loaded {} rows in {:?}", result.rows_loaded, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(mut args: LoadArgs) -> Result<LoadResult> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let table = Table::new(args.table_name.clone(), Schema::census());

    info!(
        %run_id,
        strategy = %args.strategy,
        source = %args.source.display(),
        table = %table.name,
        "Starting load"
    );

    let records = prepare_input(&args, &table).await?;
    let rows_read = records.as_ref().map(|r| r.len() as u64);

    if args.dry_run {
        info!("Dry run: input is valid, no database changes made");
        let first_record = records.as_ref().and_then(|r| r.first()).map(|record| {
            record
                .iter()
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect()
        });
        return Ok(LoadResult {
            run_id,
            started_at,
            strategy: args.strategy,
            table: table.name,
            rows_read,
            rows_loaded: 0,
            table_rows: None,
            duration: Duration::ZERO,
            stats: ProgressStats::new(),
            dry_run: true,
            first_record,
        });
    }

    let mut conn = open_connection(&mut args).await?;

    if args.recreate_table {
        recreate_table(&mut conn, &table).await?;
        let lookup = table_exists(&mut conn, &table).await;
        report_table_check(&table, lookup);
    }

    let batch = match records {
        Some(records) => LoadBatch::Rows(records),
        None => LoadBatch::Raw(SourceFile::open(&args.source).await?),
    };

    let outcome = args
        .strategy
        .loader(args.quiet)
        .load(&mut conn, &table, batch)
        .await?;

    let table_rows = match conn.count_rows(&table.name).await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %e, table = %table.name, "Could not count table rows");
            None
        }
    };

    Ok(LoadResult {
        run_id,
        started_at,
        strategy: args.strategy,
        table: table.name,
        rows_read,
        rows_loaded: outcome.rows_loaded,
        table_rows,
        duration: outcome.elapsed,
        stats: outcome.stats,
        dry_run: false,
        first_record: None,
    })
}

/// Validate the source file and, for the row strategies, return its
/// normalized records
async fn prepare_input(args: &LoadArgs, table: &Table) -> Result<Option<Vec<NormalizedRecord>>> {
    let config = DelimitedConfig::csv();

    if !args.strategy.uses_records() {
        let header = read_header(&args.source, &config).await?;
        validate_header(&header, &table.schema)?;
        return Ok(None);
    }

    let parsed = read_records(&args.source, &config).await?;
    validate_header(&parsed.columns[..], &table.schema)?;

    let records = Normalizer::new(&table.schema).normalize_all(&parsed.records);
    info!(rows = records.len(), "Records parsed and normalized");
    Ok(Some(records))
}

/// Log the post-create catalog check; returns whether the table was seen
///
/// Never fails the run: if the table really is missing, the load itself
/// reports it.
fn report_table_check(table: &Table, lookup: Result<bool>) -> bool {
    match lookup {
        Ok(true) => {
            info!(table = %table.name, "Table exists");
            true
        }
        Ok(false) => {
            warn!(table = %table.name, "Table not found after creation");
            false
        }
        Err(e) => {
            warn!(error = %e, table = %table.name, "Could not check that the table exists");
            false
        }
    }
}

async fn open_connection(args: &mut LoadArgs) -> Result<Connection> {
    #[cfg(test)]
    if let Some(conn) = args.test_connection.take() {
        return Ok(conn);
    }

    let db = &args.database;
    Connection::connect(db)
        .await
        .map_err(|source| Error::Connection {
            host: db.host.clone(),
            port: db.port,
            source,
        })
}
