use census_loader::runner::{
    DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PASSWORD, DEFAULT_PORT, DEFAULT_TABLE_NAME,
    DEFAULT_USER, DatabaseConfigBuilder, LoadArgs, LoadResult, LoadStrategy, run_load,
};
use clap::Parser;
use std::path::PathBuf;

/// Load the ACS census tract CSV extract into PostgreSQL
#[derive(Parser, Clone)]
#[command(name = "census-loader", version)]
struct Args {
    /// Path to the census CSV file
    #[arg(short = 'd', long = "datafile")]
    datafile: PathBuf,

    /// Drop and recreate the table before loading
    #[arg(short = 'c', long = "createtable")]
    create_table: bool,

    /// Load strategy (autocommit, transaction, copy)
    #[arg(short, long, default_value = "transaction")]
    strategy: LoadStrategy,

    /// Destination table name
    #[arg(long, default_value = DEFAULT_TABLE_NAME)]
    table: String,

    /// Database host
    #[arg(long, env = "CENSUS_DB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Database port
    #[arg(long, env = "CENSUS_DB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Database name
    #[arg(long, env = "CENSUS_DB_NAME", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Database user
    #[arg(long, env = "CENSUS_DB_USER", default_value = DEFAULT_USER)]
    user: String,

    /// Database password
    #[arg(
        long,
        env = "CENSUS_DB_PASSWORD",
        default_value = DEFAULT_PASSWORD,
        hide_env_values = true
    )]
    password: String,

    /// Validate and normalize the file without touching the database
    #[arg(long)]
    dry_run: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("census_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("census_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if !args.quiet {
        println!("Census Data Loader");
        println!("==================");
        println!("Source: {}", args.datafile.display());
        println!("Table: {}", args.table);
        println!("Strategy: {}", args.strategy);
        println!("Database: {}@{}:{}/{}", args.user, args.host, args.port, args.database);
        println!();
    }

    let database = DatabaseConfigBuilder::default()
        .host(args.host)
        .port(args.port)
        .database(args.database)
        .user(args.user)
        .password(args.password)
        .build()?;

    let load_args = LoadArgs {
        source: args.datafile,
        table_name: args.table,
        strategy: args.strategy,
        recreate_table: args.create_table,
        dry_run: args.dry_run,
        quiet: args.quiet,
        database,
    };

    let result = run_load(load_args).await?;

    if result.dry_run {
        print_plan(&result, args.create_table);
    } else {
        print_summary(&result);
    }

    Ok(())
}

fn print_plan(result: &LoadResult, create_table: bool) {
    println!("DRY RUN MODE - No data will be loaded");
    println!();
    println!("Configuration:");
    println!("  Table: {}", result.table);
    println!("  Strategy: {}", result.strategy);
    println!("  Recreate table: {}", create_table);
    match result.rows_read {
        Some(rows) => println!("  Rows to load: {}", rows),
        None => println!("  Rows to load: streamed by COPY, not counted"),
    }

    if let Some(ref record) = result.first_record {
        println!();
        println!("First normalized record:");
        for (column, value) in record {
            println!("  {:<16} {}", column, value);
        }
    }

    println!();
    println!("To execute, run without --dry-run");
}

fn print_summary(result: &LoadResult) {
    println!();
    println!("Load Summary");
    println!("============");
    println!("Run ID: {}", result.run_id);
    println!(
        "Started: {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Strategy: {}", result.strategy);
    println!("Rows loaded: {}", result.rows_loaded);
    if let Some(rows) = result.table_rows {
        println!("Rows in '{}': {}", result.table, rows);
    }
    println!("Time taken: {:.4} seconds", result.duration.as_secs_f64());
    println!("Throughput: {:.2} rows/sec", result.rows_per_second());

    if let (Some(p50), Some(p90), Some(p99)) = result.stats.get_percentiles() {
        println!(
            "Statement latency: p50 {}us, p90 {}us, p99 {}us",
            p50, p90, p99
        );
    }
    if result.stats.bytes_processed > 0 {
        println!("Bytes streamed: {}", result.stats.bytes_processed);
    }
}
