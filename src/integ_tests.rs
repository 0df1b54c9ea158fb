//! Integration tests for the full load pipeline
//!
//! These tests use file-backed SQLite databases and real CSV files to test
//! end to end scenarios of the loader. Each run gets its own connection; the
//! test opens a second one afterwards to inspect the table.

#[cfg(test)]
mod tests {
    use crate::{
        db::{Connection, Schema, StatementExecutor, Table, schema::recreate_table},
        error::Error,
        runner::{DatabaseConfig, LoadArgs, LoadStrategy, run_load},
    };
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use tokio::fs::File;
    use tokio::io::AsyncWriteExt;

    const TABLE: &str = "census_data";

    // ============ Test Helpers ============

    fn header() -> String {
        Schema::census().column_names().collect::<Vec<_>>().join(",")
    }

    /// One census row; every column not named below or in `overrides` is 1
    fn census_row(tract: u64, county: &str, overrides: &[(&str, &str)]) -> String {
        let tract = tract.to_string();
        Schema::census()
            .columns
            .iter()
            .map(|c| match c.name {
                "CensusTract" => tract.clone(),
                "State" => "Iowa".to_string(),
                "County" => county.to_string(),
                name => overrides
                    .iter()
                    .find(|(column, _)| *column == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| "1".to_string()),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn plain_rows(count: u64) -> Vec<String> {
        (1..=count)
            .map(|tract| census_row(tract, "Adair", &[]))
            .collect()
    }

    /// Write a CSV with the census header followed by `rows`
    async fn create_census_csv(dir: &TempDir, filename: &str, rows: &[String]) -> PathBuf {
        let mut lines = vec![header()];
        lines.extend(rows.iter().cloned());
        create_csv_with_content(dir, filename, &lines).await
    }

    /// Helper to create a test CSV file with custom content (lines include header)
    async fn create_csv_with_content(dir: &TempDir, filename: &str, lines: &[String]) -> PathBuf {
        let path = dir.path().join(filename);
        let mut file = File::create(&path).await.unwrap();
        for line in lines {
            file.write_all(line.as_bytes()).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        file.flush().await.unwrap();
        path
    }

    async fn open_db(dir: &TempDir) -> Connection {
        Connection::sqlite_at(&dir.path().join("census.db"))
            .await
            .unwrap()
    }

    async fn load_args(
        dir: &TempDir,
        source: &Path,
        strategy: LoadStrategy,
        recreate_table: bool,
    ) -> LoadArgs {
        LoadArgs {
            source: source.to_path_buf(),
            table_name: TABLE.to_string(),
            strategy,
            recreate_table,
            dry_run: false,
            quiet: true,
            database: DatabaseConfig::default(),
            test_connection: Some(open_db(dir).await),
        }
    }

    async fn table_count(dir: &TempDir) -> i64 {
        open_db(dir).await.count_rows(TABLE).await.unwrap()
    }

    // ============ Row strategies ============

    #[tokio::test]
    async fn test_transaction_load_conserves_rows() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(25)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, true).await;
        let result = run_load(args).await.unwrap();

        assert!(!result.dry_run);
        assert_eq!(result.strategy, LoadStrategy::Transactional);
        assert_eq!(result.rows_read, Some(25));
        assert_eq!(result.rows_loaded, 25);
        assert_eq!(result.table_rows, Some(25));
        assert_eq!(result.stats.statement_durations_us.len(), 25);
        assert_eq!(table_count(&temp_dir).await, 25);
    }

    #[tokio::test]
    async fn test_autocommit_load_conserves_rows() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(10)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Autocommit, true).await;
        let result = run_load(args).await.unwrap();

        assert_eq!(result.rows_loaded, 10);
        assert_eq!(table_count(&temp_dir).await, 10);
    }

    /// Run a transactional load of five rows where the row at `bad_index`
    /// cannot be bound, and check nothing reached the table
    async fn assert_transaction_rolls_back(bad_index: usize) {
        let temp_dir = TempDir::new().unwrap();
        let mut rows = plain_rows(5);
        rows[bad_index] = census_row(bad_index as u64 + 1, "Boone", &[("Poverty", "abc")]);
        let csv_path = create_census_csv(&temp_dir, "census.csv", &rows).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, true).await;
        let err = run_load(args).await.unwrap_err();

        assert!(matches!(err, Error::Load { .. }));
        // Header is line 1, so record N sits on line N + 1
        assert_eq!(err.line(), Some(bad_index as u64 + 2));
        assert_eq!(table_count(&temp_dir).await, 0);
    }

    #[tokio::test]
    async fn test_transaction_failure_leaves_no_rows() {
        assert_transaction_rolls_back(2).await;
    }

    #[tokio::test]
    async fn test_transaction_failure_on_first_row_leaves_no_rows() {
        assert_transaction_rolls_back(0).await;
    }

    #[tokio::test]
    async fn test_transaction_failure_on_last_row_leaves_no_rows() {
        // Four rows were inserted inside the transaction before this one
        assert_transaction_rolls_back(4).await;
    }

    #[tokio::test]
    async fn test_autocommit_failure_keeps_earlier_rows() {
        let temp_dir = TempDir::new().unwrap();
        let mut rows = plain_rows(5);
        rows[2] = census_row(3, "Boone", &[("Men", "many")]);
        let csv_path = create_census_csv(&temp_dir, "census.csv", &rows).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Autocommit, true).await;
        let err = run_load(args).await.unwrap_err();

        assert_eq!(err.line(), Some(4));
        assert_eq!(table_count(&temp_dir).await, 2);
    }

    #[tokio::test]
    async fn test_normalization_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let rows = vec![
            census_row(1, "Adair", &[]),
            census_row(2, "O'Brien", &[("Men", "")]),
            census_row(3, "Clay", &[]),
        ];
        let csv_path = create_census_csv(&temp_dir, "census.csv", &rows).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, true).await;
        let result = run_load(args).await.unwrap();
        assert_eq!(result.rows_loaded, 3);

        let mut conn = open_db(&temp_dir).await;
        let Connection::Sqlite(ref mut sqlite_conn) = conn else {
            panic!("expected a SQLite connection");
        };
        let (men, county): (i64, String) = sqlx::query_as(
            "SELECT Men, County FROM census_data WHERE CensusTract = 2",
        )
        .fetch_one(&mut *sqlite_conn)
        .await
        .unwrap();

        assert_eq!(men, 0);
        assert_eq!(county, "OBrien");
    }

    #[tokio::test]
    async fn test_load_into_existing_table_appends() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(4)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, true).await;
        run_load(args).await.unwrap();
        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, false).await;
        let result = run_load(args).await.unwrap();

        assert_eq!(result.rows_loaded, 4);
        assert_eq!(result.table_rows, Some(8));
    }

    #[tokio::test]
    async fn test_missing_table_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(2)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Autocommit, false).await;
        let err = run_load(args).await.unwrap_err();

        match err {
            Error::Load { line, source, .. } => {
                assert_eq!(line, Some(2));
                assert!(source.is_some());
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }

    // ============ Schema ============

    #[tokio::test]
    async fn test_recreate_twice_leaves_empty_table() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(3)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::Transactional, true).await;
        run_load(args).await.unwrap();
        assert_eq!(table_count(&temp_dir).await, 3);

        let mut conn = open_db(&temp_dir).await;
        recreate_table(&mut conn, &Table::new(TABLE, Schema::census()))
            .await
            .unwrap();
        assert_eq!(conn.count_rows(TABLE).await.unwrap(), 0);

        let Connection::Sqlite(ref mut sqlite_conn) = conn else {
            panic!("expected a SQLite connection");
        };
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('census_data')")
                .fetch_all(&mut *sqlite_conn)
                .await
                .unwrap();
        let columns: Vec<String> = columns.into_iter().map(|(name,)| name).collect();
        let expected: Vec<String> = Schema::census()
            .columns
            .iter()
            .map(|c| c.folded_name())
            .collect();
        assert_eq!(columns, expected);
    }

    #[tokio::test]
    async fn test_load_into_table_created_with_unquoted_ddl() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(3)).await;

        // Same layout, written the way a hand-made DDL script would be
        let columns = Schema::census()
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.to_postgres()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut setup = open_db(&temp_dir).await;
        setup
            .execute(&format!("CREATE TABLE census_data ({columns})"))
            .await
            .unwrap();
        drop(setup);

        for strategy in [LoadStrategy::Autocommit, LoadStrategy::Transactional] {
            let args = load_args(&temp_dir, &csv_path, strategy, false).await;
            let result = run_load(args).await.unwrap();
            assert_eq!(result.rows_loaded, 3);
        }

        let mut conn = open_db(&temp_dir).await;
        let Connection::Sqlite(ref mut sqlite_conn) = conn else {
            panic!("expected a SQLite connection");
        };
        let (total,): (i64,) = sqlx::query_as("SELECT SUM(TotalPop) FROM census_data")
            .fetch_one(&mut *sqlite_conn)
            .await
            .unwrap();
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_malformed_file_keeps_existing_table() {
        let temp_dir = TempDir::new().unwrap();
        let good = create_census_csv(&temp_dir, "good.csv", &plain_rows(2)).await;
        let args = load_args(&temp_dir, &good, LoadStrategy::Transactional, true).await;
        run_load(args).await.unwrap();

        let mut rows = plain_rows(3);
        rows[1] = "2,Iowa,Adair,1".to_string();
        let bad = create_census_csv(&temp_dir, "bad.csv", &rows).await;
        let args = load_args(&temp_dir, &bad, LoadStrategy::Transactional, true).await;
        let err = run_load(args).await.unwrap_err();

        assert!(matches!(err, Error::Parse { line: 3, .. }));
        // Parsing fails before the table is dropped
        assert_eq!(table_count(&temp_dir).await, 2);
    }

    #[tokio::test]
    async fn test_header_mismatch_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let wrong_header = header().replace("County", "Parish");
        let lines = vec![wrong_header, census_row(1, "Adair", &[])];
        let csv_path = create_csv_with_content(&temp_dir, "census.csv", &lines).await;

        for strategy in [LoadStrategy::Transactional, LoadStrategy::BulkCopy] {
            let args = load_args(&temp_dir, &csv_path, strategy, true).await;
            let err = run_load(args).await.unwrap_err();
            assert!(matches!(err, Error::Parse { line: 1, .. }), "{strategy}");
        }
    }

    // ============ Other paths ============

    #[tokio::test]
    async fn test_missing_file_is_file_access_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.csv");

        for strategy in [LoadStrategy::Autocommit, LoadStrategy::BulkCopy] {
            let args = load_args(&temp_dir, &missing, strategy, true).await;
            let err = run_load(args).await.unwrap_err();
            assert!(matches!(err, Error::FileAccess { .. }), "{strategy}");
        }
    }

    #[tokio::test]
    async fn test_bulk_copy_requires_postgres() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_census_csv(&temp_dir, "census.csv", &plain_rows(3)).await;

        let args = load_args(&temp_dir, &csv_path, LoadStrategy::BulkCopy, true).await;
        let err = run_load(args).await.unwrap_err();

        assert!(matches!(err, Error::Load { line: None, .. }));
        assert!(err.to_string().contains("PostgreSQL"));
        assert_eq!(table_count(&temp_dir).await, 0);
    }

    #[tokio::test]
    async fn test_dry_run_touches_no_database() {
        let temp_dir = TempDir::new().unwrap();
        let rows = vec![
            census_row(1, "O'Brien", &[("Women", "")]),
            census_row(2, "Adair", &[]),
        ];
        let csv_path = create_census_csv(&temp_dir, "census.csv", &rows).await;

        let args = LoadArgs {
            source: csv_path,
            table_name: TABLE.to_string(),
            strategy: LoadStrategy::Autocommit,
            recreate_table: true,
            dry_run: true,
            quiet: true,
            database: DatabaseConfig::default(),
            test_connection: None,
        };
        let result = run_load(args).await.unwrap();

        assert!(result.dry_run);
        assert_eq!(result.rows_read, Some(2));
        assert_eq!(result.rows_loaded, 0);
        assert_eq!(result.table_rows, None);

        let first = result.first_record.unwrap();
        assert_eq!(first.len(), 37);
        assert!(first.contains(&("County".to_string(), "OBrien".to_string())));
        assert!(first.contains(&("Women".to_string(), "0".to_string())));
        assert!(!temp_dir.path().join("census.db").exists());
    }
}
