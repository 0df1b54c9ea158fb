//! Single database connection used for the whole run.
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::ConnectOptions;
use sqlx::postgres::PgConnection;
use tracing::info;

use super::schema::quote_identifier;
use crate::config::{CONNECT_TIMEOUT, DatabaseConfig};

/// A value ready to be bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(i32),
    Numeric(Decimal),
    Text(String),
}

/// Connection that can be either Postgres or SQLite
///
/// Outside of tests only the Postgres variant exists. It runs in autocommit
/// mode: every statement executed directly on it is durable once it returns.
pub enum Connection {
    Postgres(PgConnection),
    #[cfg(test)]
    Sqlite(sqlx::SqliteConnection),
}

/// Open transaction borrowed from a [`Connection`]
///
/// Dropping it without calling [`Transaction::commit`] rolls it back.
pub enum Transaction<'c> {
    Postgres(sqlx::Transaction<'c, sqlx::Postgres>),
    #[cfg(test)]
    Sqlite(sqlx::Transaction<'c, sqlx::Sqlite>),
}

/// Something statements can be executed against: the bare connection
/// (autocommit) or an open transaction.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Execute `sql` with `values` bound to `$1..$n` in order, returning the
    /// number of affected rows
    async fn execute_with(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64, sqlx::Error>;

    async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        self.execute_with(sql, &[]).await
    }
}

impl Connection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let connect_options = config.connect_options();

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, connect_options.connect())
            .await
            .map_err(|_| connect_timed_out())??;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connected to database"
        );
        Ok(Connection::Postgres(conn))
    }

    /// Create an in-memory SQLite connection for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let conn = <sqlx::SqliteConnection as sqlx::Connection>::connect("sqlite::memory:").await?;
        Ok(Connection::Sqlite(conn))
    }

    /// Open (creating if needed) a file-backed SQLite database for testing
    ///
    /// Unlike the in-memory variant the data outlives the connection, so a
    /// test can hand one connection to a run and inspect with another.
    #[cfg(test)]
    pub async fn sqlite_at(path: &std::path::Path) -> Result<Self, sqlx::Error> {
        let conn = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await?;
        Ok(Connection::Sqlite(conn))
    }

    /// The underlying Postgres connection, for protocol features such as COPY
    pub fn postgres_mut(&mut self) -> Option<&mut PgConnection> {
        match self {
            Connection::Postgres(conn) => Some(conn),
            #[cfg(test)]
            Connection::Sqlite(_) => None,
        }
    }

    pub async fn begin(&mut self) -> Result<Transaction<'_>, sqlx::Error> {
        match self {
            Connection::Postgres(conn) => {
                let tx = sqlx::Connection::begin(conn).await?;
                Ok(Transaction::Postgres(tx))
            }
            #[cfg(test)]
            Connection::Sqlite(conn) => {
                let tx = sqlx::Connection::begin(conn).await?;
                Ok(Transaction::Sqlite(tx))
            }
        }
    }

    /// Check whether a table with exactly this name exists in the catalog
    pub async fn table_exists(&mut self, table_name: &str) -> Result<bool, sqlx::Error> {
        match self {
            Connection::Postgres(conn) => {
                let (exists,): (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_tables WHERE tablename = $1)")
                        .bind(table_name)
                        .fetch_one(&mut *conn)
                        .await?;
                Ok(exists)
            }
            #[cfg(test)]
            Connection::Sqlite(conn) => {
                let (count,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                )
                .bind(table_name)
                .fetch_one(&mut *conn)
                .await?;
                Ok(count > 0)
            }
        }
    }

    /// Number of rows currently in the table
    pub async fn count_rows(&mut self, table_name: &str) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
        let (count,): (i64,) = match self {
            Connection::Postgres(conn) => sqlx::query_as(&sql).fetch_one(&mut *conn).await?,
            #[cfg(test)]
            Connection::Sqlite(conn) => sqlx::query_as(&sql).fetch_one(&mut *conn).await?,
        };
        Ok(count)
    }
}

#[async_trait]
impl StatementExecutor for Connection {
    async fn execute_with(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64, sqlx::Error> {
        match self {
            Connection::Postgres(conn) => execute_postgres(conn, sql, values).await,
            #[cfg(test)]
            Connection::Sqlite(conn) => execute_sqlite(conn, sql, values).await,
        }
    }
}

impl Transaction<'_> {
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            Transaction::Postgres(tx) => tx.commit().await,
            #[cfg(test)]
            Transaction::Sqlite(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            Transaction::Postgres(tx) => tx.rollback().await,
            #[cfg(test)]
            Transaction::Sqlite(tx) => tx.rollback().await,
        }
    }
}

#[async_trait]
impl<'c> StatementExecutor for Transaction<'c> {
    async fn execute_with(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64, sqlx::Error> {
        match self {
            Transaction::Postgres(tx) => execute_postgres(&mut **tx, sql, values).await,
            #[cfg(test)]
            Transaction::Sqlite(tx) => execute_sqlite(&mut **tx, sql, values).await,
        }
    }
}

async fn execute_postgres(
    conn: &mut PgConnection,
    sql: &str,
    values: &[SqlValue],
) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(sql);
    for value in values {
        query = match value {
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Numeric(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
        };
    }
    Ok(query.execute(conn).await?.rows_affected())
}

fn connect_timed_out() -> sqlx::Error {
    sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!(
            "connection attempt timed out after {} seconds",
            CONNECT_TIMEOUT.as_secs()
        ),
    ))
}

/// Execute against SQLite (placeholders rewritten, same binding as Postgres)
#[cfg(test)]
async fn execute_sqlite(
    conn: &mut sqlx::SqliteConnection,
    sql: &str,
    values: &[SqlValue],
) -> Result<u64, sqlx::Error> {
    let sqlite_sql = convert_to_sqlite_placeholders(sql);
    let mut query = sqlx::query(&sqlite_sql);
    for value in values {
        query = match value {
            SqlValue::Integer(v) => query.bind(*v),
            // No decimal type in SQLite; the column affinity decides
            SqlValue::Numeric(v) => query.bind(v.to_string()),
            SqlValue::Text(v) => query.bind(v.as_str()),
        };
    }
    Ok(query.execute(conn).await?.rows_affected())
}

/// Convert Postgres-style placeholders ($1, $2, ...) to SQLite-style (?, ?, ...)
#[cfg(test)]
fn convert_to_sqlite_placeholders(sql: &str) -> String {
    let mut result = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            // Skip the dollar sign and any following digits
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                chars.next();
            }
            result.push('?');
        } else {
            result.push(ch);
        }
    }

    result
}
