//! Error types for the census loader.
//!
//! Every failure surfaces to the caller of [`crate::runner::run_load`]; none
//! of these are recovered from inside the pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Source file missing or unreadable.
    #[error("Cannot access source file '{}'", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV: missing header, field count disagreeing with the
    /// header, or a header that does not match the table columns.
    #[error("Malformed input at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// The database could not be reached.
    #[error("Failed to connect to {host}:{port}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    /// DROP/CREATE or the catalog lookup failed.
    #[error("Schema operation on table '{table}' failed")]
    Schema {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A row, statement, commit or COPY failed while loading.
    #[error("Load into '{table}' failed{}: {message}", at_line(.line))]
    Load {
        table: String,
        line: Option<u64>,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

fn at_line(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl Error {
    pub(crate) fn parse(line: u64, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn load(
        table: &str,
        line: Option<u64>,
        message: impl Into<String>,
        source: Option<sqlx::Error>,
    ) -> Self {
        Error::Load {
            table: table.to_string(),
            line,
            message: message.into(),
            source,
        }
    }

    /// Source line of the offending record, when one is known
    pub fn line(&self) -> Option<u64> {
        match self {
            Error::Parse { line, .. } => Some(*line),
            Error::Load { line, .. } => *line,
            _ => None,
        }
    }
}
