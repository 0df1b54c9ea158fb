//! The parameterized INSERT used by the row strategies

use rust_decimal::Decimal;

use crate::db::{SqlType, SqlValue, Table};
use crate::normalize::NormalizedRecord;

/// `INSERT INTO "table" ("c1", ..., "cN") VALUES ($1, ..., $N)` plus the
/// column types needed to bind a record to it
#[derive(Debug, Clone)]
pub struct InsertStatement {
    sql: String,
    column_types: Vec<SqlType>,
}

impl InsertStatement {
    pub fn new(table: &Table) -> Self {
        let placeholders = (1..=table.schema.len())
            .map(|idx| format!("${idx}"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted_name(),
            table.column_list(),
            placeholders
        );

        Self {
            sql,
            column_types: table.schema.columns.iter().map(|c| c.sql_type).collect(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Convert a record's fields into typed values, one per placeholder
    ///
    /// Values are only ever bound, never spliced into the statement text.
    pub fn bind_values(&self, record: &NormalizedRecord) -> Result<Vec<SqlValue>, String> {
        if record.fields.len() != self.column_types.len() {
            return Err(format!(
                "Record has {} fields, statement expects {}",
                record.fields.len(),
                self.column_types.len()
            ));
        }

        record
            .iter()
            .zip(&self.column_types)
            .map(|((column, value), sql_type)| bind_typed_value(column, value, *sql_type))
            .collect()
    }
}

fn bind_typed_value(column: &str, value: &str, sql_type: SqlType) -> Result<SqlValue, String> {
    Ok(match sql_type {
        SqlType::Integer => SqlValue::Integer(parse(column, value.trim(), sql_type)?),
        // Exact parse: a value with more digits than fit is an error, never rounded
        SqlType::Numeric | SqlType::Decimal => SqlValue::Numeric(
            Decimal::from_str_exact(value.trim())
                .map_err(|e| type_mismatch(column, value.trim(), sql_type, e))?,
        ),
        SqlType::Text => SqlValue::Text(value.to_string()),
    })
}

fn parse<T: std::str::FromStr>(column: &str, value: &str, sql_type: SqlType) -> Result<T, String>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| type_mismatch(column, value, sql_type, e))
}

fn type_mismatch(column: &str, value: &str, sql_type: SqlType, e: impl std::fmt::Display) -> String {
    format!(
        "Type mismatch in column '{}': cannot convert '{}' to {} ({})",
        column,
        value,
        sql_type.to_postgres(),
        e
    )
}
