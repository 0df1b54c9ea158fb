use tracing::info;

use super::connection::{Connection, StatementExecutor};
use crate::error::{Error, Result};

/// SQL data type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Numeric,
    Decimal,
    Text,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Numeric => "NUMERIC",
            SqlType::Decimal => "DECIMAL",
            SqlType::Text => "TEXT",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Text)
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

impl Column {
    /// Name as Postgres stores an unquoted identifier
    pub fn folded_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

const fn column(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

/// Column layout of the census extract, in file and table order
const CENSUS_COLUMNS: [Column; 37] = [
    column("CensusTract", SqlType::Numeric),
    column("State", SqlType::Text),
    column("County", SqlType::Text),
    column("TotalPop", SqlType::Integer),
    column("Men", SqlType::Integer),
    column("Women", SqlType::Integer),
    column("Hispanic", SqlType::Decimal),
    column("White", SqlType::Decimal),
    column("Black", SqlType::Decimal),
    column("Native", SqlType::Decimal),
    column("Asian", SqlType::Decimal),
    column("Pacific", SqlType::Decimal),
    column("Citizen", SqlType::Decimal),
    column("Income", SqlType::Decimal),
    column("IncomeErr", SqlType::Decimal),
    column("IncomePerCap", SqlType::Decimal),
    column("IncomePerCapErr", SqlType::Decimal),
    column("Poverty", SqlType::Decimal),
    column("ChildPoverty", SqlType::Decimal),
    column("Professional", SqlType::Decimal),
    column("Service", SqlType::Decimal),
    column("Office", SqlType::Decimal),
    column("Construction", SqlType::Decimal),
    column("Production", SqlType::Decimal),
    column("Drive", SqlType::Decimal),
    column("Carpool", SqlType::Decimal),
    column("Transit", SqlType::Decimal),
    column("Walk", SqlType::Decimal),
    column("OtherTransp", SqlType::Decimal),
    column("WorkAtHome", SqlType::Decimal),
    column("MeanCommute", SqlType::Decimal),
    column("Employed", SqlType::Integer),
    column("PrivateWork", SqlType::Decimal),
    column("PublicWork", SqlType::Decimal),
    column("SelfEmployed", SqlType::Decimal),
    column("FamilyWork", SqlType::Decimal),
    column("Unemployment", SqlType::Decimal),
];

/// A fixed, ordered collection of columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// The census tract layout every load targets
    pub fn census() -> Self {
        Self {
            columns: CENSUS_COLUMNS.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// Destination table: a name plus its fixed column layout
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Table name quoted as a SQL identifier
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Quoted, comma separated column list in schema order
    ///
    /// Names are lowercased so the list matches a table created with
    /// unquoted DDL, where Postgres folds identifiers to lower case.
    pub fn column_list(&self) -> String {
        self.schema
            .columns
            .iter()
            .map(|col| quote_identifier(&col.folded_name()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn drop_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quoted_name())
    }

    /// Generate DDL statement for creating the table
    pub fn create_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE {} (\n", self.quoted_name());

        let column_defs: Vec<String> = self
            .schema
            .columns
            .iter()
            .map(|col| {
                format!(
                    "  {} {}",
                    quote_identifier(&col.folded_name()),
                    col.sql_type.to_postgres()
                )
            })
            .collect();

        ddl.push_str(&column_defs.join(",\n"));
        ddl.push_str("\n)");

        ddl
    }
}

/// Double-quote an identifier, doubling any embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Drop the table if present and create it again from the fixed layout
///
/// Both statements run in one transaction. Whatever the table held before is
/// gone once this returns `Ok`.
pub async fn recreate_table(conn: &mut Connection, table: &Table) -> Result<()> {
    let schema_error = |source| Error::Schema {
        table: table.name.clone(),
        source,
    };

    let mut tx = conn.begin().await.map_err(schema_error)?;
    tx.execute(&table.drop_ddl()).await.map_err(schema_error)?;
    tx.execute(&table.create_ddl()).await.map_err(schema_error)?;
    tx.commit().await.map_err(schema_error)?;

    info!(
        table = %table.name,
        columns = table.schema.len(),
        "Table recreated"
    );
    Ok(())
}

/// Catalog lookup: does the table currently exist
pub async fn table_exists(conn: &mut Connection, table: &Table) -> Result<bool> {
    conn.table_exists(&table.name)
        .await
        .map_err(|source| Error::Schema {
            table: table.name.clone(),
            source,
        })
}
