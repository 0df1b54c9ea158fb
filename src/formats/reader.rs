use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::db::Schema;
use crate::error::{Error, Result};
use crate::io::SourceFile;

/// A single record (row) from the file
///
/// Fields are kept in file order and paired with the header names, so the
/// record can be walked as (column, value) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based line number in the source file
    pub line: u64,
    columns: Arc<[String]>,
    pub fields: Vec<String>,
}

impl Record {
    pub fn new(line: u64, columns: Arc<[String]>, fields: Vec<String>) -> Self {
        Self {
            line,
            columns,
            fields,
        }
    }

    /// Shared handle on the header names
    pub(crate) fn columns_arc(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    /// (column, value) pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.fields.iter().map(String::as_str))
    }
}

/// Configuration for delimited file reading
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }
}

/// Header names plus every data record of a parsed file
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub columns: Arc<[String]>,
    pub records: Vec<Record>,
}

/// Read and parse the whole file into records
///
/// The file handle is released before parsing starts.
pub async fn read_records(path: &Path, config: &DelimitedConfig) -> Result<ParsedFile> {
    info!("Fetching data from file: {}", path.display());

    let buffer = {
        let mut source = SourceFile::open(path).await?;
        source.read_to_end().await?
    };

    parse_records(&buffer, config)
}

/// Read only the header line of a file and split it into column names
pub async fn read_header(path: &Path, config: &DelimitedConfig) -> Result<Vec<String>> {
    let mut source = SourceFile::open(path).await?;
    let line = source
        .read_header()
        .await?
        .ok_or_else(|| Error::parse(1, "File has no header line"))?;
    parse_header(&line, config)
}

/// Split a single header line into trimmed column names
pub fn parse_header(line: &str, config: &DelimitedConfig) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote)
        .has_headers(false)
        .from_reader(line.as_bytes());

    match csv_reader.records().next() {
        Some(record) => Ok(record
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect()),
        None => Err(Error::parse(1, "File has no header line")),
    }
}

/// Parse delimited bytes whose first line is the header
pub fn parse_records(data: &[u8], config: &DelimitedConfig) -> Result<ParsedFile> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote)
        .has_headers(true)
        .flexible(false)
        .from_reader(data);

    let headers = csv_reader.headers().map_err(csv_error)?;
    if headers.is_empty() {
        return Err(Error::parse(1, "File has no header line"));
    }
    let columns: Arc<[String]> = headers.iter().map(|h| h.trim().to_string()).collect();

    let mut records = Vec::new();

    for result in csv_reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        records.push(Record::new(
            line,
            Arc::clone(&columns),
            record.iter().map(|s| s.to_string()).collect(),
        ));
    }

    Ok(ParsedFile { columns, records })
}

/// Check that the header names the schema's columns, in the schema's order
pub fn validate_header<S: AsRef<str>>(header: &[S], schema: &Schema) -> Result<()> {
    if header.len() != schema.len() {
        return Err(Error::parse(
            1,
            format!(
                "Header has {} columns, table expects {}",
                header.len(),
                schema.len()
            ),
        ));
    }

    for (idx, (found, expected)) in header.iter().zip(schema.column_names()).enumerate() {
        if !found.as_ref().trim().eq_ignore_ascii_case(expected) {
            return Err(Error::parse(
                1,
                format!(
                    "Header column {} is '{}', expected '{}'",
                    idx + 1,
                    found.as_ref(),
                    expected
                ),
            ));
        }
    }

    Ok(())
}

fn csv_error(err: csv::Error) -> Error {
    let line = err.position().map(|p| p.line()).unwrap_or_default();
    Error::parse(line, err.to_string())
}
