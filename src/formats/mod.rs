//! Delimited file parsing

pub mod reader;

pub use reader::{DelimitedConfig, Record, read_header, read_records, validate_header};
