//! Pre-binding normalization of census records
//!
//! Two rules, applied to every record before it is bound to a statement:
//!
//! - any empty field becomes the literal `0`, whatever the column's type
//! - every `'` is removed from the `County` field
//!
//! The zero fill is positional and blind. It is harmless for the census
//! extract only because its text columns are never empty; filling one is
//! logged as a warning.

use std::ops::Deref;

use tracing::warn;

use crate::db::Schema;
use crate::formats::Record;

/// Value substituted for empty fields
pub const ZERO_FILL: &str = "0";

/// Column whose single quotes are stripped
pub const QUOTE_STRIPPED_COLUMN: &str = "County";

/// A record with both normalization rules applied
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord(Record);

impl Deref for NormalizedRecord {
    type Target = Record;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct Normalizer {
    text_columns: Vec<&'static str>,
}

impl Normalizer {
    pub fn new(schema: &Schema) -> Self {
        Self {
            text_columns: schema
                .columns
                .iter()
                .filter(|c| c.sql_type.is_text())
                .map(|c| c.name)
                .collect(),
        }
    }

    pub fn normalize(&self, record: &Record) -> NormalizedRecord {
        let fields = record
            .iter()
            .map(|(column, value)| {
                let value = if value.is_empty() {
                    if self.is_text(column) {
                        warn!(
                            column,
                            line = record.line,
                            "Empty text field replaced with {ZERO_FILL}"
                        );
                    }
                    ZERO_FILL.to_string()
                } else {
                    value.to_string()
                };

                if column.eq_ignore_ascii_case(QUOTE_STRIPPED_COLUMN) {
                    value.replace('\'', "")
                } else {
                    value
                }
            })
            .collect();

        NormalizedRecord(Record::new(record.line, record.columns_arc(), fields))
    }

    pub fn normalize_all(&self, records: &[Record]) -> Vec<NormalizedRecord> {
        records.iter().map(|r| self.normalize(r)).collect()
    }

    fn is_text(&self, column: &str) -> bool {
        self.text_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(pairs: &[(&str, &str)]) -> Record {
        let columns: Arc<[String]> = pairs.iter().map(|(c, _)| c.to_string()).collect();
        let fields = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Record::new(2, columns, fields)
    }

    fn field<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
        record.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(&Schema::census())
    }

    #[test]
    fn test_empty_fields_become_zero() {
        let input = record(&[
            ("CensusTract", "1001020100"),
            ("State", "Alabama"),
            ("County", "Autauga"),
            ("Men", ""),
            ("Income", ""),
            ("Poverty", "8.1"),
        ]);

        let normalized = normalizer().normalize(&input);

        assert_eq!(
            normalized.fields,
            ["1001020100", "Alabama", "Autauga", "0", "0", "8.1"]
        );
        assert_eq!(normalized.line, 2);
        let columns: Vec<_> = normalized.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, ["CensusTract", "State", "County", "Men", "Income", "Poverty"]);
    }

    #[test]
    fn test_text_columns_are_zero_filled_too() {
        let input = record(&[("State", ""), ("County", "")]);

        let normalized = normalizer().normalize(&input);

        assert_eq!(normalized.fields, ["0", "0"]);
    }

    #[test]
    fn test_whitespace_is_not_empty() {
        let input = record(&[("Men", " ")]);

        let normalized = normalizer().normalize(&input);

        assert_eq!(field(&normalized, "Men"), Some(" "));
    }

    #[test]
    fn test_county_quotes_stripped() {
        let cases = [
            ("O'Brien", "OBrien"),
            ("St. Mary's", "St. Marys"),
            ("''", ""),
            ("'", ""),
            ("Autauga", "Autauga"),
        ];

        for (county, expected) in cases {
            let input = record(&[("County", county), ("State", "Iowa's")]);
            let normalized = normalizer().normalize(&input);

            let stripped = field(&normalized, "County").unwrap();
            assert_eq!(stripped, expected, "county {county:?}");
            assert!(!stripped.contains('\''));
            assert_eq!(
                county.len() - stripped.len(),
                county.matches('\'').count(),
                "county {county:?}"
            );
            // Only County is touched
            assert_eq!(field(&normalized, "State"), Some("Iowa's"));
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let input = record(&[
            ("CensusTract", "1001020200"),
            ("State", "Alabama"),
            ("County", "O'Brien"),
            ("Men", ""),
            ("Women", "0"),
            ("Walk", ""),
        ]);
        let normalizer = normalizer();

        let once = normalizer.normalize(&input);
        let twice = normalizer.normalize(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_empty_fields_pass_through() {
        let input = record(&[("TotalPop", "1948"), ("Hispanic", "0.9"), ("State", "Alabama")]);

        let normalized = normalizer().normalize(&input);

        assert_eq!(normalized.fields, input.fields);
    }

    #[test]
    fn test_normalize_all_keeps_order() {
        let records = vec![
            record(&[("County", "A'a")]),
            record(&[("County", "")]),
            record(&[("County", "C")]),
        ];

        let normalized = normalizer().normalize_all(&records);

        let counties: Vec<_> = normalized.iter().map(|r| r.fields[0].as_str()).collect();
        assert_eq!(counties, ["Aa", "0", "C"]);
    }
}
