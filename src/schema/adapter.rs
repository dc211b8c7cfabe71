//! Parsing of fix record streams

use crate::error::LightspeedError;

use super::fix_record::{FixRecord, ValidationError};

/// Adapter from serialized fix records to positions
pub struct FixRecordAdapter;

impl FixRecordAdapter {
    /// Parse a JSON array of fix records
    pub fn parse_array(json: &str) -> Result<Vec<FixRecord>, LightspeedError> {
        let records: Vec<FixRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse newline-delimited JSON, one record per line. Blank lines are skipped.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FixRecord>, LightspeedError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FixRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(LightspeedError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Return only the records that fail validation
    pub fn validate_records(records: &[FixRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index,
                    fix_id: record.fix_id.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A failed record in a validation pass
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub index: usize,
    pub fix_id: Option<String>,
    pub error: ValidationError,
}
