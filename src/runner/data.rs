//! Data sources for data-driven runs.

use std::path::Path;

use serde_json::Value as JsonValue;

use crate::errors::{Result, WaypostError};
use crate::models::DataRow;

/// Rows driving a data-driven run, one per iteration.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    rows: Vec<DataRow>,
}

impl DataTable {
    pub fn from_rows(rows: Vec<DataRow>) -> Self {
        DataTable { rows }
    }

    /// Parses CSV input. The first record is the header; every later
    /// record becomes a row of string values keyed by header name.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|e| WaypostError::Data(format!("invalid CSV data: {}", e)))?
            .clone();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record =
                record.map_err(|e| WaypostError::Data(format!("invalid CSV data: {}", e)))?;
            let mut row = DataRow::new();
            for (i, header) in headers.iter().enumerate() {
                let value = record.get(i).unwrap_or_default();
                row.insert(header.to_string(), JsonValue::String(value.to_string()));
            }
            rows.push(row);
        }
        Ok(DataTable { rows })
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    /// Parses a JSON array of objects. Values keep their JSON type, so
    /// numbers and booleans stay distinguishable from strings.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(text)
            .map_err(|e| WaypostError::Data(format!("invalid JSON data: {}", e)))?;
        let items = value.as_array().ok_or_else(|| {
            WaypostError::Data("data file must be a JSON array of objects".to_string())
        })?;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            match item {
                JsonValue::Object(map) => {
                    rows.push(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                }
                _ => {
                    return Err(WaypostError::Data(
                        "data file must be a JSON array of objects".to_string(),
                    ))
                }
            }
        }
        Ok(DataTable { rows })
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }
}
