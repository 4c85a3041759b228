//! Tabular input surface.
//!
//! Historical series arrive from an external collaborator as a table with
//! `Date`, `Close` and optionally `Open/High/Low/Volume` plus any number of
//! pre-enriched derived columns. This module only holds named string columns;
//! typing and validation happen in [`crate::repository`].

use crate::error::{Result, RiskError};
use std::io;

pub const DATE: &str = "Date";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

/// Derived columns a pre-enriched table may carry. Accepted, then recomputed.
pub const DERIVED_COLUMNS: [&str; 6] = [
    "Returns",
    "Log_Returns",
    "Volatility",
    "Drawdown",
    "Volume_MA",
    "Volume_Ratio",
];

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    columns: Vec<(String, Vec<String>)>,
    rows: usize,
}

impl PriceTable {
    /// Build from named columns. All columns must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<String>)>) -> Result<Self> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != rows) {
            return Err(RiskError::DataShape {
                reason: format!("column {name} has {} rows, expected {rows}", values.len()),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Read a headered CSV. The caller owns the file or stream.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| RiskError::DataShape {
                reason: format!("unreadable header: {e}"),
            })?
            .clone();

        let mut columns: Vec<(String, Vec<String>)> =
            headers.iter().map(|h| (h.to_string(), Vec::new())).collect();

        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| RiskError::DataShape {
                reason: format!("row {row}: {e}"),
            })?;
            for (idx, (_, values)) in columns.iter_mut().enumerate() {
                values.push(record.get(idx).unwrap_or_default().to_string());
            }
        }

        tracing::debug!(columns = columns.len(), "price table read from csv");
        Self::from_columns(columns)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_enriched(&self) -> bool {
        DERIVED_COLUMNS.iter().any(|c| self.has_column(c))
    }

    pub(crate) fn require(&self, name: &str) -> Result<&[String]> {
        self.column(name).ok_or_else(|| RiskError::DataShape {
            reason: format!("missing required column {name}"),
        })
    }
}
