//! Data handling: sample records and a small integer data frame with CSV
//! ingest.
//!
//! The learners in this crate consume ordered sequences of samples. A
//! [`DiscreteSample`] maps variable names to integer states; a [`Sample`]
//! additionally carries continuous values. Absent keys mean the value is
//! missing at random; learners skip the affected row for the CPDs that
//! need it.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// A fully or partially observed discrete record.
pub type DiscreteSample = HashMap<String, usize>;

/// A record over mixed discrete and continuous variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    /// Discrete observations, by variable name.
    pub discrete: HashMap<String, usize>,
    /// Continuous observations, by variable name.
    pub continuous: HashMap<String, f64>,
}

impl Sample {
    /// Create an empty sample.
    pub fn new() -> Self {
        Sample::default()
    }
}

/// A simple in-memory table of integer-valued observations.
#[derive(Clone, Debug, Default)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<DiscreteSample>,
}

impl DataFrame {
    /// Create an empty data frame with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        DataFrame {
            columns,
            rows: Vec::new(),
        }
    }

    /// Wrap existing samples in a data frame.
    pub fn from_samples(columns: Vec<String>, rows: Vec<DiscreteSample>) -> Self {
        DataFrame { columns, rows }
    }

    /// Append a row.
    pub fn push_row(&mut self, row: DiscreteSample) {
        self.rows.push(row);
    }

    /// The column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The rows, each a map from column name to state.
    pub fn rows(&self) -> &[DiscreteSample] {
        &self.rows
    }

    /// All values of one column, skipping rows where it is missing.
    pub fn column(&self, name: &str) -> Vec<usize> {
        self.rows
            .iter()
            .filter_map(|row| row.get(name).copied())
            .collect()
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` if the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the frame, yielding its rows.
    pub fn into_samples(self) -> Vec<DiscreteSample> {
        self.rows
    }

    /// Load a data frame from a CSV file with a header row.
    ///
    /// # Errors
    /// * `Error::Data` if the file cannot be read or a cell is not a
    ///   nonnegative integer.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut frame = DataFrame::new(columns);
        for record in reader.records() {
            let record = record?;
            let mut row = DiscreteSample::with_capacity(frame.columns.len());
            for (i, cell) in record.iter().enumerate() {
                let column = frame.columns.get(i).ok_or_else(|| {
                    Error::Data(format!("row has more cells than the {} headers", frame.columns.len()))
                })?;
                let value: usize = cell.trim().parse().map_err(|_| {
                    Error::Data(format!(
                        "invalid integer value {cell:?} in column {column}"
                    ))
                })?;
                row.insert(column.clone(), value);
            }
            frame.push_row(row);
        }
        Ok(frame)
    }

    /// Write the data frame to a CSV file with a header row. Missing cells
    /// are written empty.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush().map_err(|e| Error::Data(e.to_string()))
    }
}
