//! Column-named tables of raw cell text.
//!
//! Cells stay as text until the preprocessor decides how each column is interpreted;
//! empty cells and `N/A` load as missing.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Label column of the training/test tables.
pub const LABEL_COLUMN: &str = "stroke";
/// Row identifier column, dropped before fitting.
pub const ID_COLUMN: &str = "id";

const MISSING_MARKERS: &[&str] = &["", "N/A", "NA", "NaN", "nan"];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read CSV {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },
    #[error("row {row} has {found} cells but the header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("missing column {0}")]
    MissingColumn(String),
    #[error("invalid label {value:?} at row {row} (expected 0 or 1)")]
    InvalidLabel { row: usize, value: String },
}

/// Rows of optional cell text under a fixed, named column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl FeatureTable {
    /// Build a table from already-shaped rows.
    ///
    /// Short rows are padded with missing cells and long rows truncated so the
    /// width invariant always holds; use [`FeatureTable::push_row`] for checked input.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, rejecting it when its width differs from the header.
    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }

    /// Borrow every cell of a named column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<Option<&str>>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Rewrite every present cell of a column in place.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<(), TableError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        for row in &mut self.rows {
            if let Some(value) = row[idx].as_deref() {
                if let Some(replacement) = f(value) {
                    row[idx] = Some(replacement);
                }
            }
        }
        Ok(())
    }

    /// Remove a column and return its cells.
    pub fn take_column(&mut self, name: &str) -> Result<Vec<Option<String>>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        self.columns.remove(idx);
        Ok(self.rows.iter_mut().map(|row| row.remove(idx)).collect())
    }

    /// Remove a column if present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        self.take_column(name).is_ok()
    }
}

/// Feature table plus the aligned 0/1 label column.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    pub features: FeatureTable,
    pub labels: Vec<u8>,
}

impl LabeledTable {
    /// Split the label out of a raw table, dropping the row identifier if present.
    pub fn from_table(mut table: FeatureTable) -> Result<Self, TableError> {
        table.drop_column(ID_COLUMN);
        let raw_labels = table.take_column(LABEL_COLUMN)?;
        let labels = raw_labels
            .into_iter()
            .enumerate()
            .map(|(row, value)| parse_label(row, value.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            features: table,
            labels,
        })
    }
}

/// Load a headered CSV into a [`FeatureTable`].
pub fn load_csv(path: &Path) -> Result<FeatureTable, TableError> {
    let file = std::fs::File::open(path).map_err(|source| TableError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(std::io::BufReader::new(file));
    let headers = reader
        .headers()
        .map_err(|source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if headers.is_empty() {
        return Err(TableError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    let mut table = FeatureTable::new(headers);
    for record in reader.records() {
        let record = record.map_err(|source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let row = record.iter().map(parse_cell).collect();
        table.push_row(row)?;
    }
    Ok(table)
}

/// Load a CSV and split off its `stroke` label column.
pub fn load_labeled_csv(path: &Path) -> Result<LabeledTable, TableError> {
    LabeledTable::from_table(load_csv(path)?)
}

fn parse_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_label(row: usize, value: Option<&str>) -> Result<u8, TableError> {
    let invalid = || TableError::InvalidLabel {
        row,
        value: value.unwrap_or_default().to_string(),
    };
    let text = value.ok_or_else(invalid)?;
    match text.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(invalid()),
    }
}
