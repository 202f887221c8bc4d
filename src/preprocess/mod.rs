//! Column-wise preprocessing: numeric scaling, binary encoding, one-hot encoding, passthrough.
//!
//! [`PreprocessorBuilder`] describes which named columns go through which block;
//! [`PreprocessorBuilder::fit`] learns the per-column state and returns an immutable
//! [`Preprocessor`]. The output layout is always: numeric block, binary block, one-hot
//! block, then passthrough columns in input order. Columns are selected by name at
//! transform time, so a table with a different column set is rejected instead of being
//! silently misaligned.

mod encoding;
mod numeric;

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::dataset::FeatureTable;

pub use encoding::{OneHotColumn, OrdinalColumn, UNKNOWN_ORDINAL_CODE};
pub use numeric::NumericColumn;

/// Numeric block of the stroke schema.
pub const NUMERIC_FEATURES: [&str; 3] = ["age", "bmi", "avg_glucose_level"];
/// Binary (ordinal-encoded) block of the stroke schema.
pub const BINARY_FEATURES: [&str; 3] = ["gender", "ever_married", "Residence_type"];
/// One-hot block of the stroke schema.
pub const CATEGORICAL_FEATURES: [&str; 2] = ["work_type", "smoking_status"];

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("cannot fit on an empty table")]
    EmptyTable,
    #[error("column set does not match (missing: {missing:?}, unexpected: {unexpected:?})")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("column {0} is assigned to more than one block")]
    DuplicateColumn(String),
    #[error("invalid number {value:?} in column {column} at row {row}")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },
    #[error("missing value in column {column} at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("column {column} has no values to fit")]
    AllMissing { column: String },
    #[error("unseen category {value:?} in column {column} (known: {known:?})")]
    UnknownCategory {
        column: String,
        value: String,
        known: Vec<String>,
    },
}

/// How encoders treat categories that were not seen at fit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCategory {
    /// Fail the transform.
    #[default]
    Error,
    /// Encode as [`UNKNOWN_ORDINAL_CODE`] (binary block) or all zeros (one-hot block).
    Ignore,
}

/// Unfitted description of the column transform.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorBuilder {
    numeric: Vec<String>,
    binary: Vec<String>,
    categorical: Vec<String>,
    unknown: UnknownCategory,
}

impl PreprocessorBuilder {
    pub fn new<S: AsRef<str>>(numeric: &[S], binary: &[S], categorical: &[S]) -> Self {
        let owned = |cols: &[S]| -> Vec<String> {
            cols.iter().map(|c| c.as_ref().to_string()).collect()
        };
        Self {
            numeric: owned(numeric),
            binary: owned(binary),
            categorical: owned(categorical),
            unknown: UnknownCategory::default(),
        }
    }

    /// Builder for the stroke dataset schema.
    pub fn stroke() -> Self {
        Self::new(&NUMERIC_FEATURES, &BINARY_FEATURES, &CATEGORICAL_FEATURES)
    }

    pub fn unknown_categories(mut self, policy: UnknownCategory) -> Self {
        self.unknown = policy;
        self
    }

    /// Learn medians, scales and vocabularies from `table`.
    pub fn fit(&self, table: &FeatureTable) -> Result<Preprocessor, PreprocessError> {
        if table.is_empty() {
            return Err(PreprocessError::EmptyTable);
        }
        let named = self.named_columns()?;
        let missing: Vec<String> = named
            .iter()
            .filter(|name| table.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PreprocessError::SchemaMismatch {
                missing,
                unexpected: Vec::new(),
            });
        }

        let numeric = self
            .numeric
            .iter()
            .map(|name| NumericColumn::fit(name, &column_cells(table, name)))
            .collect::<Result<Vec<_>, _>>()?;
        let binary = self
            .binary
            .iter()
            .map(|name| OrdinalColumn::fit(name, &column_cells(table, name)))
            .collect::<Result<Vec<_>, _>>()?;
        let categorical = self
            .categorical
            .iter()
            .map(|name| OneHotColumn::fit(name, &column_cells(table, name)))
            .collect::<Result<Vec<_>, _>>()?;
        let passthrough: Vec<String> = table
            .columns()
            .iter()
            .filter(|name| !named.contains(name.as_str()))
            .cloned()
            .collect();
        for name in &passthrough {
            for (row, cell) in column_cells(table, name).into_iter().enumerate() {
                let text = cell.ok_or_else(|| PreprocessError::MissingValue {
                    column: name.clone(),
                    row,
                })?;
                numeric::parse_number(name, row, text)?;
            }
        }

        let preprocessor = Preprocessor::assemble(
            table.columns().to_vec(),
            numeric,
            binary,
            categorical,
            passthrough,
            self.unknown,
        );
        debug!(
            rows = table.n_rows(),
            features = preprocessor.n_features_out(),
            "Preprocessor fitted"
        );
        Ok(preprocessor)
    }

    fn named_columns(&self) -> Result<BTreeSet<&str>, PreprocessError> {
        let mut seen = BTreeSet::new();
        for name in self
            .numeric
            .iter()
            .chain(&self.binary)
            .chain(&self.categorical)
        {
            if !seen.insert(name.as_str()) {
                return Err(PreprocessError::DuplicateColumn(name.clone()));
            }
        }
        Ok(seen)
    }
}

/// Fitted column transform. Immutable; refitting means building a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    input_columns: Vec<String>,
    numeric: Vec<NumericColumn>,
    binary: Vec<OrdinalColumn>,
    categorical: Vec<OneHotColumn>,
    passthrough: Vec<String>,
    unknown: UnknownCategory,
    feature_names: Vec<String>,
}

impl Preprocessor {
    fn assemble(
        input_columns: Vec<String>,
        numeric: Vec<NumericColumn>,
        binary: Vec<OrdinalColumn>,
        categorical: Vec<OneHotColumn>,
        passthrough: Vec<String>,
        unknown: UnknownCategory,
    ) -> Self {
        let mut feature_names: Vec<String> = numeric
            .iter()
            .map(|c| format!("num__{}", c.name))
            .chain(binary.iter().map(|c| format!("bin__{}", c.name)))
            .collect();
        for column in &categorical {
            feature_names.extend(column.feature_names("cat"));
        }
        feature_names.extend(passthrough.iter().map(|c| format!("remainder__{c}")));
        Self {
            input_columns,
            numeric,
            binary,
            categorical,
            passthrough,
            unknown,
            feature_names,
        }
    }

    /// Column set seen at fit time, in the order it was seen.
    pub fn input_columns(&self) -> &[String] {
        &self.input_columns
    }

    /// Output column names, in output order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features_out(&self) -> usize {
        self.feature_names.len()
    }

    pub fn unknown_policy(&self) -> UnknownCategory {
        self.unknown
    }

    /// Transform with the unknown-category policy chosen at fit time.
    pub fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>, PreprocessError> {
        self.transform_with(table, self.unknown)
    }

    /// Transform using learned parameters only; never refits.
    pub fn transform_with(
        &self,
        table: &FeatureTable,
        policy: UnknownCategory,
    ) -> Result<Array2<f64>, PreprocessError> {
        self.check_schema(table)?;
        let mut out = Array2::<f64>::zeros((table.n_rows(), self.n_features_out()));
        let mut offset = 0usize;

        for column in &self.numeric {
            let cells = column_cells(table, &column.name);
            for (row, cell) in cells.into_iter().enumerate() {
                out[[row, offset]] = column.transform(row, cell)?;
            }
            offset += 1;
        }
        for column in &self.binary {
            let cells = column_cells(table, &column.name);
            for (row, cell) in cells.into_iter().enumerate() {
                out[[row, offset]] = column.transform(row, cell, policy)?;
            }
            offset += 1;
        }
        for column in &self.categorical {
            let width = column.width();
            let cells = column_cells(table, &column.name);
            let mut buffer = vec![0.0; width];
            for (row, cell) in cells.into_iter().enumerate() {
                column.transform_into(row, cell, policy, &mut buffer)?;
                for (j, value) in buffer.iter().enumerate() {
                    out[[row, offset + j]] = *value;
                }
            }
            offset += width;
        }
        for name in &self.passthrough {
            let cells = column_cells(table, name);
            for (row, cell) in cells.into_iter().enumerate() {
                let text = cell.ok_or_else(|| PreprocessError::MissingValue {
                    column: name.clone(),
                    row,
                })?;
                out[[row, offset]] = numeric::parse_number(name, row, text)?;
            }
            offset += 1;
        }
        debug_assert_eq!(offset, self.n_features_out());
        Ok(out)
    }

    fn check_schema(&self, table: &FeatureTable) -> Result<(), PreprocessError> {
        let expected: BTreeSet<&str> = self.input_columns.iter().map(String::as_str).collect();
        let found: BTreeSet<&str> = table.columns().iter().map(String::as_str).collect();
        if expected == found && found.len() == table.columns().len() {
            return Ok(());
        }
        Err(PreprocessError::SchemaMismatch {
            missing: expected.difference(&found).map(|s| s.to_string()).collect(),
            unexpected: found.difference(&expected).map(|s| s.to_string()).collect(),
        })
    }
}

/// Cells of a column already known to exist; absent columns read as all-missing.
fn column_cells<'a>(table: &'a FeatureTable, name: &str) -> Vec<Option<&'a str>> {
    table
        .column(name)
        .unwrap_or_else(|_| vec![None; table.n_rows()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: [&str; 10] = [
        "gender",
        "age",
        "hypertension",
        "heart_disease",
        "ever_married",
        "work_type",
        "Residence_type",
        "avg_glucose_level",
        "bmi",
        "smoking_status",
    ];

    fn table(rows: &[[&str; 10]]) -> FeatureTable {
        FeatureTable::from_rows(
            COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    fn training() -> FeatureTable {
        table(&[
            ["Male", "67", "0", "1", "Yes", "Private", "Urban", "228.69", "36.6", "formerly smoked"],
            ["Female", "61", "0", "0", "Yes", "Self-employed", "Rural", "202.21", "", "never smoked"],
            ["Male", "80", "0", "1", "Yes", "Private", "Rural", "105.92", "32.5", "never smoked"],
            ["Female", "49", "0", "0", "Yes", "Private", "Urban", "171.23", "34.4", "smokes"],
            ["Female", "3", "0", "0", "No", "Other", "Rural", "95.12", "18.0", "Unknown"],
        ])
    }

    #[test]
    fn output_layout_is_numeric_binary_onehot_passthrough() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        assert_eq!(
            pre.feature_names(),
            [
                "num__age",
                "num__bmi",
                "num__avg_glucose_level",
                "bin__gender",
                "bin__ever_married",
                "bin__Residence_type",
                "cat__work_type_Private",
                "cat__work_type_Self-employed",
                "cat__smoking_status_formerly smoked",
                "cat__smoking_status_never smoked",
                "cat__smoking_status_smokes",
                "remainder__hypertension",
                "remainder__heart_disease",
            ]
        );
        let out = pre.transform(&training()).unwrap();
        assert_eq!(out.dim(), (5, 13));
        // Male -> 1, Yes -> 1, Urban -> 1
        assert_eq!(out.row(0).to_vec()[3..6], [1.0, 1.0, 1.0]);
        // Private, formerly smoked, heart_disease
        assert_eq!(out.row(0).to_vec()[6..], [1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn numeric_block_is_standardized_on_training_data() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        let out = pre.transform(&training()).unwrap();
        for j in 0..3 {
            let column = out.column(j);
            let mean = column.sum() / column.len() as f64;
            assert!(mean.abs() < 1e-9, "column {j} mean {mean}");
        }
    }

    #[test]
    fn selects_columns_by_name_when_order_differs() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        let expected = pre.transform(&training()).unwrap();

        let mut reordered = FeatureTable::new(
            COLUMNS.iter().rev().map(|c| c.to_string()).collect(),
        );
        let source = training();
        for row in 0..source.n_rows() {
            let cells = (0..COLUMNS.len())
                .rev()
                .map(|col| source.cell(row, col).map(str::to_string))
                .collect();
            reordered.push_row(cells).unwrap();
        }
        assert_eq!(pre.transform(&reordered).unwrap(), expected);
    }

    #[test]
    fn mismatched_column_set_is_rejected() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        let mut table = training();
        table.drop_column("bmi");
        let err = pre.transform(&table).unwrap_err();
        assert_eq!(
            err,
            PreprocessError::SchemaMismatch {
                missing: vec!["bmi".into()],
                unexpected: vec![],
            }
        );
    }

    #[test]
    fn fit_requires_named_columns() {
        let mut table = training();
        table.drop_column("work_type");
        assert!(matches!(
            PreprocessorBuilder::stroke().fit(&table),
            Err(PreprocessError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn unseen_category_policy() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        let row = table(&[[
            "Male", "50", "0", "0", "Yes", "children", "Urban", "100", "25", "smokes",
        ]]);
        assert!(matches!(
            pre.transform(&row),
            Err(PreprocessError::UnknownCategory { .. })
        ));
        let out = pre.transform_with(&row, UnknownCategory::Ignore).unwrap();
        assert_eq!(out.row(0).to_vec()[6..8], [0.0, 0.0]);
    }

    #[test]
    fn json_round_trip_transforms_identically() {
        let pre = PreprocessorBuilder::stroke().fit(&training()).unwrap();
        let json = serde_json::to_string(&pre).unwrap();
        let restored: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pre);
        assert_eq!(
            restored.transform(&training()).unwrap(),
            pre.transform(&training()).unwrap()
        );
    }

    #[test]
    fn duplicate_block_assignment_is_rejected() {
        let builder = PreprocessorBuilder::new(&["age"], &["age"], &[]);
        assert_eq!(
            builder.fit(&training()).unwrap_err(),
            PreprocessError::DuplicateColumn("age".into())
        );
    }
}
