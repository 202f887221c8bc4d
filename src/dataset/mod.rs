//! Tabular input: CSV loading, column-named feature tables and category cleaning.

pub mod clean;
pub mod table;

pub use clean::CleaningRules;
pub use table::{FeatureTable, LabeledTable, TableError, load_csv, load_labeled_csv};
