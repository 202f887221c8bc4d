use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{PreprocessError, UnknownCategory};

/// Code assigned to unseen values under [`UnknownCategory::Ignore`].
pub const UNKNOWN_ORDINAL_CODE: f64 = -1.0;

/// Small-integer encoding for low-cardinality columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalColumn {
    pub name: String,
    /// Sorted vocabulary; a value's code is its index.
    pub categories: Vec<String>,
}

impl OrdinalColumn {
    pub fn fit(name: &str, cells: &[Option<&str>]) -> Result<Self, PreprocessError> {
        Ok(Self {
            name: name.to_string(),
            categories: vocabulary(name, cells)?,
        })
    }

    pub fn transform(
        &self,
        row: usize,
        cell: Option<&str>,
        policy: UnknownCategory,
    ) -> Result<f64, PreprocessError> {
        let value = required(&self.name, row, cell)?;
        match self.categories.iter().position(|c| c == value) {
            Some(code) => Ok(code as f64),
            None => match policy {
                UnknownCategory::Error => Err(unknown(&self.name, value, &self.categories)),
                UnknownCategory::Ignore => Ok(UNKNOWN_ORDINAL_CODE),
            },
        }
    }
}

/// One-hot encoding that drops the first (smallest) category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotColumn {
    pub name: String,
    /// Sorted vocabulary including the dropped first category.
    pub categories: Vec<String>,
}

impl OneHotColumn {
    pub fn fit(name: &str, cells: &[Option<&str>]) -> Result<Self, PreprocessError> {
        Ok(Self {
            name: name.to_string(),
            categories: vocabulary(name, cells)?,
        })
    }

    /// Number of output columns.
    pub fn width(&self) -> usize {
        self.categories.len().saturating_sub(1)
    }

    pub fn feature_names(&self, prefix: &str) -> impl Iterator<Item = String> + '_ {
        let prefix = prefix.to_string();
        self.categories
            .iter()
            .skip(1)
            .map(move |category| format!("{prefix}__{}_{category}", self.name))
    }

    /// Write this column's indicators into `out` (length [`OneHotColumn::width`]).
    pub fn transform_into(
        &self,
        row: usize,
        cell: Option<&str>,
        policy: UnknownCategory,
        out: &mut [f64],
    ) -> Result<(), PreprocessError> {
        out.iter_mut().for_each(|v| *v = 0.0);
        let value = required(&self.name, row, cell)?;
        match self.categories.iter().position(|c| c == value) {
            Some(0) => Ok(()),
            Some(idx) => {
                out[idx - 1] = 1.0;
                Ok(())
            }
            None => match policy {
                UnknownCategory::Error => Err(unknown(&self.name, value, &self.categories)),
                UnknownCategory::Ignore => Ok(()),
            },
        }
    }
}

fn vocabulary(name: &str, cells: &[Option<&str>]) -> Result<Vec<String>, PreprocessError> {
    let mut set = BTreeSet::new();
    for (row, cell) in cells.iter().enumerate() {
        set.insert(required(name, row, *cell)?.to_string());
    }
    if set.is_empty() {
        return Err(PreprocessError::AllMissing {
            column: name.to_string(),
        });
    }
    Ok(set.into_iter().collect())
}

fn required<'a>(name: &str, row: usize, cell: Option<&'a str>) -> Result<&'a str, PreprocessError> {
    cell.ok_or_else(|| PreprocessError::MissingValue {
        column: name.to_string(),
        row,
    })
}

fn unknown(name: &str, value: &str, known: &[String]) -> PreprocessError {
    PreprocessError::UnknownCategory {
        column: name.to_string(),
        value: value.to_string(),
        known: known.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_codes_follow_sorted_vocabulary() {
        let column = OrdinalColumn::fit("ever_married", &[Some("Yes"), Some("No"), Some("Yes")])
            .unwrap();
        assert_eq!(column.categories, ["No", "Yes"]);
        assert_eq!(column.transform(0, Some("Yes"), UnknownCategory::Error).unwrap(), 1.0);
        assert_eq!(column.transform(0, Some("No"), UnknownCategory::Error).unwrap(), 0.0);
    }

    #[test]
    fn ordinal_unknown_value_respects_policy() {
        let column = OrdinalColumn::fit("gender", &[Some("Female"), Some("Male")]).unwrap();
        assert!(matches!(
            column.transform(3, Some("Other"), UnknownCategory::Error),
            Err(PreprocessError::UnknownCategory { .. })
        ));
        assert_eq!(
            column.transform(3, Some("Other"), UnknownCategory::Ignore).unwrap(),
            UNKNOWN_ORDINAL_CODE
        );
    }

    #[test]
    fn one_hot_drops_first_category() {
        let cells = [Some("smokes"), Some("Unknown"), Some("never smoked")];
        let column = OneHotColumn::fit("smoking_status", &cells).unwrap();
        assert_eq!(column.categories, ["Unknown", "never smoked", "smokes"]);
        assert_eq!(column.width(), 2);
        let names: Vec<_> = column.feature_names("cat").collect();
        assert_eq!(
            names,
            ["cat__smoking_status_never smoked", "cat__smoking_status_smokes"]
        );

        let mut out = [9.0; 2];
        column
            .transform_into(0, Some("Unknown"), UnknownCategory::Error, &mut out)
            .unwrap();
        assert_eq!(out, [0.0, 0.0]);
        column
            .transform_into(0, Some("smokes"), UnknownCategory::Error, &mut out)
            .unwrap();
        assert_eq!(out, [0.0, 1.0]);
    }

    #[test]
    fn one_hot_unknown_is_all_zero_when_ignored() {
        let column = OneHotColumn::fit("work_type", &[Some("Private"), Some("Other")]).unwrap();
        let mut out = [1.0];
        column
            .transform_into(0, Some("children"), UnknownCategory::Ignore, &mut out)
            .unwrap();
        assert_eq!(out, [0.0]);
        assert!(
            column
                .transform_into(0, Some("children"), UnknownCategory::Error, &mut out)
                .is_err()
        );
    }

    #[test]
    fn missing_categorical_cell_is_an_error() {
        assert!(matches!(
            OrdinalColumn::fit("gender", &[Some("Male"), None]),
            Err(PreprocessError::MissingValue { row: 1, .. })
        ));
    }
}
