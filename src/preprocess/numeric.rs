use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// Median imputation followed by standard scaling for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    /// Fill value for missing cells.
    pub median: f64,
    pub mean: f64,
    /// Population standard deviation, or 1 when the column is constant.
    pub scale: f64,
}

impl NumericColumn {
    pub fn fit(name: &str, cells: &[Option<&str>]) -> Result<Self, PreprocessError> {
        let parsed = cells
            .iter()
            .enumerate()
            .map(|(row, cell)| cell.map(|text| parse_number(name, row, text)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        let mut present: Vec<f64> = parsed.iter().flatten().copied().collect();
        if present.is_empty() {
            return Err(PreprocessError::AllMissing {
                column: name.to_string(),
            });
        }
        let median = median(&mut present);
        let imputed: Vec<f64> = parsed.iter().map(|v| v.unwrap_or(median)).collect();
        let n = imputed.len() as f64;
        let mean = imputed.iter().sum::<f64>() / n;
        let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std.is_finite() && std > f64::EPSILON {
            std
        } else {
            1.0
        };
        Ok(Self {
            name: name.to_string(),
            median,
            mean,
            scale,
        })
    }

    pub fn transform(&self, row: usize, cell: Option<&str>) -> Result<f64, PreprocessError> {
        let value = match cell {
            Some(text) => parse_number(&self.name, row, text)?,
            None => self.median,
        };
        Ok((value - self.mean) / self.scale)
    }
}

pub(super) fn parse_number(column: &str, row: usize, text: &str) -> Result<f64, PreprocessError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| PreprocessError::InvalidNumber {
            column: column.to_string(),
            row,
            value: text.to_string(),
        })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
