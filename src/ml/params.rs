//! Hyperparameter values, parameter sets and search grids.
//!
//! Grids are plain configuration data: a parameter name maps to the list of values to
//! try. Each family reads the names it understands from a [`ParamSet`] and rejects the rest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spelling of "no limit" for optional integer parameters such as `max_depth`.
pub const NONE_VALUE: &str = "none";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter {name} (accepted: {accepted:?})")]
    Unknown {
        name: String,
        accepted: Vec<&'static str>,
    },
    #[error("parameter {name} has invalid value {value}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: &'static str,
    },
    #[error("parameter {0} has an empty value list")]
    EmptyRange(String),
}

/// A single hyperparameter value as written in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// One concrete assignment of hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail on any name outside `accepted`.
    pub fn check_known(&self, accepted: &[&'static str]) -> Result<(), ParamError> {
        match self
            .0
            .keys()
            .find(|name| !accepted.iter().any(|known| *known == name.as_str()))
        {
            Some(name) => Err(ParamError::Unknown {
                name: name.clone(),
                accepted: accepted.to_vec(),
            }),
            None => Ok(()),
        }
    }

    pub fn float(&self, name: &str, default: f64) -> Result<f64, ParamError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(ParamValue::Float(v)) if v.is_finite() => Ok(*v),
            Some(other) => Err(invalid(name, other, "expected a number")),
        }
    }

    /// A finite number strictly greater than zero.
    pub fn positive_float(&self, name: &str, default: f64) -> Result<f64, ParamError> {
        let value = self.float(name, default)?;
        if value > 0.0 {
            Ok(value)
        } else {
            Err(invalid(name, &ParamValue::Float(value), "must be > 0"))
        }
    }

    pub fn usize(&self, name: &str, default: usize) -> Result<usize, ParamError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(*v as usize),
            Some(other) => Err(invalid(name, other, "expected a non-negative integer")),
        }
    }

    /// Optional bound where `"none"` means unbounded.
    pub fn optional_usize(
        &self,
        name: &str,
        default: Option<usize>,
    ) -> Result<Option<usize>, ParamError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Text(text)) if text.eq_ignore_ascii_case(NONE_VALUE) => Ok(None),
            Some(_) => self.usize(name, 0).map(Some),
        }
    }

    /// One of a fixed set of keywords.
    pub fn choice(
        &self,
        name: &str,
        options: &[&'static str],
        default: &'static str,
    ) -> Result<&'static str, ParamError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Text(text)) => options
                .iter()
                .find(|option| **option == text.as_str())
                .copied()
                .ok_or_else(|| invalid(name, &ParamValue::Text(text.clone()), "unsupported option")),
            Some(other) => Err(invalid(name, other, "expected a keyword")),
        }
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("defaults");
        }
        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Named parameter ranges for one family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchGrid(BTreeMap<String, Vec<ParamValue>>);

impl SearchGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.0
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of candidates the grid expands to.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product over parameter names in sorted order; the last name varies fastest.
    /// An empty grid yields a single empty candidate (family defaults).
    pub fn candidates(&self) -> Result<Vec<ParamSet>, ParamError> {
        if let Some((name, _)) = self.0.iter().find(|(_, values)| values.is_empty()) {
            return Err(ParamError::EmptyRange(name.clone()));
        }
        let mut out = vec![ParamSet::new()];
        for (name, values) in &self.0 {
            out = out
                .into_iter()
                .flat_map(|base| {
                    values
                        .iter()
                        .map(move |value| base.clone().with(name, value.clone()))
                })
                .collect();
        }
        Ok(out)
    }
}

fn invalid(name: &str, value: &ParamValue, reason: &'static str) -> ParamError {
    ParamError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_expands_in_sorted_name_order_last_fastest() {
        let grid = SearchGrid::new()
            .with("solver", ["batch", "stochastic"])
            .with("c", [0.1, 1.0]);
        let candidates = grid.candidates().unwrap();
        let rendered: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "c=0.1, solver=batch",
                "c=0.1, solver=stochastic",
                "c=1, solver=batch",
                "c=1, solver=stochastic",
            ]
        );
        assert_eq!(grid.len(), 4);
    }

    #[test]
    fn empty_grid_means_defaults() {
        let candidates = SearchGrid::new().candidates().unwrap();
        assert_eq!(candidates, vec![ParamSet::new()]);
    }

    #[test]
    fn empty_value_list_is_rejected() {
        let grid = SearchGrid::new().with("k", Vec::<i64>::new());
        assert_eq!(
            grid.candidates().unwrap_err(),
            ParamError::EmptyRange("k".into())
        );
    }

    #[test]
    fn optional_usize_understands_none() {
        let params = ParamSet::new().with("max_depth", "none");
        assert_eq!(params.optional_usize("max_depth", Some(3)).unwrap(), None);
        let params = ParamSet::new().with("max_depth", 5i64);
        assert_eq!(params.optional_usize("max_depth", None).unwrap(), Some(5));
        assert_eq!(ParamSet::new().optional_usize("max_depth", Some(3)).unwrap(), Some(3));
    }

    #[test]
    fn integers_are_accepted_as_floats() {
        let params = ParamSet::new().with("c", 10i64);
        assert_eq!(params.float("c", 1.0).unwrap(), 10.0);
        assert!(ParamSet::new().with("c", "big").float("c", 1.0).is_err());
        assert!(ParamSet::new().with("c", 0i64).positive_float("c", 1.0).is_err());
    }

    #[test]
    fn unknown_names_are_reported() {
        let params = ParamSet::new().with("depth", 3i64);
        assert!(matches!(
            params.check_known(&["max_depth"]),
            Err(ParamError::Unknown { name, .. }) if name == "depth"
        ));
    }

    #[test]
    fn choice_accepts_listed_keywords_only() {
        let params = ParamSet::new().with("solver", "stochastic");
        assert_eq!(
            params.choice("solver", &["batch", "stochastic"], "batch").unwrap(),
            "stochastic"
        );
        let params = ParamSet::new().with("solver", "saga");
        assert!(params.choice("solver", &["batch", "stochastic"], "batch").is_err());
    }

    #[test]
    fn grid_values_deserialize_from_toml() {
        let grid: SearchGrid = toml::from_str(
            "max_depth = [\"none\", 5]\nlearning_rate = [0.1]\n",
        )
        .unwrap();
        let candidates = grid.candidates().unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].get("max_depth"), Some(&ParamValue::Text("none".into())));
        assert_eq!(candidates[1].get("max_depth"), Some(&ParamValue::Int(5)));
        assert_eq!(candidates[0].get("learning_rate"), Some(&ParamValue::Float(0.1)));
    }
}
