//! Category-collapsing cleaning applied to categorical columns before fitting.
//!
//! Rules map a set of rare values onto one target value. Targets never appear in
//! their own source set, so applying the rules twice is the same as applying them once.

use super::table::{FeatureTable, TableError};

/// Replacement rule for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseRule {
    pub column: String,
    pub from: Vec<String>,
    pub to: String,
}

impl CollapseRule {
    pub fn new(column: &str, from: &[&str], to: &str) -> Self {
        Self {
            column: column.to_string(),
            from: from
                .iter()
                .filter(|value| **value != to)
                .map(|value| value.to_string())
                .collect(),
            to: to.to_string(),
        }
    }

    fn replacement(&self, value: &str) -> Option<String> {
        self.from
            .iter()
            .any(|source| source == value)
            .then(|| self.to.clone())
    }
}

/// Ordered set of collapse rules.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningRules {
    rules: Vec<CollapseRule>,
}

impl CleaningRules {
    /// The stroke dataset rules: `gender` Other→Female and
    /// `work_type` {Never_worked, children}→Other.
    pub fn stroke() -> Self {
        Self {
            rules: vec![
                CollapseRule::new("gender", &["Other"], "Female"),
                CollapseRule::new("work_type", &["Never_worked", "children"], "Other"),
            ],
        }
    }

    pub fn rules(&self) -> &[CollapseRule] {
        &self.rules
    }

    /// Apply every rule in place. Fails if a rule's column is absent.
    pub fn apply(&self, table: &mut FeatureTable) -> Result<(), TableError> {
        for rule in &self.rules {
            table.map_column(&rule.column, |value| rule.replacement(value))?;
        }
        Ok(())
    }
}
