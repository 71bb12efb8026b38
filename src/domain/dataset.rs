//! Datasets and the analysis formula.
//!
//! A `Dataset` is a row-major table of named numeric fields. Missing cells are
//! `None`; there is no numeric sentinel for "absent".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Name of the constant term in every `Formula`.
pub const INTERCEPT: &str = "intercept";

/// A cell value: `None` means the value is absent.
pub type Cell = Option<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    fields: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Create an empty dataset with the given schema.
    pub fn new(fields: Vec<String>) -> Result<Self, SimError> {
        if fields.is_empty() {
            return Err(SimError::invalid("dataset schema must have at least one field"));
        }
        for (i, name) in fields.iter().enumerate() {
            if fields[..i].contains(name) {
                return Err(SimError::invalid(format!("duplicate field name '{name}'")));
            }
        }
        Ok(Self {
            fields,
            rows: Vec::new(),
        })
    }

    /// Create a dataset from rows, checking every row against the schema.
    pub fn from_rows(fields: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, SimError> {
        let mut data = Self::new(fields)?;
        data.rows.reserve(rows.len());
        for row in rows {
            data.push_row(row)?;
        }
        Ok(data)
    }

    /// Append a row. Present values must be finite.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), SimError> {
        if row.len() != self.fields.len() {
            return Err(SimError::integrity(format!(
                "row has {} values but schema has {} fields",
                row.len(),
                self.fields.len()
            )));
        }
        if row.iter().flatten().any(|v| !v.is_finite()) {
            return Err(SimError::integrity("row contains a non-finite value"));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Like `field_index`, but a missing field is a data integrity error.
    pub fn require_field(&self, name: &str) -> Result<usize, SimError> {
        self.field_index(name)
            .ok_or_else(|| SimError::integrity(format!("dataset has no field '{name}'")))
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[Cell] {
        &self.rows[i]
    }

    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.rows[row][col]
    }

    /// Overwrite a single cell.
    ///
    /// # Panics
    /// Panics if `row` or `col` is out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        self.rows[row][col] = value;
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = Cell> + '_ {
        self.rows.iter().map(move |r| r[col])
    }

    /// Observed (present) values of one column.
    pub fn observed(&self, col: usize) -> Vec<f64> {
        self.column(col).flatten().collect()
    }

    pub fn missing_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|v| v.is_none()).count())
            .sum()
    }

    pub fn missing_in_field(&self, col: usize) -> usize {
        self.column(col).filter(|v| v.is_none()).count()
    }

    /// Number of rows with at least one absent value.
    pub fn incomplete_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.iter().any(|v| v.is_none())).count()
    }

    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|v| v.is_some()))
    }

    /// Same schema and row count.
    pub fn same_shape(&self, other: &Dataset) -> bool {
        self.fields == other.fields && self.rows.len() == other.rows.len()
    }

    /// Build a new dataset from the rows at `indices` (in that order).
    ///
    /// # Panics
    /// Panics if any index is out of bounds.
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            fields: self.fields.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Concatenate datasets that share one schema.
    pub fn concat(parts: Vec<Dataset>) -> Result<Dataset, SimError> {
        let mut iter = parts.into_iter();
        let Some(mut out) = iter.next() else {
            return Err(SimError::invalid("cannot concatenate zero datasets"));
        };
        for part in iter {
            if part.fields != out.fields {
                return Err(SimError::integrity("cannot concatenate datasets with different schemas"));
            }
            out.rows.extend(part.rows);
        }
        Ok(out)
    }
}

/// A fixed additive linear model: `outcome ~ predictor_1 + ... + predictor_k`.
///
/// Terms are `intercept` followed by the predictors in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub outcome: String,
    pub predictors: Vec<String>,
}

impl Formula {
    pub fn new(outcome: impl Into<String>, predictors: Vec<String>) -> Self {
        Self {
            outcome: outcome.into(),
            predictors,
        }
    }

    pub fn terms(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.predictors.iter().cloned())
            .collect()
    }

    /// Number of regression coefficients (intercept included).
    pub fn n_terms(&self) -> usize {
        self.predictors.len() + 1
    }

    /// Check that every field the formula names exists in `fields`.
    pub fn check_fields(&self, fields: &[String]) -> Result<(), SimError> {
        for name in std::iter::once(&self.outcome).chain(self.predictors.iter()) {
            if !fields.contains(name) {
                return Err(SimError::invalid(format!(
                    "formula field '{name}' is not in the schema [{}]",
                    fields.join(", ")
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((lhs, rhs)) = s.split_once('~') else {
            return Err(SimError::invalid(format!("formula '{s}' has no '~'")));
        };
        let outcome = lhs.trim();
        if outcome.is_empty() {
            return Err(SimError::invalid(format!("formula '{s}' has no outcome")));
        }

        let mut predictors: Vec<String> = Vec::new();
        for part in rhs.split('+') {
            let name = part.trim();
            if name.is_empty() || name == "1" {
                continue;
            }
            if name == outcome {
                return Err(SimError::invalid(format!("outcome '{outcome}' also appears as a predictor")));
            }
            if name.eq_ignore_ascii_case(INTERCEPT) || predictors.iter().any(|p| p == name) {
                return Err(SimError::invalid(format!("duplicate or reserved predictor '{name}'")));
            }
            predictors.push(name.to_string());
        }
        if predictors.is_empty() {
            return Err(SimError::invalid(format!("formula '{s}' has no predictors")));
        }

        Ok(Self::new(outcome, predictors))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.outcome, self.predictors.join(" + "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        vec!["x".into(), "z".into(), "y".into()]
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Dataset::from_rows(fields(), vec![vec![Some(1.0), Some(2.0)]]).unwrap_err();
        assert!(matches!(err, SimError::DataIntegrity(_)));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = Dataset::from_rows(fields(), vec![vec![Some(1.0), Some(f64::NAN), None]]).unwrap_err();
        assert!(matches!(err, SimError::DataIntegrity(_)));
    }

    #[test]
    fn counts_missing_cells() {
        let data = Dataset::from_rows(
            fields(),
            vec![
                vec![Some(1.0), None, Some(3.0)],
                vec![Some(1.0), Some(2.0), Some(3.0)],
                vec![None, None, Some(3.0)],
            ],
        )
        .unwrap();
        assert_eq!(data.missing_count(), 3);
        assert_eq!(data.missing_in_field(1), 2);
        assert_eq!(data.incomplete_rows(), 2);
        assert!(!data.is_complete());
        assert_eq!(data.observed(0), vec![1.0, 1.0]);
    }

    #[test]
    fn concat_requires_matching_schema() {
        let a = Dataset::from_rows(fields(), vec![vec![Some(1.0), Some(2.0), Some(3.0)]]).unwrap();
        let b = Dataset::from_rows(fields(), vec![vec![Some(4.0), Some(5.0), Some(6.0)]]).unwrap();
        let joined = Dataset::concat(vec![a.clone(), b]).unwrap();
        assert_eq!(joined.n_rows(), 2);
        assert_eq!(joined.get(1, 2), Some(6.0));

        let other = Dataset::new(vec!["a".into()]).unwrap();
        assert!(Dataset::concat(vec![a, other]).is_err());
    }

    #[test]
    fn parses_formula() {
        let f: Formula = "y ~ x + z".parse().unwrap();
        assert_eq!(f.outcome, "y");
        assert_eq!(f.predictors, vec!["x".to_string(), "z".to_string()]);
        assert_eq!(f.terms(), vec!["intercept", "x", "z"]);
        assert_eq!(f.to_string(), "y ~ x + z");
        assert!(f.check_fields(&fields()).is_ok());
    }

    #[test]
    fn rejects_bad_formulas() {
        assert!("y x + z".parse::<Formula>().is_err());
        assert!("y ~ ".parse::<Formula>().is_err());
        assert!("y ~ x + x".parse::<Formula>().is_err());
        assert!("y ~ y".parse::<Formula>().is_err());

        let f: Formula = "y ~ w".parse().unwrap();
        assert!(f.check_fields(&fields()).is_err());
    }
}
