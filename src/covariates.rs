use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::{Axis, KiraError};
use crate::matrix::same_value;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CovariateValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Missing,
}

impl CovariateValue {
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("na")
            || trimmed.eq_ignore_ascii_case("null")
            || trimmed.eq_ignore_ascii_case("nan")
        {
            return CovariateValue::Missing;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return CovariateValue::Integer(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return CovariateValue::Float(value);
        }
        CovariateValue::Text(trimmed.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CovariateValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CovariateValue::Integer(value) => Some(*value as f64),
            CovariateValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CovariateValue::Missing)
    }

    // `age=30` matches both `Integer(30)` and `Float(30.0)`.
    pub fn matches_str(&self, raw: &str) -> bool {
        match self {
            CovariateValue::Text(value) => value == raw.trim(),
            CovariateValue::Missing => CovariateValue::infer(raw).is_missing(),
            _ => match (self.as_f64(), CovariateValue::infer(raw).as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

pub fn infer_column<S: AsRef<str>>(raw: &[S]) -> Vec<CovariateValue> {
    let cells: Vec<CovariateValue> = raw.iter().map(|v| CovariateValue::infer(v.as_ref())).collect();
    let all_integer = cells
        .iter()
        .all(|cell| matches!(cell, CovariateValue::Integer(_) | CovariateValue::Missing));
    if all_integer {
        return cells;
    }
    let all_numeric = cells.iter().all(|cell| cell.is_missing() || cell.as_f64().is_some());
    if all_numeric {
        return cells
            .into_iter()
            .map(|cell| match cell.as_f64() {
                Some(value) => CovariateValue::Float(value),
                None => CovariateValue::Missing,
            })
            .collect();
    }
    cells
        .into_iter()
        .zip(raw)
        .map(|(cell, raw)| match cell {
            CovariateValue::Missing => CovariateValue::Missing,
            _ => CovariateValue::Text(raw.as_ref().trim().to_string()),
        })
        .collect()
}

impl PartialEq for CovariateValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CovariateValue::Text(a), CovariateValue::Text(b)) => a == b,
            (CovariateValue::Integer(a), CovariateValue::Integer(b)) => a == b,
            (CovariateValue::Float(a), CovariateValue::Float(b)) => same_value(*a, *b),
            (CovariateValue::Missing, CovariateValue::Missing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CovariateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CovariateValue::Text(value) => write!(f, "{value}"),
            CovariateValue::Integer(value) => write!(f, "{value}"),
            CovariateValue::Float(value) => write!(f, "{value}"),
            CovariateValue::Missing => write!(f, "NA"),
        }
    }
}

impl From<&str> for CovariateValue {
    fn from(value: &str) -> Self {
        CovariateValue::Text(value.to_string())
    }
}

impl From<String> for CovariateValue {
    fn from(value: String) -> Self {
        CovariateValue::Text(value)
    }
}

impl From<i64> for CovariateValue {
    fn from(value: i64) -> Self {
        CovariateValue::Integer(value)
    }
}

impl From<f64> for CovariateValue {
    fn from(value: f64) -> Self {
        CovariateValue::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Covariate {
    name: String,
    description: Option<String>,
    values: Vec<CovariateValue>,
}

impl Covariate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn values(&self) -> &[CovariateValue] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CovariateTable {
    row_ids: Vec<String>,
    columns: Vec<Covariate>,
}

impl CovariateTable {
    pub fn new(row_ids: Vec<String>) -> Result<Self, KiraError> {
        let mut seen = HashSet::with_capacity(row_ids.len());
        for id in &row_ids {
            if !seen.insert(id.as_str()) {
                return Err(KiraError::DuplicateIdentifier {
                    axis: Axis::Sample,
                    id: id.clone(),
                });
            }
        }
        Ok(Self {
            row_ids,
            columns: Vec::new(),
        })
    }

    pub fn with_column<V>(mut self, name: impl Into<String>, values: Vec<V>) -> Result<Self, KiraError>
    where
        V: Into<CovariateValue>,
    {
        self.push_column(name.into(), values.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    pub fn with_description(
        mut self,
        name: &str,
        description: impl Into<String>,
    ) -> Result<Self, KiraError> {
        self.describe(name, description)?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: String, values: Vec<CovariateValue>) -> Result<(), KiraError> {
        if self.columns.iter().any(|column| column.name == name) {
            return Err(KiraError::DuplicateIdentifier {
                axis: Axis::Covariate,
                id: name,
            });
        }
        if values.len() != self.row_ids.len() {
            return Err(KiraError::InvalidInput(format!(
                "covariate {name} has {} values, expected {}",
                values.len(),
                self.row_ids.len()
            )));
        }
        self.columns.push(Covariate {
            name,
            description: None,
            values,
        });
        Ok(())
    }

    pub fn describe(&mut self, name: &str, description: impl Into<String>) -> Result<(), KiraError> {
        let column = self
            .columns
            .iter_mut()
            .find(|column| column.name == name)
            .ok_or_else(|| KiraError::Lookup {
                axis: Axis::Covariate,
                id: name.to_string(),
            })?;
        column.description = Some(description.into());
        Ok(())
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn columns(&self) -> &[Covariate] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Covariate> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn descriptions(&self) -> BTreeMap<&str, &str> {
        self.columns
            .iter()
            .filter_map(|column| Some((column.name.as_str(), column.description.as_deref()?)))
            .collect()
    }

    pub fn row(&self, index: usize) -> Option<CovariateRow<'_>> {
        (index < self.row_ids.len()).then_some(CovariateRow { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = CovariateRow<'_>> {
        (0..self.row_ids.len()).map(move |index| CovariateRow { table: self, index })
    }

    /// Positions must already be bounds-checked by the caller.
    pub(crate) fn take_rows(&self, positions: &[usize]) -> CovariateTable {
        CovariateTable {
            row_ids: positions.iter().map(|&i| self.row_ids[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| Covariate {
                    name: column.name.clone(),
                    description: column.description.clone(),
                    values: positions.iter().map(|&i| column.values[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// `order` must be a permutation of the row ids.
    pub(crate) fn reorder_to(&self, order: &[String]) -> CovariateTable {
        let index: HashMap<&str, usize> = self
            .row_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let positions: Vec<usize> = order.iter().map(|id| index[id.as_str()]).collect();
        self.take_rows(&positions)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CovariateRow<'a> {
    table: &'a CovariateTable,
    index: usize,
}

impl<'a> CovariateRow<'a> {
    pub fn sample_id(&self) -> &'a str {
        &self.table.row_ids[self.index]
    }

    pub fn get(&self, name: &str) -> Option<&'a CovariateValue> {
        self.table
            .column(name)
            .map(|column| &column.values[self.index])
    }

    pub fn position(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn table() -> CovariateTable {
        CovariateTable::new(vec!["s1".into(), "s2".into()])
            .unwrap()
            .with_column("group", vec!["case", "control"])
            .unwrap()
            .with_column("age", vec![34_i64, 51])
            .unwrap()
            .with_description("group", "disease status")
            .unwrap()
    }

    #[test]
    fn infer_cell_types() {
        assert_eq!(CovariateValue::infer("42"), CovariateValue::Integer(42));
        assert_eq!(CovariateValue::infer("4.5"), CovariateValue::Float(4.5));
        assert_eq!(CovariateValue::infer(" NA "), CovariateValue::Missing);
        assert_eq!(CovariateValue::infer(""), CovariateValue::Missing);
        assert_eq!(
            CovariateValue::infer("female"),
            CovariateValue::Text("female".into())
        );
    }

    #[test]
    fn nan_cells_are_missing() {
        assert_eq!(CovariateValue::infer("NaN"), CovariateValue::Missing);
        assert_eq!(
            infer_column(&["1.5", "nan"]),
            vec![CovariateValue::Float(1.5), CovariateValue::Missing]
        );
        assert_eq!(
            CovariateValue::Float(f64::NAN),
            CovariateValue::Float(f64::NAN)
        );
        assert_ne!(CovariateValue::Float(1.0), CovariateValue::Integer(1));
    }

    #[test]
    fn infer_column_promotes_consistently() {
        assert_eq!(
            infer_column(&["1", "2.5", "NA"]),
            vec![
                CovariateValue::Float(1.0),
                CovariateValue::Float(2.5),
                CovariateValue::Missing
            ]
        );
        assert_eq!(
            infer_column(&["7", "x"]),
            vec![CovariateValue::Text("7".into()), CovariateValue::Text("x".into())]
        );
        assert_eq!(
            infer_column(&["3", ""]),
            vec![CovariateValue::Integer(3), CovariateValue::Missing]
        );
    }

    #[test]
    fn matches_numeric_across_types() {
        assert!(CovariateValue::Float(30.0).matches_str("30"));
        assert!(CovariateValue::Text("case".into()).matches_str("case"));
        assert!(!CovariateValue::Text("case".into()).matches_str("control"));
        assert!(CovariateValue::Text("7".into()).matches_str("7"));
        assert!(CovariateValue::Missing.matches_str("NA"));
    }

    #[test]
    fn row_view_reads_columns() {
        let table = table();
        let row = table.row(1).unwrap();
        assert_eq!(row.sample_id(), "s2");
        assert_eq!(row.get("age"), Some(&CovariateValue::Integer(51)));
        assert_eq!(row.get("missing"), None);
        assert!(table.row(2).is_none());
    }

    #[test]
    fn descriptions_only_for_described_columns() {
        let table = table();
        let descriptions = table.descriptions();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions["group"], "disease status");
    }

    #[test]
    fn duplicate_row_ids_rejected() {
        let err = CovariateTable::new(vec!["s1".into(), "s1".into()]).unwrap_err();
        assert_matches!(err, KiraError::DuplicateIdentifier { axis: Axis::Sample, .. });
    }

    #[test]
    fn column_length_checked() {
        let err = CovariateTable::new(vec!["s1".into()])
            .unwrap()
            .with_column("group", vec!["a", "b"])
            .unwrap_err();
        assert_matches!(err, KiraError::InvalidInput(_));
    }

    #[test]
    fn describe_unknown_column() {
        let err = table().with_description("sex", "x").unwrap_err();
        assert_matches!(err, KiraError::Lookup { axis: Axis::Covariate, .. });
    }

    #[test]
    fn reorder_follows_order() {
        let reordered = table().reorder_to(&["s2".to_string(), "s1".to_string()]);
        assert_eq!(reordered.row_ids(), &["s2".to_string(), "s1".to_string()]);
        assert_eq!(
            reordered.column("group").unwrap().values()[0],
            CovariateValue::Text("control".into())
        );
        assert_eq!(
            reordered.column("group").unwrap().description(),
            Some("disease status")
        );
    }
}
