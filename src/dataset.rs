use std::collections::{HashMap, HashSet};

use crate::covariates::{Covariate, CovariateTable};
use crate::domain::ExperimentInfo;
use crate::error::{Axis, KiraError};
use crate::matrix::ExpressionMatrix;
use crate::selection::{FeatureSelection, SampleSelection};

#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizedDataset {
    expression: ExpressionMatrix,
    covariates: CovariateTable,
    feature_ids: Option<Vec<String>>,
    metadata: ExperimentInfo,
}

impl SynchronizedDataset {
    pub fn new(expression: ExpressionMatrix) -> Result<Self, KiraError> {
        let covariates = CovariateTable::new(expression.sample_labels().to_vec())?;
        Ok(Self {
            expression,
            covariates,
            feature_ids: None,
            metadata: ExperimentInfo::default(),
        })
    }

    pub fn from_parts(
        expression: ExpressionMatrix,
        covariates: Option<CovariateTable>,
        feature_ids: Option<Vec<String>>,
        metadata: ExperimentInfo,
    ) -> Result<Self, KiraError> {
        let mut dataset = Self::new(expression)?.with_metadata(metadata);
        if let Some(table) = covariates {
            dataset.replace_covariates(table)?;
        }
        if let Some(ids) = feature_ids {
            dataset = dataset.with_feature_ids(ids)?;
        }
        Ok(dataset)
    }

    pub fn with_covariates(mut self, table: CovariateTable) -> Result<Self, KiraError> {
        self.replace_covariates(table)?;
        Ok(self)
    }

    pub fn with_feature_ids(mut self, ids: Vec<String>) -> Result<Self, KiraError> {
        check_feature_ids(self.expression.n_features(), &ids)?;
        self.feature_ids = Some(ids);
        Ok(self)
    }

    pub fn with_metadata(mut self, metadata: ExperimentInfo) -> Self {
        self.metadata = metadata;
        self
    }

    /// A permuted table is reordered to follow the expression columns.
    pub fn replace_covariates(&mut self, table: CovariateTable) -> Result<(), KiraError> {
        let aligned = align_covariates(self.expression.sample_labels(), table)?;
        self.covariates = aligned;
        Ok(())
    }

    pub fn set_metadata(&mut self, metadata: ExperimentInfo) {
        self.metadata = metadata;
    }

    pub fn expression(&self) -> &ExpressionMatrix {
        &self.expression
    }

    pub fn covariates(&self) -> &CovariateTable {
        &self.covariates
    }

    pub fn feature_ids(&self) -> Option<&[String]> {
        self.feature_ids.as_deref()
    }

    pub fn sample_ids(&self) -> &[String] {
        self.expression.sample_labels()
    }

    pub fn metadata(&self) -> &ExperimentInfo {
        &self.metadata
    }

    pub fn n_features(&self) -> usize {
        self.expression.n_features()
    }

    pub fn n_samples(&self) -> usize {
        self.expression.n_samples()
    }

    pub fn covariate(&self, name: &str) -> Result<&Covariate, KiraError> {
        self.covariates.column(name).ok_or_else(|| KiraError::Lookup {
            axis: Axis::Covariate,
            id: name.to_string(),
        })
    }

    pub fn samples_where(&self, name: &str, value: &str) -> Result<Vec<String>, KiraError> {
        let column = self.covariate(name)?;
        Ok(column
            .values()
            .iter()
            .zip(self.sample_ids())
            .filter(|(cell, _)| cell.matches_str(value))
            .map(|(_, id)| id.clone())
            .collect())
    }

    pub fn select_samples(&self, selection: &SampleSelection) -> Result<Self, KiraError> {
        let columns = self.resolve_samples(selection)?;
        Ok(self.take(None, Some(&columns)))
    }

    pub fn select_features(&self, selection: &FeatureSelection) -> Result<Self, KiraError> {
        let rows = self.resolve_features(selection)?;
        Ok(self.take(Some(&rows), None))
    }

    pub fn subset(
        &self,
        features: &FeatureSelection,
        samples: &SampleSelection,
    ) -> Result<Self, KiraError> {
        let rows = self.resolve_features(features)?;
        let columns = self.resolve_samples(samples)?;
        Ok(self.take(Some(&rows), Some(&columns)))
    }

    fn take(&self, rows: Option<&[usize]>, columns: Option<&[usize]>) -> Self {
        let mut expression = match rows {
            Some(rows) => self.expression.select_rows(rows),
            None => self.expression.clone(),
        };
        let covariates = match columns {
            Some(columns) => {
                expression = expression.select_columns(columns);
                self.covariates.take_rows(columns)
            }
            None => self.covariates.clone(),
        };
        let feature_ids = match (rows, &self.feature_ids) {
            (Some(rows), Some(ids)) => Some(rows.iter().map(|&r| ids[r].clone()).collect()),
            (_, ids) => ids.clone(),
        };
        tracing::debug!(
            features = expression.n_features(),
            samples = expression.n_samples(),
            "derived dataset view"
        );
        Self {
            expression,
            covariates,
            feature_ids,
            metadata: self.metadata.clone(),
        }
    }

    fn resolve_samples(&self, selection: &SampleSelection) -> Result<Vec<usize>, KiraError> {
        let n = self.n_samples();
        let positions = match selection {
            SampleSelection::All => (0..n).collect(),
            SampleSelection::Positions(positions) => {
                check_positions(Axis::Sample, positions, n)?;
                positions.clone()
            }
            SampleSelection::Ids(ids) => lookup_ids(Axis::Sample, self.sample_ids(), ids)?,
            SampleSelection::Matching(predicate) => self
                .covariates
                .rows()
                .filter(|row| predicate(row))
                .map(|row| row.position())
                .collect(),
        };
        check_unique(Axis::Sample, &positions, self.sample_ids())?;
        Ok(positions)
    }

    fn resolve_features(&self, selection: &FeatureSelection) -> Result<Vec<usize>, KiraError> {
        let n = self.n_features();
        let positions = match selection {
            FeatureSelection::All => (0..n).collect(),
            FeatureSelection::Positions(positions) => {
                check_positions(Axis::Feature, positions, n)?;
                positions.clone()
            }
            FeatureSelection::Ids(ids) => {
                let known = self
                    .feature_ids
                    .as_deref()
                    .ok_or(KiraError::MissingFeatureIds)?;
                lookup_ids(Axis::Feature, known, ids)?
            }
            FeatureSelection::Matching(predicate) => {
                let known = self
                    .feature_ids
                    .as_deref()
                    .ok_or(KiraError::MissingFeatureIds)?;
                known
                    .iter()
                    .enumerate()
                    .filter(|(_, id)| predicate(id.as_str()))
                    .map(|(i, _)| i)
                    .collect()
            }
        };
        match self.feature_ids.as_deref() {
            Some(ids) => check_unique(Axis::Feature, &positions, ids)?,
            None => check_unique_positions(Axis::Feature, &positions)?,
        }
        Ok(positions)
    }
}

fn align_covariates(labels: &[String], table: CovariateTable) -> Result<CovariateTable, KiraError> {
    if table.row_ids() == labels {
        return Ok(table);
    }

    let label_set: HashSet<&str> = labels.iter().map(String::as_str).collect();
    let row_set: HashSet<&str> = table.row_ids().iter().map(String::as_str).collect();
    let expression_only: Vec<String> = labels
        .iter()
        .filter(|id| !row_set.contains(id.as_str()))
        .cloned()
        .collect();
    let covariate_only: Vec<String> = table
        .row_ids()
        .iter()
        .filter(|id| !label_set.contains(id.as_str()))
        .cloned()
        .collect();

    if !expression_only.is_empty() || !covariate_only.is_empty() {
        return Err(KiraError::Alignment {
            expression_only,
            covariate_only,
        });
    }

    // Both sides are unique, so equal sets mean a permutation.
    tracing::debug!("reordering covariate rows to expression column order");
    Ok(table.reorder_to(labels))
}

fn check_feature_ids(n_rows: usize, ids: &[String]) -> Result<(), KiraError> {
    if ids.len() != n_rows {
        return Err(KiraError::Cardinality {
            expected: n_rows,
            actual: ids.len(),
        });
    }
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(KiraError::DuplicateIdentifier {
                axis: Axis::Feature,
                id: id.clone(),
            });
        }
    }
    Ok(())
}

fn check_positions(axis: Axis, positions: &[usize], len: usize) -> Result<(), KiraError> {
    match positions.iter().find(|&&p| p >= len) {
        Some(&position) => Err(KiraError::PositionOutOfRange {
            axis,
            position,
            len,
        }),
        None => Ok(()),
    }
}

fn lookup_ids(axis: Axis, known: &[String], wanted: &[String]) -> Result<Vec<usize>, KiraError> {
    let index: HashMap<&str, usize> = known
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    wanted
        .iter()
        .map(|id| {
            index
                .get(id.as_str())
                .copied()
                .ok_or_else(|| KiraError::Lookup {
                    axis,
                    id: id.clone(),
                })
        })
        .collect()
}

fn check_unique(axis: Axis, positions: &[usize], ids: &[String]) -> Result<(), KiraError> {
    let mut seen = HashSet::with_capacity(positions.len());
    for &p in positions {
        if !seen.insert(p) {
            return Err(KiraError::DuplicateIdentifier {
                axis,
                id: ids[p].clone(),
            });
        }
    }
    Ok(())
}

fn check_unique_positions(axis: Axis, positions: &[usize]) -> Result<(), KiraError> {
    let mut seen = HashSet::with_capacity(positions.len());
    for &p in positions {
        if !seen.insert(p) {
            return Err(KiraError::DuplicateIdentifier {
                axis,
                id: p.to_string(),
            });
        }
    }
    Ok(())
}
