//! Read-only descriptive statistics over a dataset.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::SynchronizedDataset;
use crate::error::KiraError;

/// Five-number summary plus mean of one sample column. Statistics are `None`
/// when every value is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub sample: String,
    pub min: Option<f64>,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub mean: Option<f64>,
    pub q3: Option<f64>,
    pub max: Option<f64>,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMean {
    pub feature: String,
    pub mean: Option<f64>,
}

pub fn sample_summaries(dataset: &SynchronizedDataset) -> Vec<SampleSummary> {
    let expression = dataset.expression();
    dataset
        .sample_ids()
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            let column = expression.column(index).unwrap_or_default();
            let missing = column.iter().filter(|v| v.is_nan()).count();
            let mut present: Vec<f64> = column.into_iter().filter(|v| !v.is_nan()).collect();
            present.sort_by(f64::total_cmp);
            SampleSummary {
                sample: sample.clone(),
                min: present.first().copied(),
                q1: quantile(&present, 0.25),
                median: quantile(&present, 0.5),
                mean: mean(&present),
                q3: quantile(&present, 0.75),
                max: present.last().copied(),
                missing,
            }
        })
        .collect()
}

/// Mean of each feature across samples. Features are named by id when the
/// dataset has them, by row position otherwise.
pub fn feature_means(dataset: &SynchronizedDataset) -> Vec<FeatureMean> {
    let expression = dataset.expression();
    (0..dataset.n_features())
        .map(|row| {
            let feature = match dataset.feature_ids() {
                Some(ids) => ids[row].clone(),
                None => row.to_string(),
            };
            let present: Vec<f64> = expression
                .row(row)
                .unwrap_or_default()
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            FeatureMean {
                feature,
                mean: mean(&present),
            }
        })
        .collect()
}

/// Number of samples per distinct value of a covariate.
pub fn group_counts(
    dataset: &SynchronizedDataset,
    covariate: &str,
) -> Result<BTreeMap<String, usize>, KiraError> {
    let column = dataset.covariate(covariate)?;
    let mut counts = BTreeMap::new();
    for value in column.values() {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}

fn mean(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
}

/// Linear interpolation between closest ranks over sorted input.
fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
