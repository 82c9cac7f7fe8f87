use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::covariates::CovariateValue;
use crate::dataset::SynchronizedDataset;
use crate::domain::{ExperimentInfo, GeoSeriesAccession};
use crate::error::KiraError;
use crate::geo::{GeoClient, GeoFetcher};
use crate::reader::{read_covariates, read_expression_grid};
use crate::selection::{FeatureSelection, SampleSelection};
use crate::store::Store;
use crate::summary::{FeatureMean, SampleSummary, feature_means, group_counts, sample_summaries};

const FEATURE_PREVIEW: usize = 10;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubsetRequest {
    pub samples: Option<Vec<String>>,
    pub features: Option<Vec<String>>,
    /// `(covariate, value)`; keeps samples whose covariate equals value.
    pub filter: Option<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CovariateReport {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<CovariateValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub n_features: usize,
    pub n_samples: usize,
    pub sample_ids: Vec<String>,
    pub feature_preview: Vec<String>,
    pub covariates: Vec<CovariateReport>,
    #[serde(skip_serializing_if = "ExperimentInfo::is_empty")]
    pub experiment: ExperimentInfo,
}

impl DatasetReport {
    pub fn from_dataset(dataset: &SynchronizedDataset) -> Self {
        Self {
            n_features: dataset.n_features(),
            n_samples: dataset.n_samples(),
            sample_ids: dataset.sample_ids().to_vec(),
            feature_preview: dataset
                .feature_ids()
                .map(|ids| ids.iter().take(FEATURE_PREVIEW).cloned().collect())
                .unwrap_or_default(),
            covariates: dataset
                .covariates()
                .columns()
                .iter()
                .map(|column| CovariateReport {
                    name: column.name().to_string(),
                    description: column.description().map(str::to_string),
                    values: column.values().to_vec(),
                })
                .collect(),
            experiment: dataset.metadata().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub samples: Vec<SampleSummary>,
    pub features: Vec<FeatureMean>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<GroupCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupCounts {
    pub covariate: String,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub accession: String,
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub file_name: String,
    pub platform: String,
    pub action: String,
    pub cache_path: String,
    pub dataset: DatasetReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListResult {
    pub entries: Vec<CacheEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub accession: String,
    pub file_name: String,
    pub downloaded_at: String,
    pub cache_path: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<std::time::Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<G: GeoClient> {
    store: Store,
    geo: G,
}

impl<G: GeoClient> App<G> {
    pub fn new(store: Store, geo: G) -> Self {
        Self { store, geo }
    }

    /// Build a dataset from the files named in a lab config.
    pub fn load(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SynchronizedDataset, KiraError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; expression {}", config.expression.path.display()),
            elapsed: None,
        });
        let grid = read_expression_grid(&config.expression.path, &config.expression.options)?;

        let covariates = match &config.covariates {
            Some(source) => {
                sink.event(ProgressEvent {
                    message: format!("phase=Read; covariates {}", source.path.display()),
                    elapsed: None,
                });
                Some(read_covariates(&source.path, &source.options)?)
            }
            None => None,
        };

        sink.event(ProgressEvent {
            message: "phase=Verify; aligning samples".to_string(),
            elapsed: None,
        });
        let dataset = SynchronizedDataset::from_parts(
            grid.matrix,
            covariates,
            Some(grid.row_labels),
            config.experiment.clone(),
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "loaded {} features x {} samples",
                dataset.n_features(),
                dataset.n_samples()
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(dataset)
    }

    pub fn describe(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetReport, KiraError> {
        let dataset = self.load(config, sink)?;
        Ok(DatasetReport::from_dataset(&dataset))
    }

    /// Sample and feature statistics, plus sample counts per value of `by`
    /// when a covariate is named.
    pub fn summary(
        &self,
        config: &ResolvedConfig,
        by: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<SummaryResult, KiraError> {
        let dataset = self.load(config, sink)?;
        sink.event(ProgressEvent {
            message: "phase=Summarize; computing sample statistics".to_string(),
            elapsed: None,
        });
        let groups = match by {
            Some(covariate) => Some(GroupCounts {
                covariate: covariate.to_string(),
                counts: group_counts(&dataset, covariate)?,
            }),
            None => None,
        };
        Ok(SummaryResult {
            samples: sample_summaries(&dataset),
            features: feature_means(&dataset),
            groups,
        })
    }

    pub fn subset(
        &self,
        config: &ResolvedConfig,
        request: &SubsetRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetReport, KiraError> {
        let dataset = self.load(config, sink)?;
        let view = subset_dataset(&dataset, request)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Subset; kept {} features x {} samples",
                view.n_features(),
                view.n_samples()
            ),
            elapsed: None,
        });
        Ok(DatasetReport::from_dataset(&view))
    }

    pub fn fetch(
        &self,
        accession: &GeoSeriesAccession,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; series {accession}"),
            elapsed: None,
        });
        let start = Instant::now();
        let fetcher = GeoFetcher::new(&self.geo, self.store.clone());
        let fetched = fetcher.fetch(accession, options.force)?;
        sink.event(ProgressEvent {
            message: format!("geo.response files={}", fetched.len()),
            elapsed: Some(start.elapsed()),
        });

        let items = fetched
            .into_iter()
            .map(|item| FetchItemResult {
                dataset: DatasetReport::from_dataset(&item.dataset),
                file_name: item.file_name,
                platform: item.platform,
                action: item.source.as_str().to_string(),
                cache_path: item.path.to_string(),
            })
            .collect();
        Ok(FetchResult {
            accession: accession.to_string(),
            items,
        })
    }

    pub fn cached(&self, sink: &dyn ProgressSink) -> Result<CacheListResult, KiraError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning cache".to_string(),
            elapsed: None,
        });
        let entries = Store::list_metadata(self.store.cache_root())?
            .into_iter()
            .map(|meta| CacheEntry {
                accession: meta.accession,
                file_name: meta.id,
                downloaded_at: meta.downloaded_at,
                cache_path: meta.resolved_path,
            })
            .collect();
        Ok(CacheListResult { entries })
    }
}

/// Apply a CLI-style subset request. Explicit sample ids and a covariate
/// filter cannot be combined.
pub fn subset_dataset(
    dataset: &SynchronizedDataset,
    request: &SubsetRequest,
) -> Result<SynchronizedDataset, KiraError> {
    let samples = match (&request.samples, &request.filter) {
        (Some(_), Some(_)) => {
            return Err(KiraError::InvalidInput(
                "sample ids and a covariate filter cannot be combined".to_string(),
            ));
        }
        (Some(ids), None) => SampleSelection::ids(ids.iter().cloned()),
        (None, Some((name, value))) => SampleSelection::Ids(dataset.samples_where(name, value)?),
        (None, None) => SampleSelection::All,
    };
    let features = match &request.features {
        Some(ids) => FeatureSelection::ids(ids.iter().cloned()),
        None => FeatureSelection::All,
    };
    dataset.subset(&features, &samples)
}

/// Split `key=value` as given on the command line.
pub fn parse_filter(value: &str) -> Result<(String, String), KiraError> {
    value
        .split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| KiraError::InvalidInput(format!("expected key=value, got {value}")))
}

/// Group sample ids by a covariate's values, for callers that want the
/// per-group layout (e.g. plotting one series per group).
pub fn samples_by_group(
    dataset: &SynchronizedDataset,
    covariate: &str,
) -> Result<BTreeMap<String, Vec<String>>, KiraError> {
    let column = dataset.covariate(covariate)?;
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (value, id) in column.values().iter().zip(dataset.sample_ids()) {
        groups.entry(value.to_string()).or_default().push(id.clone());
    }
    Ok(groups)
}
