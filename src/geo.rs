use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::covariates::{CovariateTable, infer_column};
use crate::dataset::SynchronizedDataset;
use crate::domain::{ExperimentInfo, GeoSeriesAccession};
use crate::error::KiraError;
use crate::reader::{GridOptions, LabeledGrid, read_expression_grid_from};
use crate::store::{Metadata, Store};

const TABLE_BEGIN: &str = "!series_matrix_table_begin";
const TABLE_END: &str = "!series_matrix_table_end";

pub trait GeoClient: Send + Sync {
    fn list_series_matrix_files(
        &self,
        accession: &GeoSeriesAccession,
    ) -> Result<Vec<String>, KiraError>;

    fn download_series_matrix(
        &self,
        accession: &GeoSeriesAccession,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), KiraError>;
}

impl<C: GeoClient> GeoClient for &C {
    fn list_series_matrix_files(
        &self,
        accession: &GeoSeriesAccession,
    ) -> Result<Vec<String>, KiraError> {
        (**self).list_series_matrix_files(accession)
    }

    fn download_series_matrix(
        &self,
        accession: &GeoSeriesAccession,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), KiraError> {
        (**self).download_series_matrix(accession, file_name, destination)
    }
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-es/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn matrix_dir_url(accession: &GeoSeriesAccession) -> String {
        format!(
            "https://ftp.ncbi.nlm.nih.gov/geo/series/{}/{}/matrix/",
            accession.bucket(),
            accession.as_str()
        )
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, KiraError> {
        tracing::debug!(%url, "geo request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(KiraError::GeoStatus { status, message });
        }
        Ok(response)
    }
}

impl GeoClient for GeoHttpClient {
    fn list_series_matrix_files(
        &self,
        accession: &GeoSeriesAccession,
    ) -> Result<Vec<String>, KiraError> {
        let listing = self
            .get(&Self::matrix_dir_url(accession))?
            .text()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(extract_series_matrix_names(&listing))
    }

    fn download_series_matrix(
        &self,
        accession: &GeoSeriesAccession,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), KiraError> {
        let url = format!("{}{file_name}", Self::matrix_dir_url(accession));
        let mut response = self.get(&url)?;
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn extract_series_matrix_names(listing: &str) -> Vec<String> {
    let pattern = Regex::new(r"GSE\d+(?:-GPL\d+)?_series_matrix\.txt\.gz").unwrap();
    let mut names: Vec<String> = pattern
        .find_iter(listing)
        .map(|m| m.as_str().to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[derive(Debug, Clone)]
pub struct SeriesMatrix {
    pub platform: String,
    pub info: ExperimentInfo,
    pub covariates: Option<CovariateTable>,
    pub grid: LabeledGrid,
}

impl SeriesMatrix {
    pub fn into_dataset(self) -> Result<SynchronizedDataset, KiraError> {
        SynchronizedDataset::from_parts(
            self.grid.matrix,
            self.covariates,
            Some(self.grid.row_labels),
            self.info,
        )
    }
}

pub fn parse_series_matrix(text: &str) -> Result<SeriesMatrix, KiraError> {
    let mut series: Vec<(String, Vec<String>)> = Vec::new();
    let mut samples: Vec<(String, Vec<String>)> = Vec::new();
    let mut table = String::new();
    let mut in_table = false;
    let mut table_seen = false;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(TABLE_BEGIN) {
            in_table = true;
            table_seen = true;
            continue;
        }
        if line.starts_with(TABLE_END) {
            in_table = false;
            continue;
        }
        if in_table {
            table.push_str(line);
            table.push('\n');
            continue;
        }
        let mut fields = line.split('\t');
        let key = fields.next().unwrap_or_default();
        let values: Vec<String> = fields.map(unquote).collect();
        if let Some(name) = key.strip_prefix("!Series_") {
            series.push((name.to_string(), values));
        } else if let Some(name) = key.strip_prefix("!Sample_") {
            samples.push((name.to_string(), values));
        }
    }

    if !table_seen {
        return Err(KiraError::Parse(
            "series matrix has no expression table".to_string(),
        ));
    }

    let grid = read_expression_grid_from(table.as_bytes(), &GridOptions::default())?;
    let platform = platform_of(&series, &samples);
    let info = experiment_info(&series);
    let covariates = sample_covariates(&samples)?;
    tracing::debug!(
        %platform,
        features = grid.matrix.n_features(),
        samples = grid.matrix.n_samples(),
        "parsed series matrix"
    );

    Ok(SeriesMatrix {
        platform,
        info,
        covariates,
        grid,
    })
}

pub fn read_series_matrix(path: &Path) -> Result<SeriesMatrix, KiraError> {
    let file = File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut text = String::new();
    let is_gzip = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    if is_gzip {
        GzDecoder::new(BufReader::new(file))
            .read_to_string(&mut text)
            .map_err(|err| KiraError::Parse(format!("{}: {err}", path.display())))?;
    } else {
        BufReader::new(file)
            .read_to_string(&mut text)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    parse_series_matrix(&text)
}

fn unquote(field: &str) -> String {
    let trimmed = field.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

fn platform_of(series: &[(String, Vec<String>)], samples: &[(String, Vec<String>)]) -> String {
    let first = |rows: &[(String, Vec<String>)]| {
        rows.iter()
            .find(|(key, _)| key == "platform_id")
            .and_then(|(_, values)| values.first().cloned())
    };
    first(samples)
        .or_else(|| first(series))
        .unwrap_or_else(|| "unknown".to_string())
}

fn experiment_info(series: &[(String, Vec<String>)]) -> ExperimentInfo {
    let mut info = ExperimentInfo::default();
    let mut other: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, values) in series {
        let value = values.join(" ");
        let append = |slot: &mut Option<String>| match slot {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&value);
            }
            None => *slot = Some(value.clone()),
        };
        match key.as_str() {
            "geo_accession" => append(&mut info.name),
            "title" => append(&mut info.title),
            "summary" => append(&mut info.summary),
            "contact_name" => append(&mut info.contact),
            "contact_institute" => append(&mut info.lab),
            "web_link" => {
                if info.url.is_none() {
                    info.url = Some(value.clone());
                }
            }
            _ => other.entry(key.clone()).or_default().push(value),
        }
    }
    if let Some(contact) = info.contact.as_mut() {
        *contact = contact
            .split(',')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }
    info.other = other
        .into_iter()
        .map(|(key, values)| (key, values.join("; ")))
        .collect();
    info
}

fn sample_covariates(
    samples: &[(String, Vec<String>)],
) -> Result<Option<CovariateTable>, KiraError> {
    let Some((_, ids)) = samples.iter().find(|(key, _)| key == "geo_accession") else {
        return Ok(None);
    };
    let n = ids.len();
    let mut table = CovariateTable::new(ids.clone())?;
    let mut used: BTreeMap<String, usize> = BTreeMap::new();

    for (key, values) in samples {
        if key == "geo_accession" {
            continue;
        }
        if values.len() != n {
            return Err(KiraError::Parse(format!(
                "!Sample_{key} has {} values for {n} samples",
                values.len()
            )));
        }
        let (name, cells) = match characteristic_key(key, values) {
            Some(characteristic) => (
                characteristic.clone(),
                values
                    .iter()
                    .map(|value| {
                        value
                            .split_once(':')
                            .map(|(_, rest)| rest.trim().to_string())
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>(),
            ),
            None => (key.clone(), values.clone()),
        };
        let count = used.entry(name.clone()).or_insert(0);
        *count += 1;
        let column = if *count == 1 {
            name
        } else {
            format!("{name}.{}", *count - 1)
        };
        table.push_column(column.clone(), infer_column(&cells))?;
        table.describe(&column, format!("!Sample_{key}"))?;
    }
    Ok(Some(table))
}

// Characteristics rows become a column only when every cell shares one `key: value` key.
fn characteristic_key(key: &str, values: &[String]) -> Option<String> {
    if !key.starts_with("characteristics") {
        return None;
    }
    let mut shared: Option<&str> = None;
    for value in values {
        let (name, _) = value.split_once(':')?;
        let name = name.trim();
        match shared {
            Some(existing) if existing != name => return None,
            _ => shared = Some(name),
        }
    }
    shared.filter(|name| !name.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Download,
}

impl FetchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchSource::Cache => "cache",
            FetchSource::Download => "download",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedMatrix {
    pub file_name: String,
    pub platform: String,
    pub source: FetchSource,
    pub path: Utf8PathBuf,
    pub dataset: SynchronizedDataset,
}

pub struct GeoFetcher<C: GeoClient> {
    client: C,
    store: Store,
}

impl<C: GeoClient> GeoFetcher<C> {
    pub fn new(client: C, store: Store) -> Self {
        Self { client, store }
    }

    pub fn fetch(
        &self,
        accession: &GeoSeriesAccession,
        force: bool,
    ) -> Result<Vec<FetchedMatrix>, KiraError> {
        self.store.ensure_cache_root()?;
        let files = self.client.list_series_matrix_files(accession)?;
        if files.is_empty() {
            return Err(KiraError::GeoNoSeriesMatrix(accession.to_string()));
        }
        tracing::info!(%accession, files = files.len(), "resolved series matrix files");

        let mut fetched = Vec::with_capacity(files.len());
        for file_name in files {
            let path = self.store.cache_geo_path(accession, &file_name);
            let source = if !force && self.store.cache_exists(&path) {
                tracing::info!(%file_name, "using cached series matrix");
                FetchSource::Cache
            } else {
                tracing::info!(%file_name, "downloading series matrix");
                Store::fill_file_atomic(&path, |temp| {
                    self.client
                        .download_series_matrix(accession, &file_name, temp)
                })?;
                self.record_download(accession, &file_name, &path)?;
                FetchSource::Download
            };
            let matrix = read_series_matrix(path.as_std_path())?;
            let platform = matrix.platform.clone();
            fetched.push(FetchedMatrix {
                file_name,
                platform,
                source,
                path,
                dataset: matrix.into_dataset()?,
            });
        }
        Ok(fetched)
    }

    /// Datasets keyed by platform id (file name when two files share one).
    pub fn fetch_by_platform(
        &self,
        accession: &GeoSeriesAccession,
        force: bool,
    ) -> Result<BTreeMap<String, SynchronizedDataset>, KiraError> {
        let mut datasets = BTreeMap::new();
        for item in self.fetch(accession, force)? {
            let key = if datasets.contains_key(&item.platform) {
                item.file_name
            } else {
                item.platform
            };
            datasets.insert(key, item.dataset);
        }
        Ok(datasets)
    }

    fn record_download(
        &self,
        accession: &GeoSeriesAccession,
        file_name: &str,
        path: &Utf8Path,
    ) -> Result<(), KiraError> {
        let meta = Metadata {
            source: "geo".to_string(),
            dataset_type: "series_matrix".to_string(),
            id: file_name.to_string(),
            accession: accession.to_string(),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("kira-es/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: path.to_string(),
        };
        Store::write_metadata(
            &self.store.cache_metadata_path("series_matrix", file_name),
            &meta,
        )
    }
}
