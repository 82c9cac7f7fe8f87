use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::ExperimentInfo;
use crate::error::KiraError;
use crate::reader::{CovariateOptions, GridOptions, parse_delimiter};

pub const DEFAULT_CONFIG_FILE: &str = "kira-es.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub expression: ExpressionEntry,
    #[serde(default)]
    pub covariates: Option<CovariateEntry>,
    #[serde(default)]
    pub experiment: Option<ExperimentInfo>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExpressionEntry {
    Shorthand(String),
    Detailed(ExpressionEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExpressionEntryObject {
    pub path: String,
    #[serde(default)]
    pub header_row: Option<usize>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CovariateEntry {
    Shorthand(String),
    Detailed(CovariateEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CovariateEntryObject {
    pub path: String,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExpressionSource {
    pub path: PathBuf,
    pub options: GridOptions,
}

#[derive(Debug, Clone)]
pub struct CovariateSource {
    pub path: PathBuf,
    pub options: CovariateOptions,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub expression: ExpressionSource,
    pub covariates: Option<CovariateSource>,
    pub experiment: ExperimentInfo,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::debug!(config = %config_path.display(), "resolved config file");
        Self::resolve_config(config, &base_dir)
    }

    /// Apply defaults; relative data paths are taken from `base_dir`.
    pub fn resolve_config(config: Config, base_dir: &Path) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let expression = match config.expression {
            ExpressionEntry::Shorthand(path) => ExpressionSource {
                path: base_dir.join(path),
                options: GridOptions::default(),
            },
            ExpressionEntry::Detailed(obj) => {
                let defaults = GridOptions::default();
                ExpressionSource {
                    path: base_dir.join(obj.path),
                    options: GridOptions {
                        header_row: obj.header_row.unwrap_or(defaults.header_row),
                        n_rows: obj.rows,
                        delimiter: match obj.delimiter {
                            Some(value) => parse_delimiter(&value)?,
                            None => defaults.delimiter,
                        },
                    },
                }
            }
        };

        let covariates = config
            .covariates
            .map(|entry| -> Result<CovariateSource, KiraError> {
                match entry {
                    CovariateEntry::Shorthand(path) => Ok(CovariateSource {
                        path: base_dir.join(path),
                        options: CovariateOptions::default(),
                    }),
                    CovariateEntry::Detailed(obj) => {
                        let defaults = CovariateOptions::default();
                        Ok(CovariateSource {
                            path: base_dir.join(obj.path),
                            options: CovariateOptions {
                                id_column: obj.id_column.unwrap_or(defaults.id_column),
                                delimiter: match obj.delimiter {
                                    Some(value) => parse_delimiter(&value)?,
                                    None => defaults.delimiter,
                                },
                                descriptions: obj.descriptions,
                            },
                        })
                    }
                }
            })
            .transpose()?;

        Ok(ResolvedConfig {
            schema_version,
            expression,
            covariates,
            experiment: config.experiment.unwrap_or_default(),
        })
    }
}
