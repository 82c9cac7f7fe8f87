use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoSeriesAccession(String);

impl GeoSeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory bucket used by the NCBI mirror, e.g. `GSE2nnn` for `GSE2553`.
    pub fn bucket(&self) -> String {
        let digits = self.0.trim_start_matches("GSE");
        if digits.len() <= 3 {
            return "GSEnnn".to_string();
        }
        let head = &digits[..digits.len() - 3];
        format!("GSE{head}nnn")
    }
}

impl fmt::Display for GeoSeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeoSeriesAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = normalized
            .strip_prefix("GSE")
            .map(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(false);
        if !is_valid {
            return Err(KiraError::InvalidGeoAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Free-form provenance carried alongside a dataset. Nothing here constrains
/// the expression grid or the covariates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, String>,
}

impl ExperimentInfo {
    pub fn is_empty(&self) -> bool {
        *self == ExperimentInfo::default()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_series_accession_valid() {
        let acc: GeoSeriesAccession = "gse2553".parse().unwrap();
        assert_eq!(acc.as_str(), "GSE2553");
    }

    #[test]
    fn parse_series_accession_invalid() {
        let err = "GDS507".parse::<GeoSeriesAccession>().unwrap_err();
        assert_matches!(err, KiraError::InvalidGeoAccession(_));
        assert!("GSE".parse::<GeoSeriesAccession>().is_err());
    }

    #[test]
    fn bucket_layout() {
        let acc: GeoSeriesAccession = "GSE2553".parse().unwrap();
        assert_eq!(acc.bucket(), "GSE2nnn");
        let short: GeoSeriesAccession = "GSE12".parse().unwrap();
        assert_eq!(short.bucket(), "GSEnnn");
    }

    #[test]
    fn experiment_info_empty() {
        assert!(ExperimentInfo::default().is_empty());
        let info = ExperimentInfo {
            lab: Some("Bioinformatics Lab".into()),
            ..Default::default()
        };
        assert!(!info.is_empty());
    }
}
