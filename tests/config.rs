use std::fs;

use assert_matches::assert_matches;

use kira_expression_set::config::{Config, ConfigLoader, CovariateEntry, ExpressionEntry};
use kira_expression_set::error::KiraError;

#[test]
fn parse_config_shorthand() {
    let config: Config = serde_json::from_str(
        r#"{"expression": "exprs.tsv", "covariates": "pdata.csv"}"#,
    )
    .unwrap();
    assert_matches!(config.expression, ExpressionEntry::Shorthand(ref path) if path == "exprs.tsv");
    assert_matches!(config.covariates, Some(CovariateEntry::Shorthand(_)));
}

#[test]
fn resolve_detailed_config_relative_to_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-es.json");
    fs::write(
        &path,
        r#"{
  "schema_version": 1,
  "expression": {"path": "data/exprs.csv", "header_row": 2, "rows": 100, "delimiter": ","},
  "covariates": {
    "path": "data/pdata.tsv",
    "id_column": "individual",
    "delimiter": "tab",
    "descriptions": {"sex": "reported sex"}
  },
  "experiment": {"lab": "Francis Galton", "title": "Smoking Mice"}
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.expression.path, temp.path().join("data/exprs.csv"));
    assert_eq!(resolved.expression.options.header_row, 2);
    assert_eq!(resolved.expression.options.n_rows, Some(100));
    assert_eq!(resolved.expression.options.delimiter, b',');

    let covariates = resolved.covariates.unwrap();
    assert_eq!(covariates.options.id_column, "individual");
    assert_eq!(covariates.options.delimiter, b'\t');
    assert_eq!(
        covariates.options.descriptions.get("sex").map(String::as_str),
        Some("reported sex")
    );
    assert_eq!(resolved.experiment.title.as_deref(), Some("Smoking Mice"));
}

#[test]
fn invalid_json_reports_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-es.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));
}

#[test]
fn bad_delimiter_rejected() {
    let config: Config = serde_json::from_str(
        r#"{"expression": {"path": "x.tsv", "delimiter": "pipes"}}"#,
    )
    .unwrap();
    let err = ConfigLoader::resolve_config(config, std::path::Path::new(".")).unwrap_err();
    assert_matches!(err, KiraError::InvalidInput(_));
}
