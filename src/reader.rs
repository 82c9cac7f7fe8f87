//! Delimited-text readers for expression grids and covariate tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use crate::covariates::{CovariateTable, infer_column};
use crate::error::KiraError;
use crate::matrix::ExpressionMatrix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOptions {
    /// Lines to skip before the header row.
    pub header_row: usize,
    /// Maximum number of data rows to read.
    pub n_rows: Option<usize>,
    pub delimiter: u8,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            header_row: 0,
            n_rows: None,
            delimiter: b'\t',
        }
    }
}

/// Numeric grid plus the row labels read from its first column.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledGrid {
    pub matrix: ExpressionMatrix,
    pub row_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovariateOptions {
    /// Column promoted to the sample index.
    pub id_column: String,
    pub delimiter: u8,
    /// Column name -> human-readable description.
    pub descriptions: BTreeMap<String, String>,
}

impl Default for CovariateOptions {
    fn default() -> Self {
        Self {
            id_column: "sample".to_string(),
            delimiter: b',',
            descriptions: BTreeMap::new(),
        }
    }
}

pub fn read_expression_grid(path: &Path, options: &GridOptions) -> Result<LabeledGrid, KiraError> {
    tracing::info!(path = %path.display(), header_row = options.header_row, "reading expression grid");
    let file = File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    read_expression_grid_from(BufReader::new(file), options)
}

pub fn read_expression_grid_from<R: BufRead>(
    mut reader: R,
    options: &GridOptions,
) -> Result<LabeledGrid, KiraError> {
    skip_lines(&mut reader, options.header_row)?;

    let mut csv = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv.records();

    let header = match records.next() {
        Some(record) => record.map_err(|err| KiraError::Parse(err.to_string()))?,
        None => {
            return Err(KiraError::Parse(format!(
                "no header row at line {}",
                options.header_row + 1
            )));
        }
    };

    let mut rows = Vec::new();
    let mut row_labels = Vec::new();
    let mut sample_labels: Option<Vec<String>> = None;

    for record in records {
        if options.n_rows.is_some_and(|limit| rows.len() >= limit) {
            break;
        }
        let record = record.map_err(|err| KiraError::Parse(err.to_string()))?;
        let line = options.header_row + record_line(&record);
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if sample_labels.is_none() {
            sample_labels = Some(sample_labels_for(&header, record.len(), line)?);
        }
        let labels = sample_labels.as_deref().unwrap_or_default();
        if record.len() != labels.len() + 1 {
            return Err(KiraError::Parse(format!(
                "line {line}: expected {} fields, found {}",
                labels.len() + 1,
                record.len()
            )));
        }

        row_labels.push(record[0].trim().to_string());
        let values = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(column, raw)| parse_value(raw, line, column + 2))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    let sample_labels = match sample_labels {
        Some(labels) => labels,
        None => header.iter().skip(1).map(|s| s.trim().to_string()).collect(),
    };
    tracing::debug!(features = rows.len(), samples = sample_labels.len(), "parsed grid");

    Ok(LabeledGrid {
        matrix: ExpressionMatrix::new(rows, sample_labels)?,
        row_labels,
    })
}

pub fn read_covariates(path: &Path, options: &CovariateOptions) -> Result<CovariateTable, KiraError> {
    tracing::info!(path = %path.display(), id_column = %options.id_column, "reading covariates");
    let file = File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    read_covariates_from(BufReader::new(file), options)
}

pub fn read_covariates_from<R: BufRead>(
    reader: R,
    options: &CovariateOptions,
) -> Result<CovariateTable, KiraError> {
    let mut csv = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .from_reader(reader);
    let headers: Vec<String> = csv
        .headers()
        .map_err(|err| KiraError::Parse(err.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let id_index = headers
        .iter()
        .position(|h| *h == options.id_column)
        .ok_or_else(|| {
            KiraError::Parse(format!("covariate file has no column {}", options.id_column))
        })?;

    let mut ids = Vec::new();
    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in csv.records() {
        let record = record.map_err(|err| KiraError::Parse(err.to_string()))?;
        ids.push(record[id_index].trim().to_string());
        for (i, field) in record.iter().enumerate() {
            raw_columns[i].push(field.to_string());
        }
    }

    let mut table = CovariateTable::new(ids)?;
    for (i, (name, raw)) in headers.into_iter().zip(raw_columns).enumerate() {
        if i == id_index {
            continue;
        }
        table.push_column(name, infer_column(&raw))?;
    }
    for (name, description) in &options.descriptions {
        table.describe(name, description.clone())?;
    }
    Ok(table)
}

/// Parse a single delimiter argument such as `","`, `"\t"` or `"tab"`.
pub fn parse_delimiter(value: &str) -> Result<u8, KiraError> {
    match value {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        "space" => Ok(b' '),
        other if other.len() == 1 && other.is_ascii() => Ok(other.as_bytes()[0]),
        other => Err(KiraError::InvalidInput(format!("invalid delimiter: {other:?}"))),
    }
}

fn skip_lines<R: BufRead>(reader: &mut R, count: usize) -> Result<(), KiraError> {
    let mut buffer = String::new();
    for skipped in 0..count {
        buffer.clear();
        let read = reader
            .read_line(&mut buffer)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if read == 0 {
            return Err(KiraError::Parse(format!(
                "input ends after {skipped} lines, header expected at line {}",
                count + 1
            )));
        }
    }
    Ok(())
}

/// A header may omit the row-label column (one field short of the data rows).
fn sample_labels_for(header: &StringRecord, width: usize, line: usize) -> Result<Vec<String>, KiraError> {
    let fields = header.iter().map(|s| s.trim().to_string());
    if header.len() == width {
        Ok(fields.skip(1).collect())
    } else if header.len() + 1 == width {
        Ok(fields.collect())
    } else {
        Err(KiraError::Parse(format!(
            "line {line}: header has {} fields but data row has {width}",
            header.len()
        )))
    }
}

fn record_line(record: &StringRecord) -> usize {
    record
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or_default()
}

fn parse_value(raw: &str, line: usize, column: usize) -> Result<f64, KiraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| {
        KiraError::Parse(format!("line {line}, column {column}: not a number: {trimmed}"))
    })
}
