use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    CacheListResult, DatasetReport, FetchResult, ProgressEvent, ProgressSink, SummaryResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_dataset(result: &DatasetReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_summary(result: &SummaryResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write_summary(&mut out, result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache(result: &CacheListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Human-readable rendering for terminal use.
pub struct TextOutput;

impl TextOutput {
    pub fn print_dataset(report: &DatasetReport) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write_dataset(&mut out, report, "")
    }

    pub fn print_summary(result: &SummaryResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{CYAN}{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}{RESET}",
            "sample", "min", "q1", "median", "mean", "q3", "max", "missing"
        )?;
        for row in &result.samples {
            writeln!(
                out,
                "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
                row.sample,
                stat(row.min),
                stat(row.q1),
                stat(row.median),
                stat(row.mean),
                stat(row.q3),
                stat(row.max),
                row.missing
            )?;
        }
        Ok(())
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{CYAN}KIRA-ES fetch {}{RESET}", result.accession)?;
        for item in &result.items {
            let color = if item.action == "cache" { GREEN } else { CYAN };
            writeln!(
                out,
                "{color}{} [{}] ({}){RESET}",
                item.file_name, item.platform, item.action
            )?;
            writeln!(out, "{color}   cache: {}{RESET}", item.cache_path)?;
            write_dataset(&mut out, &item.dataset, "   ")?;
        }
        Ok(())
    }

    pub fn print_cache(result: &CacheListResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if result.entries.is_empty() {
            writeln!(out, "{YELLOW}cache is empty{RESET}")?;
        }
        for entry in &result.entries {
            writeln!(
                out,
                "{} {} {} {}",
                entry.accession, entry.file_name, entry.downloaded_at, entry.cache_path
            )?;
        }
        Ok(())
    }
}

fn write_dataset(out: &mut impl Write, report: &DatasetReport, indent: &str) -> io::Result<()> {
    writeln!(
        out,
        "{indent}{GREEN}{} features x {} samples{RESET}",
        report.n_features, report.n_samples
    )?;
    if let Some(title) = &report.experiment.title {
        writeln!(out, "{indent}title: {title}")?;
    }
    writeln!(out, "{indent}samples: {}", report.sample_ids.join(", "))?;
    if !report.feature_preview.is_empty() {
        let more = if report.n_features > report.feature_preview.len() {
            ", ..."
        } else {
            ""
        };
        writeln!(
            out,
            "{indent}features: {}{more}",
            report.feature_preview.join(", ")
        )?;
    }
    for covariate in &report.covariates {
        match &covariate.description {
            Some(description) => writeln!(
                out,
                "{indent}covariate {} ({description})",
                covariate.name
            )?,
            None => writeln!(out, "{indent}covariate {}", covariate.name)?,
        }
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, result: &SummaryResult) -> io::Result<()> {
    writeln!(
        out,
        "{CYAN}{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}{RESET}",
        "sample", "min", "q1", "median", "mean", "q3", "max", "missing"
    )?;
    for row in &result.samples {
        writeln!(
            out,
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
            row.sample,
            stat(row.min),
            stat(row.q1),
            stat(row.median),
            stat(row.mean),
            stat(row.q3),
            stat(row.max),
            row.missing
        )?;
    }

    writeln!(out)?;
    writeln!(out, "{CYAN}{:<16} {:>10}{RESET}", "feature", "mean")?;
    for row in &result.features {
        writeln!(out, "{:<16} {:>10}", row.feature, stat(row.mean))?;
    }

    if let Some(groups) = &result.groups {
        writeln!(out)?;
        writeln!(out, "{CYAN}{:<16} {:>10}{RESET}", groups.covariate, "samples")?;
        for (value, count) in &groups.counts {
            writeln!(out, "{value:<16} {count:>10}")?;
        }
    }
    Ok(())
}

fn stat(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "NA".to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::app::GroupCounts;
    use crate::summary::{FeatureMean, SampleSummary};

    fn result(groups: Option<GroupCounts>) -> SummaryResult {
        SummaryResult {
            samples: vec![SampleSummary {
                sample: "GSM1".to_string(),
                min: Some(1.0),
                q1: Some(1.5),
                median: Some(2.0),
                mean: Some(2.0),
                q3: Some(2.5),
                max: Some(3.0),
                missing: 0,
            }],
            features: vec![
                FeatureMean {
                    feature: "TP53".to_string(),
                    mean: Some(6.15),
                },
                FeatureMean {
                    feature: "BRCA1".to_string(),
                    mean: None,
                },
            ],
            groups,
        }
    }

    fn render(result: &SummaryResult) -> String {
        let mut buffer = Vec::new();
        write_summary(&mut buffer, result).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn text_summary_lists_feature_means() {
        let text = render(&result(None));
        assert!(text.contains("GSM1"));
        let tp53 = text.lines().find(|line| line.starts_with("TP53")).unwrap();
        assert!(tp53.ends_with("6.150"));
        let brca1 = text.lines().find(|line| line.starts_with("BRCA1")).unwrap();
        assert!(brca1.ends_with("NA"));
        assert!(!text.contains("samples"));
    }

    #[test]
    fn text_summary_lists_group_counts() {
        let counts = BTreeMap::from([("no".to_string(), 2), ("yes".to_string(), 3)]);
        let text = render(&result(Some(GroupCounts {
            covariate: "smoker".to_string(),
            counts,
        })));
        assert!(text.contains("smoker"));
        let yes = text.lines().find(|line| line.starts_with("yes")).unwrap();
        assert!(yes.ends_with('3'));
    }
}
