use anyhow::{Context, Result};
use log::{debug, error, info};
use regex::Regex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::parser::{parse_records, to_points, IngestSummary, MeterCsvError};
use crate::metrics::{EnergyMetricPoint, MetricSink};
use crate::timezone::LocalZone;

/// Outcome of one ingestor pass over all matching files
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub files_ingested: usize,
    pub files_failed: Vec<PathBuf>,
    pub points_written: usize,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.files_failed.is_empty()
    }
}

/// Expand a `dir/name*.ext` pattern. Wildcards (`*`, `?`) are only
/// honoured in the file-name part. Results are sorted.
pub fn matching_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern_path = Path::new(pattern);
    let dir = match pattern_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name_pattern = pattern_path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file pattern '{}'", pattern))?;

    let matcher = wildcard_regex(name_pattern)?;

    if !dir.is_dir() {
        debug!("Directory {} does not exist, nothing to ingest", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("Unable to list {}", dir.display()))? {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| matcher.is_match(name))
            .unwrap_or(false);
        if matches && entry.path().is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

fn wildcard_regex(name_pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for ch in name_pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(&ch.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).with_context(|| format!("Invalid file pattern '{}'", name_pattern))
}

/// Loads smart-meter interval CSVs into the time-series database, one
/// batch per file.
pub struct MeterCsvIngestor<'s, S: MetricSink> {
    sink: &'s S,
    zone: LocalZone,
}

impl<'s, S: MetricSink> MeterCsvIngestor<'s, S> {
    pub fn new(sink: &'s S, zone: LocalZone) -> Self {
        MeterCsvIngestor { sink, zone }
    }

    /// Process every file matching `pattern`. A failing file is logged and
    /// skipped; the others are still ingested.
    pub async fn ingest_pattern(&self, pattern: &str) -> Result<IngestReport> {
        let files = matching_files(pattern)?;
        info!("Found {} file(s) matching '{}'", files.len(), pattern);

        let mut report = IngestReport::default();

        // Un fichier en erreur n'empêche pas le traitement des suivants

        for path in files {
            match self.ingest_file(&path).await {
                Ok(summary) => {
                    report.files_ingested += 1;
                    report.points_written += summary.points;
                }
                Err(e) => {
                    error!("❌ Unable to ingest {}: {:#}", path.display(), e);
                    report.files_failed.push(path);
                }
            }
        }

        info!(
            "Ingestion completed: {} file(s) ingested, {} failed, {} point(s) written",
            report.files_ingested,
            report.files_failed.len(),
            report.points_written
        );

        Ok(report)
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestSummary> {
        debug!("Processing {}", path.display());

        let (points, summary) = read_points(path, &self.zone)
            .with_context(|| format!("Unable to parse {}", path.display()))?;

        debug!(
            "{}: {} point(s), consumption {:.3} kWh, surplus {:.3} kWh",
            path.display(),
            summary.points,
            summary.consumption_kwh,
            summary.surplus_kwh
        );

        // Empty batches are never sent
        if points.is_empty() {
            info!("No usable rows in {}, nothing written", path.display());
            return Ok(summary);
        }

        self.sink
            .write_points(&points)
            .await
            .with_context(|| format!("Unable to write points from {}", path.display()))?;

        Ok(summary)
    }
}

fn read_points(
    path: &Path,
    zone: &LocalZone,
) -> Result<(Vec<EnergyMetricPoint>, IngestSummary), MeterCsvError> {
    let file = File::open(path)?;
    let records = parse_records(file)?;
    to_points(&records, zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_regex() {
        let re = wildcard_regex("Interval*.CSV").unwrap();
        assert!(re.is_match("IntervalMeterUsage20240115.CSV"));
        assert!(re.is_match("Interval.CSV"));
        assert!(!re.is_match("IntervalMeterUsage.csv"));
        assert!(!re.is_match("XInterval.CSV"));
        assert!(!re.is_match("Interval.CSV.bak"));
    }

    #[test]
    fn test_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Interval_b.CSV", "Interval_a.CSV", "notes.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let pattern = dir.path().join("Interval*.CSV");
        let files = matching_files(pattern.to_str().unwrap()).unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("Interval_a.CSV"), dir.path().join("Interval_b.CSV")]
        );
    }

    #[test]
    fn test_missing_directory_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("absent/Interval*.CSV");
        assert!(matching_files(pattern.to_str().unwrap()).unwrap().is_empty());
    }
}
