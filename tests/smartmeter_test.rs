mod common;

use std::fs;
use std::path::Path;

use common::RecordingSink;
use energymetrics::metrics::{ENERGY_CONSUMED_LAST_15, ENERGY_SURPLUS_LAST_15};
use energymetrics::smartmeter::MeterCsvIngestor;
use energymetrics::timezone::LocalZone;

fn chicago() -> LocalZone {
    LocalZone::named("America/Chicago").unwrap()
}

fn copy_fixture(name: &str, dir: &Path) {
    fs::copy(Path::new("data_test").join(name), dir.join(name))
        .unwrap_or_else(|e| panic!("Failed to copy data_test/{}: {}", name, e));
}

#[tokio::test]
async fn test_ingest_smart_meter_file() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture("IntervalMeterUsage20240115.CSV", dir.path());

    let sink = RecordingSink::default();
    let pattern = dir.path().join("Interval*.CSV");
    let report = MeterCsvIngestor::new(&sink, chicago())
        .ingest_pattern(pattern.to_str().unwrap())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.points_written, 4);

    // One batch per file
    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let points = &batches[0];

    let consumed: Vec<_> = points.iter().filter(|p| p.measurement == ENERGY_CONSUMED_LAST_15).collect();
    let surplus: Vec<_> = points.iter().filter(|p| p.measurement == ENERGY_SURPLUS_LAST_15).collect();
    assert_eq!(consumed.len(), 3);
    assert_eq!(surplus.len(), 1);

    // 01/15/2024 14:30 in Chicago (CST, UTC-6)
    assert_eq!(surplus[0].time.to_rfc3339(), "2024-01-15T20:30:00+00:00");
    assert_eq!(surplus[0].energy(), 0.455);
    assert_eq!(consumed[0].time.to_rfc3339(), "2024-01-15T06:00:00+00:00");
    assert_eq!(consumed[0].energy(), 0.312);
}

#[tokio::test]
async fn test_malformed_file_does_not_stop_other_files() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture("IntervalMeterUsage20240115.CSV", dir.path());
    copy_fixture("IntervalMeterUsage_malformed.CSV", dir.path());

    let sink = RecordingSink::default();
    let pattern = dir.path().join("Interval*.CSV");
    let report = MeterCsvIngestor::new(&sink, chicago())
        .ingest_pattern(pattern.to_str().unwrap())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.files_ingested, 1);
    assert_eq!(
        report.files_failed,
        vec![dir.path().join("IntervalMeterUsage_malformed.CSV")]
    );

    // Nothing from the malformed file, not even its valid first row
    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 4);
}

#[tokio::test]
async fn test_no_matching_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "not a meter file").unwrap();

    let sink = RecordingSink::default();
    let pattern = dir.path().join("Interval*.CSV");
    let report = MeterCsvIngestor::new(&sink, chicago())
        .ingest_pattern(pattern.to_str().unwrap())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.files_ingested, 0);
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_file_with_only_unknown_rows_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("IntervalEmpty.CSV"),
        "USAGE_DATE,USAGE_START_TIME,USAGE_KWH,CONSUMPTION_SURPLUSGENERATION\n01/15/2024,00:00,.1,Other\n",
    )
    .unwrap();

    let sink = RecordingSink::default();
    let summary = MeterCsvIngestor::new(&sink, chicago())
        .ingest_file(&dir.path().join("IntervalEmpty.CSV"))
        .await
        .unwrap();

    assert_eq!(summary.points, 0);
    assert!(sink.batches().is_empty());
}
