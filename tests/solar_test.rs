mod common;

use chrono::{NaiveDate, NaiveDateTime};
use mockito::{Matcher, Mock, ServerGuard};

use common::RecordingSink;
use energymetrics::config::{HttpConfig, SolarEdgeConfig};
use energymetrics::metrics::{ENERGY_PRODUCED_LAST_DAY, ENERGY_PRODUCED_LAST_HOUR};
use energymetrics::solar::{ReportWindow, SolarEdgeClient, SolarReporter};
use energymetrics::timezone::LocalZone;

const SITE_ID: u64 = 42;
const API_KEY: &str = "test-key";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(14, 37, 12)
        .unwrap()
}

fn chicago() -> LocalZone {
    LocalZone::named("America/Chicago").unwrap()
}

fn client(server: &ServerGuard) -> SolarEdgeClient {
    let config = SolarEdgeConfig {
        base_url: server.url(),
        api_key: API_KEY.to_string(),
        site_id: SITE_ID,
    };
    SolarEdgeClient::new(&config, &HttpConfig::default()).unwrap()
}

async fn energy_mock(server: &mut ServerGuard, start: &str, end: &str, status: usize, body: &str) -> Mock {
    server
        .mock("GET", format!("/site/{}/energyDetails", SITE_ID).as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("api_key".into(), API_KEY.into()),
            Matcher::UrlEncoded("startTime".into(), start.into()),
            Matcher::UrlEncoded("endTime".into(), end.into()),
            Matcher::UrlEncoded("meters".into(), "PRODUCTION".into()),
            Matcher::UrlEncoded("timeUnit".into(), "HOUR".into()),
        ]))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_last_hour_takes_first_value() {
    let mut server = mockito::Server::new_async().await;
    let mock = energy_mock(
        &mut server,
        "2024-01-15 13:00:00",
        "2024-01-15 14:00:00",
        200,
        r#"{"energyDetails": {"timeUnit": "HOUR", "unit": "Wh",
            "meters": [{"type": "Production", "values": [{"date": "2024-01-15 13:00:00", "value": 2.5}]}]}}"#,
    )
    .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let reports = SolarReporter::new(&client, &sink, chicago())
        .report_at(&[ReportWindow::LastHour], now())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reading.value, 2.5);
    assert!(!reports[0].reading.degraded);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let point = &batches[0][0];
    assert_eq!(point.measurement, ENERGY_PRODUCED_LAST_HOUR);
    // 13:00 CST
    assert_eq!(point.time.to_rfc3339(), "2024-01-15T19:00:00+00:00");
    assert_eq!(point.energy(), 2.5);
}

#[tokio::test]
async fn test_last_day_sums_values_and_skips_nulls() {
    let mut server = mockito::Server::new_async().await;
    let mock = energy_mock(
        &mut server,
        "2024-01-14 00:00:00",
        "2024-01-15 00:00:00",
        200,
        r#"{"energyDetails": {"timeUnit": "HOUR", "unit": "Wh", "meters": [{"type": "Production", "values": [
            {"date": "2024-01-14 10:00:00", "value": 1.0},
            {"date": "2024-01-14 11:00:00"},
            {"date": "2024-01-14 12:00:00", "value": 2.0}
        ]}]}}"#,
    )
    .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let reports = SolarReporter::new(&client, &sink, chicago())
        .report_at(&[ReportWindow::LastDay], now())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reports[0].reading.value, 3.0);
    let point = &sink.batches()[0][0];
    assert_eq!(point.measurement, ENERGY_PRODUCED_LAST_DAY);
    assert_eq!(point.time.to_rfc3339(), "2024-01-14T06:00:00+00:00");
}

#[tokio::test]
async fn test_last_day_treats_explicit_null_as_zero() {
    let mut server = mockito::Server::new_async().await;
    let _mock = energy_mock(
        &mut server,
        "2024-01-14 00:00:00",
        "2024-01-15 00:00:00",
        200,
        r#"{"energyDetails": {"timeUnit": "HOUR", "unit": "Wh", "meters": [{"type": "Production", "values": [
            {"date": "2024-01-14 10:00:00", "value": 1},
            {"date": "2024-01-14 11:00:00", "value": 2},
            {"date": "2024-01-14 12:00:00", "value": null}
        ]}]}}"#,
    )
    .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let reports = SolarReporter::new(&client, &sink, chicago())
        .report_at(&[ReportWindow::LastDay], now())
        .await
        .unwrap();

    assert_eq!(reports[0].reading.value, 3.0);
    assert!(!reports[0].reading.degraded);
}

#[tokio::test]
async fn test_api_failure_reports_zero() {
    let mut server = mockito::Server::new_async().await;
    let _mock = energy_mock(
        &mut server,
        "2024-01-15 13:00:00",
        "2024-01-15 14:00:00",
        403,
        r#"{"String": "Invalid token"}"#,
    )
    .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let reports = SolarReporter::new(&client, &sink, chicago())
        .report_at(&[ReportWindow::LastHour], now())
        .await
        .unwrap();

    assert_eq!(reports[0].reading.value, 0.0);
    assert!(reports[0].reading.degraded);
    // The substituted value is still written
    assert_eq!(sink.batches()[0][0].energy(), 0.0);
}

#[tokio::test]
async fn test_both_windows_share_one_batch() {
    let mut server = mockito::Server::new_async().await;
    let hour = energy_mock(
        &mut server,
        "2024-01-15 13:00:00",
        "2024-01-15 14:00:00",
        200,
        r#"{"energyDetails": {"meters": [{"type": "Production", "values": [{"value": 2.5}]}]}}"#,
    )
    .await;
    let day = energy_mock(
        &mut server,
        "2024-01-14 00:00:00",
        "2024-01-15 00:00:00",
        200,
        r#"{"energyDetails": {"meters": [{"type": "Production", "values": [{"value": 10.0}, {"value": 4.5}]}]}}"#,
    )
    .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let windows = ReportWindow::from_flags(true, true);
    SolarReporter::new(&client, &sink, chicago())
        .report_at(&windows, now())
        .await
        .unwrap();

    hour.assert_async().await;
    day.assert_async().await;

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let written: Vec<(&str, f64)> = batches[0]
        .iter()
        .map(|p| (p.measurement.as_str(), p.energy()))
        .collect();
    assert_eq!(
        written,
        vec![(ENERGY_PRODUCED_LAST_HOUR, 2.5), (ENERGY_PRODUCED_LAST_DAY, 14.5)]
    );
}

#[tokio::test]
async fn test_no_window_no_request_no_write() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client(&server);
    let sink = RecordingSink::default();
    let reports = SolarReporter::new(&client, &sink, chicago())
        .report_at(&[], now())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(reports.is_empty());
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_power_details() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("/site/{}/powerDetails", SITE_ID).as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("startTime".into(), "2024-01-15 13:00:00".into()),
            Matcher::UrlEncoded("meters".into(), "PRODUCTION".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"powerDetails": {"timeUnit": "QUARTER_OF_AN_HOUR", "unit": "W", "meters": [
                {"type": "Production", "values": [
                    {"date": "2024-01-15 13:00:00", "value": 812.4},
                    {"date": "2024-01-15 13:15:00"}
                ]}]}}"#,
        )
        .create_async()
        .await;

    let client = client(&server);
    let span = ReportWindow::LastHour.span(now());
    let details = client.power_details(&span).await.unwrap().unwrap();

    mock.assert_async().await;
    assert_eq!(details.unit.as_deref(), Some("W"));
    assert_eq!(details.first_meter_values(), vec![Some(812.4), None]);
}
