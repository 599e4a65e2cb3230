use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{info, warn};

use super::client::{SolarEdgeClient, TimeUnit};
use super::window::{ReportWindow, TimeWindow};
use crate::metrics::{EnergyMetricPoint, MetricSink};
use crate::timezone::LocalZone;

/// Energy for one window. `degraded` is set when the API call did not
/// succeed and the value was substituted with 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReading {
    pub value: f64,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub window: ReportWindow,
    pub span: TimeWindow,
    pub reading: EnergyReading,
    pub point: EnergyMetricPoint,
}

pub struct SolarReporter<'a, S: MetricSink> {
    client: &'a SolarEdgeClient,
    sink: &'a S,
    zone: LocalZone,
}

impl<'a, S: MetricSink> SolarReporter<'a, S> {
    pub fn new(client: &'a SolarEdgeClient, sink: &'a S, zone: LocalZone) -> Self {
        SolarReporter { client, sink, zone }
    }

    pub async fn report(&self, windows: &[ReportWindow]) -> Result<Vec<WindowReport>> {
        self.report_at(windows, self.zone.now()).await
    }

    /// Compute every requested window relative to `now` and write the
    /// resulting points in a single batch.
    pub async fn report_at(&self, windows: &[ReportWindow], now: NaiveDateTime) -> Result<Vec<WindowReport>> {
        if windows.is_empty() {
            info!("No window requested (use --hour and/or --day), nothing to report");
            return Ok(Vec::new());
        }

        let mut reports = Vec::with_capacity(windows.len());
        for window in windows {
            reports.push(self.measure(*window, now).await?);
        }

        // Every window goes out in the same write
        let points: Vec<EnergyMetricPoint> = reports.iter().map(|r| r.point.clone()).collect();
        self.sink
            .write_points(&points)
            .await
            .context("Unable to write solar production points")?;

        Ok(reports)
    }

    pub async fn measure(&self, window: ReportWindow, now: NaiveDateTime) -> Result<WindowReport> {
        let span = window.span(now);

        let reading = match self.client.energy_details(&span, TimeUnit::Hour).await? {
            Some(details) => EnergyReading {
                value: window.aggregate(&details.first_meter_values()),
                degraded: false,
            },
            None => {
                warn!("Energy for the {} {} unavailable, reporting 0", window, span);
                EnergyReading {
                    value: 0.0,
                    degraded: true,
                }
            }
        };

        info!("☀️  Energy produced {} {}: {}", window, span, reading.value);

        // The point is stamped with the window start, not the call time
        let time = self.zone.to_utc(span.start)?;
        Ok(WindowReport {
            window,
            span,
            reading,
            point: EnergyMetricPoint::new(window.measurement(), time, reading.value),
        })
    }
}
