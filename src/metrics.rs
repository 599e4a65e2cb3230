use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::info;
use serde::{Serialize, Serializer};

pub const ENERGY_CONSUMED_LAST_15: &str = "energyConsumedLast15";
pub const ENERGY_SURPLUS_LAST_15: &str = "energySurplusLast15";
pub const ENERGY_PRODUCED_LAST_HOUR: &str = "energyProducedLastHour";
pub const ENERGY_PRODUCED_LAST_DAY: &str = "energyProducedLastDay";

/// One value written to the time-series database.
///
/// Serializes as `{"measurement": .., "time": <RFC 3339 UTC>, "fields": {"energy": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyMetricPoint {
    pub measurement: String,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    pub fields: EnergyFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyFields {
    pub energy: f64,
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, false))
}

impl EnergyMetricPoint {
    pub fn new(measurement: &str, time: DateTime<Utc>, energy: f64) -> Self {
        EnergyMetricPoint {
            measurement: measurement.to_string(),
            time,
            fields: EnergyFields { energy },
        }
    }

    pub fn energy(&self) -> f64 {
        self.fields.energy
    }

    /// `<measurement> energy=<value> <epoch seconds>`
    pub fn write_line_protocol(&self, out: &mut String) {
        escape_measurement(&self.measurement, out);
        out.push_str(" energy=");
        out.push_str(&self.fields.energy.to_string());
        out.push(' ');
        out.push_str(&self.time.timestamp().to_string());
    }
}

fn escape_measurement(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

pub fn to_line_protocol(points: &[EnergyMetricPoint]) -> String {
    let mut body = String::new();
    for point in points {
        point.write_line_protocol(&mut body);
        body.push('\n');
    }
    body
}

/// Destination for a batch of points. One call per batch.
pub trait MetricSink: Send + Sync {
    fn write_points<'a>(&'a self, points: &'a [EnergyMetricPoint]) -> BoxFuture<'a, Result<()>>;
}

/// Prints the batch as JSON instead of writing it.
pub struct DryRunSink;

impl DryRunSink {
    pub async fn print(&self, points: &[EnergyMetricPoint]) -> Result<()> {
        let json = serde_json::to_string_pretty(points)
            .context("Unable to serialize metric points")?;
        println!("🧪 DRY-RUN - {} point(s) not written:", points.len());
        println!("{}", json);
        info!("Dry-run: {} point(s) printed instead of written", points.len());
        Ok(())
    }
}

impl MetricSink for DryRunSink {
    fn write_points<'a>(&'a self, points: &'a [EnergyMetricPoint]) -> BoxFuture<'a, Result<()>> {
        self.print(points).boxed()
    }
}
