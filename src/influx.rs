use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::config::{HttpConfig, InfluxConfig};
use crate::metrics::{to_line_protocol, EnergyMetricPoint, MetricSink};

/// InfluxDB v2 write client
pub struct InfluxWriter {
    http: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxWriter {
    pub fn new(config: &InfluxConfig, http: &HttpConfig) -> Result<Self> {
        info!("Preparing InfluxDB writer for {} (bucket '{}')", config.url, config.bucket);

        Ok(InfluxWriter {
            http: http.build_client()?,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        })
    }

    pub async fn write(&self, points: &[EnergyMetricPoint]) -> Result<()> {
        if points.is_empty() {
            debug!("No points to write, skipping InfluxDB call");
            return Ok(());
        }

        debug!("Attempting to write {} point(s) to InfluxDB", points.len());

        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(to_line_protocol(points))
            .send()
            .await
            .context("Unable to reach InfluxDB")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB write rejected ({}): {}", status, body.trim());
        }

        info!("✅ {} point(s) written to bucket '{}'", points.len(), self.bucket);
        Ok(())
    }
}

impl MetricSink for InfluxWriter {
    fn write_points<'a>(&'a self, points: &'a [EnergyMetricPoint]) -> BoxFuture<'a, Result<()>> {
        self.write(points).boxed()
    }
}
