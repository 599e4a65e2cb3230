use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

use super::window::TimeWindow;
use crate::config::{HttpConfig, SolarEdgeConfig};

/// Granularity of `energyDetails` values. Reports always aggregate hourly values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Hour,
}

impl TimeUnit {
    pub fn as_param(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "HOUR",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnergyDetailsResponse {
    energy_details: MeterDetails,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PowerDetailsResponse {
    power_details: MeterDetails,
}

/// Body shared by `energyDetails` and `powerDetails`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterDetails {
    pub time_unit: Option<String>,
    pub unit: Option<String>,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meter {
    #[serde(rename = "type")]
    pub meter_type: Option<String>,
    #[serde(default)]
    pub values: Vec<MeterValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterValue {
    pub date: Option<String>,
    pub value: Option<f64>,
}

impl MeterDetails {
    /// Values of the first meter; empty when no meter was returned.
    pub fn first_meter_values(&self) -> Vec<Option<f64>> {
        self.meters
            .first()
            .map(|meter| meter.values.iter().map(|v| v.value).collect())
            .unwrap_or_default()
    }
}

/// Read-only client for the SolarEdge monitoring API
pub struct SolarEdgeClient {
    http: reqwest::Client,
    base_url: String,
    site_id: u64,
    api_key: String,
}

impl SolarEdgeClient {
    pub fn new(config: &SolarEdgeConfig, http: &HttpConfig) -> Result<Self> {
        info!("Preparing SolarEdge client for site {}", config.site_id);

        Ok(SolarEdgeClient {
            http: http.build_client()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            site_id: config.site_id,
            api_key: config.api_key.clone(),
        })
    }

    /// Production energy over `window`. `None` when the API answers with
    /// anything other than 200.
    pub async fn energy_details(&self, window: &TimeWindow, time_unit: TimeUnit) -> Result<Option<MeterDetails>> {
        let extra = [("timeUnit", time_unit.as_param())];
        let body: Option<EnergyDetailsResponse> = self.get("energyDetails", window, &extra).await?;
        Ok(body.map(|b| b.energy_details))
    }

    /// Production power samples over `window`. `None` on non-200.
    pub async fn power_details(&self, window: &TimeWindow) -> Result<Option<MeterDetails>> {
        let body: Option<PowerDetailsResponse> = self.get("powerDetails", window, &[]).await?;
        Ok(body.map(|b| b.power_details))
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        window: &TimeWindow,
        extra: &[(&str, &str)],
    ) -> Result<Option<T>> {
        // Window bounds are local wall-clock times
        let url = format!("{}/site/{}/{}", self.base_url, self.site_id, endpoint);
        let start_time = window.start_param();
        let end_time = window.end_param();

        debug!("GET {} for {}", url, window);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("startTime", start_time.as_str()),
                ("endTime", end_time.as_str()),
                ("meters", "PRODUCTION"),
            ])
            .query(extra)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Unable to reach SolarEdge {}", endpoint))?;

        // Anything but 200 is reported as "no data" to the caller
        let status = response.status();
        if status != StatusCode::OK {
            warn!("⚠️  SolarEdge {} answered {} for {}", endpoint, status, window);
            return Ok(None);
        }

        let body = response
            .json::<T>()
            .await
            .with_context(|| format!("Unexpected SolarEdge {} response", endpoint))?;
        Ok(Some(body))
    }
}
