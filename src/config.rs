use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::timezone::LocalZone;

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_GMAIL_QUERY: &str = "subject:Smart Meter Texas – Subscription Report and is:unread";
pub const DEFAULT_SOLAREDGE_URL: &str = "https://monitoringapi.solaredge.com";

const INFLUX_KEYS: [&str; 4] = ["INFLUX_URL", "INFLUX_TOKEN", "INFLUX_ORG", "INFLUX_BUCKET"];
const SOLAREDGE_KEYS: [&str; 2] = ["APIKEY", "SITEID"];

#[derive(Debug, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub influx: Option<InfluxConfig>,
    pub solaredge: Option<SolarEdgeSettings>,
    pub smartmeter: SmartMeterConfig,
    pub http: HttpConfig,
    pub timezone: LocalZone,
    /// Required keys absent when the config was loaded
    missing: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub credentials_path: String,
    pub token_cache_path: String,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// SolarEdge keys as found in the environment; `SITEID` is only validated
/// when a command needs the monitoring API.
#[derive(Debug, Clone)]
pub struct SolarEdgeSettings {
    pub base_url: String,
    pub api_key: String,
    pub site_id: String,
}

#[derive(Debug, Clone)]
pub struct SolarEdgeConfig {
    pub base_url: String,
    pub api_key: String,
    pub site_id: u64,
}

#[derive(Debug, Clone)]
pub struct SmartMeterConfig {
    /// Where harvested attachments are written
    pub output_dir: String,
    /// Files picked up by the ingestor, e.g. `./smartmeter/Interval*.CSV`
    pub pattern: String,
}

#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// `None` keeps the client's default (no timeout)
    pub timeout: Option<Duration>,
}

impl HttpConfig {
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().context("Unable to build HTTP client")
    }
}

/// Load the key/value env file named by `SLR_CONFIG` (or `.env`).
pub fn load_env_file() -> Result<Option<PathBuf>> {
    let explicit = std::env::var("SLR_CONFIG").ok().map(PathBuf::from);
    load_env_file_from(explicit, Path::new(DEFAULT_ENV_FILE))
}

/// A missing default file is fine, a missing explicitly named one is not.
pub fn load_env_file_from(explicit: Option<PathBuf>, default: &Path) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            dotenv::from_path(&path)
                .with_context(|| format!("Unable to load config file {}", path.display()))?;
            Ok(Some(path))
        }
        None => Ok(dotenv::from_path(default).ok().map(|_| default.to_path_buf())),
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `new` reads the process environment.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(var: F) -> Result<Self> {
        let timezone = match var("LOCAL_TZ") {
            Some(name) if !name.trim().is_empty() => LocalZone::named(name.trim())?,
            _ => LocalZone::System,
        };

        let timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(
                secs.trim()
                    .parse()
                    .with_context(|| format!("HTTP_TIMEOUT_SECS is not a number of seconds: {}", secs))?,
            )),
            None => None,
        };

        let missing: Vec<&'static str> = INFLUX_KEYS
            .iter()
            .chain(SOLAREDGE_KEYS.iter())
            .copied()
            .filter(|key| var(*key).is_none())
            .collect();

        // Each section is only present when all of its keys are
        let influx = match (var("INFLUX_URL"), var("INFLUX_TOKEN"), var("INFLUX_ORG"), var("INFLUX_BUCKET")) {
            (Some(url), Some(token), Some(org), Some(bucket)) => Some(InfluxConfig { url, token, org, bucket }),
            _ => None,
        };

        let solaredge = match (var("APIKEY"), var("SITEID")) {
            (Some(api_key), Some(site_id)) => Some(SolarEdgeSettings {
                base_url: var("SOLAREDGE_URL").unwrap_or_else(|| DEFAULT_SOLAREDGE_URL.to_string()),
                api_key,
                site_id,
            }),
            _ => None,
        };

        Ok(Config {
            gmail: GmailConfig {
                credentials_path: var("CRD_JSON").unwrap_or_else(|| "credentials.json".to_string()),
                token_cache_path: var("TKN_PICKLE").unwrap_or_else(|| "token.json".to_string()),
                query: var("GMAIL_QUERY").unwrap_or_else(|| DEFAULT_GMAIL_QUERY.to_string()),
            },
            influx,
            solaredge,
            smartmeter: SmartMeterConfig {
                output_dir: var("SMARTMETER_DIR").unwrap_or_else(|| "smartmeter".to_string()),
                pattern: var("SMARTMETER_PATTERN")
                    .unwrap_or_else(|| "./smartmeter/Interval*.CSV".to_string()),
            },
            http: HttpConfig { timeout },
            timezone,
            missing,
        })
    }

    pub fn require_influx(&self) -> Result<&InfluxConfig> {
        self.check_required_vars(&INFLUX_KEYS)?;
        self.influx
            .as_ref()
            .context("InfluxDB configuration not loaded")
    }

    /// SolarEdge settings with `SITEID` parsed.
    pub fn require_solaredge(&self) -> Result<SolarEdgeConfig> {
        self.check_required_vars(&SOLAREDGE_KEYS)?;
        let settings = self
            .solaredge
            .as_ref()
            .context("SolarEdge configuration not loaded")?;

        Ok(SolarEdgeConfig {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            site_id: settings
                .site_id
                .trim()
                .parse()
                .with_context(|| format!("SITEID must be an integer, got '{}'", settings.site_id))?,
        })
    }

    /// Print the resolved configuration with secrets masked.
    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("🔑 Gmail credentials: {}", self.gmail.credentials_path),
            format!("💾 Token cache: {}", self.gmail.token_cache_path),
            format!("🔎 Gmail query: {}", self.gmail.query),
            format!("📁 Smart meter directory: {}", self.smartmeter.output_dir),
            format!("📄 Smart meter pattern: {}", self.smartmeter.pattern),
            format!("🕒 Local zone: {}", self.timezone),
        ];
        match &self.influx {
            Some(influx) => lines.push(format!(
                "🗄️  InfluxDB: {} (org: {}, bucket: {}, token: {})",
                influx.url,
                influx.org,
                influx.bucket,
                mask(&influx.token)
            )),
            None => lines.push("🗄️  InfluxDB: not configured".to_string()),
        }
        match &self.solaredge {
            Some(solar) => lines.push(format!(
                "☀️  SolarEdge: {} (site: {}, api key: {})",
                solar.base_url,
                solar.site_id,
                mask(&solar.api_key)
            )),
            None => lines.push("☀️  SolarEdge: not configured".to_string()),
        }
        if let Some(timeout) = self.http.timeout {
            lines.push(format!("⏱️  HTTP timeout: {}s", timeout.as_secs()));
        }
        lines.join("\n")
    }

    fn check_required_vars(&self, required_vars: &[&str]) -> Result<()> {
        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| self.missing.iter().any(|missing| missing == var))
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 💡 Define them in the env file (SLR_CONFIG, default .env) or export them:\n\
                    export APIKEY=... SITEID=...\n\
                    export INFLUX_URL=http://localhost:8086 INFLUX_TOKEN=... INFLUX_ORG=... INFLUX_BUCKET=...",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}

fn mask(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}
