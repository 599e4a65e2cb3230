// Library exports for energymetrics crate
// This allows tests and the binary to use the modules

pub mod config;
pub mod email;
pub mod gmail_client;
pub mod influx;
pub mod logging;
pub mod metrics;
pub mod timezone;

// Smart meter interval CSV ingestion
pub mod smartmeter;

// SolarEdge production reporting
pub mod solar;
