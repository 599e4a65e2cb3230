//! SolarEdge production reporting

pub mod client;
pub mod reporter;
pub mod window;

pub use client::{MeterDetails, SolarEdgeClient, TimeUnit};
pub use reporter::{EnergyReading, SolarReporter, WindowReport};
pub use window::{ReportWindow, TimeWindow};
