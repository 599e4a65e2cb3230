//! Smart meter interval CSV ingestion

pub mod ingestor;
pub mod parser;

pub use ingestor::{IngestReport, MeterCsvIngestor};
pub use parser::{IngestSummary, MeterCsvError, UsageIntervalRecord, UsageType};
