use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::debug;
use std::io::Read;
use thiserror::Error;

use crate::metrics::{EnergyMetricPoint, ENERGY_CONSUMED_LAST_15, ENERGY_SURPLUS_LAST_15};
use crate::timezone::{LocalZone, TimeZoneError};

const USAGE_DATE: &str = "USAGE_DATE";
const USAGE_START_TIME: &str = "USAGE_START_TIME";
const USAGE_KWH: &str = "USAGE_KWH";
const USAGE_TYPE: &str = "CONSUMPTION_SURPLUSGENERATION";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M";

#[derive(Error, Debug)]
pub enum MeterCsvError {
    #[error("line {line}: missing column '{column}'")]
    MissingColumn { line: u64, column: &'static str },
    #[error("line {line}: invalid USAGE_KWH '{value}'")]
    InvalidKwh { line: u64, value: String },
    #[error("line {line}: invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        line: u64,
        value: String,
        source: chrono::ParseError,
    },
    #[error(transparent)]
    LocalTime(#[from] TimeZoneError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageType {
    Consumption,
    SurplusGeneration,
}

impl UsageType {
    /// Unknown labels are not an error, they are simply not recorded.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Consumption" => Some(UsageType::Consumption),
            "Surplus Generation" => Some(UsageType::SurplusGeneration),
            _ => None,
        }
    }

    pub fn measurement(&self) -> &'static str {
        match self {
            UsageType::Consumption => ENERGY_CONSUMED_LAST_15,
            UsageType::SurplusGeneration => ENERGY_SURPLUS_LAST_15,
        }
    }
}

/// One 15-minute interval row
#[derive(Debug, Clone, PartialEq)]
pub struct UsageIntervalRecord {
    pub start: NaiveDateTime,
    pub kilowatt_hours: f64,
    pub usage_type: UsageType,
}

impl UsageIntervalRecord {
    pub fn to_point(&self, zone: &LocalZone) -> Result<EnergyMetricPoint, TimeZoneError> {
        let time: DateTime<Utc> = zone.to_utc(self.start)?;
        Ok(EnergyMetricPoint::new(self.usage_type.measurement(), time, self.kilowatt_hours))
    }
}

/// Running totals for a file; diagnostic only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub points: usize,
    pub consumption_kwh: f64,
    pub surplus_kwh: f64,
}

impl IngestSummary {
    fn add(&mut self, record: &UsageIntervalRecord) {
        self.points += 1;
        match record.usage_type {
            UsageType::Consumption => self.consumption_kwh += record.kilowatt_hours,
            UsageType::SurplusGeneration => self.surplus_kwh += record.kilowatt_hours,
        }
    }
}

/// Column positions resolved from the header row
struct Columns {
    date: Option<usize>,
    start_time: Option<usize>,
    kwh: Option<usize>,
    usage_type: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Columns {
            date: find(USAGE_DATE),
            start_time: find(USAGE_START_TIME),
            kwh: find(USAGE_KWH),
            usage_type: find(USAGE_TYPE),
        }
    }
}

fn field<'r>(record: &'r StringRecord, index: Option<usize>) -> Option<&'r str> {
    index.and_then(|i| record.get(i))
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

/// Parse `month/day/year hour:minute` from the date and start-time columns.
pub fn parse_usage_timestamp(date: &str, start_time: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let timestamp = format!("{} {}", date.trim(), start_time.trim());
    NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
}

fn parse_record(record: &StringRecord, columns: &Columns) -> Result<Option<UsageIntervalRecord>, MeterCsvError> {
    let line = line_of(record);

    let date = field(record, columns.date)
        .ok_or(MeterCsvError::MissingColumn { line, column: USAGE_DATE })?;
    let start_time = field(record, columns.start_time)
        .ok_or(MeterCsvError::MissingColumn { line, column: USAGE_START_TIME })?;

    let start = parse_usage_timestamp(date, start_time).map_err(|source| {
        MeterCsvError::InvalidTimestamp {
            line,
            value: format!("{} {}", date.trim(), start_time.trim()),
            source,
        }
    })?;

    let kilowatt_hours = match field(record, columns.kwh) {
        None => 0.0,
        // NaN and infinities parse but cannot be written
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|kwh| kwh.is_finite())
            .ok_or_else(|| MeterCsvError::InvalidKwh {
                line,
                value: raw.to_string(),
            })?,
    };

    let Some(usage_type) = field(record, columns.usage_type).and_then(UsageType::from_label) else {
        return Ok(None);
    };

    Ok(Some(UsageIntervalRecord {
        start,
        kilowatt_hours,
        usage_type,
    }))
}

/// Parse interval records from a header-driven CSV. Rows with an unknown
/// usage type are dropped; any malformed row fails the whole input, whatever
/// its usage type.
pub fn parse_records<R: Read>(reader: R) -> Result<Vec<UsageIntervalRecord>, MeterCsvError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::from_headers(rdr.headers()?);
    let mut records = Vec::new();

    for result in rdr.records() {
        let record = result?;
        if let Some(parsed) = parse_record(&record, &columns)? {
            records.push(parsed);
        } else {
            debug!("Line {} skipped: unrecognised usage type", line_of(&record));
        }
    }

    Ok(records)
}

/// Convert parsed records into points, accumulating the running totals.
pub fn to_points(
    records: &[UsageIntervalRecord],
    zone: &LocalZone,
) -> Result<(Vec<EnergyMetricPoint>, IngestSummary), MeterCsvError> {
    let mut summary = IngestSummary::default();
    let mut points = Vec::with_capacity(records.len());

    for record in records {
        let point = record.to_point(zone)?;
        summary.add(record);
        points.push(point);
    }

    Ok((points, summary))
}
