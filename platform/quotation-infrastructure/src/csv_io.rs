use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quotation_domain::repositories::FetchError;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

/// Reads every row of `path`; a missing file is reported as unavailable data.
pub(crate) fn read_rows<T: DeserializeOwned>(
    kind: &'static str,
    path: &Path,
) -> Result<Vec<T>, FetchError> {
    let start = Instant::now();
    let result = read_rows_inner(path);
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "quotation.infra.csv.read.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!("quotation.infra.csv.read_ms", "kind" => kind, "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
    result
}

fn read_rows_inner<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FetchError> {
    let file = File::open(path).map_err(|err| {
        FetchError::DataUnavailable(format!("failed to open CSV {}: {}", path.display(), err))
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(index, row)| {
            row.map_err(|err| {
                FetchError::DataUnavailable(format!(
                    "failed to parse CSV row {} of {}: {}",
                    index + 1,
                    path.display(),
                    err
                ))
            })
        })
        .collect()
}

/// Local exchange time. Offsets are dropped: the session schedule is expressed in local time.
pub(crate) fn parse_timestamp(value: &str) -> Result<NaiveDateTime, FetchError> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Ok(naive);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_local());
    }
    Err(FetchError::DataUnavailable(format!(
        "unsupported timestamp format: {value}"
    )))
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, FetchError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map_err(|err| FetchError::DataUnavailable(format!("invalid date {value}: {err}")))
}
