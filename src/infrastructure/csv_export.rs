// CSV rendering of series and estimate tables
use crate::domain::pipeline::EstimateRow;
use crate::domain::series::Series;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

const TIMESTAMP_COLUMN: &str = "timestamp";

fn iso(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One `timestamp` column followed by one column per channel display name.
/// Missing values are left empty.
pub fn series_to_csv(series: &Series) -> String {
    let mut out = String::from(TIMESTAMP_COLUMN);
    for channel in series.channels() {
        out.push(',');
        out.push_str(&escape(&channel.display_name));
    }
    out.push('\n');

    for (row, timestamp) in series.timestamps().iter().enumerate() {
        out.push_str(&iso(*timestamp));
        for value in series.row(row) {
            out.push(',');
            if let Some(v) = value {
                let _ = write!(out, "{}", v);
            }
        }
        out.push('\n');
    }
    out
}

/// Columns: name, target, offset, estimate, r value.
pub fn estimates_to_csv(rows: &[EstimateRow]) -> String {
    let mut out = String::from("name,target,offset,estimate,r value\n");
    for row in rows {
        let estimate = row
            .estimate
            .crossing_time
            .map(iso)
            .unwrap_or_else(|| "none".to_string());
        let r_value = row
            .estimate
            .r_value
            .map(|r| r.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            escape(&row.channel.display_name),
            row.target,
            row.offset,
            estimate,
            r_value
        );
    }
    out
}
