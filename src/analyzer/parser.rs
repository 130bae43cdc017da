use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};

/// A parsed OpenClaw diagnostic event.
///
/// `raw` preserves the full source payload as a typed extension map so
/// fields this struct does not model (tool names, channel metadata) stay
/// available to downstream consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceEvent {
    pub timestamp: f64,
    pub event_type: String,
    pub channel: String,
    pub provider: String,
    pub model: String,
    pub session_key: String,
    pub session_id: String,
    pub duration_ms: f64,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub tokens_total: i64,
    pub cost_usd: f64,
    /// "error" iff the source payload carried a non-empty error field
    pub status: String,
    pub error: String,
    pub raw: Map<String, Value>,
}

/// A metric sample round-tripped through persisted storage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResourceSample {
    pub timestamp: f64,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub labels: BTreeMap<String, String>,
}

/// Kind of a persisted trace file, decided once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFileKind {
    Resource,
    Event,
}

/// Classify a trace file by its stem. Pure so the heuristic stays in one
/// testable place instead of ad hoc string matching in the loader.
pub fn classify_trace_file(stem: &str) -> TraceFileKind {
    if stem.to_lowercase().contains("resource") {
        TraceFileKind::Resource
    } else {
        TraceFileKind::Event
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f64_field(obj: &Map<String, Value>, key: &str) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn i64_field(obj: &Map<String, Value>, key: &str) -> i64 {
    obj.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

/// Parse a timestamp that is either numeric epoch seconds or an ISO-8601
/// string. An unparsable string degrades to epoch 0 rather than failing
/// the whole file.
fn parse_timestamp(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return dt.timestamp_micros() as f64 / 1_000_000.0;
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return naive.and_utc().timestamp_micros() as f64 / 1_000_000.0;
            }
            0.0
        }
        _ => 0.0,
    }
}

/// Parse one JSONL line into a [`TraceEvent`]. Returns `None` for
/// unparsable lines and records without a resolvable event type.
pub fn parse_event_line(line: &str) -> Option<TraceEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let obj: Map<String, Value> = serde_json::from_str(line).ok()?;

    // First non-empty of several possible type fields wins
    let event_type = ["type", "event_type", "name"]
        .iter()
        .map(|key| str_field(&obj, key))
        .find(|t| !t.is_empty())?;

    let timestamp = parse_timestamp(obj.get("timestamp").or_else(|| obj.get("time")));

    let usage = obj
        .get("usage")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let error = match obj.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let duration_ms = if obj.contains_key("durationMs") {
        f64_field(&obj, "durationMs")
    } else {
        f64_field(&obj, "duration_ms")
    };
    let cost_usd = if obj.contains_key("costUsd") {
        f64_field(&obj, "costUsd")
    } else {
        f64_field(&obj, "cost_usd")
    };

    Some(TraceEvent {
        timestamp,
        event_type,
        channel: str_field(&obj, "channel"),
        provider: str_field(&obj, "provider"),
        model: str_field(&obj, "model"),
        session_key: str_field(&obj, "sessionKey"),
        session_id: str_field(&obj, "sessionId"),
        duration_ms,
        tokens_input: i64_field(&usage, "input"),
        tokens_output: i64_field(&usage, "output"),
        tokens_total: i64_field(&usage, "total"),
        cost_usd,
        status: if error.is_empty() { "ok" } else { "error" }.to_string(),
        error,
        raw: obj,
    })
}

/// Parse an OpenClaw JSONL event file, sorted ascending by timestamp.
/// A missing file yields an empty result with a logged warning.
pub fn parse_event_file(path: &Path) -> Vec<TraceEvent> {
    let mut events = Vec::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => {
            warn!("OpenClaw event file not found: {}", path.display());
            return events;
        }
    };
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(event) = parse_event_line(&line) {
            events.push(event);
        }
    }
    events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    events
}

/// Parse a JSONL resource file produced by the local exporter.
/// Unparsable lines are skipped; a missing file yields an empty result.
pub fn parse_resource_file(path: &Path) -> Vec<ResourceSample> {
    let mut samples = Vec::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => {
            warn!("Resource file not found: {}", path.display());
            return samples;
        }
    };
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ResourceSample>(line) {
            Ok(sample) => samples.push(sample),
            Err(_) => continue,
        }
    }
    samples
}

/// Load all trace data from a directory.
///
/// Scans `*.jsonl` files, classifies each via [`classify_trace_file`], and
/// returns both streams sorted ascending by timestamp. A missing directory
/// yields empty results with a warning, never an error.
pub fn load_trace_dir(trace_dir: &Path) -> (Vec<TraceEvent>, Vec<ResourceSample>) {
    let mut events = Vec::new();
    let mut resources = Vec::new();

    let entries = match std::fs::read_dir(trace_dir) {
        Ok(entries) => entries,
        Err(_) => {
            warn!("Trace directory does not exist: {}", trace_dir.display());
            return (events, resources);
        }
    };

    let mut paths: Vec<_> = entries
        .map_while(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect();
    paths.sort();

    for path in paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match classify_trace_file(&stem) {
            TraceFileKind::Resource => resources.extend(parse_resource_file(&path)),
            TraceFileKind::Event => events.extend(parse_event_file(&path)),
        }
    }

    events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    resources.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    (events, resources)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_parse_event_line_never_panics(line: String) -> bool {
        // Arbitrary input either parses or is rejected, never a panic
        let _ = parse_event_line(&line);
        true
    }

    #[quickcheck]
    fn prop_status_matches_error_presence(error: Option<String>) -> bool {
        let doc = match &error {
            Some(e) => format!(
                r#"{{"type":"t","timestamp":1,"error":{}}}"#,
                serde_json::to_string(e).unwrap()
            ),
            None => r#"{"type":"t","timestamp":1}"#.to_string(),
        };
        let event = parse_event_line(&doc).unwrap();
        let expect_error = error.map(|e| !e.is_empty()).unwrap_or(false);
        (event.status == "error") == expect_error
    }
}
