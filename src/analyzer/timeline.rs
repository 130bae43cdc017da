use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use super::parser::{ResourceSample, TraceEvent};
use crate::error::AnalyzeError;

/// Default half-width of the correlation window, in seconds.
pub const DEFAULT_WINDOW_SECONDS: f64 = 2.0;

/// Metric-name-prefix to timeline category table.
const CATEGORY_PREFIXES: &[(&str, &str)] = &[
    ("system.cpu", "cpu"),
    ("system.memory", "memory"),
    ("system.swap", "memory"),
    ("system.network", "network"),
    ("process.cpu", "process"),
    ("process.memory", "process"),
    ("process.io", "process"),
];

fn categorize_metric(name: &str) -> &'static str {
    for (prefix, category) in CATEGORY_PREFIXES {
        if name.starts_with(prefix) {
            return category;
        }
    }
    "resource"
}

/// A single row in the unified timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: f64,
    /// Offset from the earliest timestamp in either stream
    pub relative_ms: f64,
    /// "openclaw" for events, else the metric's category
    pub category: String,
    pub event_type: String,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub duration_ms: f64,
    pub status: String,
    pub details: Map<String, Value>,
}

/// Merge events and resource samples into one chronological timeline.
///
/// Every input element becomes exactly one row (1:1, no drops) carrying a
/// `relative_ms` offset from the earliest timestamp across both streams,
/// so traces and resource data share one axis. The result is sorted
/// ascending by absolute timestamp.
pub fn build_timeline(
    events: &[TraceEvent],
    resources: &[ResourceSample],
) -> Vec<TimelineEntry> {
    if events.is_empty() && resources.is_empty() {
        return Vec::new();
    }

    let t0 = events
        .iter()
        .map(|e| e.timestamp)
        .chain(resources.iter().map(|r| r.timestamp))
        .fold(f64::MAX, f64::min);

    let mut entries = Vec::with_capacity(events.len() + resources.len());

    for event in events {
        let mut label = event.event_type.clone();
        if !event.model.is_empty() {
            label.push_str(" | ");
            label.push_str(&event.model);
        }

        let mut details = Map::new();
        if event.tokens_total != 0 {
            details.insert("tokens_total".to_string(), event.tokens_total.into());
            details.insert("tokens_input".to_string(), event.tokens_input.into());
            details.insert("tokens_output".to_string(), event.tokens_output.into());
        }
        if event.cost_usd != 0.0 {
            details.insert("cost_usd".to_string(), event.cost_usd.into());
        }
        if !event.error.is_empty() {
            details.insert("error".to_string(), event.error.clone().into());
        }

        entries.push(TimelineEntry {
            timestamp: event.timestamp,
            relative_ms: (event.timestamp - t0) * 1000.0,
            category: "openclaw".to_string(),
            event_type: event.event_type.clone(),
            label,
            value: event.duration_ms,
            unit: "ms".to_string(),
            duration_ms: event.duration_ms,
            status: event.status.clone(),
            details,
        });
    }

    for sample in resources {
        let label = if sample.labels.is_empty() {
            sample.name.clone()
        } else {
            let labels = sample
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({labels})", sample.name)
        };

        entries.push(TimelineEntry {
            timestamp: sample.timestamp,
            relative_ms: (sample.timestamp - t0) * 1000.0,
            category: categorize_metric(&sample.name).to_string(),
            event_type: sample.name.clone(),
            label,
            value: sample.value,
            unit: sample.unit.clone(),
            duration_ms: 0.0,
            status: "ok".to_string(),
            details: Map::new(),
        });
    }

    entries.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    entries
}

/// A single row in the action-oriented timeline: one discrete unit of
/// application work with the nearest in-window resource readings attached.
/// Uncorrelated fields stay `None` (JSON null), never a fabricated zero.
#[derive(Debug, Clone, Serialize)]
pub struct ActionTimelineRow {
    pub timestamp: f64,
    pub relative_ms: f64,
    /// e.g. "llm:claude-3" or "tool:web_search"
    pub action: String,
    pub duration_ms: f64,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub tokens_total: i64,
    pub cost_usd: f64,
    pub status: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub process_cpu_percent: Option<f64>,
    pub process_rss_bytes: Option<f64>,
    pub net_recv_rate: Option<f64>,
}

/// A time-sorted series of `(timestamp, value)` pairs for one metric name.
struct MetricSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl MetricSeries {
    /// Value of the sample nearest to `ts` within `±window` seconds, or
    /// `None` when the window holds no sample. Equidistant ties resolve to
    /// the earlier-indexed candidate, keeping the result deterministic.
    fn nearest(&self, ts: f64, window: f64) -> Option<f64> {
        let lo = self.times.partition_point(|&t| t < ts - window);
        let hi = self.times.partition_point(|&t| t <= ts + window);
        if lo >= hi {
            return None;
        }
        let mut best = lo;
        let mut best_dist = (self.times[lo] - ts).abs();
        for i in lo + 1..hi {
            let dist = (self.times[i] - ts).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        Some(self.values[best])
    }
}

/// Index resources by metric name for the windowed join. Per-core CPU
/// samples are excluded so the system CPU series reflects `cpu=total`.
fn index_resources(resources: &[ResourceSample]) -> HashMap<String, MetricSeries> {
    let mut by_name: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for sample in resources {
        if sample.name == "system.cpu.usage_percent"
            && sample.labels.get("cpu").map(String::as_str) != Some("total")
        {
            continue;
        }
        by_name
            .entry(sample.name.clone())
            .or_default()
            .push((sample.timestamp, sample.value));
    }

    by_name
        .into_iter()
        .map(|(name, mut points)| {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let (times, values) = points.into_iter().unzip();
            (name, MetricSeries { times, values })
        })
        .collect()
}

fn action_label(event: &TraceEvent) -> String {
    match event.event_type.as_str() {
        "model.usage" => {
            if event.model.is_empty() {
                "llm".to_string()
            } else {
                format!("llm:{}", event.model)
            }
        }
        "tool.call" => {
            // tool name travels in the raw payload
            match event.raw.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => format!("tool:{name}"),
                _ => "tool".to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// Build the action-oriented timeline: each event becomes a row with the
/// nearest resource reading per correlated metric, restricted to a
/// symmetric window of `window_seconds` around the event.
pub fn build_action_timeline(
    events: &[TraceEvent],
    resources: &[ResourceSample],
    window_seconds: f64,
) -> Vec<ActionTimelineRow> {
    if events.is_empty() {
        return Vec::new();
    }

    let t0 = events
        .iter()
        .map(|e| e.timestamp)
        .chain(resources.iter().map(|r| r.timestamp))
        .fold(f64::MAX, f64::min);

    let index = index_resources(resources);
    let nearest = |name: &str, ts: f64| -> Option<f64> {
        index.get(name).and_then(|s| s.nearest(ts, window_seconds))
    };

    let mut rows: Vec<ActionTimelineRow> = events
        .iter()
        .map(|event| ActionTimelineRow {
            timestamp: event.timestamp,
            relative_ms: (event.timestamp - t0) * 1000.0,
            action: action_label(event),
            duration_ms: event.duration_ms,
            tokens_input: event.tokens_input,
            tokens_output: event.tokens_output,
            tokens_total: event.tokens_total,
            cost_usd: event.cost_usd,
            status: event.status.clone(),
            cpu_percent: nearest("system.cpu.usage_percent", event.timestamp),
            memory_percent: nearest("system.memory.usage_percent", event.timestamp),
            process_cpu_percent: nearest("process.cpu.usage_percent", event.timestamp),
            process_rss_bytes: nearest("process.memory.rss_bytes", event.timestamp),
            net_recv_rate: nearest("system.network.bytes_recv_rate", event.timestamp),
        })
        .collect();

    rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    rows
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write the unified timeline as a JSON array, creating parent directories.
pub fn save_timeline(entries: &[TimelineEntry], path: &Path) -> Result<(), AnalyzeError> {
    let rows: Vec<TimelineEntry> = entries
        .iter()
        .map(|e| TimelineEntry {
            relative_ms: round2(e.relative_ms),
            ..e.clone()
        })
        .collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
    Ok(())
}

/// Write the action timeline as a JSON array, creating parent directories.
pub fn save_action_timeline(rows: &[ActionTimelineRow], path: &Path) -> Result<(), AnalyzeError> {
    let rows: Vec<ActionTimelineRow> = rows
        .iter()
        .map(|r| ActionTimelineRow {
            relative_ms: round2(r.relative_ms),
            ..r.clone()
        })
        .collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: f64, event_type: &str, model: &str) -> TraceEvent {
        TraceEvent {
            timestamp: ts,
            event_type: event_type.to_string(),
            model: model.to_string(),
            status: "ok".to_string(),
            ..Default::default()
        }
    }

    fn resource(ts: f64, name: &str, value: f64) -> ResourceSample {
        ResourceSample {
            timestamp: ts,
            name: name.to_string(),
            value,
            unit: "%".to_string(),
            labels: Default::default(),
        }
    }

    fn cpu_total(ts: f64, value: f64) -> ResourceSample {
        ResourceSample {
            labels: [("cpu".to_string(), "total".to_string())]
                .into_iter()
                .collect(),
            ..resource(ts, "system.cpu.usage_percent", value)
        }
    }

    #[test]
    fn test_unified_timeline_is_one_to_one_and_sorted() {
        let events = vec![event(105.0, "model.usage", "claude-3"), event(101.0, "tool.call", "")];
        let resources = vec![
            cpu_total(100.0, 10.0),
            resource(103.0, "system.memory.usage_percent", 60.0),
            resource(107.0, "system.network.bytes_recv_rate", 5.0),
        ];

        let timeline = build_timeline(&events, &resources);
        assert_eq!(timeline.len(), events.len() + resources.len());
        assert!(timeline
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        // relative offsets are anchored at the global minimum
        assert_eq!(timeline[0].relative_ms, 0.0);
        assert_eq!(timeline.last().unwrap().relative_ms, 7000.0);
    }

    #[test]
    fn test_unified_timeline_categories() {
        let resources = vec![
            cpu_total(1.0, 10.0),
            resource(1.0, "system.swap.usage_percent", 0.0),
            resource(1.0, "system.network.bytes_sent_total", 1.0),
            resource(1.0, "process.memory.rss_bytes", 1.0),
            resource(1.0, "custom.metric", 1.0),
        ];
        let timeline = build_timeline(&[event(1.0, "model.usage", "m")], &resources);

        let category_of = |event_type: &str| {
            timeline
                .iter()
                .find(|e| e.event_type == event_type)
                .map(|e| e.category.clone())
                .unwrap()
        };
        assert_eq!(category_of("model.usage"), "openclaw");
        assert_eq!(category_of("system.cpu.usage_percent"), "cpu");
        assert_eq!(category_of("system.swap.usage_percent"), "memory");
        assert_eq!(category_of("system.network.bytes_sent_total"), "network");
        assert_eq!(category_of("process.memory.rss_bytes"), "process");
        assert_eq!(category_of("custom.metric"), "resource");
    }

    #[test]
    fn test_empty_inputs_yield_empty_timeline() {
        assert!(build_timeline(&[], &[]).is_empty());
        assert!(build_action_timeline(&[], &[], 2.0).is_empty());
    }

    #[test]
    fn test_windowed_join_picks_minimum_distance() {
        // event at t=100, candidates at t=97 (A) and t=103 (B)
        let events = vec![event(100.0, "model.usage", "claude-3")];
        let resources = vec![cpu_total(97.0, 11.0), cpu_total(103.0, 22.0)];

        let rows = build_action_timeline(&events, &resources, 5.0);
        assert_eq!(rows[0].cpu_percent, Some(11.0));

        // shrink the window until both candidates fall outside
        let rows = build_action_timeline(&events, &resources, 2.0);
        assert_eq!(rows[0].cpu_percent, None);
    }

    #[test]
    fn test_windowed_join_boundary_inclusive() {
        let events = vec![event(100.0, "model.usage", "m")];
        let resources = vec![cpu_total(103.0, 33.0)];
        let rows = build_action_timeline(&events, &resources, 3.0);
        assert_eq!(rows[0].cpu_percent, Some(33.0));
    }

    #[test]
    fn test_windowed_join_tie_resolves_to_earlier() {
        let events = vec![event(100.0, "model.usage", "m")];
        let resources = vec![cpu_total(98.0, 1.0), cpu_total(102.0, 2.0)];
        let rows = build_action_timeline(&events, &resources, 5.0);
        assert_eq!(rows[0].cpu_percent, Some(1.0));
    }

    #[test]
    fn test_per_core_samples_excluded_from_join() {
        let events = vec![event(100.0, "model.usage", "m")];
        let per_core = ResourceSample {
            labels: [("cpu".to_string(), "0".to_string())].into_iter().collect(),
            ..resource(100.0, "system.cpu.usage_percent", 99.0)
        };
        let resources = vec![per_core, cpu_total(101.0, 42.0)];
        let rows = build_action_timeline(&events, &resources, 5.0);
        assert_eq!(rows[0].cpu_percent, Some(42.0));
    }

    #[test]
    fn test_action_labels() {
        let mut tool = event(1.0, "tool.call", "");
        tool.raw
            .insert("name".to_string(), Value::String("web_search".to_string()));
        let events = vec![
            event(1.0, "model.usage", "claude-3"),
            event(2.0, "model.usage", ""),
            tool,
            event(3.0, "tool.call", ""),
            event(4.0, "webhook.received", ""),
        ];
        let rows = build_action_timeline(&events, &[], 2.0);
        let actions: Vec<&str> = rows.iter().map(|r| r.action.as_str()).collect();
        assert!(actions.contains(&"llm:claude-3"));
        assert!(actions.contains(&"llm"));
        assert!(actions.contains(&"tool:web_search"));
        assert!(actions.contains(&"tool"));
        assert!(actions.contains(&"webhook.received"));
    }

    #[test]
    fn test_uncorrelated_fields_serialize_as_null() {
        let rows = build_action_timeline(&[event(1.0, "model.usage", "m")], &[], 2.0);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json["cpu_percent"].is_null());
        assert!(json["net_recv_rate"].is_null());
        // measured values stay numbers
        assert_eq!(json["duration_ms"], 0.0);
    }

    #[test]
    fn test_save_round_trips_through_parser_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![event(100.0, "model.usage", "m")];
        let resources = vec![cpu_total(100.5, 50.0)];

        let timeline = build_timeline(&events, &resources);
        let path = dir.path().join("timeline.json");
        save_timeline(&timeline, &path).unwrap();
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["relative_ms"], 500.0);

        let rows = build_action_timeline(&events, &resources, 2.0);
        let path = dir.path().join("action_timeline.json");
        save_action_timeline(&rows, &path).unwrap();
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["cpu_percent"], 50.0);
    }
}
