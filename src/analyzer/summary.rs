use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use super::parser::{ResourceSample, TraceEvent};
use crate::error::AnalyzeError;

/// Summary statistics for a single tracing session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub total_duration_ms: f64,
    pub event_count: usize,
    pub model_calls: usize,
    pub total_tokens_input: i64,
    pub total_tokens_output: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,
    pub error_count: usize,
    pub error_rate: f64,
    pub models_used: Vec<String>,
    pub providers_used: Vec<String>,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub avg_memory_percent: f64,
    pub max_memory_percent: f64,
    pub avg_network_recv_rate: f64,
    pub max_network_recv_rate: f64,
}

/// Aggregate summary across multiple sessions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiSessionSummary {
    pub session_count: usize,
    pub total_events: usize,
    pub total_model_calls: usize,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub overall_error_rate: f64,
    pub avg_session_duration_ms: f64,
    pub sessions: Vec<SessionSummary>,
}

/// Percentile via linear interpolation between closest ranks: p=0 is the
/// minimum, p=100 the maximum, p=50 the interpolated median. Empty input
/// yields 0.0.
pub fn percentile(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = pct / 100.0 * (sorted.len() - 1) as f64;
    let low = idx.floor() as usize;
    let high = (low + 1).min(sorted.len() - 1);
    let frac = idx - low as f64;
    sorted[low] * (1.0 - frac) + sorted[high] * frac
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

fn max_of(data: &[f64]) -> f64 {
    data.iter().copied().fold(f64::MIN, f64::max)
}

/// Compute summary statistics over one session's events and resources.
///
/// Latency, token and cost aggregates accumulate over `model.usage` events
/// only. CPU aggregates consider `cpu=total` samples only, so per-core
/// samples do not skew the average.
pub fn summarize_session(
    events: &[TraceEvent],
    resources: &[ResourceSample],
    session_id: &str,
) -> SessionSummary {
    let mut summary = SessionSummary {
        session_id: if session_id.is_empty() {
            "default".to_string()
        } else {
            session_id.to_string()
        },
        ..Default::default()
    };
    if events.is_empty() {
        return summary;
    }

    summary.event_count = events.len();
    summary.start_time = events[0].timestamp;
    summary.end_time = events[events.len() - 1].timestamp;
    summary.total_duration_ms = (summary.end_time - summary.start_time) * 1000.0;

    let mut latencies = Vec::new();
    let mut models = BTreeSet::new();
    let mut providers = BTreeSet::new();

    for event in events {
        if event.event_type == "model.usage" {
            summary.model_calls += 1;
            summary.total_tokens_input += event.tokens_input;
            summary.total_tokens_output += event.tokens_output;
            summary.total_tokens += event.tokens_total;
            summary.total_cost_usd += event.cost_usd;
            if event.duration_ms > 0.0 {
                latencies.push(event.duration_ms);
            }
            if !event.model.is_empty() {
                models.insert(event.model.clone());
            }
            if !event.provider.is_empty() {
                providers.insert(event.provider.clone());
            }
        }
        if event.status == "error" {
            summary.error_count += 1;
        }
    }

    if !latencies.is_empty() {
        summary.avg_latency_ms = mean(&latencies);
        summary.p50_latency_ms = percentile(&latencies, 50.0);
        summary.p95_latency_ms = percentile(&latencies, 95.0);
        summary.p99_latency_ms = percentile(&latencies, 99.0);
        summary.max_latency_ms = max_of(&latencies);
    }

    // guarded: zero events means zero rate, never a division error
    if summary.event_count > 0 {
        summary.error_rate = summary.error_count as f64 / summary.event_count as f64;
    }

    summary.models_used = models.into_iter().collect();
    summary.providers_used = providers.into_iter().collect();

    let cpu_vals: Vec<f64> = resources
        .iter()
        .filter(|r| {
            r.name == "system.cpu.usage_percent"
                && r.labels.get("cpu").map(String::as_str) == Some("total")
        })
        .map(|r| r.value)
        .collect();
    let mem_vals: Vec<f64> = resources
        .iter()
        .filter(|r| r.name == "system.memory.usage_percent")
        .map(|r| r.value)
        .collect();
    let net_recv: Vec<f64> = resources
        .iter()
        .filter(|r| r.name == "system.network.bytes_recv_rate")
        .map(|r| r.value)
        .collect();

    if !cpu_vals.is_empty() {
        summary.avg_cpu_percent = mean(&cpu_vals);
        summary.max_cpu_percent = max_of(&cpu_vals);
    }
    if !mem_vals.is_empty() {
        summary.avg_memory_percent = mean(&mem_vals);
        summary.max_memory_percent = max_of(&mem_vals);
    }
    if !net_recv.is_empty() {
        summary.avg_network_recv_rate = mean(&net_recv);
        summary.max_network_recv_rate = max_of(&net_recv);
    }

    summary
}

/// Aggregate summaries across sessions. A pure fold over independently
/// computed per-session summaries; no cross-session state.
pub fn summarize_multi_session(
    sessions: &[(Vec<TraceEvent>, Vec<ResourceSample>, String)],
) -> MultiSessionSummary {
    let mut multi = MultiSessionSummary::default();
    for (events, resources, session_id) in sessions {
        let summary = summarize_session(events, resources, session_id);
        multi.total_events += summary.event_count;
        multi.total_model_calls += summary.model_calls;
        multi.total_tokens += summary.total_tokens;
        multi.total_cost_usd += summary.total_cost_usd;
        multi.sessions.push(summary);
    }

    multi.session_count = multi.sessions.len();
    let durations: Vec<f64> = multi
        .sessions
        .iter()
        .map(|s| s.total_duration_ms)
        .filter(|&d| d > 0.0)
        .collect();
    if !durations.is_empty() {
        multi.avg_session_duration_ms = mean(&durations);
    }
    let errors: usize = multi.sessions.iter().map(|s| s.error_count).sum();
    let total: usize = multi.sessions.iter().map(|s| s.event_count).sum();
    if total > 0 {
        multi.overall_error_rate = errors as f64 / total as f64;
    }
    multi
}

/// Write a summary as pretty JSON, creating parent directories.
pub fn save_summary<T: Serialize>(summary: &T, path: &Path) -> Result<(), AnalyzeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
