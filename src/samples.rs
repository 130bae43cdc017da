//! Core metric sample type shared by collectors and exporters
//!
//! A [`MetricSample`] is the atomic unit of data flowing through the
//! collection pipeline: collectors produce batches of samples, the manager
//! fans them out, and exporters persist or forward them.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single timestamped metric observation.
///
/// Samples are immutable after creation. The `description` field is
/// informational only and is not part of the persisted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// Dotted metric name, e.g. `system.cpu.usage_percent`
    pub name: String,
    /// Observed value
    pub value: f64,
    /// Unit string, e.g. `%`, `bytes`, `bytes/s`
    pub unit: String,
    /// Observation time as fractional epoch seconds
    pub timestamp: f64,
    /// Dimension labels, e.g. `cpu=total` or `pid=1234`
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Human-readable description of the metric
    #[serde(default)]
    pub description: String,
}

impl MetricSample {
    /// Create a sample without labels.
    pub fn new(name: &str, value: f64, unit: &str, timestamp: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp,
            labels: BTreeMap::new(),
            description: description.to_string(),
        }
    }

    /// Create a sample carrying the given labels.
    pub fn with_labels(
        name: &str,
        value: f64,
        unit: &str,
        timestamp: f64,
        labels: BTreeMap<String, String>,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp,
            labels,
            description: description.to_string(),
        }
    }
}

/// Current wall-clock time as fractional epoch seconds.
pub fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
