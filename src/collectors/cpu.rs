use std::collections::BTreeMap;

use sysinfo::System;

use super::Collector;
use crate::error::CollectorError;
use crate::samples::{epoch_now, MetricSample};

/// Collects overall and per-core CPU usage plus load averages.
///
/// CPU usage percentages are computed by `sysinfo` as a delta between
/// consecutive refreshes, so the first collection cycle after construction
/// reports near-zero usage.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
        self.system.refresh_cpu();
        let now = epoch_now();
        let mut samples = Vec::new();

        let mut labels = BTreeMap::new();
        labels.insert("cpu".to_string(), "total".to_string());
        samples.push(MetricSample::with_labels(
            "system.cpu.usage_percent",
            f64::from(self.system.global_cpu_info().cpu_usage()),
            "%",
            now,
            labels,
            "Overall CPU usage percentage",
        ));

        for (idx, cpu) in self.system.cpus().iter().enumerate() {
            let mut labels = BTreeMap::new();
            labels.insert("cpu".to_string(), idx.to_string());
            samples.push(MetricSample::with_labels(
                "system.cpu.usage_percent",
                f64::from(cpu.cpu_usage()),
                "%",
                now,
                labels,
                &format!("CPU core {idx} usage percentage"),
            ));
        }

        let load = System::load_average();
        samples.push(MetricSample::new(
            "system.cpu.load_avg_1m",
            load.one,
            "1",
            now,
            "Load average 1 minute",
        ));
        samples.push(MetricSample::new(
            "system.cpu.load_avg_5m",
            load.five,
            "1",
            now,
            "Load average 5 minutes",
        ));

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_collector_sample_shape() {
        let mut collector = CpuCollector::new();
        let samples = collector.collect().unwrap();

        let usage: Vec<_> = samples
            .iter()
            .filter(|s| s.name == "system.cpu.usage_percent")
            .collect();
        // One total sample plus one per logical core
        assert!(!usage.is_empty());
        assert!(usage
            .iter()
            .any(|s| s.labels.get("cpu").map(String::as_str) == Some("total")));
        assert_eq!(usage.len(), 1 + usage.iter().filter(|s| s.labels.get("cpu").map(String::as_str) != Some("total")).count());

        assert!(samples.iter().any(|s| s.name == "system.cpu.load_avg_1m"));
        assert!(samples.iter().any(|s| s.name == "system.cpu.load_avg_5m"));
    }

    #[test]
    fn test_cpu_collector_shares_batch_timestamp() {
        let mut collector = CpuCollector::new();
        let samples = collector.collect().unwrap();
        let first = samples[0].timestamp;
        assert!(samples.iter().all(|s| s.timestamp == first));
    }
}
