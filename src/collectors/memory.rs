use sysinfo::System;

use super::Collector;
use crate::error::CollectorError;
use crate::samples::{epoch_now, MetricSample};

/// Collects memory and swap usage. Emits five fixed samples per cycle.
pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
        self.system.refresh_memory();
        let now = epoch_now();

        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let available = self.system.available_memory();
        let usage_percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let swap_total = self.system.total_swap();
        let swap_percent = if swap_total > 0 {
            self.system.used_swap() as f64 / swap_total as f64 * 100.0
        } else {
            0.0
        };

        Ok(vec![
            MetricSample::new(
                "system.memory.usage_percent",
                usage_percent,
                "%",
                now,
                "Memory usage percentage",
            ),
            MetricSample::new(
                "system.memory.used_bytes",
                used as f64,
                "bytes",
                now,
                "Memory used in bytes",
            ),
            MetricSample::new(
                "system.memory.available_bytes",
                available as f64,
                "bytes",
                now,
                "Memory available in bytes",
            ),
            MetricSample::new(
                "system.memory.total_bytes",
                total as f64,
                "bytes",
                now,
                "Total memory in bytes",
            ),
            MetricSample::new(
                "system.swap.usage_percent",
                swap_percent,
                "%",
                now,
                "Swap usage percentage",
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_collector_emits_five_samples() {
        let mut collector = MemoryCollector::new();
        let samples = collector.collect().unwrap();
        assert_eq!(samples.len(), 5);

        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "system.memory.usage_percent",
                "system.memory.used_bytes",
                "system.memory.available_bytes",
                "system.memory.total_bytes",
                "system.swap.usage_percent",
            ]
        );
    }

    #[test]
    fn test_memory_percentages_in_range() {
        let mut collector = MemoryCollector::new();
        let samples = collector.collect().unwrap();
        for s in samples.iter().filter(|s| s.unit == "%") {
            assert!(s.value >= 0.0 && s.value <= 100.0, "{} = {}", s.name, s.value);
        }
    }
}
