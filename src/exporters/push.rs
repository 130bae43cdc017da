use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::json;

use super::Exporter;
use crate::config::PushConfig;
use crate::error::ExportError;
use crate::samples::MetricSample;

/// Latest observation for one label set of a gauge.
#[derive(Debug, Clone)]
struct GaugePoint {
    labels: BTreeMap<String, String>,
    value: f64,
    timestamp: f64,
}

/// A gauge handle created lazily the first time a metric name is observed
/// and reused for every later batch.
#[derive(Debug, Clone)]
struct Gauge {
    unit: String,
    description: String,
    points: BTreeMap<String, GaugePoint>,
}

impl Gauge {
    fn set(&mut self, labels: &BTreeMap<String, String>, value: f64, timestamp: f64) {
        let key = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        self.points.insert(
            key,
            GaugePoint {
                labels: labels.clone(),
                value,
                timestamp,
            },
        );
    }
}

struct GaugeRegistry {
    service_name: String,
    gauges: HashMap<String, Gauge>,
}

impl GaugeRegistry {
    fn record(&mut self, sample: &MetricSample) {
        let gauge = self
            .gauges
            .entry(sample.name.clone())
            .or_insert_with(|| Gauge {
                unit: sample.unit.clone(),
                description: sample.description.clone(),
                points: BTreeMap::new(),
            });
        gauge.set(&sample.labels, sample.value, sample.timestamp);
    }

    fn snapshot(&self) -> serde_json::Value {
        let metrics: Vec<serde_json::Value> = self
            .gauges
            .iter()
            .map(|(name, gauge)| {
                json!({
                    "name": name,
                    "unit": gauge.unit,
                    "description": gauge.description,
                    "points": gauge.points.values().map(|p| json!({
                        "value": p.value,
                        "timestamp": p.timestamp,
                        "labels": p.labels,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({ "service": self.service_name, "metrics": metrics })
    }
}

/// Forwards the latest gauge values to an HTTP endpoint.
///
/// `export` only updates the in-memory gauge map; a background thread
/// flushes snapshots on its own fixed timer, decoupled from the collection
/// interval. Delivery is best-effort: a failed flush is logged and the
/// next timer tick retries with fresher data.
pub struct PushExporter {
    registry: Arc<Mutex<GaugeRegistry>>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PushExporter {
    pub fn new(config: &PushConfig) -> Self {
        let registry = Arc::new(Mutex::new(GaugeRegistry {
            service_name: config.service_name.clone(),
            gauges: HashMap::new(),
        }));

        let (stop_tx, stop_rx) = mpsc::channel();
        let thread_registry = Arc::clone(&registry);
        let thread_config = config.clone();
        let handle = thread::spawn(move || Self::flush_loop(thread_registry, thread_config, stop_rx));

        info!(
            "PushExporter initialized -> {} (service={})",
            config.endpoint, config.service_name
        );
        Self {
            registry,
            stop_tx: Some(stop_tx),
            thread: Some(handle),
        }
    }

    fn flush_loop(registry: Arc<Mutex<GaugeRegistry>>, config: PushConfig, stop_rx: Receiver<()>) {
        let client = match reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!("Push transport unavailable: {err}");
                return;
            }
        };
        let interval = Duration::from_millis(config.flush_interval_ms.max(100));
        loop {
            let stopping = !matches!(
                stop_rx.recv_timeout(interval),
                Err(RecvTimeoutError::Timeout)
            );
            if let Err(err) = Self::flush(&client, &config, &registry) {
                warn!("Push flush failed: {err}");
            }
            if stopping {
                break;
            }
        }
    }

    fn flush(
        client: &reqwest::blocking::Client,
        config: &PushConfig,
        registry: &Arc<Mutex<GaugeRegistry>>,
    ) -> Result<(), ExportError> {
        let body = {
            let registry = match registry.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if registry.gauges.is_empty() {
                return Ok(());
            }
            registry.snapshot()
        };

        let url = format!("{}/v1/metrics", config.endpoint.trim_end_matches('/'));
        let mut request = client.post(&url).json(&body);
        for (key, value) in &config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        let response = request
            .send()
            .map_err(|e| ExportError::PushFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExportError::PushFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        debug!("Pushed gauge snapshot to {url}");
        Ok(())
    }
}

impl Exporter for PushExporter {
    fn export(&mut self, samples: &[MetricSample]) -> Result<(), ExportError> {
        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sample in samples {
            registry.record(sample);
        }
        Ok(())
    }

    /// Stops the flush thread after it performs a final flush.
    fn shutdown(&mut self) -> Result<(), ExportError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Push flush thread panicked before joining");
            }
            info!("PushExporter shut down");
        }
        Ok(())
    }
}

impl Drop for PushExporter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PushConfig {
        PushConfig {
            // unroutable endpoint; tests never rely on a successful flush
            endpoint: "http://127.0.0.1:9".to_string(),
            service_name: "test-service".to_string(),
            headers: BTreeMap::new(),
            flush_interval_ms: 3_600_000,
        }
    }

    fn sample(name: &str, value: f64, labels: &[(&str, &str)]) -> MetricSample {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MetricSample::with_labels(name, value, "%", 1_700_000_000.0, labels, "desc")
    }

    #[test]
    fn test_gauge_handle_created_lazily_and_reused() {
        let mut exporter = PushExporter::new(&test_config());
        exporter
            .export(&[sample("system.cpu.usage_percent", 10.0, &[("cpu", "total")])])
            .unwrap();
        exporter
            .export(&[sample("system.cpu.usage_percent", 55.0, &[("cpu", "total")])])
            .unwrap();

        {
            let registry = exporter.registry.lock().unwrap();
            assert_eq!(registry.gauges.len(), 1);
            let gauge = &registry.gauges["system.cpu.usage_percent"];
            assert_eq!(gauge.points.len(), 1);
            assert_eq!(gauge.points["cpu=total"].value, 55.0);
        }
        exporter.shutdown().unwrap();
    }

    #[test]
    fn test_distinct_label_sets_kept_separately() {
        let mut exporter = PushExporter::new(&test_config());
        exporter
            .export(&[
                sample("system.cpu.usage_percent", 10.0, &[("cpu", "total")]),
                sample("system.cpu.usage_percent", 80.0, &[("cpu", "0")]),
            ])
            .unwrap();

        {
            let registry = exporter.registry.lock().unwrap();
            let gauge = &registry.gauges["system.cpu.usage_percent"];
            assert_eq!(gauge.points.len(), 2);
        }
        exporter.shutdown().unwrap();
    }

    #[test]
    fn test_snapshot_shape() {
        let mut registry = GaugeRegistry {
            service_name: "svc".to_string(),
            gauges: HashMap::new(),
        };
        registry.record(&sample("system.memory.usage_percent", 60.0, &[]));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot["service"], "svc");
        assert_eq!(snapshot["metrics"][0]["name"], "system.memory.usage_percent");
        assert_eq!(snapshot["metrics"][0]["points"][0]["value"], 60.0);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mut exporter = PushExporter::new(&test_config());
        exporter.shutdown().unwrap();
        exporter.shutdown().unwrap();
    }
}
