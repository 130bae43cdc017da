//! Configuration loading: YAML file with environment variable overrides.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ConfigError;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "clawtrace.yaml";

/// Push exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Base endpoint the flush thread posts gauge snapshots to.
    pub endpoint: String,
    pub service_name: String,
    /// Extra HTTP headers, e.g. auth tokens.
    pub headers: BTreeMap<String, String>,
    /// Transport flush cadence, decoupled from the collection interval.
    pub flush_interval_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            service_name: "clawtrace-resources".to_string(),
            headers: BTreeMap::new(),
            flush_interval_ms: 10_000,
        }
    }
}

/// System resource collector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub interval_seconds: f64,
    pub cpu: bool,
    pub memory: bool,
    pub network: bool,
    /// Restrict network collection to one interface when non-empty.
    pub network_interface: String,
    /// Target name for the per-process collector.
    pub process_name: String,
    pub process_filter_enabled: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 2.0,
            cpu: true,
            memory: true,
            network: true,
            network_interface: String::new(),
            process_name: "node".to_string(),
            process_filter_enabled: false,
        }
    }
}

/// Local file exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalExporterConfig {
    pub enabled: bool,
    pub output_dir: String,
}

impl Default for LocalExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: "./trace_data".to_string(),
        }
    }
}

/// Reference values for the generated OpenClaw diagnostics config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenClawConfig {
    pub otel_endpoint: String,
    pub service_name: String,
    pub traces: bool,
    pub metrics: bool,
    pub logs: bool,
    pub sample_rate: f64,
    pub flush_interval_ms: u64,
}

impl Default for OpenClawConfig {
    fn default() -> Self {
        Self {
            otel_endpoint: "http://localhost:4318".to_string(),
            service_name: "openclaw-gateway".to_string(),
            traces: true,
            metrics: true,
            logs: true,
            sample_rate: 1.0,
            flush_interval_ms: 10_000,
        }
    }
}

/// Analyzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub trace_dir: String,
    pub summary_output: String,
    /// Half-width of the correlation window for the action timeline.
    pub window_seconds: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            trace_dir: "./trace_data".to_string(),
            summary_output: "./trace_data/summary".to_string(),
            window_seconds: 2.0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// "local" writes JSONL files only; "online" additionally pushes
    /// gauges to the configured endpoint.
    pub mode: Mode,
    pub push: PushConfig,
    pub collector: CollectorConfig,
    pub local_exporter: LocalExporterConfig,
    pub openclaw: OpenClawConfig,
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Local,
    Online,
}

impl Config {
    /// Load configuration from a YAML file, then apply environment
    /// overrides. A missing file yields defaults with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadError(format!("{}: {e}", path.display())))?;
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `CLAWTRACE_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(mode) = env::var("CLAWTRACE_MODE") {
            self.mode = match mode.to_lowercase().as_str() {
                "local" => Mode::Local,
                "online" => Mode::Online,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "CLAWTRACE_MODE must be 'local' or 'online', got {other:?}"
                    )))
                }
            };
        }
        if let Ok(endpoint) = env::var("CLAWTRACE_PUSH_ENDPOINT") {
            self.push.endpoint = endpoint;
        }
        if let Ok(service) = env::var("CLAWTRACE_PUSH_SERVICE_NAME") {
            self.push.service_name = service;
        }
        if let Ok(interval) = env::var("CLAWTRACE_COLLECTOR_INTERVAL") {
            self.collector.interval_seconds = interval.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CLAWTRACE_COLLECTOR_INTERVAL must be a number, got {interval:?}"
                ))
            })?;
        }
        if let Ok(process) = env::var("CLAWTRACE_COLLECTOR_PROCESS") {
            self.collector.process_name = process;
        }
        if let Ok(dir) = env::var("CLAWTRACE_LOCAL_OUTPUT_DIR") {
            self.local_exporter.output_dir = dir;
        }
        Ok(())
    }
}

/// Build the OpenClaw diagnostics configuration document that points the
/// assistant's OTel plugin at the configured collector endpoint.
pub fn diagnostics_config(cfg: &OpenClawConfig) -> serde_json::Value {
    json!({
        "plugins": {
            "allow": ["diagnostics-otel"],
            "entries": {
                "diagnostics-otel": { "enabled": true },
            },
        },
        "diagnostics": {
            "enabled": true,
            "otel": {
                "enabled": true,
                "endpoint": cfg.otel_endpoint,
                "protocol": "http/protobuf",
                "serviceName": cfg.service_name,
                "traces": cfg.traces,
                "metrics": cfg.metrics,
                "logs": cfg.logs,
                "sampleRate": cfg.sample_rate,
                "flushIntervalMs": cfg.flush_interval_ms,
            },
        },
        "logging": { "level": "debug" },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    // Environment variables are process-global; every test that reads or
    // writes them must hold this lock so the parallel runner cannot
    // interleave them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Local);
        assert_eq!(config.collector.interval_seconds, 2.0);
        assert!(config.collector.cpu);
        assert!(!config.collector.process_filter_enabled);
        assert_eq!(config.local_exporter.output_dir, "./trace_data");
        assert_eq!(config.analyzer.window_seconds, 2.0);
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let _guard = env_guard();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mode: online\ncollector:\n  interval_seconds: 5.0\n  process_name: openclaw"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.mode, Mode::Online);
        assert_eq!(config.collector.interval_seconds, 5.0);
        assert_eq!(config.collector.process_name, "openclaw");
        // untouched sections fall back to defaults
        assert!(config.collector.memory);
        assert_eq!(config.push.flush_interval_ms, 10_000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let _guard = env_guard();
        let config = Config::load(Some(Path::new("/nonexistent/clawtrace.yaml"))).unwrap();
        assert_eq!(config.mode, Mode::Local);
    }

    #[test]
    fn test_env_override_precedence() {
        let _guard = env_guard();
        // Env overrides apply on top of file values
        env::set_var("CLAWTRACE_COLLECTOR_PROCESS", "gateway");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "collector:\n  process_name: node").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        env::remove_var("CLAWTRACE_COLLECTOR_PROCESS");
        assert_eq!(config.collector.process_name, "gateway");
    }

    #[test]
    fn test_invalid_env_interval_rejected() {
        let _guard = env_guard();
        env::set_var("CLAWTRACE_COLLECTOR_INTERVAL", "fast");
        let result = Config::load(Some(Path::new("/nonexistent/clawtrace.yaml")));
        env::remove_var("CLAWTRACE_COLLECTOR_INTERVAL");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_diagnostics_config_shape() {
        let doc = diagnostics_config(&OpenClawConfig::default());
        assert_eq!(doc["diagnostics"]["otel"]["protocol"], "http/protobuf");
        assert_eq!(
            doc["diagnostics"]["otel"]["serviceName"],
            "openclaw-gateway"
        );
        assert_eq!(doc["plugins"]["allow"][0], "diagnostics-otel");
    }
}
