//! Local event logger for LLM and tool action events
//!
//! Writes OpenClaw-compatible JSONL records so fully local tracing works
//! without the assistant's own diagnostics plugin. The records parse back
//! through [`crate::analyzer::parser`] unchanged.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use log::info;
use serde_json::{json, Value};

use crate::error::ExportError;
use crate::samples::epoch_now;

/// Parameters of one LLM call to record.
#[derive(Debug, Clone, Default)]
pub struct LlmCallRecord {
    pub model: String,
    pub provider: String,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub duration_ms: f64,
    pub cost_usd: f64,
    pub status: String,
    pub error: String,
    pub session_id: String,
}

/// Daily file name for event records.
pub fn event_file_name(date: NaiveDate) -> String {
    format!("events-{}.jsonl", date.format("%Y-%m-%d"))
}

/// Appends action events to daily `events-YYYY-MM-DD.jsonl` files with the
/// same rollover and flush policy as the resource exporter.
pub struct EventLogger {
    output_dir: PathBuf,
    file: Option<File>,
    current_date: Option<NaiveDate>,
}

impl EventLogger {
    pub fn new(output_dir: &str) -> Result<Self, ExportError> {
        let output_dir = PathBuf::from(output_dir);
        std::fs::create_dir_all(&output_dir)?;
        info!("EventLogger initialized -> {}", output_dir.display());
        Ok(Self {
            output_dir,
            file: None,
            current_date: None,
        })
    }

    /// Record an LLM call event.
    pub fn log_llm_call(&mut self, record: &LlmCallRecord) -> Result<(), ExportError> {
        let mut doc = json!({
            "type": "model.usage",
            "timestamp": epoch_now(),
            "provider": record.provider,
            "model": record.model,
            "durationMs": record.duration_ms,
            "costUsd": record.cost_usd,
            "usage": {
                "input": record.tokens_input,
                "output": record.tokens_output,
                "total": record.tokens_input + record.tokens_output,
            },
            "sessionId": record.session_id,
        });
        if record.status == "error" || !record.error.is_empty() {
            doc["error"] = Value::String(if record.error.is_empty() {
                "unknown error".to_string()
            } else {
                record.error.clone()
            });
        }
        self.write(&doc)
    }

    /// Record a tool invocation event.
    pub fn log_tool_call(
        &mut self,
        tool_name: &str,
        duration_ms: f64,
        status: &str,
        error: &str,
    ) -> Result<(), ExportError> {
        let mut doc = json!({
            "type": "tool.call",
            "timestamp": epoch_now(),
            "name": tool_name,
            "durationMs": duration_ms,
        });
        if status == "error" || !error.is_empty() {
            doc["error"] = Value::String(if error.is_empty() {
                "unknown error".to_string()
            } else {
                error.to_string()
            });
        }
        self.write(&doc)
    }

    /// Record a generic event of an arbitrary type.
    pub fn log_event(
        &mut self,
        event_type: &str,
        duration_ms: f64,
        status: &str,
        error: &str,
    ) -> Result<(), ExportError> {
        let mut doc = json!({
            "type": event_type,
            "timestamp": epoch_now(),
            "durationMs": duration_ms,
        });
        if status == "error" || !error.is_empty() {
            doc["error"] = Value::String(if error.is_empty() {
                "unknown error".to_string()
            } else {
                error.to_string()
            });
        }
        self.write(&doc)
    }

    fn write(&mut self, doc: &Value) -> Result<(), ExportError> {
        let today = Utc::now().date_naive();
        if self.current_date != Some(today) || self.file.is_none() {
            let path = self.output_dir.join(event_file_name(today));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.file = Some(file);
            self.current_date = Some(today);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(serde_json::to_string(doc)?.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()?;
        }
        Ok(())
    }

    /// Close the output file. Idempotent.
    pub fn shutdown(&mut self) {
        if self.file.take().is_some() {
            info!("EventLogger shut down");
        }
    }
}
