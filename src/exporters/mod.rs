//! Exporters that persist or forward collected metric samples
//!
//! Exporters own their output handle exclusively and define their own
//! durability policy; the collector manager only hands them batches.

use crate::error::ExportError;
use crate::samples::MetricSample;

/// Local JSONL file exporter with daily rollover
pub mod local;

/// Push exporter forwarding gauge snapshots over HTTP
pub mod push;

/// Writer for locally-traced LLM/tool action events
pub mod event_log;

pub use event_log::{EventLogger, LlmCallRecord};
pub use local::LocalExporter;
pub use push::PushExporter;

/// A consumer of sample batches that persists or forwards them.
pub trait Exporter: Send {
    /// Export a batch of metric samples.
    fn export(&mut self, samples: &[MetricSample]) -> Result<(), ExportError>;

    /// Flush and release resources. Must be idempotent.
    fn shutdown(&mut self) -> Result<(), ExportError>;
}
