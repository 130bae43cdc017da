/// Error types for the tracing pipeline
pub mod error;

/// Metric sample type shared across the pipeline
pub mod samples;

/// Resource collectors and the collector manager
pub mod collectors;

/// Exporters that persist or forward metric samples
pub mod exporters;

/// Trace parsing, summaries and timeline correlation
pub mod analyzer;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{AnalyzeError, CollectorError, ConfigError, ExportError};
pub use samples::MetricSample;
