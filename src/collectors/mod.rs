//! Resource collectors for system and per-process metrics
//!
//! Each collector produces a batch of [`MetricSample`]s per invocation.
//! Collectors that need a previous-cycle baseline (network rates, process
//! CPU percent) own their state exclusively; a given instance must not be
//! driven from two threads at once.

use crate::error::CollectorError;
use crate::samples::MetricSample;

/// CPU usage collector
pub mod cpu;

/// Memory and swap collector
pub mod memory;

/// Network interface counter and rate collector
pub mod network;

/// Per-process collector with PID re-resolution
pub mod process;

/// Collector manager and scheduling loop
pub mod manager;

pub use cpu::CpuCollector;
pub use manager::CollectorManager;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use process::ProcessCollector;

/// A unit producing a batch of samples from one resource domain.
pub trait Collector: Send {
    /// Collector name used in configuration and logs.
    fn name(&self) -> &str;

    /// Collect current resource metrics.
    fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError>;
}
