//! Trace analysis: parsing persisted data, summary statistics and the
//! event/resource correlation timelines.

/// Parsers for persisted event and resource files
pub mod parser;

/// Per-session and multi-session summary statistics
pub mod summary;

/// Unified and action-oriented timeline construction
pub mod timeline;

pub use parser::{load_trace_dir, ResourceSample, TraceEvent, TraceFileKind};
pub use summary::{summarize_multi_session, summarize_session, MultiSessionSummary, SessionSummary};
pub use timeline::{build_action_timeline, build_timeline, ActionTimelineRow, TimelineEntry};
