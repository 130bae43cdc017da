use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use clawtrace::analyzer::{
    build_action_timeline, build_timeline, load_trace_dir, summarize_session,
};
use clawtrace::analyzer::summary::save_summary;
use clawtrace::analyzer::timeline::{save_action_timeline, save_timeline};
use clawtrace::collectors::CollectorManager;
use clawtrace::config::{diagnostics_config, Config, Mode};
use clawtrace::exporters::{EventLogger, Exporter, LlmCallRecord, LocalExporter, PushExporter};

/// Command-line arguments for the resource collection and trace
/// correlation tool.
#[derive(Parser)]
#[command(
    name = "clawtrace",
    about = "Resource collection and timeline correlation for OpenClaw workloads",
    long_about = "Samples system and per-process resource metrics alongside OpenClaw trace \
                  events, persists both as daily JSONL files, and reconstructs correlated \
                  summaries and timelines from the persisted data."
)]
struct Cli {
    /// Configuration file path (YAML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the resource collector until interrupted
    Collect,

    /// Analyze persisted trace data: summary, unified timeline, action timeline
    Analyze {
        /// Directory holding events-*.jsonl and resources-*.jsonl files
        #[arg(long, value_name = "DIR")]
        trace_dir: Option<PathBuf>,

        /// Suppress the plain-text tables, write JSON artifacts only
        #[arg(long)]
        no_table: bool,
    },

    /// Append one trace event to today's local event file
    LogEvent {
        /// Event type, e.g. model.usage, tool.call or any custom name
        #[arg(long = "type", value_name = "TYPE")]
        event_type: String,

        /// Model identifier (model.usage events)
        #[arg(long, default_value = "")]
        model: String,

        /// Provider name (model.usage events)
        #[arg(long, default_value = "")]
        provider: String,

        /// Tool name (tool.call events)
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value_t = 0)]
        tokens_input: i64,

        #[arg(long, default_value_t = 0)]
        tokens_output: i64,

        #[arg(long, default_value_t = 0.0)]
        duration_ms: f64,

        #[arg(long, default_value_t = 0.0)]
        cost_usd: f64,

        #[arg(long, default_value = "ok")]
        status: String,

        #[arg(long, default_value = "")]
        error: String,

        #[arg(long, default_value = "")]
        session_id: String,
    },

    /// Emit the OpenClaw diagnostics configuration pointing at this collector
    GenerateConfig {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Collect => run_collect(&config),
        Command::Analyze {
            trace_dir,
            no_table,
        } => run_analyze(&config, trace_dir.as_deref(), no_table),
        Command::LogEvent {
            event_type,
            model,
            provider,
            name,
            tokens_input,
            tokens_output,
            duration_ms,
            cost_usd,
            status,
            error,
            session_id,
        } => run_log_event(
            &config,
            &event_type,
            &LlmCallRecord {
                model,
                provider,
                tokens_input,
                tokens_output,
                duration_ms,
                cost_usd,
                status,
                error,
                session_id,
            },
            &name,
        ),
        Command::GenerateConfig { output } => run_generate_config(&config, output.as_deref()),
    }
}

/// Run the collector daemon until SIGINT.
fn run_collect(config: &Config) -> anyhow::Result<()> {
    if !config.collector.enabled {
        warn!("Collector is disabled in configuration, nothing to do");
        return Ok(());
    }

    let mut manager = CollectorManager::new(&config.collector);

    let mut local = None;
    if config.local_exporter.enabled {
        let exporter = Arc::new(Mutex::new(
            LocalExporter::new(&config.local_exporter).context("failed to open local exporter")?,
        ));
        local = Some(Arc::clone(&exporter));
        manager.add_sink(Box::new(move |samples| {
            let mut exporter = exporter
                .lock()
                .map_err(|e| clawtrace::ExportError::PushFailed(e.to_string()))?;
            exporter.export(samples)
        }));
        info!(
            "Local exporter enabled -> {}",
            config.local_exporter.output_dir
        );
    }

    let mut push = None;
    if config.mode == Mode::Online {
        let exporter = Arc::new(Mutex::new(PushExporter::new(&config.push)));
        push = Some(Arc::clone(&exporter));
        manager.add_sink(Box::new(move |samples| {
            let mut exporter = exporter
                .lock()
                .map_err(|e| clawtrace::ExportError::PushFailed(e.to_string()))?;
            exporter.export(samples)
        }));
        info!("Push exporter enabled -> {}", config.push.endpoint);
    }

    manager.start();

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        let _ = shutdown_tx.send(());
    })
    .context("failed to install SIGINT handler")?;

    info!(
        "Collector running every {:.1}s. Press Ctrl+C to stop.",
        config.collector.interval_seconds
    );
    let _ = shutdown_rx.recv();

    manager.stop();
    if let Some(local) = local {
        if let Ok(mut exporter) = local.lock() {
            if let Err(e) = exporter.shutdown() {
                error!("Local exporter shutdown failed: {e}");
            }
        }
    }
    if let Some(push) = push {
        if let Ok(mut exporter) = push.lock() {
            if let Err(e) = exporter.shutdown() {
                error!("Push exporter shutdown failed: {e}");
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Analyze persisted trace data and write the summary and timeline artifacts.
fn run_analyze(
    config: &Config,
    trace_dir: Option<&Path>,
    no_table: bool,
) -> anyhow::Result<()> {
    let trace_dir = trace_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.analyzer.trace_dir));
    let (events, resources) = load_trace_dir(&trace_dir);
    info!(
        "Loaded {} events and {} resource samples from {}",
        events.len(),
        resources.len(),
        trace_dir.display()
    );

    let session_id = trace_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let summary = summarize_session(&events, &resources, &session_id);
    let timeline = build_timeline(&events, &resources);
    let actions = build_action_timeline(&events, &resources, config.analyzer.window_seconds);

    let out_dir = PathBuf::from(&config.analyzer.summary_output);
    save_summary(&summary, &out_dir.join("summary.json"))?;
    save_timeline(&timeline, &out_dir.join("timeline.json"))?;
    save_action_timeline(&actions, &out_dir.join("action_timeline.json"))?;
    info!("Wrote analysis artifacts to {}", out_dir.display());

    if !no_table {
        print_summary(&summary);
        print_action_table(&actions);
    }
    Ok(())
}

fn print_summary(summary: &clawtrace::analyzer::SessionSummary) {
    println!("Session summary: {}", summary.session_id);
    println!("  events:          {}", summary.event_count);
    println!("  model calls:     {}", summary.model_calls);
    println!(
        "  tokens:          {} in / {} out / {} total",
        summary.total_tokens_input, summary.total_tokens_output, summary.total_tokens
    );
    println!("  cost:            ${:.4}", summary.total_cost_usd);
    println!(
        "  latency ms:      avg {:.1}  p50 {:.1}  p95 {:.1}  p99 {:.1}  max {:.1}",
        summary.avg_latency_ms,
        summary.p50_latency_ms,
        summary.p95_latency_ms,
        summary.p99_latency_ms,
        summary.max_latency_ms
    );
    println!(
        "  errors:          {} ({:.1}%)",
        summary.error_count,
        summary.error_rate * 100.0
    );
    println!("  models:          {}", summary.models_used.join(", "));
    println!(
        "  cpu %:           avg {:.1}  max {:.1}",
        summary.avg_cpu_percent, summary.max_cpu_percent
    );
    println!(
        "  memory %:        avg {:.1}  max {:.1}",
        summary.avg_memory_percent, summary.max_memory_percent
    );
    println!(
        "  net recv rate:   avg {:.0} B/s  max {:.0} B/s",
        summary.avg_network_recv_rate, summary.max_network_recv_rate
    );
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "-".to_string(),
    }
}

fn print_action_table(rows: &[clawtrace::analyzer::ActionTimelineRow]) {
    if rows.is_empty() {
        println!("No action events found.");
        return;
    }
    println!();
    println!(
        "{:>12}  {:<32}  {:>10}  {:>8}  {:>8}  {:>8}  {:>10}  {:<6}",
        "rel ms", "action", "dur ms", "tokens", "cpu %", "mem %", "proc cpu %", "status"
    );
    for row in rows {
        println!(
            "{:>12.1}  {:<32}  {:>10.1}  {:>8}  {:>8}  {:>8}  {:>10}  {:<6}",
            row.relative_ms,
            row.action,
            row.duration_ms,
            row.tokens_total,
            fmt_opt(row.cpu_percent),
            fmt_opt(row.memory_percent),
            fmt_opt(row.process_cpu_percent),
            row.status
        );
    }
}

/// Append a single event to today's local event file.
fn run_log_event(
    config: &Config,
    event_type: &str,
    record: &LlmCallRecord,
    tool_name: &str,
) -> anyhow::Result<()> {
    let mut logger = EventLogger::new(&config.local_exporter.output_dir)
        .context("failed to open event logger")?;
    match event_type {
        "model.usage" => logger.log_llm_call(record)?,
        "tool.call" => {
            logger.log_tool_call(tool_name, record.duration_ms, &record.status, &record.error)?
        }
        other => logger.log_event(other, record.duration_ms, &record.status, &record.error)?,
    }
    logger.shutdown();
    info!("Logged {event_type} event");
    Ok(())
}

/// Print or write the OpenClaw diagnostics configuration document.
fn run_generate_config(config: &Config, output: Option<&Path>) -> anyhow::Result<()> {
    let doc = serde_json::to_string_pretty(&diagnostics_config(&config.openclaw))?;
    match output {
        Some(path) => {
            std::fs::write(path, doc).with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote diagnostics config to {}", path.display());
        }
        None => println!("{doc}"),
    }
    Ok(())
}
