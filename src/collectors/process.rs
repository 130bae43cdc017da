use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use procfs::process::Process;
use procfs::Current;

use super::Collector;
use crate::error::CollectorError;
use crate::samples::{epoch_now, MetricSample};

/// Previous-cycle CPU accounting for one PID.
///
/// CPU percent is a derivative: it needs the ticks and wall time recorded
/// on the previous observation of the same PID.
#[derive(Debug, Clone, Copy)]
struct PidState {
    prev_ticks: u64,
    prev_time: f64,
}

/// Return PIDs whose process name or first command-line argument contains
/// `target`, case-insensitively.
pub fn find_pids_by_name(target: &str) -> Vec<i32> {
    let target = target.to_lowercase();
    let mut pids = Vec::new();
    let procs = match procfs::process::all_processes() {
        Ok(procs) => procs,
        Err(err) => {
            debug!("Failed to enumerate processes: {err}");
            return pids;
        }
    };
    for proc in procs.flatten() {
        let comm = proc
            .stat()
            .map(|s| s.comm.to_lowercase())
            .unwrap_or_default();
        let cmd0 = proc
            .cmdline()
            .ok()
            .and_then(|c| c.into_iter().next())
            .unwrap_or_default()
            .to_lowercase();
        if (!comm.is_empty() && comm.contains(target.as_str()))
            || (!cmd0.is_empty() && cmd0.contains(target.as_str()))
        {
            pids.push(proc.pid());
        }
    }
    pids
}

/// Collects per-process CPU, memory and I/O metrics for a target name.
///
/// PIDs are re-resolved on every cycle so a restarted process is picked up
/// without pinning to a stale PID. A cache of per-PID CPU accounting is
/// kept because CPU percent needs a warm baseline; entries for PIDs no
/// longer in the live match set are evicted each cycle.
pub struct ProcessCollector {
    process_name: String,
    cache: HashMap<i32, PidState>,
}

impl ProcessCollector {
    pub fn new(process_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
            cache: HashMap::new(),
        }
    }

    fn evict_stale(&mut self, live: &HashSet<i32>) {
        self.cache.retain(|pid, _| live.contains(pid));
    }

    fn cpu_percent(&mut self, pid: i32, ticks: u64, now: f64) -> f64 {
        let pct = match self.cache.get(&pid) {
            Some(state) => {
                let dt = now - state.prev_time;
                if dt > 0.0 {
                    let delta = ticks.saturating_sub(state.prev_ticks);
                    delta as f64 / procfs::ticks_per_second() as f64 / dt * 100.0
                } else {
                    0.0
                }
            }
            // First observation of this PID: record the baseline, report 0
            None => 0.0,
        };
        self.cache.insert(
            pid,
            PidState {
                prev_ticks: ticks,
                prev_time: now,
            },
        );
        pct
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
        let now = epoch_now();
        let mut samples = Vec::new();

        let pids = find_pids_by_name(&self.process_name);
        if pids.is_empty() {
            debug!("No process found matching {:?}", self.process_name);
            return Ok(samples);
        }

        let live: HashSet<i32> = pids.iter().copied().collect();
        self.evict_stale(&live);

        let mem_total = procfs::Meminfo::current().ok().map(|m| m.mem_total);
        let page_size = procfs::page_size();

        for pid in pids {
            let proc = match Process::new(pid) {
                Ok(proc) => proc,
                Err(err) => {
                    // Exited or inaccessible mid-cycle: skip this PID only
                    debug!("Process {pid} gone: {err}");
                    self.cache.remove(&pid);
                    continue;
                }
            };
            let stat = match proc.stat() {
                Ok(stat) => stat,
                Err(err) => {
                    debug!("Failed to stat pid {pid}: {err}");
                    self.cache.remove(&pid);
                    continue;
                }
            };

            let mut labels = BTreeMap::new();
            labels.insert("pid".to_string(), pid.to_string());
            labels.insert("process_name".to_string(), self.process_name.clone());

            let cpu = self.cpu_percent(pid, stat.utime + stat.stime, now);
            samples.push(MetricSample::with_labels(
                "process.cpu.usage_percent",
                cpu,
                "%",
                now,
                labels.clone(),
                &format!("CPU usage for {} (pid {pid})", self.process_name),
            ));

            let rss_bytes = stat.rss.saturating_mul(page_size) as f64;
            samples.push(MetricSample::with_labels(
                "process.memory.rss_bytes",
                rss_bytes,
                "bytes",
                now,
                labels.clone(),
                &format!("RSS for {} (pid {pid})", self.process_name),
            ));
            samples.push(MetricSample::with_labels(
                "process.memory.vms_bytes",
                stat.vsize as f64,
                "bytes",
                now,
                labels.clone(),
                &format!("VMS for {} (pid {pid})", self.process_name),
            ));

            if let Some(total) = mem_total {
                if total > 0 {
                    samples.push(MetricSample::with_labels(
                        "process.memory.usage_percent",
                        rss_bytes / total as f64 * 100.0,
                        "%",
                        now,
                        labels.clone(),
                        &format!("Memory % for {} (pid {pid})", self.process_name),
                    ));
                }
            }

            // I/O counters may be unreadable without privileges
            if let Ok(io) = proc.io() {
                samples.push(MetricSample::with_labels(
                    "process.io.read_bytes",
                    io.read_bytes as f64,
                    "bytes",
                    now,
                    labels.clone(),
                    &format!("IO read bytes for {} (pid {pid})", self.process_name),
                ));
                samples.push(MetricSample::with_labels(
                    "process.io.write_bytes",
                    io.write_bytes as f64,
                    "bytes",
                    now,
                    labels,
                    &format!("IO write bytes for {} (pid {pid})", self.process_name),
                ));
            }
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_comm() -> String {
        Process::myself().unwrap().stat().unwrap().comm
    }

    #[test]
    fn test_find_pids_matches_own_process() {
        let pids = find_pids_by_name(&own_comm());
        let me = std::process::id() as i32;
        assert!(pids.contains(&me));
    }

    #[test]
    fn test_collect_emits_labeled_samples_for_own_process() {
        let mut collector = ProcessCollector::new(&own_comm());
        let samples = collector.collect().unwrap();
        assert!(!samples.is_empty());

        let me = std::process::id().to_string();
        let mine: Vec<_> = samples
            .iter()
            .filter(|s| s.labels.get("pid") == Some(&me))
            .collect();
        assert!(mine.iter().any(|s| s.name == "process.cpu.usage_percent"));
        assert!(mine.iter().any(|s| s.name == "process.memory.rss_bytes"));
        assert!(mine.iter().any(|s| s.name == "process.memory.vms_bytes"));
        assert!(mine
            .iter()
            .all(|s| s.labels.get("process_name").is_some()));
    }

    #[test]
    fn test_stale_pid_evicted_on_collect() {
        let mut collector = ProcessCollector::new(&own_comm());
        collector.cache.insert(
            999_999_999,
            PidState {
                prev_ticks: 0,
                prev_time: 0.0,
            },
        );

        collector.collect().unwrap();
        assert!(!collector.cache.contains_key(&999_999_999));
        // Our own PID was observed and is now warm
        assert!(collector.cache.contains_key(&(std::process::id() as i32)));
    }

    #[test]
    fn test_cpu_percent_uses_previous_cycle_baseline() {
        let mut collector = ProcessCollector::new("irrelevant");
        let tps = procfs::ticks_per_second();

        // First observation primes the cache and reports zero
        assert_eq!(collector.cpu_percent(42, 100, 10.0), 0.0);
        // One full core over two seconds
        let pct = collector.cpu_percent(42, 100 + tps * 2, 12.0);
        assert!((pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_match_returns_empty_batch() {
        let mut collector = ProcessCollector::new("no-such-process-zzqy");
        let samples = collector.collect().unwrap();
        assert!(samples.is_empty());
    }
}
