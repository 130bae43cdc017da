use std::collections::{BTreeMap, HashMap};

use log::debug;
use sysinfo::Networks;

use super::Collector;
use crate::error::CollectorError;
use crate::samples::{epoch_now, MetricSample};

/// Cumulative byte counters observed on one interface in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Collects per-interface network counters and derived byte rates.
///
/// Counters are cumulative since boot and are emitted every cycle. Rates
/// need a baseline, so the first cycle after construction emits none; from
/// the second cycle onward a `bytes/s` rate is derived against the counters
/// recorded on the immediately preceding cycle. An interface that vanishes
/// between cycles loses its baseline rather than producing a bogus rate.
pub struct NetworkCollector {
    networks: Networks,
    interface: String,
    prev_counters: HashMap<String, InterfaceCounters>,
    prev_time: Option<f64>,
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name == "lo0"
}

impl NetworkCollector {
    /// `interface` restricts collection to a single interface when non-empty.
    /// If that interface is absent in a cycle, all interfaces are collected.
    pub fn new(interface: &str) -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            interface: interface.to_string(),
            prev_counters: HashMap::new(),
            prev_time: None,
        }
    }

    /// Produce samples from a snapshot of interface counters.
    ///
    /// Split out from [`Collector::collect`] so the rate derivation can be
    /// exercised with controlled counter values.
    fn collect_from_counters(
        &mut self,
        now: f64,
        counters: &[(String, InterfaceCounters)],
    ) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        let mut current: HashMap<String, InterfaceCounters> = HashMap::new();

        // Honor the restriction only when the named interface is present
        // this cycle; otherwise fall back to all interfaces
        let restrict = !self.interface.is_empty()
            && counters.iter().any(|(name, _)| *name == self.interface);
        if !self.interface.is_empty() && !restrict {
            debug!(
                "Interface {:?} not found, collecting all interfaces",
                self.interface
            );
        }

        for (iface, ctrs) in counters {
            if is_loopback(iface) {
                continue;
            }
            if restrict && *iface != self.interface {
                continue;
            }
            current.insert(iface.clone(), *ctrs);

            let mut labels = BTreeMap::new();
            labels.insert("interface".to_string(), iface.clone());

            samples.push(MetricSample::with_labels(
                "system.network.bytes_sent_total",
                ctrs.bytes_sent as f64,
                "bytes",
                now,
                labels.clone(),
                &format!("Total bytes sent on {iface}"),
            ));
            samples.push(MetricSample::with_labels(
                "system.network.bytes_recv_total",
                ctrs.bytes_recv as f64,
                "bytes",
                now,
                labels.clone(),
                &format!("Total bytes received on {iface}"),
            ));

            if let (Some(prev_time), Some(prev)) =
                (self.prev_time, self.prev_counters.get(iface))
            {
                let dt = now - prev_time;
                if dt > 0.0 {
                    let rate_sent =
                        ctrs.bytes_sent.saturating_sub(prev.bytes_sent) as f64 / dt;
                    let rate_recv =
                        ctrs.bytes_recv.saturating_sub(prev.bytes_recv) as f64 / dt;
                    samples.push(MetricSample::with_labels(
                        "system.network.bytes_sent_rate",
                        rate_sent,
                        "bytes/s",
                        now,
                        labels.clone(),
                        &format!("Send rate on {iface}"),
                    ));
                    samples.push(MetricSample::with_labels(
                        "system.network.bytes_recv_rate",
                        rate_recv,
                        "bytes/s",
                        now,
                        labels,
                        &format!("Receive rate on {iface}"),
                    ));
                }
            }
        }

        self.prev_counters = current;
        self.prev_time = Some(now);
        samples
    }
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
        self.networks.refresh_list();
        let now = epoch_now();
        let counters: Vec<(String, InterfaceCounters)> = self
            .networks
            .iter()
            .map(|(name, data)| {
                (
                    name.clone(),
                    InterfaceCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                    },
                )
            })
            .collect();
        Ok(self.collect_from_counters(now, &counters))
    }
}
