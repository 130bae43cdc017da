use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use super::{Collector, CpuCollector, MemoryCollector, NetworkCollector, ProcessCollector};
use crate::config::CollectorConfig;
use crate::error::ExportError;
use crate::samples::MetricSample;

/// A batch consumer registered with the manager.
pub type Sink = Box<dyn FnMut(&[MetricSample]) -> Result<(), ExportError> + Send>;

/// Upper bound on how long `stop()` waits for the background thread.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct ManagerInner {
    collectors: Vec<Box<dyn Collector>>,
    sinks: Vec<Sink>,
}

impl ManagerInner {
    /// Run every collector once and concatenate the results.
    ///
    /// A failing collector is logged and excluded from this cycle's batch;
    /// the remaining collectors still run.
    fn collect_once(&mut self) -> Vec<MetricSample> {
        let mut all_samples = Vec::new();
        for collector in &mut self.collectors {
            match collector.collect() {
                Ok(samples) => all_samples.extend(samples),
                Err(err) => error!("Collector {} failed: {err}", collector.name()),
            }
        }
        all_samples
    }

    /// Invoke sinks in registration order, isolating failures.
    fn dispatch(&mut self, samples: &[MetricSample]) {
        for sink in &mut self.sinks {
            if let Err(err) = sink(samples) {
                error!("Sink failed: {err}");
            }
        }
    }
}

/// Schedules resource collectors on an interval and fans samples out to
/// registered sinks.
///
/// Instantiate with a [`CollectorConfig`], register sinks via
/// [`add_sink`](Self::add_sink), then call [`start`](Self::start) /
/// [`stop`](Self::stop). [`collect_once`](Self::collect_once) can also be
/// driven synchronously, e.g. from tests.
pub struct CollectorManager {
    inner: Arc<Mutex<ManagerInner>>,
    interval: Duration,
    enabled: bool,
    stop_tx: Option<Sender<()>>,
    // Dropped by the background thread on exit, so the receiver observes
    // termination without an unbounded join
    done_rx: Option<Receiver<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CollectorManager {
    pub fn new(config: &CollectorConfig) -> Self {
        let mut collectors: Vec<Box<dyn Collector>> = Vec::new();
        if config.cpu {
            collectors.push(Box::new(CpuCollector::new()));
        }
        if config.memory {
            collectors.push(Box::new(MemoryCollector::new()));
        }
        if config.network {
            collectors.push(Box::new(NetworkCollector::new(&config.network_interface)));
        }
        if config.process_filter_enabled {
            collectors.push(Box::new(ProcessCollector::new(&config.process_name)));
        }

        Self {
            inner: Arc::new(Mutex::new(ManagerInner {
                collectors,
                sinks: Vec::new(),
            })),
            interval: Duration::from_secs_f64(config.interval_seconds.max(0.1)),
            enabled: config.enabled,
            stop_tx: None,
            done_rx: None,
            thread: None,
        }
    }

    /// Build a manager directly from collectors, bypassing configuration.
    pub fn with_collectors(collectors: Vec<Box<dyn Collector>>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManagerInner {
                collectors,
                sinks: Vec::new(),
            })),
            interval,
            enabled: true,
            stop_tx: None,
            done_rx: None,
            thread: None,
        }
    }

    /// Register a callback to receive each cycle's batch. Sinks are invoked
    /// in registration order.
    pub fn add_sink(&self, sink: Sink) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.sinks.push(sink);
    }

    /// Run all collectors once and return the aggregated samples. Sinks are
    /// not invoked.
    pub fn collect_once(&self) -> Vec<MetricSample> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.collect_once()
    }

    /// Start collecting in the background. Idempotent: a second call while
    /// already running is a no-op.
    pub fn start(&mut self) {
        if !self.enabled {
            info!("Collection disabled by configuration");
            return;
        }
        if self.thread.is_some() {
            info!("CollectorManager already running, skipping start");
            return;
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let interval = self.interval;
        let handle = thread::spawn(move || {
            Self::run(inner, interval, stop_rx);
            drop(done_tx);
        });

        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);
        self.thread = Some(handle);
        info!(
            "CollectorManager started (interval={:.1}s)",
            self.interval.as_secs_f64()
        );
    }

    /// Signal the background loop to terminate and wait for it to exit,
    /// up to a bounded timeout. Safe to call even if never started.
    pub fn stop(&mut self) {
        self.stop_with_timeout(JOIN_TIMEOUT);
    }

    fn stop_with_timeout(&mut self, timeout: Duration) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let Some(handle) = self.thread.take() else {
            return;
        };
        let exited = match self.done_rx.take() {
            // Disconnected means the thread dropped its end, i.e. exited
            Some(done_rx) => !matches!(
                done_rx.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            ),
            None => true,
        };
        if exited {
            if handle.join().is_err() {
                warn!("Collector thread panicked before joining");
            }
            info!("CollectorManager stopped");
        } else {
            // A collector is stuck in a system query; detach rather than
            // hold shutdown hostage
            warn!(
                "Collector thread did not exit within {:.1}s, detaching",
                timeout.as_secs_f64()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Background loop: one collection cycle, sink dispatch, then an
    /// interruptible wait. `stop()` wakes the wait immediately so shutdown
    /// latency is bounded by the cycle work, not the interval.
    fn run(inner: Arc<Mutex<ManagerInner>>, interval: Duration, stop_rx: Receiver<()>) {
        loop {
            {
                let mut inner = match inner.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let samples = inner.collect_once();
                inner.dispatch(&samples);
            }
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

impl Drop for CollectorManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use crate::samples::MetricSample;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct FixedCollector {
        name: &'static str,
        count: usize,
    }

    impl Collector for FixedCollector {
        fn name(&self) -> &str {
            self.name
        }

        fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
            Ok((0..self.count)
                .map(|i| {
                    MetricSample::new(&format!("{}.metric_{i}", self.name), i as f64, "1", 1.0, "")
                })
                .collect())
        }
    }

    struct SlowCollector {
        delay: Duration,
    }

    impl Collector for SlowCollector {
        fn name(&self) -> &str {
            "slow"
        }

        fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
            thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }

    struct FailingCollector;

    impl Collector for FailingCollector {
        fn name(&self) -> &str {
            "failing"
        }

        fn collect(&mut self) -> Result<Vec<MetricSample>, CollectorError> {
            Err(CollectorError::SystemQuery("boom".to_string()))
        }
    }

    #[test]
    fn test_collect_once_concatenates_in_registration_order() {
        let manager = CollectorManager::with_collectors(
            vec![
                Box::new(FixedCollector { name: "a", count: 2 }),
                Box::new(FixedCollector { name: "b", count: 1 }),
            ],
            Duration::from_secs(60),
        );
        let samples = manager.collect_once();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.metric_0", "a.metric_1", "b.metric_0"]);
    }

    #[test]
    fn test_failing_collector_is_isolated() {
        let manager = CollectorManager::with_collectors(
            vec![
                Box::new(FailingCollector),
                Box::new(FixedCollector { name: "ok", count: 1 }),
            ],
            Duration::from_secs(60),
        );
        let samples = manager.collect_once();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "ok.metric_0");
    }

    #[test]
    fn test_failing_sink_does_not_abort_other_sinks() {
        let manager = CollectorManager::with_collectors(
            vec![Box::new(FixedCollector { name: "a", count: 1 })],
            Duration::from_millis(10),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        manager.add_sink(Box::new(|_samples| {
            Err(ExportError::PushFailed("down".to_string()))
        }));
        let calls_clone = Arc::clone(&calls);
        manager.add_sink(Box::new(move |samples| {
            calls_clone.fetch_add(samples.len(), Ordering::SeqCst);
            Ok(())
        }));

        let mut manager = manager;
        manager.start();
        thread::sleep(Duration::from_millis(50));
        manager.stop();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_start_is_idempotent_and_stop_is_safe_unstarted() {
        let mut manager = CollectorManager::with_collectors(vec![], Duration::from_secs(60));
        manager.stop(); // never started

        manager.start();
        assert!(manager.is_running());
        manager.start(); // no-op
        assert!(manager.is_running());
        manager.stop();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_stop_latency_not_bounded_by_interval() {
        let mut manager = CollectorManager::with_collectors(
            vec![Box::new(FixedCollector { name: "a", count: 1 })],
            Duration::from_secs(3600),
        );
        manager.start();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        manager.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_stop_detaches_when_cycle_hangs() {
        let mut manager = CollectorManager::with_collectors(
            vec![Box::new(SlowCollector {
                delay: Duration::from_secs(2),
            })],
            Duration::from_millis(1),
        );
        manager.start();
        // let a collection cycle get under way
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        manager.stop_with_timeout(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!manager.is_running());
    }

    #[test]
    fn test_sinks_observe_batches_in_cycle_order() {
        let manager = CollectorManager::with_collectors(
            vec![Box::new(FixedCollector { name: "a", count: 1 })],
            Duration::from_millis(5),
        );
        let batches: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let batches_clone = Arc::clone(&batches);
        manager.add_sink(Box::new(move |samples| {
            batches_clone.lock().unwrap().push(samples.len());
            Ok(())
        }));

        let mut manager = manager;
        manager.start();
        thread::sleep(Duration::from_millis(40));
        manager.stop();

        let seen = batches.lock().unwrap();
        assert!(seen.len() >= 2);
        assert!(seen.iter().all(|&n| n == 1));
    }
}
