use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::SourceResult;
use super::history::{UsageHistory, clamp_percent};
use super::sampler::{MemorySampler, NOT_AVAILABLE};
use crate::format::format_process_memory;
use crate::shutdown::spawn_periodic;

pub const DEFAULT_PROCESS_CACHE_AGE: Duration = Duration::from_secs(5);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// System memory figures in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub free_kb: u64,
    pub cached_kb: u64,
    pub buffers_kb: u64,
}

impl MemInfo {
    pub fn usage_percent(&self) -> f32 {
        if self.total_kb == 0 {
            return 0.0;
        }
        let used = self.total_kb - self.available_kb.min(self.total_kb);
        clamp_percent((used as f64 / self.total_kb as f64 * 100.0) as f32)
    }

    pub fn remaining_mb(&self) -> f32 {
        (self.available_kb as f64 / 1024.0) as f32
    }
}

/// Process name to resident set size (kB).
///
/// Rebuilt as a whole on every refresh and published behind an `Arc`, so
/// readers never observe a half-populated table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMemoryTable {
    rss_kb: HashMap<String, u64>,
}

impl ProcessMemoryTable {
    /// Processes sharing a name keep the largest resident size seen.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut rss_kb: HashMap<String, u64> = HashMap::new();
        for (name, rss) in entries {
            let slot = rss_kb.entry(name).or_default();
            *slot = (*slot).max(rss);
        }
        Self { rss_kb }
    }

    /// Largest consumer. Ties resolve in map iteration order.
    pub fn top(&self) -> Option<(&str, u64)> {
        self.rss_kb
            .iter()
            .max_by_key(|(_, rss)| **rss)
            .map(|(name, rss)| (name.as_str(), *rss))
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.rss_kb.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.rss_kb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rss_kb.is_empty()
    }
}

/// Raw per-OS memory readings.
pub trait MemorySource: Send + Sync {
    fn meminfo(&self) -> SourceResult<MemInfo>;
    fn processes(&self) -> SourceResult<ProcessMemoryTable>;
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryOptions {
    pub history_capacity: usize,
    pub process_cache_age: Duration,
    pub refresh_interval: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            history_capacity: super::history::DEFAULT_CAPACITY,
            process_cache_age: DEFAULT_PROCESS_CACHE_AGE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct MemoryState {
    latest: Option<MemInfo>,
    history: UsageHistory,
    processes: Arc<ProcessMemoryTable>,
    refreshed_at: Option<Instant>,
    /// Set while one caller enumerates processes outside the lock.
    refreshing: bool,
}

impl MemoryState {
    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.refreshed_at
            .is_none_or(|at| now.saturating_duration_since(at) > max_age)
    }
}

struct Shared<S> {
    source: S,
    state: Mutex<MemoryState>,
    cache_age: Duration,
}

impl<S: MemorySource> Shared<S> {
    fn read_meminfo(&self) -> Option<MemInfo> {
        match self.source.meminfo() {
            Ok(info) => {
                self.state.lock().latest = Some(info);
                Some(info)
            }
            Err(err) => {
                warn!(%err, "failed to read memory info");
                None
            }
        }
    }

    fn record_usage(&self) {
        if let Some(info) = self.read_meminfo() {
            let usage = info.usage_percent();
            self.state.lock().history.push(usage);
            debug!(usage, "memory usage sampled");
        }
    }

    /// Rebuild the process table when it is older than the cache age.
    ///
    /// Enumeration runs without the lock; only the swap is locked. A caller
    /// arriving while another enumeration is in flight keeps the prior table.
    fn refresh_processes_if_stale(&self, now: Instant) {
        {
            let mut state = self.state.lock();
            if state.refreshing || !state.is_stale(now, self.cache_age) {
                return;
            }
            state.refreshing = true;
        }
        let table = match self.source.processes() {
            Ok(table) => table,
            Err(err) => {
                warn!(%err, "failed to enumerate process memory");
                ProcessMemoryTable::default()
            }
        };
        debug!(processes = table.len(), "process memory table rebuilt");
        let mut state = self.state.lock();
        state.processes = Arc::new(table);
        state.refreshed_at = Some(now);
        state.refreshing = false;
    }
}

/// Memory sampler with a background refresher.
///
/// The refresher is the only writer of the usage history and keeps the
/// process table warm; queries read the OS inline for current figures and
/// rebuild the process table themselves if the refresher has fallen behind.
pub struct MemoryMonitor<S: MemorySource + 'static> {
    shared: Arc<Shared<S>>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl<S: MemorySource + 'static> MemoryMonitor<S> {
    pub fn start(source: S, options: MemoryOptions, token: CancellationToken) -> Self {
        let shared = Arc::new(Shared {
            source,
            state: Mutex::new(MemoryState {
                latest: None,
                history: UsageHistory::new(options.history_capacity),
                processes: Arc::new(ProcessMemoryTable::default()),
                refreshed_at: None,
                refreshing: false,
            }),
            cache_age: options.process_cache_age,
        });

        shared.record_usage();
        shared.refresh_processes_if_stale(Instant::now());

        let worker_shared = Arc::clone(&shared);
        let worker = spawn_periodic(
            "resmon-memory",
            options.refresh_interval,
            token.clone(),
            move || {
                worker_shared.record_usage();
                worker_shared.refresh_processes_if_stale(Instant::now());
            },
        );

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%err, "memory refresher thread failed to start; sampling on demand only");
                None
            }
        };

        Self {
            shared,
            token,
            worker,
        }
    }

    pub fn latest(&self) -> Option<MemInfo> {
        self.shared.state.lock().latest
    }

    pub fn history_len(&self) -> usize {
        self.shared.state.lock().history.len()
    }
}

impl<S: MemorySource + 'static> MemorySampler for MemoryMonitor<S> {
    fn total_usage(&self) -> f32 {
        self.shared
            .read_meminfo()
            .map(|info| info.usage_percent())
            .unwrap_or(0.0)
    }

    fn remaining_ram(&self) -> f32 {
        self.shared
            .read_meminfo()
            .map(|info| info.remaining_mb())
            .unwrap_or(0.0)
    }

    fn average_usage(&self) -> f32 {
        self.shared.state.lock().history.average()
    }

    fn most_using_process(&self) -> String {
        self.shared.refresh_processes_if_stale(Instant::now());
        let table = Arc::clone(&self.shared.state.lock().processes);
        match table.top() {
            Some((name, rss_kb)) => format_process_memory(name, rss_kb),
            None => NOT_AVAILABLE.to_string(),
        }
    }
}

impl<S: MemorySource + 'static> Drop for MemoryMonitor<S> {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("memory refresher thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::error::SourceError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    struct FakeSource {
        info: Mutex<SourceResult<MemInfo>>,
        table: Vec<(String, u64)>,
        enumerations: AtomicUsize,
        slow: AtomicBool,
    }

    impl FakeSource {
        fn new(total_kb: u64, available_kb: u64) -> Self {
            Self {
                info: Mutex::new(Ok(MemInfo {
                    total_kb,
                    available_kb,
                    ..MemInfo::default()
                })),
                table: vec![
                    ("postgres".to_string(), 262_144),
                    ("firefox".to_string(), 1_048_576),
                    ("bash".to_string(), 4_096),
                ],
                enumerations: AtomicUsize::new(0),
                slow: AtomicBool::new(false),
            }
        }
    }

    impl MemorySource for Arc<FakeSource> {
        fn meminfo(&self) -> SourceResult<MemInfo> {
            match &*self.info.lock() {
                Ok(info) => Ok(*info),
                Err(_) => Err(SourceError::malformed("fake", "broken")),
            }
        }

        fn processes(&self) -> SourceResult<ProcessMemoryTable> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            if self.slow.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(150));
            }
            Ok(ProcessMemoryTable::from_entries(self.table.clone()))
        }
    }

    fn slow_options() -> MemoryOptions {
        MemoryOptions {
            history_capacity: 100,
            process_cache_age: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn usage_and_remaining_from_meminfo() {
        let info = MemInfo {
            total_kb: 8_000_000,
            available_kb: 2_000_000,
            ..MemInfo::default()
        };
        assert!((info.usage_percent() - 75.0).abs() < 1e-4);
        assert!((info.remaining_mb() - 1953.125).abs() < 0.01);
    }

    #[test]
    fn zero_total_is_zero_usage() {
        assert_eq!(MemInfo::default().usage_percent(), 0.0);
    }

    #[test]
    fn duplicate_names_keep_largest() {
        let table = ProcessMemoryTable::from_entries(vec![
            ("chrome".to_string(), 100),
            ("chrome".to_string(), 300),
            ("chrome".to_string(), 200),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("chrome"), Some(300));
    }

    #[test]
    fn monitor_reports_top_process() {
        let source = Arc::new(FakeSource::new(8_000_000, 2_000_000));
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), slow_options(), CancellationToken::new());
        assert!((monitor.total_usage() - 75.0).abs() < 1e-4);
        assert!((monitor.remaining_ram() - 1953.125).abs() < 0.01);
        assert_eq!(monitor.most_using_process(), "firefox (1024.00 MB)");
        assert!((monitor.average_usage() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn process_table_is_cached_between_queries() {
        let source = Arc::new(FakeSource::new(1000, 500));
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), slow_options(), CancellationToken::new());
        for _ in 0..5 {
            monitor.most_using_process();
        }
        assert_eq!(source.enumerations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_table_is_rebuilt_on_query() {
        let source = Arc::new(FakeSource::new(1000, 500));
        let options = MemoryOptions {
            process_cache_age: Duration::from_millis(10),
            ..slow_options()
        };
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), options, CancellationToken::new());
        thread::sleep(Duration::from_millis(30));
        monitor.most_using_process();
        assert_eq!(source.enumerations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_stale_queries_enumerate_once() {
        let source = Arc::new(FakeSource::new(1000, 500));
        let options = MemoryOptions {
            process_cache_age: Duration::ZERO,
            ..slow_options()
        };
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), options, CancellationToken::new());
        source.slow.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));

        thread::scope(|scope| {
            let rebuilding = scope.spawn(|| monitor.most_using_process());
            thread::sleep(Duration::from_millis(30));
            // The in-flight rebuild is not duplicated; the prior table answers.
            assert_eq!(monitor.most_using_process(), "firefox (1024.00 MB)");
            assert_eq!(rebuilding.join().unwrap(), "firefox (1024.00 MB)");
        });
        assert_eq!(source.enumerations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_reads_degrade_to_zero() {
        let source = Arc::new(FakeSource::new(1000, 500));
        *source.info.lock() = Err(SourceError::malformed("fake", "broken"));
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), slow_options(), CancellationToken::new());
        assert_eq!(monitor.total_usage(), 0.0);
        assert_eq!(monitor.remaining_ram(), 0.0);
        assert_eq!(monitor.average_usage(), 0.0);
        assert_eq!(monitor.history_len(), 0);
    }

    #[test]
    fn background_refresher_feeds_history() {
        let source = Arc::new(FakeSource::new(1000, 250));
        let options = MemoryOptions {
            refresh_interval: Duration::from_millis(10),
            ..slow_options()
        };
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), options, CancellationToken::new());
        thread::sleep(Duration::from_millis(100));
        assert!(monitor.history_len() >= 2);
        assert!((monitor.average_usage() - 75.0).abs() < 1e-4);
        assert_eq!(monitor.latest().map(|i| i.available_kb), Some(250));
    }

    #[test]
    fn empty_table_yields_sentinel() {
        let source = Arc::new(FakeSource {
            table: Vec::new(),
            ..FakeSource::new(1000, 500)
        });
        let monitor =
            MemoryMonitor::start(Arc::clone(&source), slow_options(), CancellationToken::new());
        assert_eq!(monitor.most_using_process(), NOT_AVAILABLE);
    }
}
