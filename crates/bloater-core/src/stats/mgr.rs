use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::StatsSink;

type Key = (String, u32);

/// One timestamped value in a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub at: SystemTime,
    pub value: f64,
}

#[derive(Debug, Default)]
struct Inner {
    /// Lifetime counter totals.
    totals: HashMap<Key, u64>,
    /// Counts since the last flush.
    pending: HashMap<Key, u64>,
    /// Gauge points, measurements and flushed counter points.
    series: BTreeMap<Key, Vec<Point>>,
}

/// In-memory [`StatsSink`].
///
/// Counters keep a lifetime total and also turn into a per-interval series
/// each time [`flush_counters`](Self::flush_counters) runs, so the dumped
/// counter files read as "events per interval".
#[derive(Debug, Default)]
pub struct StatsMgr {
    inner: Mutex<Inner>,
}

impl StatsMgr {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lifetime total of a counter (0 if never incremented).
    pub fn counter(&self, name: &str, tenant: u32) -> u64 {
        self.lock()
            .totals
            .get(&(name.to_string(), tenant))
            .copied()
            .unwrap_or(0)
    }

    /// Copy of the recorded series for a metric.
    pub fn series(&self, name: &str, tenant: u32) -> Vec<Point> {
        self.lock()
            .series
            .get(&(name.to_string(), tenant))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of points recorded for a metric.
    pub fn point_count(&self, name: &str, tenant: u32) -> usize {
        self.lock()
            .series
            .get(&(name.to_string(), tenant))
            .map_or(0, Vec::len)
    }

    /// Move pending counter values into their series as points at `at`.
    pub fn flush_counters(&self, at: SystemTime) {
        let mut inner = self.lock();
        let pending = std::mem::take(&mut inner.pending);
        for (key, count) in pending {
            inner.series.entry(key).or_default().push(Point {
                at,
                value: count as f64,
            });
        }
    }

    /// Flush counters every `interval` on a background task until stopped.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> FlusherHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let stats = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => stats.flush_counters(SystemTime::now()),
                }
            }
            stats.flush_counters(SystemTime::now());
        });
        FlusherHandle {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Write every series to `<dir>/<metric>.<tenant>.csv`.
    pub fn dump_csv(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let inner = self.lock();
        super::csv::write_series(dir, &inner.series)
    }
}

impl StatsSink for StatsMgr {
    fn incr(&self, name: &str, tenant: u32) {
        let key = (name.to_string(), tenant);
        let mut inner = self.lock();
        *inner.totals.entry(key.clone()).or_insert(0) += 1;
        *inner.pending.entry(key).or_insert(0) += 1;
    }

    fn set(&self, name: &str, value: f64, tenant: u32) {
        self.direct_measurement(name, SystemTime::now(), value, tenant);
    }

    fn direct_measurement(&self, name: &str, at: SystemTime, value: f64, tenant: u32) {
        self.lock()
            .series
            .entry((name.to_string(), tenant))
            .or_default()
            .push(Point { at, value });
    }
}

/// Stops a flusher started by [`StatsMgr::spawn_flusher`].
#[derive(Debug)]
pub struct FlusherHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stop the flusher after one final flush.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("stats flusher join: {}", e);
        }
    }
}
