use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::subscription::MsgType;

/// One worker's hot-path counters, shared between its [`crate::worker::WorkTx`]
/// (which increments `queue_depth` on every successful enqueue) and its
/// `Worker::run` dequeue loop (which decrements `queue_depth` and bumps the
/// other three fields as it emits). `queue_depth` is a live gauge; the other
/// three are cumulative counts drained to zero each time [`Stats::snapshot`]
/// reads them (§4.6, §4.10).
#[derive(Default)]
pub struct WorkerCounters {
    pub queue_depth: AtomicU64,
    pub sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub tx_timestamp_misses: AtomicU64,
}

/// Process-wide stats object; one of the two pieces of global mutable
/// state this crate carries (the other being the UTC offset), each with
/// its own synchronization (§9).
pub struct Stats {
    utc_offset_secs: AtomicI64,
    live_by_msg_type: Mutex<HashMap<MsgType, u64>>,
    worker_counters: Mutex<Vec<Arc<WorkerCounters>>>,
}

impl Default for Stats {
    fn default() -> Stats {
        Stats {
            utc_offset_secs: AtomicI64::new(0),
            live_by_msg_type: Mutex::new(HashMap::new()),
            worker_counters: Mutex::new(Vec::new()),
        }
    }
}

impl Stats {
    pub fn set_utc_offset(&self, secs: i64) {
        self.utc_offset_secs.store(secs, Ordering::Relaxed);
    }

    pub fn utc_offset(&self) -> i64 {
        self.utc_offset_secs.load(Ordering::Relaxed)
    }

    pub fn set_live_counts(&self, counts: HashMap<MsgType, u64>) {
        *self.live_by_msg_type.lock().unwrap() = counts;
    }

    /// Record each worker's counters handle, indexed by worker id, so every
    /// later `snapshot()` call can read and drain them. Called once at
    /// startup, before any worker thread is spawned.
    pub fn register_workers(&self, counters: Vec<Arc<WorkerCounters>>) {
        *self.worker_counters.lock().unwrap() = counters;
    }

    pub fn snapshot(&self) -> Snapshot {
        let workers = self
            .worker_counters
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(worker_id, c)| WorkerSnapshot {
                worker_id,
                queue_depth: c.queue_depth.load(Ordering::Relaxed),
                sent: c.sent.swap(0, Ordering::Relaxed),
                send_errors: c.send_errors.swap(0, Ordering::Relaxed),
                tx_timestamp_misses: c.tx_timestamp_misses.swap(0, Ordering::Relaxed),
            })
            .collect();
        Snapshot {
            utc_offset_secs: self.utc_offset(),
            live_by_msg_type: self.live_by_msg_type.lock().unwrap().clone(),
            workers,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub worker_id: usize,
    pub queue_depth: u64,
    pub sent: u64,
    pub send_errors: u64,
    pub tx_timestamp_misses: u64,
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub utc_offset_secs: i64,
    pub live_by_msg_type: HashMap<MsgType, u64>,
    pub workers: Vec<WorkerSnapshot>,
}

impl Snapshot {
    /// Render the snapshot the same hand-rolled way a lightweight
    /// `{...}`-builder would, without pulling in a JSON crate solely for a
    /// handful of scalar fields.
    pub fn to_json(&self) -> String {
        let mut counts = String::new();
        let mut keys: Vec<&MsgType> = self.live_by_msg_type.keys().collect();
        keys.sort_by_key(|k| format!("{:?}", k));
        for (i, k) in keys.iter().enumerate() {
            if i > 0 {
                counts.push(',');
            }
            counts.push_str(&format!("\"{:?}\":{}", k, self.live_by_msg_type[k]));
        }

        let mut workers = String::new();
        for (i, w) in self.workers.iter().enumerate() {
            if i > 0 {
                workers.push(',');
            }
            workers.push_str(&format!(
                "{{\"worker_id\":{},\"queue_depth\":{},\"sent\":{},\"send_errors\":{},\"tx_timestamp_misses\":{}}}",
                w.worker_id, w.queue_depth, w.sent, w.send_errors, w.tx_timestamp_misses
            ));
        }

        format!(
            "{{\"utc_offset_secs\":{},\"live_by_msg_type\":{{{}}},\"workers\":[{}]}}",
            self.utc_offset_secs, counts, workers
        )
    }
}

/// Swappable sink for stats snapshots (§9 "dynamic dispatch ... (a) the
/// stats sink"), so tests can observe what would otherwise go to the
/// monitoring endpoint without standing up a real listener.
pub trait StatsSink: Send + Sync {
    fn publish(&self, snapshot: &Snapshot);
}

pub struct LogSink;

impl StatsSink for LogSink {
    fn publish(&self, snapshot: &Snapshot) {
        log::info!("stats {}", snapshot.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CollectingSink {
        seen: StdMutex<Vec<String>>,
    }

    impl StatsSink for CollectingSink {
        fn publish(&self, snapshot: &Snapshot) {
            self.seen.lock().unwrap().push(snapshot.to_json());
        }
    }

    #[test]
    fn snapshot_renders_utc_offset_and_counts() {
        let stats = Stats::default();
        stats.set_utc_offset(37);
        let mut counts = HashMap::new();
        counts.insert(MsgType::Sync, 3);
        stats.set_live_counts(counts);
        let snap = stats.snapshot();
        assert_eq!(snap.utc_offset_secs, 37);
        assert!(snap.to_json().contains("\"utc_offset_secs\":37"));
        assert!(snap.to_json().contains("Sync"));
    }

    #[test]
    fn sink_is_swappable() {
        let sink = CollectingSink { seen: StdMutex::new(Vec::new()) };
        let stats = Stats::default();
        stats.set_utc_offset(40);
        sink.publish(&stats.snapshot());
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn snapshot_reads_and_drains_registered_worker_counters() {
        let stats = Stats::default();
        let w0 = Arc::new(WorkerCounters::default());
        let w1 = Arc::new(WorkerCounters::default());
        w0.queue_depth.store(3, Ordering::Relaxed);
        w0.sent.store(10, Ordering::Relaxed);
        w1.send_errors.store(2, Ordering::Relaxed);
        w1.tx_timestamp_misses.store(1, Ordering::Relaxed);
        stats.register_workers(vec![w0.clone(), w1.clone()]);

        let first = stats.snapshot();
        assert_eq!(first.workers.len(), 2);
        assert_eq!(first.workers[0], WorkerSnapshot { worker_id: 0, queue_depth: 3, sent: 10, send_errors: 0, tx_timestamp_misses: 0 });
        assert_eq!(first.workers[1], WorkerSnapshot { worker_id: 1, queue_depth: 0, sent: 0, send_errors: 2, tx_timestamp_misses: 1 });

        // sent/send_errors/tx_timestamp_misses are drained on read; queue_depth is a
        // live gauge and is left alone.
        let second = stats.snapshot();
        assert_eq!(second.workers[0], WorkerSnapshot { worker_id: 0, queue_depth: 3, sent: 0, send_errors: 0, tx_timestamp_misses: 0 });
        assert_eq!(second.workers[1].send_errors, 0);

        assert!(first.to_json().contains("\"worker_id\":0"));
    }
}
