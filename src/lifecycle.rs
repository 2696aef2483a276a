use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::config::Config;
use crate::registry::ClientRegistry;
use crate::stats::{Snapshot, Stats, StatsSink};
use crate::subscription::MsgType;
use crate::timestamp_source::{self, TimestampSource};

/// Atomic word backing the server's UTC offset: the only other piece of
/// global mutable state besides [`Stats`] (§9), read on every Sync/Announce
/// emission and written only by [`run_utc_offset_refresh`].
pub struct UtcOffset(AtomicI64);

impl UtcOffset {
    pub fn new(initial_secs: i64) -> UtcOffset {
        UtcOffset(AtomicI64::new(initial_secs))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, secs: i64) {
        self.0.store(secs, Ordering::Relaxed);
    }
}

/// Every `metric_interval`, sweep each worker's subscriptions for ones that
/// stopped running, count what's left by msg_type, and publish a snapshot
/// (§4.6). Runs until `registry`'s last `Arc` is dropped would be the
/// natural stop condition in a full shutdown sequence; callers that need
/// to stop it early should wrap this in a cancel-token of their own.
pub fn run_metrics_tick(
    registry: Arc<ClientRegistry>,
    worker_count: usize,
    config: Config,
    stats: Arc<Stats>,
    sink: Arc<dyn StatsSink>,
) {
    loop {
        thread::sleep(config.metric_interval);
        sweep_and_publish(&registry, worker_count, &stats, sink.as_ref());
    }
}

pub fn sweep_and_publish(
    registry: &ClientRegistry,
    worker_count: usize,
    stats: &Stats,
    sink: &dyn StatsSink,
) {
    let mut live = HashMap::new();
    for worker_id in 0..worker_count {
        for sub in registry.subscriptions_for_worker(worker_id) {
            if sub.is_running() {
                *live.entry(sub.msg_type).or_insert(0u64) += 1;
            } else {
                registry.remove_subscription(&sub.client, sub.msg_type);
                debug!("inventory: removed {} {:?}", sub.client, sub.msg_type);
            }
        }
    }
    stats.set_live_counts(live);
    let snapshot: Snapshot = stats.snapshot();
    sink.publish(&snapshot);
}

/// Every minute, refresh the UTC offset from the configured
/// [`TimestampSource`] when `config.shm` is enabled; otherwise the
/// statically configured offset is authoritative for the process lifetime
/// (§4.6, §9 open question: shm refresh wins whenever it is enabled).
pub fn run_utc_offset_refresh(
    offset: Arc<UtcOffset>,
    source: Arc<dyn TimestampSource>,
    shm_enabled: bool,
) {
    if !shm_enabled {
        return;
    }
    loop {
        thread::sleep(Duration::from_secs(60));
        if let Some(secs) = timestamp_source::refresh_utc_offset(source.as_ref()) {
            offset.set(secs);
            info!("utc offset refreshed to {}s", secs);
        }
    }
}
