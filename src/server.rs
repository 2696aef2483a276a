use std::net::UdpSocket;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::info;

use crate::config::Config;
use crate::err;
use crate::lifecycle::{self, UtcOffset};
use crate::listener;
use crate::registry::ClientRegistry;
use crate::stats::{LogSink, Stats, StatsSink};
use crate::timestamp_source::{self, TimestampSource};
use crate::worker::{self, WorkTx, Worker};
use crate::Result;

/// Everything needed to run one worker: its thread handle plus the two
/// listener threads that feed it, all sharing the worker's own cloned
/// sockets (§4.4: "one blocking receive loop per configured worker").
struct WorkerThreads {
    worker: JoinHandle<()>,
    event_listener: JoinHandle<()>,
    general_listener: JoinHandle<()>,
}

/// Owns every thread this process runs: the worker pool, their paired
/// listeners, and the two lifecycle tasks (§4.2-§4.6). Construction is
/// all-or-nothing: any bind or clock-identity failure aborts startup (§7).
pub struct Server {
    pub config: Config,
    pub registry: Arc<ClientRegistry>,
    pub stats: Arc<Stats>,
    pub utc_offset: Arc<UtcOffset>,
    threads: Vec<WorkerThreads>,
    metrics_thread: JoinHandle<()>,
    utc_refresh_thread: JoinHandle<()>,
}

impl Server {
    pub fn bind(config: Config) -> Result<Server> {
        Server::bind_with_sink(config, Arc::new(LogSink))
    }

    pub fn bind_with_sink(config: Config, sink: Arc<dyn StatsSink>) -> Result<Server> {
        let registry = Arc::new(ClientRegistry::new(config.workers));
        let stats = Arc::new(Stats::default());
        stats.set_utc_offset(config.utc_offset_secs);
        let utc_offset = Arc::new(UtcOffset::new(config.utc_offset_secs));

        let mut worker_handles = Vec::with_capacity(config.workers);
        let mut worker_txs: Vec<WorkTx> = Vec::with_capacity(config.workers);
        let mut event_sockets = Vec::with_capacity(config.workers);
        let mut general_sockets = Vec::with_capacity(config.workers);
        let mut worker_counters = Vec::with_capacity(config.workers);

        for id in 0..config.workers {
            let (tx, rx, counters) = worker::work_channel(config.queue_size);
            let source = timestamp_source::for_kind(config.timestamp_type);
            let worker = match Worker::bind(id, &config, rx, Arc::clone(&counters), source) {
                Ok(w) => w,
                Err(e) => return err!(FatalError, desc: "starting worker {}: {}", id, e),
            };
            event_sockets.push(worker.event_socket()?);
            general_sockets.push(worker.general_socket()?);
            worker_txs.push(tx);
            worker_counters.push(counters);
            worker_handles.push(worker);
        }
        stats.register_workers(worker_counters);

        let mut threads = Vec::with_capacity(config.workers);
        for worker in worker_handles {
            let id = worker.id;
            let stats_utc = Arc::clone(&utc_offset);
            let worker_thread = thread::spawn(move || worker.run(move || stats_utc.get()));

            let event_thread = spawn_event_listener(
                event_sockets.remove(0),
                Arc::clone(&registry),
                worker_txs.clone(),
                config.timestamp_type,
                Arc::clone(&utc_offset),
            );
            let general_thread = spawn_general_listener(
                general_sockets.remove(0),
                Arc::clone(&registry),
                worker_txs.clone(),
                config.clone(),
            );

            threads.push(WorkerThreads {
                worker: worker_thread,
                event_listener: event_thread,
                general_listener: general_thread,
            });
            info!("worker {} started", id);
        }

        let metrics_thread = {
            let registry = Arc::clone(&registry);
            let stats = Arc::clone(&stats);
            let config = config.clone();
            let sink = Arc::clone(&sink);
            let worker_count = config.workers;
            thread::spawn(move || lifecycle::run_metrics_tick(registry, worker_count, config, stats, sink))
        };

        let utc_refresh_thread = {
            let offset = Arc::clone(&utc_offset);
            let source: Arc<dyn TimestampSource> = Arc::from(timestamp_source::for_kind(config.timestamp_type));
            let shm = config.shm;
            thread::spawn(move || lifecycle::run_utc_offset_refresh(offset, source, shm))
        };

        Ok(Server { config, registry, stats, utc_offset, threads, metrics_thread, utc_refresh_thread })
    }

    /// Block until every thread exits. In practice this never returns
    /// during normal operation: the worker, listener, and lifecycle loops
    /// all run until the process is killed or panics.
    pub fn join(self) {
        for t in self.threads {
            let _ = t.worker.join();
            let _ = t.event_listener.join();
            let _ = t.general_listener.join();
        }
        let _ = self.metrics_thread.join();
        let _ = self.utc_refresh_thread.join();
    }
}

fn spawn_event_listener(
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
    worker_txs: Vec<WorkTx>,
    timestamp_type: crate::config::TimestampKind,
    utc_offset: Arc<UtcOffset>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let source: Arc<dyn TimestampSource> = Arc::from(timestamp_source::for_kind(timestamp_type));
        listener::run_event_listener(socket, registry, worker_txs, source, timestamp_type, move || utc_offset.get())
    })
}

fn spawn_general_listener(
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
    worker_txs: Vec<WorkTx>,
    config: Config,
) -> JoinHandle<()> {
    thread::spawn(move || listener::run_general_listener(socket, registry, worker_txs, config.clone(), config.clock_identity))
}
