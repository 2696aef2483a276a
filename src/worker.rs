use std::net::UdpSocket;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;

use log::{error, warn};

use crate::err;
use crate::config::{Config, TimestampKind};
use crate::stats::WorkerCounters;
use crate::subscription::{MsgType, Subscription};
use crate::timestamp_source::TimestampSource;
use crate::wire::Packetize;

/// Work queue handle a scheduler or listener holds to enqueue a
/// Subscription for emission on its assigned worker. Enqueue blocks when
/// the queue is full: backpressure must reach the caller, not be absorbed
/// silently (§4.7, §9 "queue full: blocking").
#[derive(Clone)]
pub struct WorkTx {
    tx: SyncSender<Arc<Subscription>>,
    counters: Arc<WorkerCounters>,
}

impl WorkTx {
    pub fn enqueue(&self, sub: Arc<Subscription>) {
        // A disconnected receiver only happens during worker shutdown; at
        // that point there is nothing useful left to do with the item.
        if self.tx.send(sub).is_ok() {
            self.counters.queue_depth.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

/// A worker's queue handle, its receive end, and the counters struct both
/// ends share: `WorkTx::enqueue` increments `queue_depth`, `Worker::run`
/// decrements it on dequeue, so a metrics snapshot taken at any point sees
/// the number of Subscriptions currently sitting in the channel (§4.6).
pub fn work_channel(queue_size: usize) -> (WorkTx, Receiver<Arc<Subscription>>, Arc<WorkerCounters>) {
    let (tx, rx) = mpsc::sync_channel(queue_size);
    let counters = Arc::new(WorkerCounters::default());
    (WorkTx { tx, counters: Arc::clone(&counters) }, rx, counters)
}

/// One of the fixed set of sender workers (§4.3). Owns one event socket,
/// one general socket, and a bounded FIFO of Subscriptions queued for
/// emission.
pub struct Worker {
    pub id: usize,
    event_socket: UdpSocket,
    general_socket: UdpSocket,
    queue: Receiver<Arc<Subscription>>,
    timestamp_source: Box<dyn TimestampSource>,
    timestamp_kind: TimestampKind,
    max_tx_ts_attempts: u32,
    pub counters: Arc<WorkerCounters>,
}

impl Worker {
    pub fn bind(
        id: usize,
        config: &Config,
        queue: Receiver<Arc<Subscription>>,
        counters: Arc<WorkerCounters>,
        timestamp_source: Box<dyn TimestampSource>,
    ) -> crate::Result<Worker> {
        let event_socket = match UdpSocket::bind((config.ip, 0)) {
            Ok(s) => s,
            Err(e) => return err!(FatalError, desc: "worker {} binding event socket: {}", id, e),
        };
        let general_socket = match UdpSocket::bind((config.ip, 0)) {
            Ok(s) => s,
            Err(e) => return err!(FatalError, desc: "worker {} binding general socket: {}", id, e),
        };
        timestamp_source.enable_rx_timestamping(&event_socket)?;

        Ok(Worker {
            id,
            event_socket,
            general_socket,
            queue,
            timestamp_source,
            timestamp_kind: config.timestamp_type,
            max_tx_ts_attempts: 3,
            counters,
        })
    }

    pub fn event_socket(&self) -> crate::Result<UdpSocket> {
        self.event_socket.try_clone().map_err(Into::into)
    }

    pub fn general_socket(&self) -> crate::Result<UdpSocket> {
        self.general_socket.try_clone().map_err(Into::into)
    }

    /// The tight dequeue-serialize-send loop described in §4.3. Runs until
    /// every `WorkTx` clone is dropped and the queue drains.
    pub fn run(&self, utc_offset_secs: impl Fn() -> i64) {
        let mut scratch = Vec::with_capacity(128);
        while let Ok(sub) = self.queue.recv() {
            self.counters.queue_depth.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            if !sub.is_running() {
                continue;
            }
            self.emit(&sub, &mut scratch, utc_offset_secs());
        }
    }

    fn emit(&self, sub: &Subscription, scratch: &mut Vec<u8>, utc_offset_secs: i64) {
        match sub.msg_type {
            MsgType::Sync => self.emit_sync(sub, scratch, utc_offset_secs),
            MsgType::Announce => self.emit_announce(sub, scratch, utc_offset_secs),
            MsgType::DelayResp => self.emit_delay_resp(sub, scratch),
        }
    }

    fn emit_sync(&self, sub: &Subscription, scratch: &mut Vec<u8>, utc_offset_secs: i64) {
        let sequence_id = sub.next_sequence_id();
        {
            let mut templates = sub.templates.lock().unwrap();
            templates.sync.header.sequence_id = sequence_id;

            scratch.clear();
            if let Err(e) = templates.sync.encode(scratch) {
                error!("worker-{} encoding Sync for {}: {}", self.id, sub.client, e);
                return;
            }
            if let Err(e) = self.event_socket.send_to(scratch, sub.client_event_addr) {
                warn!("worker-{} sending Sync to {}: {}", self.id, sub.client_event_addr, e);
                self.counters.send_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return;
            }
        }
        self.counters.sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let tx_ts = self.timestamp_source.read_tx_timestamp(&self.event_socket, self.max_tx_ts_attempts);
        let tx_ts = match tx_ts {
            Some(ts) if matches!(self.timestamp_kind, TimestampKind::Software) => {
                ts.shift_seconds(utc_offset_secs)
            }
            Some(ts) => ts,
            None => {
                warn!(
                    "worker-{} TX timestamp unavailable for Sync seq={} to {}, dropping FollowUp",
                    self.id, sequence_id, sub.client
                );
                self.counters.tx_timestamp_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return;
            }
        };

        let mut templates = sub.templates.lock().unwrap();
        templates.follow_up.header.sequence_id = sequence_id;
        templates.follow_up.header.log_message_interval =
            crate::wire::duration_to_log_interval(sub.interval());
        templates.follow_up.precise_origin_timestamp = tx_ts;

        scratch.clear();
        if let Err(e) = templates.follow_up.encode(scratch) {
            error!("worker-{} encoding FollowUp for {}: {}", self.id, sub.client, e);
            return;
        }
        if let Err(e) = self.general_socket.send_to(scratch, sub.client_general_addr) {
            warn!("worker-{} sending FollowUp to {}: {}", self.id, sub.client_general_addr, e);
            self.counters.send_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    fn emit_announce(&self, sub: &Subscription, scratch: &mut Vec<u8>, utc_offset_secs: i64) {
        let sequence_id = sub.next_sequence_id();
        let mut templates = sub.templates.lock().unwrap();
        templates.announce.header.sequence_id = sequence_id;
        templates.announce.header.log_message_interval =
            crate::wire::duration_to_log_interval(sub.interval());
        templates.announce.current_utc_offset = utc_offset_secs as i16;

        scratch.clear();
        if let Err(e) = templates.announce.encode(scratch) {
            error!("worker-{} encoding Announce for {}: {}", self.id, sub.client, e);
            return;
        }
        if let Err(e) = self.general_socket.send_to(scratch, sub.client_general_addr) {
            warn!("worker-{} sending Announce to {}: {}", self.id, sub.client_general_addr, e);
            self.counters.send_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        }
        self.counters.sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn emit_delay_resp(&self, sub: &Subscription, scratch: &mut Vec<u8>) {
        let templates = sub.templates.lock().unwrap();
        scratch.clear();
        if let Err(e) = templates.delay_resp.encode(scratch) {
            error!("worker-{} encoding DelayResp for {}: {}", self.id, sub.client, e);
            return;
        }
        if let Err(e) = self.general_socket.send_to(scratch, sub.client_general_addr) {
            warn!("worker-{} sending DelayResp to {}: {}", self.id, sub.client_general_addr, e);
            self.counters.send_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return;
        }
        self.counters.sent.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClockIdentity;
    use crate::timestamp_source::SoftwareTimestampSource;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn test_config() -> Config {
        let mut c = Config::default_for("lo");
        c.ip = "127.0.0.1".parse().unwrap();
        c.clock_identity = ClockIdentity([9; 8]);
        c
    }

    #[test]
    fn sync_then_followup_share_sequence_id_and_reach_client() {
        let config = test_config();
        let (_tx, rx, counters) = work_channel(8);
        let worker = Worker::bind(0, &config, rx, counters, Box::new(SoftwareTimestampSource)).unwrap();

        let client_event: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let event_listener = UdpSocket::bind(client_event).unwrap();
        event_listener.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let client_event_addr = event_listener.local_addr().unwrap();

        let general_listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        general_listener.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let client_general_addr = general_listener.local_addr().unwrap();

        let client = crate::identity::PortIdentity { clock_identity: [1; 8], port_number: 1 };
        let sub = Arc::new(Subscription::new(
            client,
            client_event_addr,
            client_general_addr,
            MsgType::Sync,
            0,
            Duration::from_secs(1),
            Instant::now() + Duration::from_secs(60),
            config.clock_identity,
        ));

        let mut scratch = Vec::new();
        worker.emit(&sub, &mut scratch, 37);

        let mut buf = [0u8; 64];
        let (n, _) = event_listener.recv_from(&mut buf).expect("sync should arrive");
        let (sync, _) = crate::wire::Sync::decode(&buf[..n]).unwrap();

        let mut buf2 = [0u8; 64];
        let (n2, _) = general_listener.recv_from(&mut buf2).expect("followup should arrive");
        let (followup, _) = crate::wire::FollowUp::decode(&buf2[..n2]).unwrap();

        assert_eq!(sync.header.sequence_id, followup.header.sequence_id);
        assert_eq!(sync.header.sequence_id, 0);
    }

    #[test]
    fn enqueue_tracks_queue_depth_until_the_worker_dequeues() {
        let config = test_config();
        let (tx, rx, counters) = work_channel(8);
        let worker = Worker::bind(0, &config, rx, counters, Box::new(SoftwareTimestampSource)).unwrap();

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let client = crate::identity::PortIdentity { clock_identity: [4; 8], port_number: 1 };
        let sub = Arc::new(Subscription::new(
            client,
            addr,
            addr,
            MsgType::Sync,
            0,
            Duration::from_secs(1),
            Instant::now() + Duration::from_secs(60),
            config.clock_identity,
        ));
        sub.set_running(false);

        tx.enqueue(sub);
        assert_eq!(worker.counters.queue_depth.load(std::sync::atomic::Ordering::Relaxed), 1);

        worker.queue.recv().unwrap();
        worker.counters.queue_depth.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        assert_eq!(worker.counters.queue_depth.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
