use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::identity::{ClockIdentity, PortIdentity};
use crate::wire::{
    Announce, DelayResp, FollowUp, Header, MsgType as WireMsgType, PtpTimestamp, Sync,
};

/// The three message types a client can hold a unicast grant for. Named
/// distinctly from `wire::MsgType` because a Subscription never exists for
/// FollowUp or Signaling: those are emitted alongside Sync or consumed
/// directly, never scheduled on their own.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub enum MsgType {
    Announce,
    Sync,
    DelayResp,
}

impl MsgType {
    pub fn to_wire(self) -> WireMsgType {
        match self {
            MsgType::Announce => WireMsgType::Announce,
            MsgType::Sync => WireMsgType::Sync,
            MsgType::DelayResp => WireMsgType::DelayResp,
        }
    }
}

/// Pre-built packet templates, populated once at grant time with every
/// header field that does not change between emissions, so the worker's
/// hot path only has to patch sequence_id / timestamps / log-interval
/// before serializing (§9 "per-subscription template packets").
pub struct Templates {
    pub sync: Sync,
    pub follow_up: FollowUp,
    pub announce: Announce,
    pub delay_resp: DelayResp,
}

/// Mutable fields a concurrent grant or cancel can update; guarded by one
/// mutex per Subscription (§5).
struct Mutable {
    interval: Duration,
    expires_at: Instant,
    sequence_id: u16,
}

/// Per-(client, msg_type) state: the central entity of this server. At
/// most one Subscription exists per (client PortIdentity, msg_type); a
/// re-grant mutates this object in place rather than creating a new one.
pub struct Subscription {
    pub client: PortIdentity,
    pub client_event_addr: SocketAddr,
    pub client_general_addr: SocketAddr,
    pub msg_type: MsgType,
    pub worker_id: usize,
    running: AtomicBool,
    mutable: Mutex<Mutable>,
    pub templates: Mutex<Templates>,
}

impl Subscription {
    pub fn new(
        client: PortIdentity,
        client_event_addr: SocketAddr,
        client_general_addr: SocketAddr,
        msg_type: MsgType,
        worker_id: usize,
        interval: Duration,
        expires_at: Instant,
        server_clock_identity: ClockIdentity,
    ) -> Subscription {
        let source = PortIdentity { clock_identity: server_clock_identity.0, port_number: 1 };
        let templates = Templates {
            sync: Sync { header: Header::new(WireMsgType::Sync, source), origin_timestamp: PtpTimestamp::default() },
            follow_up: FollowUp {
                header: Header::new(WireMsgType::FollowUp, source),
                precise_origin_timestamp: PtpTimestamp::default(),
            },
            announce: Announce {
                header: Header::new(WireMsgType::Announce, source),
                origin_timestamp: PtpTimestamp::default(),
                current_utc_offset: 0,
                grandmaster_priority1: 128,
                grandmaster_clock_quality: 0,
                grandmaster_priority2: 128,
                grandmaster_identity: server_clock_identity.0,
                steps_removed: 0,
                time_source: 0xa0, // INTERNAL_OSCILLATOR
            },
            delay_resp: DelayResp {
                header: Header::new(WireMsgType::DelayResp, source),
                receive_timestamp: PtpTimestamp::default(),
                requesting_port_identity: client,
            },
        };

        Subscription {
            client,
            client_event_addr,
            client_general_addr,
            msg_type,
            worker_id,
            running: AtomicBool::new(false),
            mutable: Mutex::new(Mutable { interval, expires_at, sequence_id: 0 }),
            templates: Mutex::new(templates),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Atomically start this Subscription if it is not already running,
    /// reporting whether the caller is the one who transitioned it. Used
    /// so a re-grant of an already-running Subscription does not spawn a
    /// second scheduler task.
    pub fn mark_started(&self) -> bool {
        self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn interval(&self) -> Duration {
        self.mutable.lock().unwrap().interval
    }

    pub fn expires_at(&self) -> Instant {
        self.mutable.lock().unwrap().expires_at
    }

    pub fn renew(&self, interval: Duration, expires_at: Instant) {
        let mut m = self.mutable.lock().unwrap();
        m.interval = interval;
        m.expires_at = expires_at;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at()
    }

    /// Return the current sequence_id, then advance it. Each (Sync,
    /// FollowUp) pair or Announce shares one value drawn from this
    /// counter; the first emission after a grant must carry sequence_id=0.
    pub fn next_sequence_id(&self) -> u16 {
        let mut m = self.mutable.lock().unwrap();
        let id = m.sequence_id;
        m.sequence_id = m.sequence_id.wrapping_add(1);
        id
    }

    pub fn sequence_id(&self) -> u16 {
        self.mutable.lock().unwrap().sequence_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(interval: Duration, ttl: Duration) -> Subscription {
        let client = PortIdentity { clock_identity: [1; 8], port_number: 1 };
        let addr: SocketAddr = "127.0.0.1:319".parse().unwrap();
        Subscription::new(
            client,
            addr,
            addr,
            MsgType::Sync,
            0,
            interval,
            Instant::now() + ttl,
            ClockIdentity([0xaa; 8]),
        )
    }

    #[test]
    fn sequence_ids_start_at_zero_and_increase_by_one() {
        let s = sub(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(s.next_sequence_id(), 0);
        assert_eq!(s.next_sequence_id(), 1);
        assert_eq!(s.next_sequence_id(), 2);
    }

    #[test]
    fn mark_started_is_idempotent() {
        let s = sub(Duration::from_secs(1), Duration::from_secs(60));
        assert!(s.mark_started());
        assert!(!s.mark_started());
        assert!(s.is_running());
    }

    #[test]
    fn expiry_is_strict() {
        let s = sub(Duration::from_secs(1), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(s.is_expired(Instant::now()));
    }

    #[test]
    fn renew_updates_both_fields_together() {
        let s = sub(Duration::from_secs(1), Duration::from_secs(60));
        let new_expiry = Instant::now() + Duration::from_secs(30);
        s.renew(Duration::from_millis(250), new_expiry);
        assert_eq!(s.interval(), Duration::from_millis(250));
        assert_eq!(s.expires_at(), new_expiry);
    }
}
