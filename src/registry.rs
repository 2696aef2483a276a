use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::identity::PortIdentity;
use crate::subscription::{MsgType, Subscription};
use crate::util::worker_for;

const BUCKETS: usize = 64;

/// A client's full set of subscriptions, one slot per msg_type. Guarded by
/// its own mutex so a grant for Sync does not block a concurrent lookup of
/// the same client's DelayResp (§4.1: "one mutex per client record").
struct ClientRecord {
    worker_id: usize,
    subs: HashMap<MsgType, Arc<Subscription>>,
}

struct Bucket {
    clients: Mutex<HashMap<PortIdentity, Arc<Mutex<ClientRecord>>>>,
}

impl Default for Bucket {
    fn default() -> Bucket {
        Bucket { clients: Mutex::new(HashMap::new()) }
    }
}

/// Process-wide mapping from client PortIdentity to its Subscriptions,
/// sharded into fixed buckets to keep lock contention local as the client
/// count grows (design target >=100k clients, §4.1).
pub struct ClientRegistry {
    worker_count: usize,
    buckets: Vec<Bucket>,
}

impl ClientRegistry {
    pub fn new(worker_count: usize) -> ClientRegistry {
        let mut buckets = Vec::with_capacity(BUCKETS);
        buckets.resize_with(BUCKETS, Bucket::default);
        ClientRegistry { worker_count, buckets }
    }

    fn bucket_for(&self, client: &PortIdentity) -> &Bucket {
        let idx = (worker_for(client, BUCKETS)) % self.buckets.len();
        &self.buckets[idx]
    }

    /// Deterministic worker index for `client`, stable across calls for a
    /// fixed worker count (§8 idempotence property).
    pub fn worker_for(&self, client: &PortIdentity) -> usize {
        worker_for(client, self.worker_count)
    }

    pub fn find(&self, client: &PortIdentity, msg_type: MsgType) -> Option<Arc<Subscription>> {
        let bucket = self.bucket_for(client);
        let clients = bucket.clients.lock().unwrap();
        let record = clients.get(client)?;
        let record = record.lock().unwrap();
        record.subs.get(&msg_type).cloned()
    }

    /// Insert a new Subscription, or return the existing one for
    /// (client, msg_type) unchanged so the caller can decide whether to
    /// renew it. This is what makes `RequestUnicastTransmission` handling
    /// idempotent at the storage layer (§8).
    pub fn upsert(&self, client: PortIdentity, msg_type: MsgType, sub: Arc<Subscription>) -> Arc<Subscription> {
        let bucket = self.bucket_for(&client);
        let record = {
            let mut clients = bucket.clients.lock().unwrap();
            Arc::clone(clients.entry(client).or_insert_with(|| {
                Arc::new(Mutex::new(ClientRecord { worker_id: sub.worker_id, subs: HashMap::new() }))
            }))
        };
        let mut record = record.lock().unwrap();
        record.subs.entry(msg_type).or_insert(sub).clone()
    }

    pub fn cancel(&self, client: &PortIdentity, msg_type: MsgType) -> Option<Arc<Subscription>> {
        let bucket = self.bucket_for(client);
        let clients = bucket.clients.lock().unwrap();
        let record = clients.get(client)?;
        let record = record.lock().unwrap();
        let sub = record.subs.get(&msg_type).cloned();
        if let Some(sub) = &sub {
            sub.set_running(false);
        }
        sub
    }

    pub fn delete(&self, client: &PortIdentity) {
        let bucket = self.bucket_for(client);
        bucket.clients.lock().unwrap().remove(client);
    }

    /// Remove only `msg_type`'s entry for `client`, leaving the client's
    /// other subscriptions (and their worker assignment) untouched. The
    /// `ClientRecord` itself is dropped only once its last subscription is
    /// gone, so a client with e.g. a live Announce and an expired Sync
    /// does not lose its Announce registration just because Sync expired
    /// (§4.6 inventory sweep).
    pub fn remove_subscription(&self, client: &PortIdentity, msg_type: MsgType) {
        let bucket = self.bucket_for(client);
        let mut clients = bucket.clients.lock().unwrap();
        let is_empty = {
            let record = match clients.get(client) {
                Some(record) => record,
                None => return,
            };
            let mut record = record.lock().unwrap();
            record.subs.remove(&msg_type);
            record.subs.is_empty()
        };
        if is_empty {
            clients.remove(client);
        }
    }

    /// Every still-registered Subscription whose owning worker is
    /// `worker_id`. Used by the lifecycle sweep (§4.6) and by worker
    /// startup to seed its in-worker registry.
    pub fn subscriptions_for_worker(&self, worker_id: usize) -> Vec<Arc<Subscription>> {
        let mut out = Vec::new();
        for bucket in &self.buckets {
            let clients = bucket.clients.lock().unwrap();
            for record in clients.values() {
                let record = record.lock().unwrap();
                if record.worker_id == worker_id {
                    out.extend(record.subs.values().cloned());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ClockIdentity;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn client(port: u16) -> PortIdentity {
        PortIdentity { clock_identity: [7; 8], port_number: port }
    }

    fn sub(registry: &ClientRegistry, c: PortIdentity, msg_type: MsgType) -> Arc<Subscription> {
        let addr: SocketAddr = "127.0.0.1:319".parse().unwrap();
        Arc::new(Subscription::new(
            c,
            addr,
            addr,
            msg_type,
            registry.worker_for(&c),
            Duration::from_secs(1),
            Instant::now() + Duration::from_secs(60),
            ClockIdentity([1; 8]),
        ))
    }

    #[test]
    fn upsert_then_find_round_trips() {
        let registry = ClientRegistry::new(4);
        let c = client(1);
        let s = sub(&registry, c, MsgType::Sync);
        registry.upsert(c, MsgType::Sync, s.clone());
        let found = registry.find(&c, MsgType::Sync).unwrap();
        assert!(Arc::ptr_eq(&found, &s));
    }

    #[test]
    fn upsert_is_idempotent_for_same_key() {
        let registry = ClientRegistry::new(4);
        let c = client(2);
        let first = sub(&registry, c, MsgType::Sync);
        let second = sub(&registry, c, MsgType::Sync);
        let a = registry.upsert(c, MsgType::Sync, first.clone());
        let b = registry.upsert(c, MsgType::Sync, second);
        assert!(Arc::ptr_eq(&a, &b), "second upsert must not replace the existing Subscription");
    }

    #[test]
    fn cancel_marks_not_running_without_deleting() {
        let registry = ClientRegistry::new(4);
        let c = client(3);
        let s = sub(&registry, c, MsgType::Sync);
        s.set_running(true);
        registry.upsert(c, MsgType::Sync, s.clone());
        registry.cancel(&c, MsgType::Sync);
        assert!(!s.is_running());
        assert!(registry.find(&c, MsgType::Sync).is_some());
    }

    #[test]
    fn remove_subscription_leaves_the_clients_other_msg_types_intact() {
        let registry = ClientRegistry::new(4);
        let c = client(4);
        let sync = sub(&registry, c, MsgType::Sync);
        let announce = sub(&registry, c, MsgType::Announce);
        registry.upsert(c, MsgType::Sync, sync);
        registry.upsert(c, MsgType::Announce, announce.clone());

        registry.remove_subscription(&c, MsgType::Sync);

        assert!(registry.find(&c, MsgType::Sync).is_none());
        let found = registry.find(&c, MsgType::Announce).unwrap();
        assert!(Arc::ptr_eq(&found, &announce));
    }

    #[test]
    fn remove_subscription_drops_the_client_record_once_empty() {
        let registry = ClientRegistry::new(4);
        let c = client(5);
        let sync = sub(&registry, c, MsgType::Sync);
        registry.upsert(c, MsgType::Sync, sync);

        registry.remove_subscription(&c, MsgType::Sync);

        assert!(registry.subscriptions_for_worker(registry.worker_for(&c)).is_empty());
    }

    #[test]
    fn a_client_subscriptions_share_one_worker() {
        let registry = ClientRegistry::new(16);
        let c = client(9);
        let sync = sub(&registry, c, MsgType::Sync);
        let announce = sub(&registry, c, MsgType::Announce);
        registry.upsert(c, MsgType::Sync, sync.clone());
        registry.upsert(c, MsgType::Announce, announce.clone());
        assert_eq!(sync.worker_id, announce.worker_id);
        assert_eq!(sync.worker_id, registry.worker_for(&c));
    }
}
