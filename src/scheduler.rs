use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::subscription::Subscription;
use crate::worker::WorkTx;

/// Starts the per-Subscription scheduler task described in §4.2: emit
/// immediately, then tick at `interval`, re-arming on interval change and
/// exiting once `running` goes false or the subscription expires. Only
/// Announce and Sync subscriptions run a scheduler; DelayResp is reactive
/// (§4.5) and never passed here.
pub fn spawn(sub: Arc<Subscription>, work_tx: WorkTx) -> thread::JoinHandle<()> {
    thread::spawn(move || run(sub, work_tx))
}

fn run(sub: Arc<Subscription>, work_tx: WorkTx) {
    work_tx.enqueue(sub.clone());

    let mut current_interval = sub.interval();
    loop {
        thread::sleep(current_interval);

        if !sub.is_running() {
            debug!("scheduler for {} {:?} cancelled", sub.client, sub.msg_type);
            return;
        }
        if sub.is_expired(Instant::now()) {
            sub.set_running(false);
            debug!("scheduler for {} {:?} expired", sub.client, sub.msg_type);
            return;
        }

        let new_interval = sub.interval();
        if new_interval != current_interval {
            current_interval = new_interval;
            continue;
        }

        work_tx.enqueue(sub.clone());
    }
}

/// Pure decision the scheduler's tick makes, pulled out so it can be
/// tested without spinning up real threads and timers (§8's "no scheduled
/// emission after expires_at + interval" property, and the re-grant/cancel
/// scenarios in §8).
#[derive(Debug, Eq, PartialEq)]
pub enum TickOutcome {
    Expire,
    Rearm(Duration),
    Emit,
}

pub fn decide_tick(now: Instant, expires_at: Instant, current_interval: Duration, new_interval: Duration) -> TickOutcome {
    if now > expires_at {
        TickOutcome::Expire
    } else if new_interval != current_interval {
        TickOutcome::Rearm(new_interval)
    } else {
        TickOutcome::Emit
    }
}
