use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use crate::config::{Config, TimestampKind};
use crate::identity::ClockIdentity;
use crate::registry::ClientRegistry;
use crate::scheduler;
use crate::subscription::{MsgType, Subscription};
use crate::timestamp_source::TimestampSource;
use crate::wire::{self, DelayReq, Header, MsgType as WireMsgType, Packetize, Signaling, Tlv};
use crate::worker::WorkTx;

/// One blocking receive loop on the event port (§4.4). `worker_txs[i]` must
/// be the `WorkTx` for worker `i`, matching the registry's own assignment.
pub fn run_event_listener(
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
    worker_txs: Vec<WorkTx>,
    timestamp_source: Arc<dyn TimestampSource>,
    timestamp_kind: TimestampKind,
    utc_offset_secs: impl Fn() -> i64,
) {
    let mut buf = [0u8; 512];
    loop {
        let (n, _src) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) => {
                warn!("event listener recv error: {}", e);
                continue;
            }
        };

        let now = std::time::SystemTime::now();
        let rx_ts = match timestamp_source.read_tx_timestamp(&socket, 1) {
            Some(mut ts) => {
                if matches!(timestamp_kind, TimestampKind::Software) {
                    ts = ts.shift_seconds(utc_offset_secs());
                }
                ts
            }
            None => wire::PtpTimestamp::from_system_time(now),
        };

        let (header, hn) = match Header::decode(&buf[..n]) {
            Ok(v) => v,
            Err(e) => {
                warn!("event listener: parse error: {}", e);
                continue;
            }
        };

        match header.msg_type {
            WireMsgType::DelayReq => {
                let (req, _) = match DelayReq::decode(&buf[..n]) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("event listener: malformed DelayReq: {}", e);
                        continue;
                    }
                };
                let _ = hn;
                handle_delay_req(&registry, &worker_txs, &req, rx_ts);
            }
            other => {
                debug!("event listener: unsupported message type {}", other);
            }
        }
    }
}

fn handle_delay_req(
    registry: &ClientRegistry,
    worker_txs: &[WorkTx],
    req: &DelayReq,
    rx_ts: wire::PtpTimestamp,
) {
    let client = req.header.source_port_identity;
    let sub = match registry.find(&client, MsgType::DelayResp) {
        Some(sub) => sub,
        None => {
            warn!("dropping DelayReq from {}: no DelayResp subscription", client);
            return;
        }
    };

    {
        let mut templates = sub.templates.lock().unwrap();
        templates.delay_resp.header.sequence_id = req.header.sequence_id;
        templates.delay_resp.header.correction_field = req.header.correction_field;
        templates.delay_resp.requesting_port_identity = client;
        templates.delay_resp.receive_timestamp = rx_ts;
    }

    if let Some(tx) = worker_txs.get(sub.worker_id) {
        tx.enqueue(sub);
    }
}

/// One blocking receive loop on the general port (§4.5). Owns Grant
/// replies, so it also needs the general socket to send on.
pub fn run_general_listener(
    socket: UdpSocket,
    registry: Arc<ClientRegistry>,
    worker_txs: Vec<WorkTx>,
    config: Config,
    clock_identity: ClockIdentity,
) {
    let mut buf = [0u8; 512];
    loop {
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) => {
                warn!("general listener recv error: {}", e);
                continue;
            }
        };

        let (header, _) = match Header::decode(&buf[..n]) {
            Ok(v) => v,
            Err(e) => {
                warn!("general listener: parse error: {}", e);
                continue;
            }
        };

        match header.msg_type {
            WireMsgType::Signaling => {
                let (sig, _) = match Signaling::decode(&buf[..n]) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("general listener: malformed Signaling: {}", e);
                        continue;
                    }
                };
                handle_signaling(&socket, &registry, &worker_txs, &config, clock_identity, &sig, src);
            }
            other => {
                debug!("general listener: unsupported message type {}", other);
            }
        }
    }
}

fn handle_signaling(
    socket: &UdpSocket,
    registry: &ClientRegistry,
    worker_txs: &[WorkTx],
    config: &Config,
    clock_identity: ClockIdentity,
    sig: &Signaling,
    src: SocketAddr,
) {
    let client = sig.header.source_port_identity;
    let client_general_addr = src;
    let client_event_addr = SocketAddr::new(src.ip(), wire::EVENT_PORT);

    for tlv in &sig.tlvs {
        match tlv {
            Tlv::RequestUnicastTransmission(req) => {
                let msg_type = match to_sub_msg_type(req.msg_type) {
                    Some(mt) => mt,
                    None => {
                        debug!("general listener: unsupported request msg_type {:?}", req.msg_type);
                        continue;
                    }
                };
                handle_request(
                    socket,
                    registry,
                    worker_txs,
                    config,
                    clock_identity,
                    &sig.header,
                    client,
                    client_event_addr,
                    client_general_addr,
                    msg_type,
                    req.log_inter_message_period,
                    req.duration_field,
                );
            }
            Tlv::CancelUnicastTransmission(cancel) => {
                if let Some(msg_type) = to_sub_msg_type(cancel.msg_type) {
                    registry.cancel(&client, msg_type);
                }
            }
            Tlv::GrantUnicastTransmission(_) | Tlv::Unknown { .. } => {
                debug!("general listener: ignoring non-request TLV from {}", client);
            }
        }
    }
}

fn to_sub_msg_type(wire: WireMsgType) -> Option<MsgType> {
    match wire {
        WireMsgType::Announce => Some(MsgType::Announce),
        WireMsgType::Sync => Some(MsgType::Sync),
        WireMsgType::DelayResp => Some(MsgType::DelayResp),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_request(
    socket: &UdpSocket,
    registry: &ClientRegistry,
    worker_txs: &[WorkTx],
    config: &Config,
    clock_identity: ClockIdentity,
    request_header: &Header,
    client: crate::identity::PortIdentity,
    client_event_addr: SocketAddr,
    client_general_addr: SocketAddr,
    msg_type: MsgType,
    log_inter_message_period: i8,
    duration_field: u32,
) {
    let interval = wire::log_interval_to_duration(log_inter_message_period);
    let duration = std::time::Duration::from_secs(duration_field as u64);

    let grant = match msg_type {
        MsgType::Announce | MsgType::Sync => {
            if interval < config.min_sub_interval || duration > config.max_sub_duration {
                warn!(
                    "rejecting {:?} request from {}: interval={:?} duration={:?}",
                    msg_type, client, interval, duration
                );
                Signaling::grant(
                    request_header,
                    client,
                    msg_type.to_wire(),
                    log_inter_message_period,
                    0,
                )
            } else {
                let expires_at = Instant::now() + duration;
                let worker_id = registry.worker_for(&client);
                let sub = Arc::new(Subscription::new(
                    client,
                    client_event_addr,
                    client_general_addr,
                    msg_type,
                    worker_id,
                    interval,
                    expires_at,
                    clock_identity,
                ));
                let sub = registry.upsert(client, msg_type, sub);
                sub.renew(interval, expires_at);
                if sub.mark_started() {
                    if let Some(tx) = worker_txs.get(worker_id) {
                        scheduler::spawn(sub, tx.clone());
                    }
                }
                Signaling::grant(
                    request_header,
                    client,
                    msg_type.to_wire(),
                    log_inter_message_period,
                    duration_field,
                )
            }
        }
        MsgType::DelayResp => {
            let worker_id = registry.worker_for(&client);
            let expires_at = Instant::now() + duration;
            let sub = Arc::new(Subscription::new(
                client,
                client_event_addr,
                client_general_addr,
                msg_type,
                worker_id,
                interval,
                expires_at,
                clock_identity,
            ));
            let sub = registry.upsert(client, msg_type, sub);
            sub.renew(interval, expires_at);
            sub.set_running(true);
            Signaling::grant(
                request_header,
                client,
                msg_type.to_wire(),
                log_inter_message_period,
                duration_field,
            )
        }
    };

    let mut buf = Vec::new();
    if let Err(e) = grant.encode(&mut buf) {
        warn!("encoding Grant for {}: {}", client, e);
        return;
    }
    if let Err(e) = socket.send_to(&buf, client_general_addr) {
        warn!("sending Grant to {}: {}", client_general_addr, e);
    }
}
