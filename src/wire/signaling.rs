use crate::err;
use crate::identity::PortIdentity;
use crate::wire::header::MsgType;
use crate::wire::{Header, Packetize};
use crate::Result;

const TLV_REQUEST_UNICAST_TRANSMISSION: u16 = 0x0004;
const TLV_GRANT_UNICAST_TRANSMISSION: u16 = 0x0005;
const TLV_CANCEL_UNICAST_TRANSMISSION: u16 = 0x0006;

/// Signaling: the management-plane message carrying unicast negotiation
/// TLVs. `target_port_identity` is the field IEEE 1588-2019 calls
/// `targetPortIdentity`; for unicast negotiation it names the peer the TLVs
/// concern.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct Signaling {
    pub header: Header,
    pub target_port_identity: PortIdentity,
    pub tlvs: Vec<Tlv>,
}

impl Packetize for Signaling {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (target_port_identity, m) = PortIdentity::decode(&stream[n..])?;
        n += m;

        let mut tlvs = Vec::new();
        while n < stream.len() {
            let (tlv, m) = Tlv::decode(&stream[n..])?;
            n += m;
            tlvs.push(tlv);
        }
        Ok((Signaling { header, target_port_identity, tlvs }, n))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.target_port_identity.encode(buf)?;
        for tlv in &self.tlvs {
            tlv.encode(buf)?;
        }
        Ok(buf.len() - start)
    }
}

impl Signaling {
    /// Build a Grant Signaling packet echoing `request`'s header, the way
    /// §4.5 describes: same sequence_id/source, one GrantUnicastTransmission
    /// TLV, `Renewal=1` unless the grant is a rejection.
    pub fn grant(
        request_header: &Header,
        target_port_identity: PortIdentity,
        msg_type: MsgType,
        log_inter_message_period: i8,
        duration_field: u32,
    ) -> Signaling {
        let mut header = request_header.clone();
        header.msg_type = MsgType::Signaling;
        let renewal = if duration_field > 0 { 1 } else { 0 };
        Signaling {
            header,
            target_port_identity,
            tlvs: vec![Tlv::GrantUnicastTransmission(GrantUnicastTransmissionTlv {
                msg_type,
                log_inter_message_period,
                duration_field,
                renewal,
            })],
        }
    }
}

/// The closed set of TLVs this server parses or emits. `Unknown` preserves
/// unsupported TLVs verbatim so re-encoding a Signaling packet never drops
/// bytes it did not understand.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub enum Tlv {
    RequestUnicastTransmission(RequestUnicastTransmissionTlv),
    GrantUnicastTransmission(GrantUnicastTransmissionTlv),
    CancelUnicastTransmission(CancelUnicastTransmissionTlv),
    Unknown { tlv_type: u16, value: Vec<u8> },
}

impl Tlv {
    fn decode(stream: &[u8]) -> Result<(Tlv, usize)> {
        if stream.len() < 4 {
            return err!(MalformedPacket, desc: "tlv header needs 4 bytes, got {}", stream.len());
        }
        let tlv_type = u16::from_be_bytes([stream[0], stream[1]]);
        let length = u16::from_be_bytes([stream[2], stream[3]]) as usize;
        if stream.len() < 4 + length {
            return err!(MalformedPacket, desc: "tlv value needs {} bytes, got {}", length, stream.len() - 4);
        }
        let value = &stream[4..4 + length];
        let tlv = match tlv_type {
            TLV_REQUEST_UNICAST_TRANSMISSION => {
                Tlv::RequestUnicastTransmission(RequestUnicastTransmissionTlv::decode_value(value)?)
            }
            TLV_GRANT_UNICAST_TRANSMISSION => {
                Tlv::GrantUnicastTransmission(GrantUnicastTransmissionTlv::decode_value(value)?)
            }
            TLV_CANCEL_UNICAST_TRANSMISSION => {
                Tlv::CancelUnicastTransmission(CancelUnicastTransmissionTlv::decode_value(value)?)
            }
            other => Tlv::Unknown { tlv_type: other, value: value.to_vec() },
        };
        Ok((tlv, 4 + length))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        match self {
            Tlv::RequestUnicastTransmission(tlv) => {
                write_tlv(buf, TLV_REQUEST_UNICAST_TRANSMISSION, |b| tlv.encode_value(b))?
            }
            Tlv::GrantUnicastTransmission(tlv) => {
                write_tlv(buf, TLV_GRANT_UNICAST_TRANSMISSION, |b| tlv.encode_value(b))?
            }
            Tlv::CancelUnicastTransmission(tlv) => {
                write_tlv(buf, TLV_CANCEL_UNICAST_TRANSMISSION, |b| tlv.encode_value(b))?
            }
            Tlv::Unknown { tlv_type, value } => {
                write_tlv(buf, *tlv_type, |b| {
                    b.extend_from_slice(value);
                    Ok(value.len())
                })?
            }
        };
        Ok(buf.len() - start)
    }
}

fn write_tlv(
    buf: &mut Vec<u8>,
    tlv_type: u16,
    body: impl FnOnce(&mut Vec<u8>) -> Result<usize>,
) -> Result<()> {
    buf.extend_from_slice(&tlv_type.to_be_bytes());
    let len_pos = buf.len();
    buf.extend_from_slice(&[0u8; 2]); // patched below
    let written = body(buf)?;
    let len = (written as u16).to_be_bytes();
    buf[len_pos..len_pos + 2].copy_from_slice(&len);
    Ok(())
}

/// Client's request to start receiving `msg_type` at `log_inter_message_period`
/// for `duration_field` seconds.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct RequestUnicastTransmissionTlv {
    pub msg_type: MsgType,
    pub log_inter_message_period: i8,
    pub duration_field: u32,
}

impl RequestUnicastTransmissionTlv {
    fn decode_value(value: &[u8]) -> Result<RequestUnicastTransmissionTlv> {
        if value.len() < 6 {
            return err!(MalformedPacket, desc: "request-unicast TLV needs 6 bytes, got {}", value.len());
        }
        let msg_type = MsgType::try_from(value[0] & 0x0f)?;
        let log_inter_message_period = value[1] as i8;
        let duration_field = u32::from_be_bytes([value[2], value[3], value[4], value[5]]);
        Ok(RequestUnicastTransmissionTlv { msg_type, log_inter_message_period, duration_field })
    }

    fn encode_value(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        buf.push(self.msg_type as u8);
        buf.push(self.log_inter_message_period as u8);
        buf.extend_from_slice(&self.duration_field.to_be_bytes());
        Ok(buf.len() - start)
    }
}

/// Server's response: the accepted parameters, or `duration_field=0` to
/// reject (§4.5).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct GrantUnicastTransmissionTlv {
    pub msg_type: MsgType,
    pub log_inter_message_period: i8,
    pub duration_field: u32,
    pub renewal: u8,
}

impl GrantUnicastTransmissionTlv {
    fn decode_value(value: &[u8]) -> Result<GrantUnicastTransmissionTlv> {
        if value.len() < 7 {
            return err!(MalformedPacket, desc: "grant-unicast TLV needs 7 bytes, got {}", value.len());
        }
        let msg_type = MsgType::try_from(value[0] & 0x0f)?;
        let log_inter_message_period = value[1] as i8;
        let duration_field = u32::from_be_bytes([value[2], value[3], value[4], value[5]]);
        let renewal = value[6] & 0x01;
        Ok(GrantUnicastTransmissionTlv { msg_type, log_inter_message_period, duration_field, renewal })
    }

    fn encode_value(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        buf.push(self.msg_type as u8);
        buf.push(self.log_inter_message_period as u8);
        buf.extend_from_slice(&self.duration_field.to_be_bytes());
        buf.push(self.renewal & 0x01);
        Ok(buf.len() - start)
    }

    pub fn is_rejected(&self) -> bool {
        self.duration_field == 0
    }
}

/// Client's request to stop receiving `msg_type`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct CancelUnicastTransmissionTlv {
    pub msg_type: MsgType,
}

impl CancelUnicastTransmissionTlv {
    fn decode_value(value: &[u8]) -> Result<CancelUnicastTransmissionTlv> {
        if value.is_empty() {
            return err!(MalformedPacket, desc: "cancel-unicast TLV needs 1 byte, got 0");
        }
        let msg_type = MsgType::try_from(value[0] & 0x0f)?;
        Ok(CancelUnicastTransmissionTlv { msg_type })
    }

    fn encode_value(&self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.push(self.msg_type as u8);
        buf.push(0); // reserved
        Ok(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u16) -> PortIdentity {
        PortIdentity { clock_identity: [5; 8], port_number: n }
    }

    #[test]
    fn request_grant_cancel_round_trip() {
        let header = Header::new(MsgType::Signaling, pid(1));
        let sig = Signaling {
            header,
            target_port_identity: pid(2),
            tlvs: vec![
                Tlv::RequestUnicastTransmission(RequestUnicastTransmissionTlv {
                    msg_type: MsgType::Sync,
                    log_inter_message_period: 0,
                    duration_field: 60,
                }),
                Tlv::GrantUnicastTransmission(GrantUnicastTransmissionTlv {
                    msg_type: MsgType::Sync,
                    log_inter_message_period: 0,
                    duration_field: 60,
                    renewal: 1,
                }),
                Tlv::CancelUnicastTransmission(CancelUnicastTransmissionTlv { msg_type: MsgType::Sync }),
            ],
        };
        let mut buf = Vec::new();
        sig.encode(&mut buf).unwrap();
        let (decoded, n) = Signaling::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, sig);
    }

    #[test]
    fn unknown_tlv_round_trips_verbatim() {
        let header = Header::new(MsgType::Signaling, pid(1));
        let sig = Signaling {
            header,
            target_port_identity: pid(2),
            tlvs: vec![Tlv::Unknown { tlv_type: 0x1234, value: vec![9, 9, 9] }],
        };
        let mut buf = Vec::new();
        sig.encode(&mut buf).unwrap();
        let (decoded, _) = Signaling::decode(&buf).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn rejection_has_zero_duration() {
        let grant = GrantUnicastTransmissionTlv {
            msg_type: MsgType::Sync,
            log_inter_message_period: 0,
            duration_field: 0,
            renewal: 0,
        };
        assert!(grant.is_rejected());
    }
}
