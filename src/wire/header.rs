use crate::err;
use crate::identity::PortIdentity;
use crate::wire::Packetize;
use crate::Result;

/// The 34-byte PTPv2 common header shared by every message type (IEEE
/// 1588-2019 clause 13.3).
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct Header {
    pub msg_type: MsgType,
    pub version_ptp: u8,
    pub message_length: u16,
    pub domain_number: u8,
    pub flag_field: u16,
    pub correction_field: i64,
    pub source_port_identity: PortIdentity,
    pub sequence_id: u16,
    pub control_field: u8,
    pub log_message_interval: i8,
}

impl Header {
    pub const LEN: usize = 34;

    pub fn new(msg_type: MsgType, source: PortIdentity) -> Header {
        Header {
            msg_type,
            version_ptp: 2,
            message_length: 0,
            domain_number: 0,
            flag_field: 0,
            correction_field: 0,
            source_port_identity: source,
            sequence_id: 0,
            control_field: msg_type.control_field(),
            log_message_interval: 0x7f, // "not applicable" per spec, callers override.
        }
    }
}

impl Packetize for Header {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        if stream.len() < Header::LEN {
            return err!(MalformedPacket, desc: "header needs {} bytes, got {}", Header::LEN, stream.len());
        }
        let msg_type = MsgType::try_from(stream[0] & 0x0f)?;
        let version_ptp = stream[1] & 0x0f;
        let message_length = u16::from_be_bytes([stream[2], stream[3]]);
        let domain_number = stream[4];
        let flag_field = u16::from_be_bytes([stream[6], stream[7]]);
        let mut correction_bytes = [0u8; 8];
        correction_bytes.copy_from_slice(&stream[8..16]);
        let correction_field = i64::from_be_bytes(correction_bytes);
        let (source_port_identity, _) = PortIdentity::decode(&stream[20..30])?;
        let sequence_id = u16::from_be_bytes([stream[30], stream[31]]);
        let control_field = stream[32];
        let log_message_interval = stream[33] as i8;

        let header = Header {
            msg_type,
            version_ptp,
            message_length,
            domain_number,
            flag_field,
            correction_field,
            source_port_identity,
            sequence_id,
            control_field,
            log_message_interval,
        };
        Ok((header, Header::LEN))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        buf.push((self.msg_type as u8) & 0x0f);
        buf.push(self.version_ptp & 0x0f);
        buf.extend_from_slice(&self.message_length.to_be_bytes());
        buf.push(self.domain_number);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.flag_field.to_be_bytes());
        buf.extend_from_slice(&self.correction_field.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]); // reserved
        self.source_port_identity.encode(buf)?;
        buf.extend_from_slice(&self.sequence_id.to_be_bytes());
        buf.push(self.control_field);
        buf.push(self.log_message_interval as u8);
        Ok(buf.len() - start)
    }
}

/// The PTP message types this server emits or consumes. Values are the
/// 4-bit messageType field (IEEE 1588-2019 Table 34).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum MsgType {
    Sync = 0x0,
    DelayReq = 0x1,
    FollowUp = 0x8,
    DelayResp = 0x9,
    Announce = 0xb,
    Signaling = 0xc,
}

impl MsgType {
    fn control_field(self) -> u8 {
        match self {
            MsgType::Sync => 0x00,
            MsgType::DelayReq => 0x01,
            MsgType::FollowUp => 0x02,
            MsgType::DelayResp => 0x03,
            MsgType::Announce | MsgType::Signaling => 0x05,
        }
    }
}

impl TryFrom<u8> for MsgType {
    type Error = crate::error::Error;

    fn try_from(val: u8) -> Result<MsgType> {
        match val {
            0x0 => Ok(MsgType::Sync),
            0x1 => Ok(MsgType::DelayReq),
            0x8 => Ok(MsgType::FollowUp),
            0x9 => Ok(MsgType::DelayResp),
            0xb => Ok(MsgType::Announce),
            0xc => Ok(MsgType::Signaling),
            val => err!(UnsupportedMessage, desc: "unsupported PTP messageType 0x{:x}", val),
        }
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
