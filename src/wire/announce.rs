use crate::wire::{Header, Packetize, PtpTimestamp};
use crate::Result;

/// Announce: advertises the grandmaster's clock quality and the current
/// UTC offset. Fields beyond what this server needs to populate or compare
/// (clock quality, priorities, grandmaster identity, steps removed, time
/// source) are carried as opaque defaults since this server always acts as
/// its own grandmaster in unicast mode.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct Announce {
    pub header: Header,
    pub origin_timestamp: PtpTimestamp,
    pub current_utc_offset: i16,
    pub grandmaster_priority1: u8,
    pub grandmaster_clock_quality: u32,
    pub grandmaster_priority2: u8,
    pub grandmaster_identity: [u8; 8],
    pub steps_removed: u16,
    pub time_source: u8,
}

impl Packetize for Announce {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (origin_timestamp, m) = PtpTimestamp::decode(&stream[n..])?;
        n += m;

        let body = &stream[n..];
        if body.len() < 20 {
            return crate::err!(MalformedPacket, desc: "announce body needs 20 bytes, got {}", body.len());
        }
        let current_utc_offset = i16::from_be_bytes([body[0], body[1]]);
        // body[2] reserved
        let grandmaster_priority1 = body[3];
        let grandmaster_clock_quality = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        let grandmaster_priority2 = body[8];
        let mut grandmaster_identity = [0u8; 8];
        grandmaster_identity.copy_from_slice(&body[9..17]);
        let steps_removed = u16::from_be_bytes([body[17], body[18]]);
        let time_source = body[19];
        n += 20;

        Ok((
            Announce {
                header,
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            },
            n,
        ))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.origin_timestamp.encode(buf)?;
        buf.extend_from_slice(&self.current_utc_offset.to_be_bytes());
        buf.push(0);
        buf.push(self.grandmaster_priority1);
        buf.extend_from_slice(&self.grandmaster_clock_quality.to_be_bytes());
        buf.push(self.grandmaster_priority2);
        buf.extend_from_slice(&self.grandmaster_identity);
        buf.extend_from_slice(&self.steps_removed.to_be_bytes());
        buf.push(self.time_source);
        Ok(buf.len() - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PortIdentity;
    use crate::wire::MsgType;

    #[test]
    fn round_trips() {
        let header =
            Header::new(MsgType::Announce, PortIdentity { clock_identity: [4; 8], port_number: 1 });
        let ann = Announce {
            header,
            origin_timestamp: PtpTimestamp::default(),
            current_utc_offset: 37,
            grandmaster_priority1: 128,
            grandmaster_clock_quality: 0x20,
            grandmaster_priority2: 128,
            grandmaster_identity: [4; 8],
            steps_removed: 0,
            time_source: 0xa0,
        };
        let mut buf = Vec::new();
        ann.encode(&mut buf).unwrap();
        let (decoded, n) = Announce::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, ann);
    }
}
