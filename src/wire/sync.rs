use crate::wire::{Header, Packetize, PtpTimestamp};
use crate::Result;

/// Sync message: the event-port half of the two-step Sync/FollowUp pair.
/// The `originTimestamp` field is left zero on the wire for two-step
/// operation; the real origin time travels in the matching FollowUp.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct Sync {
    pub header: Header,
    pub origin_timestamp: PtpTimestamp,
}

impl Packetize for Sync {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (origin_timestamp, m) = PtpTimestamp::decode(&stream[n..])?;
        n += m;
        Ok((Sync { header, origin_timestamp }, n))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.origin_timestamp.encode(buf)?;
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
        let header = Header::new(MsgType::Sync, PortIdentity { clock_identity: [1; 8], port_number: 1 });
        let sync = Sync { header, origin_timestamp: PtpTimestamp::default() };
        let mut buf = Vec::new();
        sync.encode(&mut buf).unwrap();
        let (decoded, n) = Sync::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, sync);
    }
}
