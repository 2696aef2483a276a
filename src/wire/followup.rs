use crate::wire::{Header, Packetize, PtpTimestamp};
use crate::Result;

/// FollowUp carries the egress (TX) timestamp of the Sync it pairs with,
/// identified by matching `sequenceId`.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct FollowUp {
    pub header: Header,
    pub precise_origin_timestamp: PtpTimestamp,
}

impl Packetize for FollowUp {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (precise_origin_timestamp, m) = PtpTimestamp::decode(&stream[n..])?;
        n += m;
        Ok((FollowUp { header, precise_origin_timestamp }, n))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.precise_origin_timestamp.encode(buf)?;
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
            Header::new(MsgType::FollowUp, PortIdentity { clock_identity: [2; 8], port_number: 2 });
        let fup = FollowUp {
            header,
            precise_origin_timestamp: PtpTimestamp { seconds: 42, nanoseconds: 7 },
        };
        let mut buf = Vec::new();
        fup.encode(&mut buf).unwrap();
        let (decoded, n) = FollowUp::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, fup);
    }
}
