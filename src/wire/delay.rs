use crate::identity::PortIdentity;
use crate::wire::{Header, Packetize, PtpTimestamp};
use crate::Result;

/// DelayReq: client's request for a server-stamped receive timestamp.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct DelayReq {
    pub header: Header,
    pub origin_timestamp: PtpTimestamp,
}

impl Packetize for DelayReq {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (origin_timestamp, m) = PtpTimestamp::decode(&stream[n..])?;
        n += m;
        Ok((DelayReq { header, origin_timestamp }, n))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.origin_timestamp.encode(buf)?;
        Ok(buf.len() - start)
    }
}

/// DelayResp: the server's answer, carrying the RX timestamp it observed
/// for the DelayReq and echoing the requester's PortIdentity.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct DelayResp {
    pub header: Header,
    pub receive_timestamp: PtpTimestamp,
    pub requesting_port_identity: PortIdentity,
}

impl Packetize for DelayResp {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        let (header, mut n) = Header::decode(stream)?;
        let (receive_timestamp, m) = PtpTimestamp::decode(&stream[n..])?;
        n += m;
        let (requesting_port_identity, m) = PortIdentity::decode(&stream[n..])?;
        n += m;
        Ok((DelayResp { header, receive_timestamp, requesting_port_identity }, n))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let start = buf.len();
        self.header.encode(buf)?;
        self.receive_timestamp.encode(buf)?;
        self.requesting_port_identity.encode(buf)?;
        Ok(buf.len() - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::MsgType;

    fn pid(n: u16) -> PortIdentity {
        PortIdentity { clock_identity: [3; 8], port_number: n }
    }

    #[test]
    fn delay_req_round_trips() {
        let header = Header::new(MsgType::DelayReq, pid(1));
        let req = DelayReq { header, origin_timestamp: PtpTimestamp::default() };
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        let (decoded, n) = DelayReq::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, req);
    }

    #[test]
    fn delay_resp_round_trips() {
        let header = Header::new(MsgType::DelayResp, pid(1));
        let resp = DelayResp {
            header,
            receive_timestamp: PtpTimestamp { seconds: 5, nanoseconds: 6 },
            requesting_port_identity: pid(7),
        };
        let mut buf = Vec::new();
        resp.encode(&mut buf).unwrap();
        let (decoded, n) = DelayResp::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(decoded, resp);
    }
}
