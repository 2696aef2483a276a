use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::err;
use crate::wire::Packetize;
use crate::Result;

/// PTP's on-wire timestamp: 48-bit seconds since the PTP epoch (1970-01-01
/// TAI) plus 32-bit nanoseconds (IEEE 1588-2019 clause 5.3.3).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct PtpTimestamp {
    pub seconds: u64, // only the low 48 bits are meaningful on the wire.
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    pub fn from_system_time(t: SystemTime) -> PtpTimestamp {
        let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        PtpTimestamp { seconds: d.as_secs(), nanoseconds: d.subsec_nanos() }
    }

    pub fn to_duration_since_epoch(self) -> Duration {
        Duration::new(self.seconds, self.nanoseconds)
    }

    /// Shift by a UTC offset, positive `offset_secs` moving the timestamp
    /// forward in time (TAI = UTC + offset).
    pub fn shift_seconds(self, offset_secs: i64) -> PtpTimestamp {
        let secs = self.seconds as i64 + offset_secs;
        PtpTimestamp { seconds: secs.max(0) as u64, nanoseconds: self.nanoseconds }
    }
}

impl Packetize for PtpTimestamp {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        if stream.len() < 10 {
            return err!(MalformedPacket, desc: "timestamp needs 10 bytes, got {}", stream.len());
        }
        let mut secs_bytes = [0u8; 8];
        secs_bytes[2..].copy_from_slice(&stream[..6]);
        let seconds = u64::from_be_bytes(secs_bytes);
        let nanoseconds = u32::from_be_bytes([stream[6], stream[7], stream[8], stream[9]]);
        Ok((PtpTimestamp { seconds, nanoseconds }, 10))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let secs_bytes = self.seconds.to_be_bytes();
        buf.extend_from_slice(&secs_bytes[2..]); // low 48 bits
        buf.extend_from_slice(&self.nanoseconds.to_be_bytes());
        Ok(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ts = PtpTimestamp { seconds: 1_700_000_000, nanoseconds: 123_456_789 };
        let mut buf = Vec::new();
        ts.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 10);
        let (decoded, n) = PtpTimestamp::decode(&buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(decoded, ts);
    }

    #[test]
    fn shift_seconds_moves_forward() {
        let ts = PtpTimestamp { seconds: 100, nanoseconds: 0 };
        assert_eq!(ts.shift_seconds(37).seconds, 137);
    }
}
