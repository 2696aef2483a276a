use std::fmt;

use crate::err;
use crate::wire::Packetize;
use crate::Result;

/// Uniquely identifies a PTP port: an 8-byte clock identity plus a 2-byte
/// port number (IEEE 1588-2019 clause 7.5.2).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "fuzzy", derive(arbitrary::Arbitrary))]
pub struct PortIdentity {
    pub clock_identity: [u8; 8],
    pub port_number: u16,
}

impl fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.clock_identity.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        write!(f, "/{}", self.port_number)
    }
}

impl Packetize for PortIdentity {
    fn decode(stream: &[u8]) -> Result<(Self, usize)> {
        if stream.len() < 10 {
            return err!(MalformedPacket, desc: "port-identity needs 10 bytes, got {}", stream.len());
        }
        let mut clock_identity = [0u8; 8];
        clock_identity.copy_from_slice(&stream[..8]);
        let port_number = u16::from_be_bytes([stream[8], stream[9]]);
        Ok((PortIdentity { clock_identity, port_number }, 10))
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.extend_from_slice(&self.clock_identity);
        buf.extend_from_slice(&self.port_number.to_be_bytes());
        Ok(10)
    }
}

/// The server's own clock identity, an EUI-64 derived from the bind
/// interface's 6-byte MAC address per the standard MAC->EUI-64 expansion
/// (insert 0xFFFE between the OUI and the NIC-specific bytes).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    pub fn from_mac(mac: [u8; 6]) -> ClockIdentity {
        let mut id = [0u8; 8];
        id[0..3].copy_from_slice(&mac[0..3]);
        id[3] = 0xff;
        id[4] = 0xfe;
        id[5..8].copy_from_slice(&mac[3..6]);
        ClockIdentity(id)
    }

    /// Read the MAC address of `interface` from the OS and derive a clock
    /// identity from it. Any failure here is fatal at startup (§7).
    pub fn from_interface(interface: &str) -> Result<ClockIdentity> {
        let mac = read_interface_mac(interface)?;
        Ok(ClockIdentity::from_mac(mac))
    }
}

impl fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn read_interface_mac(interface: &str) -> Result<[u8; 6]> {
    let path = format!("/sys/class/net/{}/address", interface);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            return err!(
                FatalError,
                desc: "reading MAC address of interface {}: {}",
                interface,
                err
            )
        }
    };
    parse_mac(content.trim())
}

#[cfg(not(target_os = "linux"))]
fn read_interface_mac(interface: &str) -> Result<[u8; 6]> {
    err!(FatalError, desc: "MAC address lookup for {} unsupported on this OS", interface)
}

fn parse_mac(text: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 6 {
        return err!(FatalError, desc: "malformed MAC address {:?}", text);
    }
    for (i, part) in parts.iter().enumerate() {
        mac[i] = match u8::from_str_radix(part, 16) {
            Ok(byte) => byte,
            Err(err) => return err!(FatalError, desc: "malformed MAC address {:?}: {}", text, err),
        };
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eui64_inserts_fffe() {
        let id = ClockIdentity::from_mac([0x00, 0x1b, 0x21, 0x3c, 0x4d, 0x5e]);
        assert_eq!(id.0, [0x00, 0x1b, 0x21, 0xff, 0xfe, 0x3c, 0x4d, 0x5e]);
    }

    #[test]
    fn port_identity_round_trips() {
        let id = PortIdentity { clock_identity: [1, 2, 3, 4, 5, 6, 7, 8], port_number: 42 };
        let mut buf = Vec::new();
        id.encode(&mut buf).unwrap();
        let (decoded, n) = PortIdentity::decode(&buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(decoded, id);
    }

    #[test]
    fn parse_mac_rejects_garbage() {
        assert!(parse_mac("not-a-mac").is_err());
        assert!(parse_mac("00:11:22:33:44").is_err());
    }
}
