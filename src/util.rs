use crate::error::{Error, ErrorKind};
use crate::identity::PortIdentity;

/// Return the remaining bytes of `stream` after skipping `n`, erroring if
/// `n` runs past the end. Wire decoders chain this between fields instead
/// of slicing by hand each time.
pub fn advance(stream: &[u8], n: usize) -> crate::error::Result<&[u8]> {
    if n > stream.len() {
        return Err(Error::new(
            ErrorKind::MalformedPacket,
            format!("advance {} beyond length {}", n, stream.len()),
        ));
    }
    Ok(&stream[n..])
}

/// 32-bit CityHash of a client's PortIdentity, used only to pick a stable
/// worker index for that client (the 10-byte wire identity, hashed per
/// §4.1). `cityhash-rs` exposes only the 128-bit variant, so the low 32 bits
/// of that output are kept; CityHash's bit mixing is thorough enough that
/// truncation does not reintroduce the collisions a narrower hash would
/// have picked up on its own. Not used anywhere security-sensitive.
pub fn hash_port_identity(id: &PortIdentity) -> u32 {
    let mut bytes = [0u8; 10];
    bytes[..8].copy_from_slice(&id.clock_identity);
    bytes[8..].copy_from_slice(&id.port_number.to_be_bytes());
    cityhash_rs::cityhash_110_128(&bytes) as u32
}

/// Deterministic worker assignment: same PortIdentity, same worker, for any
/// worker count fixed at startup.
pub fn worker_for(id: &PortIdentity, worker_count: usize) -> usize {
    assert!(worker_count > 0);
    (hash_port_identity(id) % worker_count as u32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(clock: [u8; 8], port: u16) -> PortIdentity {
        PortIdentity { clock_identity: clock, port_number: port }
    }

    #[test]
    fn worker_assignment_is_deterministic() {
        let id = pid([1, 2, 3, 4, 5, 6, 7, 8], 1);
        let a = worker_for(&id, 16);
        let b = worker_for(&id, 16);
        assert_eq!(a, b);
        assert!(a < 16);
    }

    #[test]
    fn worker_assignment_spreads_across_identities() {
        let mut buckets = std::collections::HashSet::new();
        for port in 0u16..64 {
            let id = pid([9, 9, 9, 9, 9, 9, 9, 9], port);
            buckets.insert(worker_for(&id, 8));
        }
        assert!(buckets.len() > 1, "hashing should not collapse to a single worker");
    }

    #[test]
    fn advance_rejects_out_of_range() {
        let buf = [0u8; 4];
        assert!(advance(&buf, 5).is_err());
        assert_eq!(advance(&buf, 4).unwrap().len(), 0);
    }
}
