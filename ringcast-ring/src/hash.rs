//! The key hash used to place both keys and node replicas on the ring.
//!
//! This is Murmur3 (x86, 32-bit) with a zero seed. Every process that shares
//! data with another must agree on it, so changing it remaps every key.

use std::io::Cursor;

const SEED: u32 = 0;

#[inline]
/// Hashes an arbitrary key onto the ring.
pub fn key_hash(key: &[u8]) -> u32 {
    murmur3_32(key, SEED)
}

/// The ring position of replica `index` of `node`.
///
/// The replica key is the decimal index immediately followed by the node id,
/// e.g. replica 3 of `n1` hashes `"3n1"`.
pub fn replica_position(node: &str, index: usize) -> u32 {
    key_hash(replica_key(node, index).as_bytes())
}

#[inline]
pub(crate) fn replica_key(node: &str, index: usize) -> String {
    format!("{index}{node}")
}

/// Murmur3 x86 32-bit over an in-memory buffer.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    // Reading from a slice cannot fail.
    murmur3::murmur3_32(&mut Cursor::new(data), seed).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        assert_eq!(murmur3_32(b"foo", 0), 0xf6a5_c420);
        assert_eq!(
            murmur3_32(b"The quick brown fox jumps over the lazy dog", 0x9747_b28c),
            0x2fa8_26cd,
        );
    }

    #[test]
    fn test_replica_key_prepends_index() {
        assert_eq!(replica_key("n1", 3), "3n1");
        assert_eq!(replica_position("n1", 3), key_hash(b"3n1"));
        assert_ne!(replica_position("n1", 3), key_hash(b"n13"));
        assert_ne!(replica_position("n1", 3), key_hash(b"3|n1"));
    }

    #[test]
    fn test_hash_is_stable() {
        let a = key_hash(b"cpu.idle/host=a");
        let b = key_hash(b"cpu.idle/host=a");
        assert_eq!(a, b);
    }
}
