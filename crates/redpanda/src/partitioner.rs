//! Key-based partition routing.
//!
//! Uses the murmur2 hash of the Kafka Java client's default partitioner, so
//! a key maps to the same partition across releases and across clients
//! writing to the same topic.

const SEED: u32 = 0x9747_b28c;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// Kafka-compatible murmur2 of `data`.
pub fn murmur2(data: &[u8]) -> i32 {
    let mut h = SEED ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() == 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h as i32
}

/// Computes a partition for a key; equal keys always land together.
pub fn partition_hash(key: &str, num_partitions: i32) -> i32 {
    if num_partitions <= 1 {
        return 0;
    }

    (murmur2(key.as_bytes()) & 0x7fff_ffff) % num_partitions
}

/// Partition for an optional key; unkeyed records go to partition 0.
pub fn partition_for(key: Option<&str>, num_partitions: i32) -> i32 {
    key.map(|k| partition_hash(k, num_partitions)).unwrap_or(0)
}
