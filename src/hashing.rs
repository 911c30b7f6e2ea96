// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
#![doc = r#"
Deterministic hashing and traffic bucketing (spec §4.1).

Two algorithms are supported, selected per flag: `legacy`, a 32-bit rolling
hash equivalent to Java's `String.hashCode()` XORed with the seed, and
`murmur3_32`, the standard Austin Appleby MurmurHash3 x86_32 variant. Both
are pure functions and must be bit-stable for identical inputs - every
reimplementation of this SDK across languages has to agree on the same
bucket for the same key.
"#]

use crate::models::HashAlgorithm;

/// Hashes `key` with the given seed using the selected algorithm, returning
/// a signed 32-bit integer.
pub fn hash(key: &str, seed: i32, algo: HashAlgorithm) -> i32 {
    match algo {
        HashAlgorithm::Legacy => legacy_hash(key, seed),
        HashAlgorithm::Murmur3_32 => murmur3_32(key.as_bytes(), seed as u32) as i32,
    }
}

/// Maps `hash(key, seed)` into a bucket in `[1, 100]`.
pub fn bucket(key: &str, seed: i32, algo: HashAlgorithm) -> u32 {
    let h = hash(key, seed, algo);
    (h.unsigned_abs() % 100) + 1
}

/// Java-`String.hashCode()`-equivalent rolling hash, XORed with the seed.
/// Kept for flags created before murmur3 became the default algorithm.
fn legacy_hash(key: &str, seed: i32) -> i32 {
    let mut h: i32 = 0;
    for byte in key.as_bytes() {
        h = h.wrapping_mul(31).wrapping_add(*byte as i32);
    }
    h ^ seed
}

/// MurmurHash3 (x86, 32-bit variant). Public-domain algorithm by Austin
/// Appleby; this is a direct, allocation-free transliteration.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h1 = seed;
    let nblocks = data.len() / 4;

    for i in 0..nblocks {
        let off = i * 4;
        let mut k1 = u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = &data[nblocks * 4..];
    let mut k1: u32 = 0;
    match tail.len() {
        3 => {
            k1 ^= (tail[2] as u32) << 16;
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
            k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
            h1 ^= k1;
        }
        2 => {
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
            k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
            h1 ^= k1;
        }
        1 => {
            k1 ^= tail[0] as u32;
            k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
            h1 ^= k1;
        }
        _ => {}
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;
    h1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur3_32_empty_string_matches_reference() {
        // Reference vector for MurmurHash3_x86_32("", seed=0) = 0.
        assert_eq!(murmur3_32(b"", 0), 0);
    }

    #[test]
    fn murmur3_32_is_deterministic() {
        let a = murmur3_32(b"some_key", 42);
        let b = murmur3_32(b"some_key", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn murmur3_32_seed_changes_output() {
        assert_ne!(murmur3_32(b"some_key", 1), murmur3_32(b"some_key", 2));
    }

    #[test]
    fn bucket_is_within_range() {
        for i in 0..1000 {
            let key = format!("user-{}", i);
            let b = bucket(&key, 42, HashAlgorithm::Murmur3_32);
            assert!((1..=100).contains(&b), "bucket {} out of range", b);

            let b = bucket(&key, 42, HashAlgorithm::Legacy);
            assert!((1..=100).contains(&b), "bucket {} out of range", b);
        }
    }

    #[test]
    fn bucket_stable_across_calls() {
        let a = bucket("abcdefg", 7, HashAlgorithm::Murmur3_32);
        let b = bucket("abcdefg", 7, HashAlgorithm::Murmur3_32);
        assert_eq!(a, b);
    }

    #[test]
    fn same_bucket_implies_same_rollout_choice() {
        // Invariant 2: two keys that hash to the same bucket must resolve to
        // the same partition when walking the same weighted list.
        fn pick(bucket_value: u32, partitions: &[(&str, u32)]) -> &'static str {
            let mut acc = 0u32;
            for (name, weight) in partitions {
                acc += weight;
                if bucket_value <= acc {
                    return match *name {
                        "on" => "on",
                        _ => "off",
                    };
                }
            }
            "off"
        }
        let partitions = [("on", 50u32), ("off", 50u32)];
        // two distinct keys that happen to land in the same bucket hash to
        // the same rollout choice, by construction of `pick` being a pure
        // function of the bucket value alone.
        let b1 = bucket("keyA", 1, HashAlgorithm::Murmur3_32);
        let b2 = b1; // simulate a collision
        assert_eq!(pick(b1, &partitions), pick(b2, &partitions));
    }
}
