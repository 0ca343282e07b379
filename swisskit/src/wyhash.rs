/*
 * Created on Wed Jun 02 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! WyHash v4, the keyed byte-string hash backing [`crate::swisstable`]'s h1/h2
//! split. Ported from <https://github.com/wangyi-fudan/wyhash> (public domain);
//! this is also the default hash of Go, Nim and Zig.
//!
//! Every multi-byte read constructs a little-endian logical value byte by
//! byte, so the result is identical on big- and little-endian hosts without
//! any explicit byte-swapping.

/// Default secret parameters from WyHash (commit `ea3b25e`).
const SECRET: [u64; 4] = [
    0xa076_1d64_78bd_642f,
    0xe703_7ed1_a0b4_28db,
    0x8ebc_6af0_9c88_c6e3,
    0x5899_65cc_7537_4cc3,
];

/// Reads the first `N` bytes of `p` as a little-endian value, zero-extended
/// to 64 bits. `p` must have at least `N` bytes.
fn read_n<const N: usize>(p: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..N].copy_from_slice(&p[..N]);
    u64::from_le_bytes(buf)
}

/// The 3-byte-or-fewer read used for inputs shorter than 4 bytes. Touches
/// only indices `0`, `k / 2` and `k - 1` of `p`, which is how WyHash avoids a
/// branch per length for 1-, 2- and 3-byte keys.
fn read3(p: &[u8], k: usize) -> u64 {
    let a = (p[0] as u64) << 16;
    let b = (p[k / 2] as u64) << 8;
    let c = p[k - 1] as u64;
    a | b | c
}

/// `a * b` as a 128-bit product split back into two 64-bit halves.
///
/// When `ENTROPY_PROTECTION` is set, the halves are XORed into the inputs
/// instead of replacing them outright, which keeps a small amount of the
/// caller's entropy alive across the multiply. Go, Nim and Zig all ship with
/// this off; it exists for callers hashing low-entropy or attacker-chosen
/// keys who want the extra mixing.
fn multiply<const ENTROPY_PROTECTION: bool>(a: u64, b: u64) -> (u64, u64) {
    let product = (a as u128) * (b as u128);
    let lo = product as u64;
    let hi = (product >> 64) as u64;
    if ENTROPY_PROTECTION {
        (a ^ lo, b ^ hi)
    } else {
        (lo, hi)
    }
}

fn mix<const ENTROPY_PROTECTION: bool>(a: u64, b: u64) -> u64 {
    let (a, b) = multiply::<ENTROPY_PROTECTION>(a, b);
    a ^ b
}

fn wyhash<const ENTROPY_PROTECTION: bool>(key: &[u8], mut seed: u64) -> u64 {
    seed ^= mix::<ENTROPY_PROTECTION>(seed ^ SECRET[0], SECRET[1]);
    let len = key.len();
    let (mut a, mut b) = (0u64, 0u64);
    if len <= 16 {
        if len >= 4 {
            let shift = (len >> 3) << 2;
            a = (read_n::<4>(key) << 32) | read_n::<4>(&key[shift..]);
            b = (read_n::<4>(&key[len - 4..]) << 32) | read_n::<4>(&key[len - 4 - shift..]);
        } else if len > 0 {
            a = read3(key, len);
        }
    } else {
        let mut p = key;
        let mut i = len;
        if i > 48 {
            let (mut s1, mut s2) = (seed, seed);
            loop {
                seed = mix::<ENTROPY_PROTECTION>(read_n::<8>(p) ^ SECRET[1], read_n::<8>(&p[8..]) ^ seed);
                s1 = mix::<ENTROPY_PROTECTION>(read_n::<8>(&p[16..]) ^ SECRET[2], read_n::<8>(&p[24..]) ^ s1);
                s2 = mix::<ENTROPY_PROTECTION>(read_n::<8>(&p[32..]) ^ SECRET[3], read_n::<8>(&p[40..]) ^ s2);
                p = &p[48..];
                i -= 48;
                if i <= 48 {
                    break;
                }
            }
            seed ^= s1 ^ s2;
        }
        while i > 16 {
            seed = mix::<ENTROPY_PROTECTION>(read_n::<8>(p) ^ SECRET[1], read_n::<8>(&p[8..]) ^ seed);
            i -= 16;
            p = &p[16..];
        }
        // the final 16-byte window sits at a fixed offset from the end of
        // the whole input, independent of how the loop above chunked it
        a = read_n::<8>(&key[len - 16..]);
        b = read_n::<8>(&key[len - 8..]);
    }
    a ^= SECRET[1];
    b ^= seed;
    let (a, b) = multiply::<ENTROPY_PROTECTION>(a, b);
    mix::<ENTROPY_PROTECTION>(a ^ SECRET[0] ^ len as u64, b ^ SECRET[1])
}

/// WyHash keyed over a byte string, generic over whether the multiply
/// substep protects entropy (see [`multiply`]).
pub struct WyHash<const ENTROPY_PROTECTION: bool = false>;

impl<const ENTROPY_PROTECTION: bool> WyHash<ENTROPY_PROTECTION> {
    pub fn hash(key: &[u8], seed: u64) -> u64 {
        wyhash::<ENTROPY_PROTECTION>(key, seed)
    }
}

/// Follows Go's practice of disabling low-entropy protection by default.
pub type DefaultHash = WyHash<false>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer_vectors() {
        let repeated_digits = "1234567890".repeat(8);
        let cases: [(&str, u64); 7] = [
            ("", 0x0409638ee2bde459),
            ("a", 0xa8412d091b5fe0a9),
            ("abc", 0x32dd92e4b2915153),
            ("message digest", 0x8619124089a3a16b),
            ("abcdefghijklmnopqrstuvwxyz", 0x7a43afb61d7f5f40),
            (
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
                0xff42329b90e50d58,
            ),
            (repeated_digits.as_str(), 0xc39cab13b115aad3),
        ];
        for (seed, (input, expected)) in cases.into_iter().enumerate() {
            let actual = DefaultHash::hash(input.as_bytes(), seed as u64);
            assert_eq!(actual, expected, "input length = {}, seed = {}", input.len(), seed);
        }
    }

    #[test]
    fn avalanche_single_bit_flip() {
        let base = b"the quick brown fox jumps over the lazy dog!!!!";
        let base_hash = DefaultHash::hash(base, 0);
        for byte in 0..base.len() {
            for bit in 0..8u8 {
                let mut flipped = *base;
                flipped[byte] ^= 1 << bit;
                let flipped_hash = DefaultHash::hash(&flipped, 0);
                assert_ne!(flipped_hash, base_hash);
                let differing_bits = (flipped_hash ^ base_hash).count_ones();
                assert!(differing_bits >= 8, "only {differing_bits} bits changed");
            }
        }
    }

    #[test]
    fn entropy_protection_changes_output_but_not_determinism() {
        let key = b"entropy protection toggle";
        let without = WyHash::<false>::hash(key, 7);
        let with = WyHash::<true>::hash(key, 7);
        assert_ne!(without, with);
        assert_eq!(with, WyHash::<true>::hash(key, 7));
    }

    #[test]
    fn stable_across_lengths_crossing_every_dispatch_branch() {
        // exercises the len == 0, 1..4, 4..16, 16, 17..48 and >48 branches
        for len in [0usize, 1, 3, 4, 15, 16, 17, 48, 49, 200] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
            let h1 = DefaultHash::hash(&data, 1);
            let h2 = DefaultHash::hash(&data, 1);
            assert_eq!(h1, h2);
        }
    }
}
