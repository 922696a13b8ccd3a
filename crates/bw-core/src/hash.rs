//! Hash functions for the match index
//!
//! Tokens are keyed by a 32-bit Murmur3 hash, domains by a 64-bit key made of
//! two Murmur3 passes with different seeds. All hashes are ASCII
//! case-insensitive so URLs never need to be lowercased before lookup.

const SEED_LO: u32 = 0x9e3779b9; // Golden ratio
const SEED_HI: u32 = 0x85ebca6b; // Murmur3 constant
const SEED_TOKEN: u32 = 0x811c9dc5;

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical token and domain lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h ^= mix_k(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        h ^= mix_k(k);
    }

    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

#[inline]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593)
}

/// Run `f` over an ASCII-lowercased copy of `bytes`, on the stack when it fits.
#[inline]
fn with_lowercase<R>(bytes: &[u8], f: impl FnOnce(&[u8]) -> R) -> R {
    let mut buf = [0u8; 256];
    if bytes.len() <= buf.len() {
        for (dst, &b) in buf.iter_mut().zip(bytes) {
            *dst = b.to_ascii_lowercase();
        }
        f(&buf[..bytes.len()])
    } else {
        f(&bytes.to_ascii_lowercase())
    }
}

/// Compute a 32-bit hash for a token, ignoring ASCII case.
#[inline]
pub fn hash_token_bytes(token: &[u8]) -> u32 {
    with_lowercase(token, |lower| murmur3_32(lower, SEED_TOKEN))
}

/// Hash a domain string for lookup in the host index.
/// Lowercases the input before hashing for case-insensitive matching.
#[inline]
pub fn hash_domain(domain: &str) -> u64 {
    with_lowercase(domain.as_bytes(), |lower| {
        let lo = murmur3_32(lower, SEED_LO) as u64;
        let hi = murmur3_32(lower, SEED_HI) as u64;
        (hi << 32) | lo
    })
}
