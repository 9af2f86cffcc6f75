//! Deterministic random number generator
//!
//! Uses a simple xorshift64 algorithm so that a seeded sequence of ticks or an
//! offline settlement can be reproduced exactly in tests and when replaying a
//! session from logs.

use serde::{Deserialize, Serialize};

/// A deterministic random number generator
///
/// Every SequenceActor and PlayerActor owns its own instance, seeded through
/// [`hash_seed`] so that no two actors share a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRng {
    state: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        // xorshift requires a non-zero state
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Get the current state (useful for saving/loading)
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Generate the next raw u64 value
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generate a random f64 in range [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a random bool with given probability of true
    ///
    /// A probability of 0 never succeeds and 1 always does.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Pick a random element from a slice
    pub fn pick<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let i = (self.next_u64() as usize) % slice.len();
            Some(&slice[i])
        }
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::new(12345)
    }
}

/// Mix a base seed with two discriminators into a new seed (splitmix64 finalizer)
///
/// Used to derive independent per-actor streams: `hash_seed(base, player, spawn)`.
pub fn hash_seed(seed: u64, a: u64, b: u64) -> u64 {
    let mut z = seed
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xC2B2_AE3D_27D4_EB4F));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Hash a byte slice with a seed (FNV-1a, finished with [`hash_seed`])
pub fn hash_bytes_with_seed(bytes: &[u8], seed: u64) -> u64 {
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut h = seed ^ 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    hash_seed(seed, h, bytes.len() as u64)
}
