//! Mapping of keys to tree levels.

use sha2::{Digest, Sha256};

/// Maps a key to the level of the node that holds it (0 = leaf).
///
/// The tree shape is a function of this mapping alone. Any deterministic
/// mapping yields a correct tree; one where each level is roughly `fanout`
/// times rarer than the one below yields a balanced one. All trees that are
/// diffed or merged against each other must use the same calculator.
pub trait LevelCalculator: Send + Sync {
    /// Returns the level of `key`.
    fn level(&self, key: &[u8]) -> u8;
}

/// Level from the number of leading all-zero bit groups of the key's
/// SHA-256 digest.
///
/// With `fanout_bits = 4` each level is 16 times rarer than the one below,
/// giving nodes of about 16 entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultLevelCalculator {
    /// Width of one bit group. Nodes hold about `2^fanout_bits` entries.
    pub fanout_bits: u8,
    /// Upper bound on the level of any key.
    pub max_level: u8,
}

impl Default for DefaultLevelCalculator {
    fn default() -> Self {
        Self {
            fanout_bits: 4,
            max_level: 16,
        }
    }
}

impl DefaultLevelCalculator {
    /// Creates a calculator with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bit group width (clamped to 1..=8).
    #[must_use]
    pub fn fanout_bits(mut self, bits: u8) -> Self {
        self.fanout_bits = bits.clamp(1, 8);
        self
    }

    /// Sets the maximum level.
    #[must_use]
    pub fn max_level(mut self, level: u8) -> Self {
        self.max_level = level;
        self
    }
}

impl LevelCalculator for DefaultLevelCalculator {
    fn level(&self, key: &[u8]) -> u8 {
        let digest = Sha256::digest(key);
        let mut prefix = [0u8; 16];
        prefix.copy_from_slice(&digest[..16]);
        let zeros = u128::from_be_bytes(prefix).leading_zeros();
        let level = zeros / u32::from(self.fanout_bits.max(1));
        u8::try_from(level).unwrap_or(u8::MAX).min(self.max_level)
    }
}
