//! Bitcoin difficulty target conversion and comparison.

use core::cmp::Ordering;
use core::fmt;

use crate::error::{PowError, Result};
use crate::network::DIFFICULTY_ONE_BITS;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// A 256-bit proof-of-work target, stored as a big-endian number.
///
/// Ordering on `Target` is numeric ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// The largest possible target; every digest meets it.
    pub const MAX: Target = Target([0xff; 32]);

    /// Build a target from 32 big-endian bytes.
    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    /// The target as 32 big-endian bytes.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Decode the compact "bits" representation.
    ///
    /// The bits format is: [exponent (1 byte)][mantissa (3 bytes)]
    /// Target = mantissa * 256^(exponent - 3)
    ///
    /// Fails if the mantissa sign bit is set or if any non-zero mantissa byte
    /// would be shifted above bit 255. Mantissa bytes shifted below bit 0
    /// (exponent < 3) are dropped, as in Bitcoin Core.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & SIGN_BIT != 0 {
            return Err(PowError::MalformedTarget {
                bits,
                reason: "mantissa sign bit is set",
            });
        }

        let exponent = (bits >> 24) as usize;
        let mantissa = bits & MANTISSA_MASK;
        let mut target = [0u8; 32];

        if exponent <= 3 {
            let value = mantissa >> (8 * (3 - exponent));
            target[28..].copy_from_slice(&value.to_be_bytes());
            return Ok(Target(target));
        }

        // Mantissa bytes land at big-endian positions 32 - exponent + 0..3
        let mantissa_bytes = mantissa.to_be_bytes();
        for (i, &byte) in mantissa_bytes[1..].iter().enumerate() {
            match (32 + i).checked_sub(exponent) {
                Some(pos) => target[pos] = byte,
                None if byte != 0 => {
                    return Err(PowError::MalformedTarget {
                        bits,
                        reason: "target overflows 256 bits",
                    })
                }
                None => {}
            }
        }

        Ok(Target(target))
    }

    /// Encode back into compact "bits" form, losing precision beyond three bytes.
    pub fn to_bits(&self) -> u32 {
        let first_nonzero = match self.0.iter().position(|&b| b != 0) {
            Some(i) => i,
            None => return 0,
        };

        // Exponent is the number of significant bytes
        let exponent = (32 - first_nonzero) as u32;

        let mut mantissa: u32 = 0;
        for i in 0..3 {
            mantissa <<= 8;
            if let Some(&byte) = self.0.get(first_nonzero + i) {
                mantissa |= byte as u32;
            }
        }

        // Shift right rather than set the sign bit
        let (exponent, mantissa) = if mantissa & SIGN_BIT != 0 {
            (exponent + 1, mantissa >> 8)
        } else {
            (exponent, mantissa)
        };

        (exponent << 24) | (mantissa & MANTISSA_MASK)
    }

    /// Target for a given difficulty, relative to the difficulty-1 target.
    ///
    /// The result is truncated to compact precision, so
    /// `Target::from_difficulty(d)?.to_bits()` is exact.
    pub fn from_difficulty(difficulty: f64) -> Result<Self> {
        if !difficulty.is_finite() || difficulty <= 0.0 {
            return Err(PowError::InvalidConfig(format!(
                "difficulty must be a positive finite number, got {}",
                difficulty
            )));
        }

        // Difficulty-1 target is 0xffff * 256^26, i.e. mantissa 0xffff at exponent 0x1d
        let mut value = f64::from(DIFFICULTY_ONE_BITS & MANTISSA_MASK) / difficulty;
        let mut exponent: u32 = DIFFICULTY_ONE_BITS >> 24;

        while value >= f64::from(SIGN_BIT) {
            value /= 256.0;
            exponent += 1;
        }
        while value < f64::from(SIGN_BIT >> 8) && exponent > 3 {
            value *= 256.0;
            exponent -= 1;
        }

        let too_easy = || PowError::InvalidConfig(format!("difficulty {} is too low", difficulty));
        if exponent > 0xff {
            return Err(too_easy());
        }
        Target::from_bits((exponent << 24) | (value as u32 & MANTISSA_MASK))
            .map_err(|_| too_easy())
    }

    /// Difficulty relative to the difficulty-1 target (approximate).
    pub fn difficulty(&self) -> f64 {
        let current = self.to_f64();
        if current == 0.0 {
            return f64::INFINITY;
        }
        difficulty_one().to_f64() / current
    }

    /// Most significant 32 bits of the target.
    pub fn top_word(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Check whether a digest meets this target.
    ///
    /// The digest is in internal byte order; it is read as a 256-bit number
    /// after reversal and must be less than or equal to the target.
    #[inline]
    pub fn meets(&self, hash: &[u8; 32]) -> bool {
        hash.iter().rev().cmp(self.0.iter()) != Ordering::Greater
    }

    fn to_f64(&self) -> f64 {
        self.0.iter().fold(0.0, |acc, &b| acc * 256.0 + f64::from(b))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", hex::encode(self.0))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

fn difficulty_one() -> Target {
    let mut target = [0u8; 32];
    target[4] = 0xff;
    target[5] = 0xff;
    Target(target)
}

/// Check if a hash (internal byte order) meets the difficulty target.
#[inline]
pub fn hash_meets_target(hash: &[u8; 32], target: &Target) -> bool {
    target.meets(hash)
}

/// Calculate approximate difficulty from bits.
///
/// Difficulty = max_target / current_target
/// Where max_target is the genesis block target (bits = 0x1d00ffff)
pub fn bits_to_difficulty(bits: u32) -> Result<f64> {
    Ok(Target::from_bits(bits)?.difficulty())
}

/// Format difficulty for display (e.g., "1.23T" for trillion).
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}
