//! SHA256 double-hashing and the round-invariant header midstate.

use crate::compress::{self, RoundState, Schedule, IV, ROUNDS};
use crate::difficulty::Target;
use crate::error::{PowError, Result};
use crate::network::{BLOCK_HEADER_SIZE, HEADER_PREFIX_SIZE, NONCE_OFFSET};

/// Message word of the header's second block that holds the nonce.
const NONCE_WORD: usize = (NONCE_OFFSET % 64) / 4;

/// Rounds of the header's second block that run before the nonce is consumed.
pub const INVARIANT_ROUNDS: usize = compress::first_dependent_round(NONCE_WORD);

/// Outer-hash round after which the last digest word is fixed.
///
/// The last three rounds only shift register `e` through `f` and `g` into
/// `h`, so `e` after this round is the final `h` before the feed-forward.
const EARLY_EXIT_ROUND: usize = ROUNDS - 3;

/// Single SHA256 hash, computed with the local compression core.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut state = IV;
    let mut block = [0u8; 64];

    let mut chunks = data.chunks_exact(64);
    for chunk in &mut chunks {
        block.copy_from_slice(chunk);
        state = compress::compress(&state, &block);
    }

    // Padding: 0x80, zeros, then the 64-bit big-endian message length in bits
    let rem = chunks.remainder();
    let mut tail = [0u8; 128];
    tail[..rem.len()].copy_from_slice(rem);
    tail[rem.len()] = 0x80;
    let tail_len = if rem.len() + 9 > 64 { 128 } else { 64 };
    let bit_len = (data.len() as u64).wrapping_mul(8);
    tail[tail_len - 8..tail_len].copy_from_slice(&bit_len.to_be_bytes());

    for chunk in tail[..tail_len].chunks_exact(64) {
        block.copy_from_slice(chunk);
        state = compress::compress(&state, &block);
    }

    state_to_bytes(&state)
}

/// Bitcoin's double SHA256: SHA256(SHA256(data)).
#[inline]
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Serialize a chaining value as a 32-byte digest.
pub fn state_to_bytes(state: &[u32; 8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Reverse the byte order of a 32-byte array.
///
/// Bitcoin displays hashes in reverse byte order.
#[inline]
pub fn reverse_bytes(bytes: &[u8; 32]) -> [u8; 32] {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Convert a hash to its display format (reversed hex).
pub fn hash_to_display_hex(hash: &[u8; 32]) -> String {
    hex::encode(reverse_bytes(hash))
}

/// Parse a display-format hash (reversed hex) into internal byte order.
pub fn hash_from_display_hex(display: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(display)?;
    let mut hash: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        PowError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len()))
    })?;
    hash.reverse();
    Ok(hash)
}

/// Round-invariant hashing state for one header.
///
/// Holds everything about the first hash that does not depend on the nonce:
/// the chaining value after the first 64-byte block, the second block's
/// message schedule up to the first nonce-dependent word, and the working
/// registers after the second block's nonce-independent rounds. It is only
/// valid for the 76-byte prefix it was built from.
#[derive(Debug, Clone)]
pub struct HeaderMidstate {
    prefix: [u8; HEADER_PREFIX_SIZE],
    chaining: [u32; 8],
    schedule: Schedule,
    dependent_from: usize,
    state: RoundState,
}

impl HeaderMidstate {
    /// Build the midstate for a header prefix (everything except the nonce).
    pub fn new(prefix: &[u8; HEADER_PREFIX_SIZE]) -> Self {
        let mut first = [0u8; 64];
        first.copy_from_slice(&prefix[..64]);
        let chaining = compress::compress(&IV, &first);

        // Second block: header tail, nonce placeholder, padding, 640-bit length
        let mut second = [0u8; 64];
        second[..HEADER_PREFIX_SIZE - 64].copy_from_slice(&prefix[64..]);
        second[BLOCK_HEADER_SIZE - 64] = 0x80;
        second[56..].copy_from_slice(&((BLOCK_HEADER_SIZE as u64) * 8).to_be_bytes());

        let schedule = compress::expand_schedule(&compress::block_words(&second));
        let state = RoundState::initial(&chaining).resume(&schedule, INVARIANT_ROUNDS);

        HeaderMidstate {
            prefix: *prefix,
            chaining,
            schedule,
            dependent_from: compress::first_dependent_schedule_word(NONCE_WORD),
            state,
        }
    }

    /// Whether this midstate may be reused for `prefix`.
    pub fn matches(&self, prefix: &[u8; HEADER_PREFIX_SIZE]) -> bool {
        self.prefix == *prefix
    }

    /// Cached working registers of the second block.
    pub fn round_state(&self) -> &RoundState {
        &self.state
    }

    fn first_hash(&self, nonce: u32) -> [u32; 8] {
        let mut w = self.schedule;
        // Little-endian nonce bytes read as a big-endian word
        w[NONCE_WORD] = nonce.swap_bytes();
        compress::expand_schedule_from(&mut w, self.dependent_from);
        self.state.finalize(&w, &self.chaining)
    }

    /// Double hash of the header with `nonce`, running every outer round.
    pub fn hash(&self, nonce: u32) -> [u8; 32] {
        let w = outer_schedule(&self.first_hash(nonce));
        state_to_bytes(&RoundState::initial(&IV).finalize(&w, &IV))
    }

    /// Double hash of the header with `nonce`, abandoned early when the
    /// digest provably exceeds `target`.
    ///
    /// Returns `None` only when the most significant 32 bits of the digest
    /// are already greater than those of the target. Otherwise the outer hash
    /// is completed and the full digest returned; the caller still has to
    /// check it with [`Target::meets`].
    pub fn hash_with_early_exit(&self, nonce: u32, target: &Target) -> Option<[u8; 32]> {
        let w = outer_schedule(&self.first_hash(nonce));
        let partial = RoundState::initial(&IV).resume(&w, EARLY_EXIT_ROUND);

        // Final word 7 is the numeric digest's most significant word, byte-swapped
        let last_word = partial.registers()[4].wrapping_add(IV[7]);
        if last_word.swap_bytes() > target.top_word() {
            return None;
        }

        Some(state_to_bytes(&partial.finalize(&w, &IV)))
    }
}

fn outer_schedule(first: &[u32; 8]) -> Schedule {
    let mut words = [0u32; 16];
    words[..8].copy_from_slice(first);
    words[8] = 0x8000_0000;
    words[15] = 256;
    compress::expand_schedule(&words)
}
