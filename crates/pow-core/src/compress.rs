//! SHA-256 compression function with partial-round evaluation.
//!
//! The `sha2` crate does not expose its working registers, so the compression
//! function is implemented here directly. A compression can be stopped after
//! any number of rounds, yielding a [`RoundState`] that can later be resumed
//! with a (possibly different) message schedule. This is what makes
//! round-invariant caching possible during a nonce search: rounds whose
//! schedule words do not depend on the nonce are run once and reused.

/// Number of rounds in one compression.
pub const ROUNDS: usize = 64;

/// SHA-256 initial hash values (FIPS 180-4, section 5.3.3).
pub const IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// SHA-256 round constants: the first 32 bits of the fractional parts of the
/// cube roots of the first 64 primes.
const K: [u32; ROUNDS] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

/// Expanded message schedule for one 64-byte block.
pub type Schedule = [u32; ROUNDS];

/// The eight working registers `a..h` after a number of compression rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundState {
    regs: [u32; 8],
    rounds: usize,
}

impl RoundState {
    /// State before round 0: the registers hold the chaining value.
    pub fn initial(chaining: &[u32; 8]) -> Self {
        RoundState {
            regs: *chaining,
            rounds: 0,
        }
    }

    /// Number of rounds already applied.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Working registers in `a, b, c, d, e, f, g, h` order.
    pub fn registers(&self) -> &[u32; 8] {
        &self.regs
    }

    /// Run rounds `self.rounds()..until` with the given schedule.
    ///
    /// # Panics
    /// If `until` is smaller than the rounds already applied or larger than 64.
    pub fn resume(&self, w: &Schedule, until: usize) -> RoundState {
        assert!(
            self.rounds <= until && until <= ROUNDS,
            "cannot resume from round {} to round {}",
            self.rounds,
            until
        );
        let mut regs = self.regs;
        for i in self.rounds..until {
            round(&mut regs, K[i], w[i]);
        }
        RoundState { regs, rounds: until }
    }

    /// Complete the remaining rounds and add the chaining value (feed-forward).
    pub fn finalize(&self, w: &Schedule, chaining: &[u32; 8]) -> [u32; 8] {
        let done = self.resume(w, ROUNDS);
        let mut out = *chaining;
        for (word, reg) in out.iter_mut().zip(done.regs.iter()) {
            *word = word.wrapping_add(*reg);
        }
        out
    }
}

#[inline(always)]
fn round(regs: &mut [u32; 8], k: u32, w: u32) {
    let [a, b, c, d, e, f, g, h] = *regs;
    let s1 = e.rotate_right(6) ^ e.rotate_right(11) ^ e.rotate_right(25);
    let ch = (e & f) ^ (!e & g);
    let temp1 = h
        .wrapping_add(s1)
        .wrapping_add(ch)
        .wrapping_add(k)
        .wrapping_add(w);
    let s0 = a.rotate_right(2) ^ a.rotate_right(13) ^ a.rotate_right(22);
    let maj = (a & b) ^ (a & c) ^ (b & c);
    let temp2 = s0.wrapping_add(maj);

    *regs = [
        temp1.wrapping_add(temp2),
        a,
        b,
        c,
        d.wrapping_add(temp1),
        e,
        f,
        g,
    ];
}

/// Parse a 64-byte block into 16 big-endian words.
pub fn block_words(block: &[u8; 64]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (word, chunk) in words.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Expand 16 message words into the full 64-word schedule.
pub fn expand_schedule(words: &[u32; 16]) -> Schedule {
    let mut w = [0u32; ROUNDS];
    w[..16].copy_from_slice(words);
    expand_schedule_from(&mut w, 16);
    w
}

/// Recompute schedule words `start..64` from the words before them.
///
/// Words below 16 are message words and are never touched.
pub fn expand_schedule_from(w: &mut Schedule, start: usize) {
    for i in start.max(16)..ROUNDS {
        let s0 = w[i - 15].rotate_right(7) ^ w[i - 15].rotate_right(18) ^ (w[i - 15] >> 3);
        let s1 = w[i - 2].rotate_right(17) ^ w[i - 2].rotate_right(19) ^ (w[i - 2] >> 10);
        w[i] = w[i - 16]
            .wrapping_add(s0)
            .wrapping_add(w[i - 7])
            .wrapping_add(s1);
    }
}

/// First round whose input depends on message word `word`.
///
/// Round `i` consumes schedule word `W[i]`, and the first 16 schedule words
/// are the message words themselves, so rounds `0..word` only see other
/// message words.
pub const fn first_dependent_round(word: usize) -> usize {
    word
}

/// First expanded schedule word (index >= 16) that depends on message word `word`.
///
/// Follows the recurrence `W[i] = f(W[i-2], W[i-7], W[i-15], W[i-16])`.
/// Every schedule word before the returned index can be computed once and
/// reused while `word` varies.
///
/// # Panics
/// If `word` is not a message word index (`0..16`).
pub fn first_dependent_schedule_word(word: usize) -> usize {
    assert!(word < 16, "message word index out of range: {}", word);
    let mut depends = [false; ROUNDS];
    depends[word] = true;
    for i in 16..ROUNDS {
        depends[i] = depends[i - 2] || depends[i - 7] || depends[i - 15] || depends[i - 16];
        if depends[i] {
            return i;
        }
    }
    ROUNDS
}

/// Run the first `rounds` rounds of a compression.
///
/// With `rounds == 64` the returned state is complete and
/// [`RoundState::finalize`] only adds the feed-forward.
pub fn compress_rounds(chaining: &[u32; 8], block: &[u8; 64], rounds: usize) -> RoundState {
    let w = expand_schedule(&block_words(block));
    RoundState::initial(chaining).resume(&w, rounds)
}

/// Full compression of one block.
pub fn compress(chaining: &[u32; 8], block: &[u8; 64]) -> [u32; 8] {
    let w = expand_schedule(&block_words(block));
    RoundState::initial(chaining).finalize(&w, chaining)
}
