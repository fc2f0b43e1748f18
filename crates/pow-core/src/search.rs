//! Nonce search over a header's 32-bit nonce space.
//!
//! A search owns the header's [`HeaderMidstate`] and walks its nonce range in
//! strictly ascending order. Each candidate goes through the early-exit hash
//! path; the first digest that meets the target ends the search.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::block::BlockHeader;
use crate::difficulty::Target;
use crate::error::Result;
use crate::hash::{hash_to_display_hex, HeaderMidstate};

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// A nonce whose header hash meets the target.
    Found { nonce: u32, hash: [u8; 32] },
    /// No nonce in the searched range meets the target.
    Exhausted,
}

impl SearchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchResult::Found { .. })
    }

    pub fn nonce(&self) -> Option<u32> {
        match self {
            SearchResult::Found { nonce, .. } => Some(*nonce),
            SearchResult::Exhausted => None,
        }
    }
}

/// Where a search stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Running,
    Terminal(SearchResult),
}

/// Sequential nonce search for one header.
#[derive(Debug, Clone)]
pub struct NonceSearch {
    midstate: HeaderMidstate,
    target: Target,
    // u64 so the range can end at u32::MAX inclusive
    next: u64,
    end: u64,
    hashes: u64,
    state: SearchState,
}

impl NonceSearch {
    /// Search `start_nonce..=u32::MAX` against the header's own target.
    pub fn new(header: &BlockHeader, start_nonce: u32) -> Result<Self> {
        let target = header.target()?;
        Ok(Self::with_target(header, target, start_nonce..=u32::MAX))
    }

    /// Search a nonce range against an arbitrary target.
    pub fn with_target(header: &BlockHeader, target: Target, range: RangeInclusive<u32>) -> Self {
        let midstate = HeaderMidstate::new(&header.serialize_without_nonce());
        Self::start(midstate, target, range)
    }

    /// Search a nonce range of `header` reusing a midstate built for it.
    ///
    /// A midstate built from any other header prefix is discarded and
    /// rebuilt, so a stale cache never produces wrong hashes.
    pub fn from_midstate(
        header: &BlockHeader,
        midstate: HeaderMidstate,
        target: Target,
        range: RangeInclusive<u32>,
    ) -> Self {
        let prefix = header.serialize_without_nonce();
        if midstate.matches(&prefix) {
            return Self::start(midstate, target, range);
        }
        warn!("midstate belongs to a different header, rebuilding");
        Self::start(HeaderMidstate::new(&prefix), target, range)
    }

    fn start(midstate: HeaderMidstate, target: Target, range: RangeInclusive<u32>) -> Self {
        let next = u64::from(*range.start());
        let end = u64::from(*range.end()) + 1;
        debug!(
            start = next,
            end = end - 1,
            invariant_rounds = midstate.round_state().rounds(),
            target = %target,
            "nonce search created"
        );

        let state = if next < end {
            SearchState::Running
        } else {
            SearchState::Terminal(SearchResult::Exhausted)
        };

        NonceSearch {
            midstate,
            target,
            next,
            end,
            hashes: 0,
            state,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Next nonce to be tried, if the search is still running.
    ///
    /// After a stopped [`run_until`](Self::run_until) this is the resume point.
    pub fn next_nonce(&self) -> Option<u32> {
        match self.state {
            SearchState::Running => Some(self.next as u32),
            SearchState::Terminal(_) => None,
        }
    }

    /// Number of nonces evaluated so far.
    pub fn hashes_computed(&self) -> u64 {
        self.hashes
    }

    /// Evaluate at most `budget` nonces.
    ///
    /// Returns `None` while the search is still running.
    pub fn step(&mut self, budget: u64) -> Option<SearchResult> {
        if let SearchState::Terminal(result) = self.state {
            return Some(result);
        }

        let stop = self.end.min(self.next.saturating_add(budget));
        while self.next < stop {
            let nonce = self.next as u32;
            self.next += 1;
            self.hashes += 1;

            if let Some(hash) = self.midstate.hash_with_early_exit(nonce, &self.target) {
                if self.target.meets(&hash) {
                    info!(
                        nonce,
                        hash = %hash_to_display_hex(&hash),
                        hashes = self.hashes,
                        "found nonce"
                    );
                    return Some(self.finish(SearchResult::Found { nonce, hash }));
                }
            }
        }

        if self.next >= self.end {
            debug!(hashes = self.hashes, "nonce range exhausted");
            return Some(self.finish(SearchResult::Exhausted));
        }
        None
    }

    fn finish(&mut self, result: SearchResult) -> SearchResult {
        self.state = SearchState::Terminal(result);
        result
    }

    /// Search to the end of the range.
    pub fn run(&mut self) -> SearchResult {
        loop {
            if let Some(result) = self.step(u64::MAX) {
                return result;
            }
        }
    }

    /// Search until a result or until `should_stop` returns true.
    ///
    /// `should_stop` is polled every `check_interval` nonces, never in the
    /// middle of a hash. A stopped search reports `Exhausted` for the part
    /// searched so far and stays `Running`; calling any run method again
    /// resumes from [`next_nonce`](Self::next_nonce).
    pub fn run_until(
        &mut self,
        check_interval: u32,
        mut should_stop: impl FnMut() -> bool,
    ) -> SearchResult {
        let interval = u64::from(check_interval.max(1));
        loop {
            if let Some(result) = self.step(interval) {
                return result;
            }
            if should_stop() {
                debug!(next_nonce = self.next, hashes = self.hashes, "nonce search stopped");
                return SearchResult::Exhausted;
            }
        }
    }

    /// Search for at most `limit` of wall-clock time.
    pub fn run_for(&mut self, limit: Duration, check_interval: u32) -> SearchResult {
        let deadline = Instant::now() + limit;
        self.run_until(check_interval, || Instant::now() >= deadline)
    }

    /// Every solving nonce in the range, in ascending order.
    pub fn solutions(self) -> Solutions {
        Solutions { search: self }
    }

    fn reopen(&mut self) {
        self.state = if self.next < self.end {
            SearchState::Running
        } else {
            SearchState::Terminal(SearchResult::Exhausted)
        };
    }
}

/// Iterator over all solutions of a search, see [`NonceSearch::solutions`].
#[derive(Debug, Clone)]
pub struct Solutions {
    search: NonceSearch,
}

impl Iterator for Solutions {
    type Item = (u32, [u8; 32]);

    fn next(&mut self) -> Option<Self::Item> {
        match self.search.run() {
            SearchResult::Found { nonce, hash } => {
                self.search.reopen();
                Some((nonce, hash))
            }
            SearchResult::Exhausted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::hash::{double_sha256, hash_to_display_hex};

    /// Roughly one nonce in 4096 meets this target.
    fn easy_target() -> Target {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0f;
        Target::from_be_bytes(bytes)
    }

    fn brute_force(header: &BlockHeader, target: &Target, range: RangeInclusive<u32>) -> Vec<u32> {
        range
            .filter(|&n| target.meets(&double_sha256(&header.with_nonce(n).serialize())))
            .collect()
    }

    #[test]
    fn test_genesis_nonce_found() {
        let mut header = fixtures::genesis();
        header.nonce = 0;
        let target = header.target().unwrap();
        let start = fixtures::GENESIS_NONCE - 2_000;

        let mut search = NonceSearch::with_target(&header, target, start..=u32::MAX);
        let result = search.run();

        assert_eq!(result.nonce(), Some(fixtures::GENESIS_NONCE));
        if let SearchResult::Found { hash, .. } = result {
            assert_eq!(hash_to_display_hex(&hash), fixtures::GENESIS_HASH);
        }
        assert_eq!(search.hashes_computed(), 2_001);
        assert_eq!(search.state(), SearchState::Terminal(result));
        assert_eq!(search.next_nonce(), None);
    }

    #[test]
    fn test_exhausted_range() {
        let header = fixtures::genesis();
        let target = header.target().unwrap();
        let mut search = NonceSearch::with_target(&header, target, 0..=999);
        assert_eq!(search.run(), SearchResult::Exhausted);
        assert_eq!(search.hashes_computed(), 1_000);
        // Terminal state is sticky
        assert_eq!(search.step(10), Some(SearchResult::Exhausted));
    }

    #[test]
    fn test_range_ending_at_max_nonce() {
        let header = fixtures::genesis();
        let mut search = NonceSearch::with_target(&header, Target::MAX, u32::MAX..=u32::MAX);
        assert_eq!(search.run().nonce(), Some(u32::MAX));

        let zero = Target::from_be_bytes([0; 32]);
        let mut search = NonceSearch::with_target(&header, zero, u32::MAX - 9..=u32::MAX);
        assert_eq!(search.run(), SearchResult::Exhausted);
        assert_eq!(search.hashes_computed(), 10);
    }

    #[test]
    fn test_finds_smallest_solution() {
        let header = fixtures::block_1();
        let target = easy_target();
        let expected = brute_force(&header, &target, 0..=50_000);
        assert!(!expected.is_empty());

        let mut search = NonceSearch::with_target(&header, target, 0..=50_000);
        assert_eq!(search.run().nonce(), Some(expected[0]));
    }

    #[test]
    fn test_solutions_iterator_matches_brute_force() {
        let header = fixtures::block_1();
        let target = easy_target();
        let expected = brute_force(&header, &target, 1_000..=30_000);

        let found: Vec<u32> = NonceSearch::with_target(&header, target, 1_000..=30_000)
            .solutions()
            .map(|(nonce, hash)| {
                assert_eq!(hash, double_sha256(&header.with_nonce(nonce).serialize()));
                nonce
            })
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_deterministic() {
        let header = fixtures::genesis();
        let target = easy_target();
        let first = NonceSearch::with_target(&header, target, 77..=100_000).run();
        let second = NonceSearch::with_target(&header, target, 77..=100_000).run();
        assert_eq!(first, second);
        assert!(first.is_found());
    }

    #[test]
    fn test_stop_and_resume() {
        let mut header = fixtures::genesis();
        header.nonce = 0;
        let start = fixtures::GENESIS_NONCE - 1_000;
        let mut search = NonceSearch::new(&header, start).unwrap();

        // Stops after the first batch
        assert_eq!(search.run_until(100, || true), SearchResult::Exhausted);
        assert_eq!(search.state(), SearchState::Running);
        assert_eq!(search.next_nonce(), Some(start + 100));
        assert_eq!(search.hashes_computed(), 100);

        let result = search.run_until(100, || false);
        assert_eq!(result.nonce(), Some(fixtures::GENESIS_NONCE));
        assert_eq!(search.hashes_computed(), 1_001);
    }

    #[test]
    fn test_run_for_zero_duration_stops() {
        let header = fixtures::genesis();
        let mut search = NonceSearch::new(&header, 0).unwrap();
        assert_eq!(search.run_for(Duration::ZERO, 10), SearchResult::Exhausted);
        assert_eq!(search.next_nonce(), Some(10));
    }

    #[test]
    fn test_empty_range() {
        let header = fixtures::genesis();
        #[allow(clippy::reversed_empty_ranges)]
        let mut search = NonceSearch::with_target(&header, Target::MAX, 10..=9);
        assert_eq!(search.state(), SearchState::Terminal(SearchResult::Exhausted));
        assert_eq!(search.run(), SearchResult::Exhausted);
        assert_eq!(search.hashes_computed(), 0);
    }

    #[test]
    fn test_from_midstate_rejects_foreign_midstate() {
        let mut header = fixtures::genesis();
        header.nonce = 0;
        let target = header.target().unwrap();
        let range = fixtures::GENESIS_NONCE - 100..=fixtures::GENESIS_NONCE + 100;

        let own = HeaderMidstate::new(&header.serialize_without_nonce());
        let mut search = NonceSearch::from_midstate(&header, own, target, range.clone());
        assert_eq!(search.run().nonce(), Some(fixtures::GENESIS_NONCE));

        // Block 1's midstate must not be used to hash the genesis header
        let foreign = HeaderMidstate::new(&fixtures::block_1().serialize_without_nonce());
        let mut search = NonceSearch::from_midstate(&header, foreign, target, range);
        assert_eq!(search.run().nonce(), Some(fixtures::GENESIS_NONCE));
    }
}
