//! Parallel search over disjoint nonce partitions.
//!
//! The nonce range is split into contiguous ranges, one independent
//! [`NonceSearch`] per range, run on a dedicated rayon thread pool. Workers
//! share nothing but two stop signals: the caller's flag, and the index of
//! the lowest partition that has found a solution. A worker only stops for a
//! find in a *lower* partition, so the overall result is always the smallest
//! solving nonce in the whole range. A stopped search hands back the ranges
//! it did not finish so the caller can pick up where it left off.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::block::BlockHeader;
use crate::config::SearchConfig;
use crate::difficulty::format_difficulty;
use crate::error::{PowError, Result};
use crate::hash::HeaderMidstate;
use crate::search::{NonceSearch, SearchResult};

/// Split `range` into at most `parts` disjoint contiguous ranges, in order.
///
/// Sizes differ by at most one. An empty input range yields no partitions.
pub fn partition_range(range: RangeInclusive<u32>, parts: usize) -> Vec<RangeInclusive<u32>> {
    let start = u64::from(*range.start());
    let end = u64::from(*range.end());
    if start > end {
        return Vec::new();
    }

    let total = end - start + 1;
    let parts = (parts as u64).clamp(1, total);
    let base = total / parts;
    let extra = total % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut lo = start;
    for i in 0..parts {
        let len = base + u64::from(i < extra);
        let hi = lo + len - 1;
        ranges.push(lo as u32..=hi as u32);
        lo = hi + 1;
    }
    ranges
}

/// Outcome of a partitioned search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedOutcome {
    /// `Found` only if every nonce below the solution was searched.
    pub result: SearchResult,
    /// Nonce ranges still to be searched after a stop, in ascending order.
    /// Empty when the search ran to completion.
    pub resume: Vec<RangeInclusive<u32>>,
}

impl PartitionedOutcome {
    /// Whether the whole range was covered without interruption.
    pub fn is_complete(&self) -> bool {
        self.resume.is_empty()
    }
}

/// Search `header` across `config.worker_count()` partitions in parallel.
///
/// Setting `stop` makes every worker return at its next check. The result is
/// then `Found` only if all partitions below the solving one ran to their
/// end; otherwise it is `Exhausted` and `resume` lists what is left to search.
pub fn search_partitioned(
    header: &BlockHeader,
    config: &SearchConfig,
    stop: &AtomicBool,
) -> Result<PartitionedOutcome> {
    config.validate()?;
    let target = config.target_for(header)?;
    let ranges = partition_range(config.nonce_range(), config.worker_count());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .build()
        .map_err(|e| PowError::InvalidConfig(format!("failed to build thread pool: {}", e)))?;

    info!(
        workers = ranges.len(),
        start = config.start_nonce,
        end = config.end_nonce,
        difficulty = %format_difficulty(target.difficulty()),
        "starting partitioned nonce search"
    );

    let midstate = HeaderMidstate::new(&header.serialize_without_nonce());
    let lowest_found = AtomicUsize::new(usize::MAX);
    let interval = config.stop_check_interval;

    let finished: Vec<(SearchResult, Option<u32>)> = pool.install(|| {
        ranges
            .par_iter()
            .enumerate()
            .map(|(index, range)| {
                let mut search =
                    NonceSearch::from_midstate(header, midstate.clone(), target, range.clone());
                let result = search.run_until(interval, || {
                    stop.load(Ordering::Relaxed) || lowest_found.load(Ordering::Relaxed) < index
                });
                if result.is_found() {
                    lowest_found.fetch_min(index, Ordering::Relaxed);
                }
                debug!(
                    partition = index,
                    hashes = search.hashes_computed(),
                    found = result.is_found(),
                    "partition finished"
                );
                (result, search.next_nonce())
            })
            .collect()
    });

    let outcome = combine(&ranges, finished);
    if !outcome.is_complete() {
        info!(remaining = outcome.resume.len(), "partitioned nonce search stopped");
    }
    Ok(outcome)
}

/// Merge per-partition results in nonce order.
///
/// A partition that was cut off leaves `next_nonce..=end` to search. The
/// first solution only counts if nothing below it is left over; otherwise
/// its partition is resumed from the solving nonce itself.
fn combine(
    ranges: &[RangeInclusive<u32>],
    finished: Vec<(SearchResult, Option<u32>)>,
) -> PartitionedOutcome {
    let mut resume = Vec::new();
    for (range, (result, next)) in ranges.iter().zip(finished) {
        match (result, next) {
            (SearchResult::Found { nonce, .. }, _) => {
                if resume.is_empty() {
                    return PartitionedOutcome { result, resume };
                }
                resume.push(nonce..=*range.end());
                break;
            }
            (SearchResult::Exhausted, Some(next)) => resume.push(next..=*range.end()),
            (SearchResult::Exhausted, None) => {}
        }
    }
    PartitionedOutcome {
        result: SearchResult::Exhausted,
        resume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_partition_range_covers_everything() {
        let ranges = partition_range(0..=u32::MAX, 7);
        assert_eq!(ranges.len(), 7);
        assert_eq!(*ranges[0].start(), 0);
        assert_eq!(*ranges[6].end(), u32::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(*pair[0].end() as u64 + 1, *pair[1].start() as u64);
        }
        let total: u64 = ranges.iter().map(|r| (*r.end() - *r.start()) as u64 + 1).sum();
        assert_eq!(total, 1u64 << 32);
    }

    #[test]
    fn test_partition_range_edge_cases() {
        assert_eq!(partition_range(5..=7, 10), vec![5..=5, 6..=6, 7..=7]);
        assert_eq!(partition_range(5..=7, 0), vec![5..=7]);
        assert_eq!(partition_range(0..=9, 3), vec![0..=3, 4..=6, 7..=9]);
        #[allow(clippy::reversed_empty_ranges)]
        let empty = partition_range(8..=7, 3);
        assert!(empty.is_empty());
    }

    fn share_config(start: u32, end: u32, workers: usize) -> SearchConfig {
        SearchConfig {
            start_nonce: start,
            end_nonce: end,
            workers,
            stop_check_interval: 512,
            // About one nonce in 4096 qualifies
            share_difficulty: Some(1.0 / 1_048_576.0),
        }
    }

    #[test]
    fn test_partition_equivalence() {
        let header = fixtures::block_1();
        let config = share_config(0, 60_000, 1);
        let target = config.target_for(&header).unwrap();
        let expected = NonceSearch::with_target(&header, target, config.nonce_range()).run();
        assert!(expected.is_found());

        let stop = AtomicBool::new(false);
        for workers in [1, 2, 3, 7, 16] {
            let config = share_config(0, 60_000, workers);
            let outcome = search_partitioned(&header, &config, &stop).unwrap();
            assert_eq!(outcome.result, expected, "workers = {}", workers);
            assert!(outcome.is_complete());
        }
    }

    #[test]
    fn test_partitioned_genesis() {
        let mut header = fixtures::genesis();
        header.nonce = 0;
        let config = SearchConfig {
            start_nonce: fixtures::GENESIS_NONCE - 3_000,
            end_nonce: fixtures::GENESIS_NONCE + 3_000,
            workers: 4,
            stop_check_interval: 256,
            share_difficulty: None,
        };
        let stop = AtomicBool::new(false);
        let outcome = search_partitioned(&header, &config, &stop).unwrap();
        assert_eq!(outcome.result.nonce(), Some(fixtures::GENESIS_NONCE));
    }

    #[test]
    fn test_collective_exhaustion() {
        let header = fixtures::genesis();
        let config = SearchConfig {
            start_nonce: 0,
            end_nonce: 20_000,
            workers: 5,
            stop_check_interval: 1_000,
            share_difficulty: None,
        };
        let stop = AtomicBool::new(false);
        let outcome = search_partitioned(&header, &config, &stop).unwrap();
        assert_eq!(outcome.result, SearchResult::Exhausted);
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_external_stop() {
        let header = fixtures::genesis();
        let config = SearchConfig {
            workers: 2,
            stop_check_interval: 100,
            ..SearchConfig::default()
        };
        let stop = AtomicBool::new(true);
        let outcome = search_partitioned(&header, &config, &stop).unwrap();
        assert_eq!(outcome.result, SearchResult::Exhausted);
        // Each worker checks the flag after its first batch
        assert_eq!(outcome.resume, vec![100..=0x7fff_ffff, 0x8000_0064..=u32::MAX]);
    }

    #[test]
    fn test_stop_never_reports_a_higher_solution() {
        // Solutions under the share target: 2402, 9984, ...
        let header = fixtures::block_1();
        let config = share_config(0, 18_944, 2);
        let target = config.target_for(&header).unwrap();
        let stop = AtomicBool::new(true);

        // The upper worker finds 9984 in its first batch while the lower one
        // is stopped at 512, short of 2402
        let outcome = search_partitioned(&header, &config, &stop).unwrap();
        assert_eq!(outcome.result, SearchResult::Exhausted);
        assert_eq!(outcome.resume, vec![512..=9_472, 9_984..=18_944]);

        let resumed = outcome.resume.iter().find_map(|range| {
            NonceSearch::with_target(&header, target, range.clone()).run().nonce()
        });
        assert_eq!(resumed, Some(2_402));
    }

    #[test]
    fn test_combine_in_nonce_order() {
        let ranges = partition_range(0..=299, 3);
        let found = |nonce| SearchResult::Found { nonce, hash: [0; 32] };

        // Every lower partition finished: the first solution stands
        let outcome = combine(
            &ranges,
            vec![
                (SearchResult::Exhausted, None),
                (found(150), None),
                (SearchResult::Exhausted, Some(220)),
            ],
        );
        assert_eq!(outcome.result, found(150));
        assert!(outcome.is_complete());

        // A lower partition was cut off: nothing is reported yet
        let outcome = combine(
            &ranges,
            vec![
                (SearchResult::Exhausted, Some(40)),
                (found(150), None),
                (SearchResult::Exhausted, Some(220)),
            ],
        );
        assert_eq!(outcome.result, SearchResult::Exhausted);
        assert_eq!(outcome.resume, vec![40..=99, 150..=199]);

        // Nothing found and two partitions interrupted
        let outcome = combine(
            &ranges,
            vec![
                (SearchResult::Exhausted, Some(10)),
                (SearchResult::Exhausted, None),
                (SearchResult::Exhausted, Some(250)),
            ],
        );
        assert_eq!(outcome.resume, vec![10..=99, 250..=299]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let header = fixtures::genesis();
        let config = SearchConfig {
            stop_check_interval: 0,
            ..SearchConfig::default()
        };
        let stop = AtomicBool::new(false);
        assert!(matches!(
            search_partitioned(&header, &config, &stop),
            Err(PowError::InvalidConfig(_))
        ));
    }
}
