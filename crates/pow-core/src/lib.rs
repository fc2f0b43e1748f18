//! Proof-of-work search core for Bitcoin block headers.
//!
//! This crate provides pure Rust implementations of:
//! - The SHA256 compression function with partial-round evaluation and resumption
//! - SHA256 double-hashing with a round-invariant header midstate and early exit
//! - Compact difficulty target decoding and comparison
//! - Block header parsing and serialization
//! - Sequential and partitioned nonce search
//!
//! Nothing here performs I/O. Headers come from a [`HeaderSource`]
//! implementation supplied by the caller.

pub mod block;
pub mod compress;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod hash;
pub mod network;
pub mod partition;
pub mod search;
pub mod source;

#[cfg(test)]
pub(crate) mod fixtures;

pub use block::BlockHeader;
pub use compress::RoundState;
pub use config::SearchConfig;
pub use difficulty::{bits_to_difficulty, hash_meets_target, Target};
pub use error::{PowError, Result};
pub use hash::{double_sha256, hash_to_display_hex, HeaderMidstate};
pub use network::Network;
pub use partition::{partition_range, search_partitioned, PartitionedOutcome};
pub use search::{NonceSearch, SearchResult, SearchState};
pub use source::{BlockFields, BlockRef, HeaderSource, MemoryChain};
