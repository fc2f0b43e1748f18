//! Header sources.
//!
//! The core never talks to a node itself. Anything that can resolve a block
//! reference to raw header bytes implements [`HeaderSource`]; the `pow-node`
//! crate provides a JSON-RPC implementation and [`MemoryChain`] serves
//! headers held in memory. This module also decodes the two node response
//! shapes headers arrive in: `getblock` objects and `getwork` data.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::block::BlockHeader;
use crate::error::{PowError, Result};
use crate::hash::hash_to_display_hex;
use crate::network::BLOCK_HEADER_SIZE;

/// A reference to a block known to a header source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// Absolute height, or relative to the tip when negative (-1 is the tip).
    Height(i64),
    /// Block hash in internal byte order.
    Hash([u8; 32]),
}

impl BlockRef {
    /// The most recent block.
    pub fn tip() -> Self {
        BlockRef::Height(-1)
    }

    /// The block `k` blocks before the most recent one.
    pub fn tip_minus(k: u32) -> Self {
        BlockRef::Height(-1 - i64::from(k))
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Height(h) => write!(f, "height {}", h),
            BlockRef::Hash(hash) => write!(f, "hash {}", hash_to_display_hex(hash)),
        }
    }
}

/// Something that can hand out raw 80-byte block headers.
///
/// Implementations return [`PowError::NotFound`] when a reference cannot be
/// resolved. Retrying is up to the implementation; callers in this crate
/// never retry.
pub trait HeaderSource {
    /// Header of the block with the given hash (internal byte order).
    fn header_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>>;

    /// Header at `height`; negative heights count back from the tip.
    fn header_by_height(&self, height: i64) -> Result<Vec<u8>>;

    /// A mining candidate with `bits` filled in. It need not have a solution.
    fn work_template(&self) -> Result<Vec<u8>>;

    /// Resolve any block reference.
    fn header(&self, reference: &BlockRef) -> Result<Vec<u8>> {
        match reference {
            BlockRef::Height(height) => self.header_by_height(*height),
            BlockRef::Hash(hash) => self.header_by_hash(hash),
        }
    }
}

/// Headers held in memory, indexed by height.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    headers: Vec<BlockHeader>,
    template: Option<BlockHeader>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header at the next height.
    pub fn push(&mut self, header: BlockHeader) {
        self.headers.push(header);
    }

    /// Set the header returned by [`HeaderSource::work_template`].
    pub fn set_template(&mut self, header: BlockHeader) {
        self.template = Some(header);
    }

    /// Number of headers in the chain.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn resolve_height(&self, height: i64) -> Option<usize> {
        let len = self.headers.len() as i64;
        let absolute = if height < 0 { len + height } else { height };
        if (0..len).contains(&absolute) {
            Some(absolute as usize)
        } else {
            None
        }
    }
}

impl HeaderSource for MemoryChain {
    fn header_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>> {
        self.headers
            .iter()
            .find(|header| header.calculate_hash() == *hash)
            .map(|header| header.serialize().to_vec())
            .ok_or_else(|| PowError::NotFound(BlockRef::Hash(*hash).to_string()))
    }

    fn header_by_height(&self, height: i64) -> Result<Vec<u8>> {
        self.resolve_height(height)
            .map(|i| self.headers[i].serialize().to_vec())
            .ok_or_else(|| PowError::NotFound(BlockRef::Height(height).to_string()))
    }

    fn work_template(&self) -> Result<Vec<u8>> {
        self.template
            .map(|header| header.serialize().to_vec())
            .ok_or_else(|| PowError::NotFound("no work template".to_string()))
    }
}

/// Header fields as returned by a node's `getblock` call.
///
/// Hashes are display-order hex and `bits` is big-endian hex, the way the
/// node prints them. Any other fields in the response are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    pub version: i32,
    /// Absent for the genesis block.
    #[serde(rename = "previousblockhash", default, skip_serializing_if = "Option::is_none")]
    pub prev_block_hash: Option<String>,
    #[serde(rename = "merkleroot")]
    pub merkle_root: String,
    pub time: u32,
    pub bits: String,
    pub nonce: u32,
}

impl BlockFields {
    /// Parse a `getblock` JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PowError::Source(format!("invalid block json: {}", e)))
    }

    /// Parse from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| PowError::Source(format!("invalid block json: {}", e)))
    }
}

/// Decode the `data` field of a `getwork` response into header bytes.
///
/// getwork hands out the padded 128-byte first-hash input with every 4-byte
/// word byte-reversed. Only the first 80 bytes are the header.
pub fn decode_getwork_data(data_hex: &str) -> Result<[u8; BLOCK_HEADER_SIZE]> {
    let data = hex::decode(data_hex)?;
    if data.len() < BLOCK_HEADER_SIZE {
        return Err(PowError::MalformedHeader { len: data.len() });
    }

    let mut header = [0u8; BLOCK_HEADER_SIZE];
    for (out, word) in header
        .chunks_exact_mut(4)
        .zip(data[..BLOCK_HEADER_SIZE].chunks_exact(4))
    {
        out.copy_from_slice(&[word[3], word[2], word[1], word[0]]);
    }
    Ok(header)
}

/// Encode header bytes the way `getwork` presents them (128 bytes, words byte-reversed).
pub fn encode_getwork_data(header: &[u8; BLOCK_HEADER_SIZE]) -> String {
    let mut data = [0u8; 128];
    data[..BLOCK_HEADER_SIZE].copy_from_slice(header);
    data[BLOCK_HEADER_SIZE] = 0x80;
    data[120..].copy_from_slice(&((BLOCK_HEADER_SIZE as u64) * 8).to_be_bytes());
    for word in data.chunks_exact_mut(4) {
        word.reverse();
    }
    hex::encode(data)
}
