//! Bitcoin block header parsing, serialization and hashing.

use crate::difficulty::Target;
use crate::error::{PowError, Result};
use crate::hash::{double_sha256, hash_from_display_hex, hash_to_display_hex};
use crate::network::{BLOCK_HEADER_SIZE, HEADER_PREFIX_SIZE, NONCE_OFFSET};
use crate::search::{NonceSearch, SearchResult};
use crate::source::{decode_getwork_data, BlockFields, BlockRef, HeaderSource};

/// A Bitcoin block header (80 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Hash of the previous block (internal byte order).
    pub prev_block_hash: [u8; 32],
    /// Merkle root of all transactions (internal byte order).
    pub merkle_root: [u8; 32],
    /// Block timestamp (Unix time).
    pub timestamp: u32,
    /// Difficulty target in compact "bits" format.
    pub bits: u32,
    /// Nonce for proof of work.
    pub nonce: u32,
}

impl BlockHeader {
    /// Create a new block header with a zero nonce.
    pub fn new(
        version: i32,
        prev_block_hash: [u8; 32],
        merkle_root: [u8; 32],
        timestamp: u32,
        bits: u32,
    ) -> Self {
        BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce: 0,
        }
    }

    /// Parse a serialized header; the input must be exactly 80 bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; BLOCK_HEADER_SIZE] = bytes
            .try_into()
            .map_err(|_| PowError::MalformedHeader { len: bytes.len() })?;

        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        Ok(BlockHeader {
            version: i32::from_le_bytes(word(0)),
            prev_block_hash,
            merkle_root,
            timestamp: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(NONCE_OFFSET)),
        })
    }

    /// Serialize the block header to 80 bytes.
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[..HEADER_PREFIX_SIZE].copy_from_slice(&self.serialize_without_nonce());

        // Nonce (4 bytes, little-endian)
        header[NONCE_OFFSET..].copy_from_slice(&self.nonce.to_le_bytes());

        header
    }

    /// Serialize the header without the nonce (76 bytes).
    /// This is the part a nonce search keeps fixed.
    pub fn serialize_without_nonce(&self) -> [u8; HEADER_PREFIX_SIZE] {
        let mut header = [0u8; HEADER_PREFIX_SIZE];

        // Version (4 bytes, little-endian)
        header[0..4].copy_from_slice(&self.version.to_le_bytes());

        // Previous block hash (32 bytes, internal byte order)
        header[4..36].copy_from_slice(&self.prev_block_hash);

        // Merkle root (32 bytes, internal byte order)
        header[36..68].copy_from_slice(&self.merkle_root);

        // Timestamp (4 bytes, little-endian)
        header[68..72].copy_from_slice(&self.timestamp.to_le_bytes());

        // Bits (4 bytes, little-endian)
        header[72..76].copy_from_slice(&self.bits.to_le_bytes());

        header
    }

    /// Copy of this header with a different nonce.
    pub fn with_nonce(&self, nonce: u32) -> Self {
        BlockHeader { nonce, ..*self }
    }

    /// Compute the block hash (double SHA256) with the current nonce.
    pub fn calculate_hash(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }

    /// The block hash as display hex (reversed byte order).
    pub fn display_hash(&self) -> String {
        hash_to_display_hex(&self.calculate_hash())
    }

    /// Decode the target from `bits`.
    pub fn target(&self) -> Result<Target> {
        Target::from_bits(self.bits)
    }

    /// Difficulty of `bits` relative to difficulty 1.
    pub fn difficulty(&self) -> Result<f64> {
        Ok(self.target()?.difficulty())
    }

    /// Recompute the hash and check it against `bits`.
    pub fn verify_proof_of_work(&self) -> Result<[u8; 32]> {
        let hash = self.calculate_hash();
        if self.target()?.meets(&hash) {
            Ok(hash)
        } else {
            Err(PowError::HashAboveTarget)
        }
    }

    /// Search `start_nonce..=u32::MAX` for a nonce meeting `bits`.
    ///
    /// The header itself is not modified; apply the nonce with
    /// [`with_nonce`](Self::with_nonce).
    pub fn search(&self, start_nonce: u32) -> Result<SearchResult> {
        Ok(NonceSearch::new(self, start_nonce)?.run())
    }

    /// Fetch a header from a header source.
    pub fn from_external<S: HeaderSource + ?Sized>(
        source: &S,
        reference: &BlockRef,
    ) -> Result<Self> {
        let header = Self::parse(&source.header(reference)?)?;
        if let BlockRef::Hash(hash) = reference {
            if header.calculate_hash() != *hash {
                return Err(PowError::Source(format!(
                    "source returned block {} for {}",
                    header.display_hash(),
                    reference
                )));
            }
        }
        Ok(header)
    }

    /// Fetch the source's current mining candidate.
    pub fn from_work_template<S: HeaderSource + ?Sized>(source: &S) -> Result<Self> {
        Self::parse(&source.work_template()?)
    }

    /// Build a header from `getblock` fields, checking the reported hash if present.
    pub fn from_fields(fields: &BlockFields) -> Result<Self> {
        let prev_block_hash = match &fields.prev_block_hash {
            Some(hex) => hash_from_display_hex(hex)?,
            None => [0u8; 32],
        };
        let bits = u32::from_str_radix(&fields.bits, 16)
            .map_err(|e| PowError::InvalidHex(format!("bits {:?}: {}", fields.bits, e)))?;

        let header = BlockHeader {
            version: fields.version,
            prev_block_hash,
            merkle_root: hash_from_display_hex(&fields.merkle_root)?,
            timestamp: fields.time,
            bits,
            nonce: fields.nonce,
        };

        if let Some(expected) = &fields.hash {
            let actual = header.display_hash();
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PowError::Source(format!(
                    "block fields hash to {}, node reported {}",
                    actual, expected
                )));
            }
        }
        Ok(header)
    }

    /// Build a header from the `data` field of a `getwork` response.
    pub fn from_getwork_data(data_hex: &str) -> Result<Self> {
        Self::parse(&decode_getwork_data(data_hex)?)
    }
}
