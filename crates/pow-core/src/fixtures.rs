//! Mainnet headers used as test vectors.

use crate::block::BlockHeader;

/// Raw genesis block header.
pub const GENESIS_HEADER_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
pub const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
pub const GENESIS_MERKLE_ROOT: &str =
    "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
pub const GENESIS_NONCE: u32 = 2_083_236_893;
pub const GENESIS_TIME: u32 = 1_231_006_505;

/// Raw header of block 1.
pub const BLOCK_1_HEADER_HEX: &str = "010000006fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000982051fd1e4ba744bbbe680e1fee14677ba1a3c3540bf7b1cdb606e857233e0e61bc6649ffff001d01e36299";
pub const BLOCK_1_HASH: &str = "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048";
pub const BLOCK_1_NONCE: u32 = 2_573_394_689;

pub fn genesis() -> BlockHeader {
    BlockHeader::parse(&hex::decode(GENESIS_HEADER_HEX).unwrap()).unwrap()
}

pub fn block_1() -> BlockHeader {
    BlockHeader::parse(&hex::decode(BLOCK_1_HEADER_HEX).unwrap()).unwrap()
}
