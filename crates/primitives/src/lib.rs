//! Basalt primitives library.
//!
//! The shared vocabulary of the chain core: fixed-size hashes and addresses,
//! accounts, headers, blocks, transactions, receipts, logs and the per-chain
//! fork schedule. Wire shapes are the Yellow Paper RLP shapes, bit-exact.

pub use alloy_primitives::{
    self, address, b256, hex, keccak256, Address, Bloom, Bytes, FixedBytes, B256, B64, U256,
};

pub mod account;
pub mod block;
pub mod chainspec;
pub mod header;
pub mod log;
pub mod receipt;
pub mod transaction;

pub use account::Account;
pub use block::Block;
pub use chainspec::{ChainSpec, SpecId};
pub use header::BlockHeader;
pub use log::{logs_bloom, LogEntry};
pub use receipt::{Receipt, ReceiptOutcome};
pub use transaction::{SignatureError, Transaction};

/// A block number.
pub type BlockNumber = u64;

/// A chain id.
pub type ChainId = u64;

/// Keccak-256 of the empty byte string, the `code_hash` of accounts without
/// code.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Keccak-256 of the RLP encoding of the empty string, the root hash of an
/// empty trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Keccak-256 of the RLP encoding of the empty list, the `ommers_hash` of a
/// block without ommers.
pub const EMPTY_OMMERS_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
