//! Error taxonomy of the chain core.
//!
//! Transaction and header failures are typed rejections that never poison
//! state; EVM halts are contained inside the interpreter and never appear
//! here; repository errors (a dangling trie node, missing code) signal store
//! corruption and propagate unconditionally.

use basalt_primitives::{SignatureError, B256, U256};
use basalt_state::StateError;

/// Why a transaction was rejected before or during execution setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// Signature malformed, unrecoverable or replay-protected for another
    /// chain.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    /// The sender's nonce does not match.
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch {
        /// The sender's account nonce.
        expected: u64,
        /// The transaction nonce.
        got: u64,
    },
    /// The sender cannot cover gas and value up front.
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance {
        /// Required wei.
        need: U256,
        /// Available wei.
        have: U256,
    },
    /// The declared gas limit is below the intrinsic cost.
    #[error("intrinsic gas {intrinsic} exceeds gas limit {gas_limit}")]
    IntrinsicGas {
        /// Intrinsic cost of the transaction.
        intrinsic: u64,
        /// Declared gas limit.
        gas_limit: u64,
    },
    /// The transaction does not fit in the block's remaining gas.
    #[error("transaction gas limit {gas_limit} exceeds remaining block gas {available}")]
    BlockGasExceeded {
        /// Declared gas limit.
        gas_limit: u64,
        /// Gas left in the block.
        available: u64,
    },
}

/// Why a header was rejected against its parent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// `extra_data` longer than 32 bytes.
    #[error("extra data exceeds 32 bytes")]
    ExtraDataTooLong,
    /// The number is not parent's plus one.
    #[error("non-sequential block number: expected {expected}, got {got}")]
    NonSequentialNumber {
        /// Parent number plus one.
        expected: u64,
        /// Header number.
        got: u64,
    },
    /// The timestamp does not advance past the parent's.
    #[error("timestamp not after parent")]
    TimestampNotAfterParent,
    /// The gas limit drifted outside the allowed band or under the minimum.
    #[error("gas limit {0} out of bounds")]
    GasLimitOutOfBounds(u64),
    /// More gas used than the limit allows.
    #[error("gas used {used} exceeds gas limit {limit}")]
    GasUsedExceedsLimit {
        /// Header `gas_used`.
        used: u64,
        /// Header `gas_limit`.
        limit: u64,
    },
    /// The difficulty does not match the recomputed value.
    #[error("difficulty mismatch: expected {expected}, got {got}")]
    DifficultyMismatch {
        /// Recomputed difficulty.
        expected: U256,
        /// Header difficulty.
        got: U256,
    },
}

/// Why a whole block was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The parent is not in the tree.
    #[error("unknown parent block {0}")]
    UnknownParent(B256),
    /// The header failed validation.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A transaction failed validation; the index names the offender.
    #[error("transaction {index}: {source}")]
    Transaction {
        /// Index of the offending transaction.
        index: usize,
        /// The underlying rejection.
        source: TransactionError,
    },
    /// Too many ommers, or one at an invalid depth.
    #[error("invalid ommer: {0}")]
    InvalidOmmer(&'static str),
    /// `ommers_hash` does not commit to the ommer list.
    #[error("ommers hash mismatch")]
    OmmersHashMismatch,
    /// `transactions_root` does not match the transactions.
    #[error("transactions root mismatch: expected {expected}, actual {actual}")]
    TransactionsRootMismatch {
        /// Header value.
        expected: B256,
        /// Recomputed value.
        actual: B256,
    },
    /// `receipts_root` does not match the receipts we produced.
    #[error("receipts root mismatch: expected {expected}, actual {actual}")]
    ReceiptsRootMismatch {
        /// Header value.
        expected: B256,
        /// Recomputed value.
        actual: B256,
    },
    /// The header bloom does not match the logs.
    #[error("logs bloom mismatch")]
    LogsBloomMismatch,
    /// The header `gas_used` does not match execution.
    #[error("gas used mismatch: expected {expected}, actual {actual}")]
    GasUsedMismatch {
        /// Header value.
        expected: u64,
        /// Gas actually consumed.
        actual: u64,
    },
    /// Post-state root disagreement with the header.
    #[error("state root mismatch: expected {expected}, actual {actual}")]
    StateRootMismatch {
        /// Header value.
        expected: B256,
        /// Root we computed.
        actual: B256,
    },
    /// Store corruption surfaced while executing.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Failure of a single transaction execution: a typed rejection or a
/// corrupted store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The transaction is invalid.
    #[error(transparent)]
    Invalid(#[from] TransactionError),
    /// The store is corrupt.
    #[error(transparent)]
    State(#[from] StateError),
}
