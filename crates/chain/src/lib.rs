//! Basalt chain core: transaction execution, block processing, header
//! validation, the block tree and snapshot chunks.
//!
//! Given a chain configuration and a sequence of blocks, this crate
//! deterministically reproduces the canonical world state: the block
//! processor drives per-transaction execution, which drives the EVM, which
//! reads and writes accounts through the repository; every commitment in the
//! header is recomputed and checked.

#[macro_use]
extern crate basalt_helpers;

pub mod block;
pub mod chunk;
pub mod error;
pub mod executor;
pub mod genesis;
pub mod tree;
pub mod validation;

pub use block::{apply_block, process_block, ProcessedBlock};
pub use error::{BlockError, ExecutionError, HeaderError, TransactionError};
pub use executor::{execute_transaction, ExecutedTransaction};
pub use genesis::GenesisConfig;
pub use tree::BlockTree;
pub use validation::{calc_difficulty, validate_header};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
