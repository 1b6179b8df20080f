//! Per-block and per-call execution environment.

use basalt_primitives::{Address, Bytes, B256, U256};
use std::collections::BTreeMap;

/// Block-level facts visible to executing code.
#[derive(Debug, Clone, Default)]
pub struct BlockEnv {
    /// Block beneficiary, the `COINBASE` value.
    pub beneficiary: Address,
    /// Block number.
    pub number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// Block difficulty.
    pub difficulty: U256,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Hashes of recent ancestors keyed by block number, serving the
    /// `BLOCKHASH` opcode. Only the 256 most recent are ever consulted.
    pub block_hashes: BTreeMap<u64, B256>,
}

/// How a frame was entered; decides value transfer, storage context and the
/// caller the callee observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScheme {
    /// Plain message call.
    Call,
    /// Run the target's code against the caller's storage.
    CallCode,
    /// Like `CallCode` but preserving caller and value (Homestead).
    DelegateCall,
    /// Read-only call (Byzantium).
    StaticCall,
}

/// Parameters of one call frame.
#[derive(Debug, Clone)]
pub struct CallParams {
    /// The scheme this frame was entered with.
    pub scheme: CallScheme,
    /// The calling account.
    pub caller: Address,
    /// The account whose storage and balance the frame runs against.
    pub address: Address,
    /// The account whose code runs (differs from `address` under
    /// `CALLCODE`/`DELEGATECALL`); also the precompile dispatch key.
    pub code_address: Address,
    /// Gas available to the frame.
    pub gas: u64,
    /// Wei actually transferred before execution.
    pub value: U256,
    /// The `CALLVALUE` the frame observes.
    pub apparent_value: U256,
    /// Input data.
    pub input: Bytes,
    /// True inside a `STATICCALL` context.
    pub is_static: bool,
}
