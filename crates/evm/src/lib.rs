//! The EVM interpreter.
//!
//! A stack machine executing bytecode under strict gas accounting. Dispatch
//! runs off per-fork instruction tables; nested calls suspend the caller,
//! spawn a child frame against a state savepoint, and merge or revert on
//! return. Exceptional halts consume the frame's remaining gas and are fully
//! contained: they never escape past the frame boundary as errors.

#[macro_use]
extern crate basalt_helpers;

pub mod env;
pub mod gas;
mod interp;
mod machine;
pub mod opcode;
mod substate;

pub use env::{BlockEnv, CallParams, CallScheme};
pub use interp::{create_address, Evm, CALL_DEPTH_LIMIT};
pub use machine::{Memory, Stack, STACK_LIMIT};
pub use opcode::{instruction_table, OpInfo};
pub use substate::Substate;

use basalt_precompile::PrecompileError;

/// Reasons a frame halts exceptionally. Every variant consumes all gas left
/// in the frame and reverts the frame's savepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Halt {
    /// Gas ran out.
    #[error("out of gas")]
    OutOfGas,
    /// An opcode found fewer stack items than its arity.
    #[error("stack underflow")]
    StackUnderflow,
    /// The stack would exceed 1024 items.
    #[error("stack overflow")]
    StackOverflow,
    /// An unassigned or fork-inactive opcode.
    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
    /// A jump to a destination that is not a `JUMPDEST`.
    #[error("invalid jump destination")]
    InvalidJump,
    /// A state mutation inside a static frame.
    #[error("state write in static context")]
    StaticWrite,
    /// `RETURNDATACOPY` past the end of the buffer.
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
    /// Deployed code over the EIP-170 cap.
    #[error("deployed code exceeds size limit")]
    CodeSizeLimit,
    /// `CREATE` into an account with code or a non-zero nonce.
    #[error("contract address collision")]
    CreateCollision,
    /// A precompile rejected its input or gas.
    #[error(transparent)]
    Precompile(#[from] PrecompileError),
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Normal halt; state and sub state merge into the parent.
    Success,
    /// `REVERT`: state is rolled back but remaining gas and output data are
    /// returned to the caller.
    Revert,
    /// Exceptional halt: state rolled back, all gas consumed.
    Halt(Halt),
}

/// The result of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// How the frame ended.
    pub status: FrameStatus,
    /// Gas returned to the caller.
    pub gas_left: u64,
    /// Return data (`RETURN` or `REVERT` payload, or a precompile output).
    pub output: Vec<u8>,
}

impl FrameOutcome {
    /// A successful outcome.
    pub fn success(gas_left: u64, output: Vec<u8>) -> Self {
        Self {
            status: FrameStatus::Success,
            gas_left,
            output,
        }
    }

    /// An exceptional outcome; all gas is gone.
    pub fn halted(halt: Halt) -> Self {
        Self {
            status: FrameStatus::Halt(halt),
            gas_left: 0,
            output: Vec::new(),
        }
    }

    /// True on normal halt.
    pub fn is_success(&self) -> bool {
        matches!(self.status, FrameStatus::Success)
    }
}
