//! The gas schedule: per-opcode base costs that changed across forks, the
//! shared cost constants, and the derived formulas (memory expansion, copy
//! cost, intrinsic transaction cost, the 63/64 forwarding rule).

use basalt_primitives::{SpecId, U256};

/// Base cost of the cheapest opcodes (`ADDRESS`, `POP`, …).
pub const BASE: u64 = 2;
/// Cost of the very-low tier (`ADD`, `PUSH*`, `MLOAD`, …).
pub const VERY_LOW: u64 = 3;
/// Cost of the low tier (`MUL`, `DIV`, …).
pub const LOW: u64 = 5;
/// Cost of the mid tier (`ADDMOD`, `JUMP`, …).
pub const MID: u64 = 8;
/// Cost of the high tier (`JUMPI`).
pub const HIGH: u64 = 10;
/// Cost of `JUMPDEST`.
pub const JUMPDEST: u64 = 1;
/// Base cost of `EXP`.
pub const EXP: u64 = 10;
/// Base cost of `SHA3`.
pub const SHA3: u64 = 30;
/// Per-word cost of `SHA3`.
pub const SHA3_WORD: u64 = 6;
/// Per-word cost of the copy opcodes.
pub const COPY_WORD: u64 = 3;
/// Cost of `BLOCKHASH`.
pub const BLOCKHASH: u64 = 20;
/// `SSTORE` cost when a zero slot becomes non-zero.
pub const SSTORE_SET: u64 = 20_000;
/// `SSTORE` cost for every other transition.
pub const SSTORE_RESET: u64 = 5_000;
/// Refund for clearing a storage slot.
pub const SSTORE_CLEAR_REFUND: u64 = 15_000;
/// Refund for the first `SELFDESTRUCT` of an account.
pub const SELFDESTRUCT_REFUND: u64 = 24_000;
/// Base cost of `LOG*`.
pub const LOG: u64 = 375;
/// Per-topic cost of `LOG*`.
pub const LOG_TOPIC: u64 = 375;
/// Per-byte cost of `LOG*` data.
pub const LOG_DATA: u64 = 8;
/// Cost of `CREATE`.
pub const CREATE: u64 = 32_000;
/// Per-byte cost of depositing contract code.
pub const CODE_DEPOSIT: u64 = 200;
/// Surcharge for calls that transfer value.
pub const CALL_VALUE: u64 = 9_000;
/// Free gas handed to the callee of a value transfer.
pub const CALL_STIPEND: u64 = 2_300;
/// Surcharge for creating the callee account.
pub const NEW_ACCOUNT: u64 = 25_000;
/// Per-word cost of memory expansion (the linear term).
pub const MEMORY_WORD: u64 = 3;
/// Base intrinsic cost of every transaction.
pub const TX: u64 = 21_000;
/// Intrinsic cost of a zero byte of transaction data.
pub const TX_DATA_ZERO: u64 = 4;
/// Intrinsic cost of a non-zero byte of transaction data.
pub const TX_DATA_NON_ZERO: u64 = 68;
/// Intrinsic surcharge of contract creation (Homestead onwards).
pub const TX_CREATE: u64 = 32_000;
/// EIP-170 deployed-code size cap (Spurious Dragon onwards).
pub const MAX_CODE_SIZE: usize = 24_576;

/// The fork-dependent base costs. EIP-150 repriced the state-touching
/// opcodes; EIP-160 repriced the `EXP` exponent byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    /// `SLOAD` cost.
    pub sload: u64,
    /// `BALANCE` cost.
    pub balance: u64,
    /// `EXTCODESIZE`/`EXTCODECOPY` base cost.
    pub extcode: u64,
    /// Base cost of the call family.
    pub call: u64,
    /// Base cost of `SELFDESTRUCT`.
    pub selfdestruct: u64,
    /// Surcharge when `SELFDESTRUCT` pays out to a fresh account.
    pub selfdestruct_new_account: u64,
    /// Per-byte cost of the `EXP` exponent.
    pub exp_byte: u64,
}

const FRONTIER_SCHEDULE: GasSchedule = GasSchedule {
    sload: 50,
    balance: 20,
    extcode: 20,
    call: 40,
    selfdestruct: 0,
    selfdestruct_new_account: 0,
    exp_byte: 10,
};

const TANGERINE_SCHEDULE: GasSchedule = GasSchedule {
    sload: 200,
    balance: 400,
    extcode: 700,
    call: 700,
    selfdestruct: 5_000,
    selfdestruct_new_account: 25_000,
    exp_byte: 10,
};

const SPURIOUS_SCHEDULE: GasSchedule = GasSchedule {
    exp_byte: 50,
    ..TANGERINE_SCHEDULE
};

/// The schedule in force under a fork.
pub const fn gas_schedule(spec: SpecId) -> &'static GasSchedule {
    match spec {
        SpecId::Frontier | SpecId::Homestead => &FRONTIER_SCHEDULE,
        SpecId::TangerineWhistle => &TANGERINE_SCHEDULE,
        _ => &SPURIOUS_SCHEDULE,
    }
}

/// Number of 32-byte words covering `len` bytes.
pub fn words(len: usize) -> u64 {
    (len as u64).div_ceil(32)
}

/// Total cost of `words` active memory words: `3·w + ⌊w²/512⌋`. `None` on
/// overflow, which callers treat as out-of-gas.
pub fn memory_gas(words: u64) -> Option<u64> {
    let words_squared = (words as u128).checked_mul(words as u128)?;
    let total = (MEMORY_WORD as u128) * (words as u128) + words_squared / 512;
    u64::try_from(total).ok()
}

/// Cost of growing memory from `current` to `target` words.
pub fn memory_expansion_gas(current: u64, target: u64) -> Option<u64> {
    if target <= current {
        return Some(0);
    }
    Some(memory_gas(target)? - memory_gas(current)?)
}

/// Per-word cost of copying `len` bytes.
pub fn copy_gas(len: usize) -> u64 {
    COPY_WORD * words(len)
}

/// The `EXP` exponent cost: one schedule unit per significant byte.
pub fn exp_gas(schedule: &GasSchedule, exponent: U256) -> u64 {
    schedule.exp_byte * (exponent.bit_len() as u64).div_ceil(8)
}

/// Intrinsic cost of a transaction: the base fee, the data bytes, and the
/// creation surcharge from Homestead onwards.
pub fn intrinsic_gas(data: &[u8], is_create: bool, spec: SpecId) -> u64 {
    let zero_bytes = data.iter().filter(|&&byte| byte == 0).count() as u64;
    let non_zero_bytes = data.len() as u64 - zero_bytes;
    let mut gas = TX + TX_DATA_ZERO * zero_bytes + TX_DATA_NON_ZERO * non_zero_bytes;
    if is_create && spec >= SpecId::Homestead {
        gas += TX_CREATE;
    }
    gas
}

/// The EIP-150 retention rule: a frame may forward at most 63/64 of its
/// remaining gas.
pub const fn all_but_one_64th(gas: u64) -> u64 {
    gas - gas / 64
}
