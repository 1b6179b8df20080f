//! Opcode definitions and the per-fork instruction tables.
//!
//! Dispatch works off a fixed 256-entry table of `(name, arity, base gas,
//! writer flag)` records. Fork differences (repriced base costs, newly
//! introduced opcodes) are baked into the table selected at configuration
//! time, not branched on in the hot loop.

use crate::gas::{self, gas_schedule};
use basalt_primitives::SpecId;
use std::sync::LazyLock;

/// Halts execution.
pub const STOP: u8 = 0x00;
/// Addition modulo 2^256.
pub const ADD: u8 = 0x01;
/// Multiplication modulo 2^256.
pub const MUL: u8 = 0x02;
/// Subtraction modulo 2^256.
pub const SUB: u8 = 0x03;
/// Integer division; division by zero yields zero.
pub const DIV: u8 = 0x04;
/// Signed integer division, truncating toward zero.
pub const SDIV: u8 = 0x05;
/// Modulo remainder.
pub const MOD: u8 = 0x06;
/// Signed modulo remainder; the sign follows the dividend.
pub const SMOD: u8 = 0x07;
/// Unbounded addition followed by modulo.
pub const ADDMOD: u8 = 0x08;
/// Unbounded multiplication followed by modulo.
pub const MULMOD: u8 = 0x09;
/// Exponentiation modulo 2^256.
pub const EXP: u8 = 0x0A;
/// Sign-extends from a given byte width.
pub const SIGNEXTEND: u8 = 0x0B;
/// Unsigned less-than.
pub const LT: u8 = 0x10;
/// Unsigned greater-than.
pub const GT: u8 = 0x11;
/// Signed less-than.
pub const SLT: u8 = 0x12;
/// Signed greater-than.
pub const SGT: u8 = 0x13;
/// Equality.
pub const EQ: u8 = 0x14;
/// Is-zero predicate.
pub const ISZERO: u8 = 0x15;
/// Bitwise and.
pub const AND: u8 = 0x16;
/// Bitwise or.
pub const OR: u8 = 0x17;
/// Bitwise xor.
pub const XOR: u8 = 0x18;
/// Bitwise complement.
pub const NOT: u8 = 0x19;
/// Extracts one byte, big-endian indexed.
pub const BYTE: u8 = 0x1A;
/// Keccak-256 over a memory slice.
pub const SHA3: u8 = 0x20;
/// Address of the executing account.
pub const ADDRESS: u8 = 0x30;
/// Balance of an account.
pub const BALANCE: u8 = 0x31;
/// Transaction originator.
pub const ORIGIN: u8 = 0x32;
/// Immediate caller.
pub const CALLER: u8 = 0x33;
/// Wei sent with the call.
pub const CALLVALUE: u8 = 0x34;
/// Loads a word of call data.
pub const CALLDATALOAD: u8 = 0x35;
/// Call data size.
pub const CALLDATASIZE: u8 = 0x36;
/// Copies call data to memory.
pub const CALLDATACOPY: u8 = 0x37;
/// Size of the executing code.
pub const CODESIZE: u8 = 0x38;
/// Copies executing code to memory.
pub const CODECOPY: u8 = 0x39;
/// Gas price of the transaction.
pub const GASPRICE: u8 = 0x3A;
/// Code size of an account.
pub const EXTCODESIZE: u8 = 0x3B;
/// Copies an account's code to memory.
pub const EXTCODECOPY: u8 = 0x3C;
/// Size of the last call's return data (Byzantium).
pub const RETURNDATASIZE: u8 = 0x3D;
/// Copies return data to memory (Byzantium).
pub const RETURNDATACOPY: u8 = 0x3E;
/// Hash of one of the 256 most recent blocks.
pub const BLOCKHASH: u8 = 0x40;
/// Block beneficiary.
pub const COINBASE: u8 = 0x41;
/// Block timestamp.
pub const TIMESTAMP: u8 = 0x42;
/// Block number.
pub const NUMBER: u8 = 0x43;
/// Block difficulty.
pub const DIFFICULTY: u8 = 0x44;
/// Block gas limit.
pub const GASLIMIT: u8 = 0x45;
/// Discards the top of the stack.
pub const POP: u8 = 0x50;
/// Loads a memory word.
pub const MLOAD: u8 = 0x51;
/// Stores a memory word.
pub const MSTORE: u8 = 0x52;
/// Stores a single memory byte.
pub const MSTORE8: u8 = 0x53;
/// Loads a storage slot.
pub const SLOAD: u8 = 0x54;
/// Stores a storage slot; the sole storage mutator.
pub const SSTORE: u8 = 0x55;
/// Unconditional jump.
pub const JUMP: u8 = 0x56;
/// Conditional jump.
pub const JUMPI: u8 = 0x57;
/// Current program counter.
pub const PC: u8 = 0x58;
/// Active memory size in bytes.
pub const MSIZE: u8 = 0x59;
/// Remaining gas.
pub const GAS: u8 = 0x5A;
/// Valid jump destination marker.
pub const JUMPDEST: u8 = 0x5B;
/// First of the 32 push opcodes.
pub const PUSH1: u8 = 0x60;
/// Last of the 32 push opcodes.
pub const PUSH32: u8 = 0x7F;
/// First of the 16 dup opcodes.
pub const DUP1: u8 = 0x80;
/// First of the 16 swap opcodes.
pub const SWAP1: u8 = 0x90;
/// Log with zero topics.
pub const LOG0: u8 = 0xA0;
/// Creates a contract.
pub const CREATE: u8 = 0xF0;
/// Message call.
pub const CALL: u8 = 0xF1;
/// Call running the target's code in the caller's context.
pub const CALLCODE: u8 = 0xF2;
/// Normal halt returning data.
pub const RETURN: u8 = 0xF3;
/// Call preserving caller and value (Homestead).
pub const DELEGATECALL: u8 = 0xF4;
/// Read-only call (Byzantium).
pub const STATICCALL: u8 = 0xFA;
/// Halt reverting state but returning data and gas (Byzantium).
pub const REVERT: u8 = 0xFD;
/// Designated invalid opcode.
pub const INVALID: u8 = 0xFE;
/// Destroys the executing account.
pub const SELFDESTRUCT: u8 = 0xFF;

/// Static description of one opcode under one fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Mnemonic.
    pub name: &'static str,
    /// Stack items consumed.
    pub inputs: u8,
    /// Stack items produced.
    pub outputs: u8,
    /// Fixed gas charged before any dynamic component.
    pub gas: u64,
    /// True if the opcode mutates state and is banned in static frames.
    pub writes: bool,
}

const fn op(name: &'static str, inputs: u8, outputs: u8, gas: u64) -> OpInfo {
    OpInfo {
        name,
        inputs,
        outputs,
        gas,
        writes: false,
    }
}

const fn write_op(name: &'static str, inputs: u8, outputs: u8, gas: u64) -> OpInfo {
    OpInfo {
        name,
        inputs,
        outputs,
        gas,
        writes: true,
    }
}

/// The instruction table in force under a fork.
pub fn instruction_table(spec: SpecId) -> &'static [Option<OpInfo>; 256] {
    match spec {
        SpecId::Frontier => &FRONTIER_TABLE,
        SpecId::Homestead => &HOMESTEAD_TABLE,
        SpecId::TangerineWhistle => &TANGERINE_TABLE,
        SpecId::SpuriousDragon => &SPURIOUS_TABLE,
        _ => &BYZANTIUM_TABLE,
    }
}

static FRONTIER_TABLE: LazyLock<[Option<OpInfo>; 256]> =
    LazyLock::new(|| build_table(SpecId::Frontier));
static HOMESTEAD_TABLE: LazyLock<[Option<OpInfo>; 256]> =
    LazyLock::new(|| build_table(SpecId::Homestead));
static TANGERINE_TABLE: LazyLock<[Option<OpInfo>; 256]> =
    LazyLock::new(|| build_table(SpecId::TangerineWhistle));
static SPURIOUS_TABLE: LazyLock<[Option<OpInfo>; 256]> =
    LazyLock::new(|| build_table(SpecId::SpuriousDragon));
static BYZANTIUM_TABLE: LazyLock<[Option<OpInfo>; 256]> =
    LazyLock::new(|| build_table(SpecId::Byzantium));

fn build_table(spec: SpecId) -> [Option<OpInfo>; 256] {
    let schedule = gas_schedule(spec);
    let mut table = [None; 256];

    table[STOP as usize] = Some(op("STOP", 0, 0, 0));
    table[ADD as usize] = Some(op("ADD", 2, 1, gas::VERY_LOW));
    table[MUL as usize] = Some(op("MUL", 2, 1, gas::LOW));
    table[SUB as usize] = Some(op("SUB", 2, 1, gas::VERY_LOW));
    table[DIV as usize] = Some(op("DIV", 2, 1, gas::LOW));
    table[SDIV as usize] = Some(op("SDIV", 2, 1, gas::LOW));
    table[MOD as usize] = Some(op("MOD", 2, 1, gas::LOW));
    table[SMOD as usize] = Some(op("SMOD", 2, 1, gas::LOW));
    table[ADDMOD as usize] = Some(op("ADDMOD", 3, 1, gas::MID));
    table[MULMOD as usize] = Some(op("MULMOD", 3, 1, gas::MID));
    table[EXP as usize] = Some(op("EXP", 2, 1, gas::EXP));
    table[SIGNEXTEND as usize] = Some(op("SIGNEXTEND", 2, 1, gas::LOW));

    table[LT as usize] = Some(op("LT", 2, 1, gas::VERY_LOW));
    table[GT as usize] = Some(op("GT", 2, 1, gas::VERY_LOW));
    table[SLT as usize] = Some(op("SLT", 2, 1, gas::VERY_LOW));
    table[SGT as usize] = Some(op("SGT", 2, 1, gas::VERY_LOW));
    table[EQ as usize] = Some(op("EQ", 2, 1, gas::VERY_LOW));
    table[ISZERO as usize] = Some(op("ISZERO", 1, 1, gas::VERY_LOW));
    table[AND as usize] = Some(op("AND", 2, 1, gas::VERY_LOW));
    table[OR as usize] = Some(op("OR", 2, 1, gas::VERY_LOW));
    table[XOR as usize] = Some(op("XOR", 2, 1, gas::VERY_LOW));
    table[NOT as usize] = Some(op("NOT", 1, 1, gas::VERY_LOW));
    table[BYTE as usize] = Some(op("BYTE", 2, 1, gas::VERY_LOW));

    table[SHA3 as usize] = Some(op("SHA3", 2, 1, gas::SHA3));

    table[ADDRESS as usize] = Some(op("ADDRESS", 0, 1, gas::BASE));
    table[BALANCE as usize] = Some(op("BALANCE", 1, 1, schedule.balance));
    table[ORIGIN as usize] = Some(op("ORIGIN", 0, 1, gas::BASE));
    table[CALLER as usize] = Some(op("CALLER", 0, 1, gas::BASE));
    table[CALLVALUE as usize] = Some(op("CALLVALUE", 0, 1, gas::BASE));
    table[CALLDATALOAD as usize] = Some(op("CALLDATALOAD", 1, 1, gas::VERY_LOW));
    table[CALLDATASIZE as usize] = Some(op("CALLDATASIZE", 0, 1, gas::BASE));
    table[CALLDATACOPY as usize] = Some(op("CALLDATACOPY", 3, 0, gas::VERY_LOW));
    table[CODESIZE as usize] = Some(op("CODESIZE", 0, 1, gas::BASE));
    table[CODECOPY as usize] = Some(op("CODECOPY", 3, 0, gas::VERY_LOW));
    table[GASPRICE as usize] = Some(op("GASPRICE", 0, 1, gas::BASE));
    table[EXTCODESIZE as usize] = Some(op("EXTCODESIZE", 1, 1, schedule.extcode));
    table[EXTCODECOPY as usize] = Some(op("EXTCODECOPY", 4, 0, schedule.extcode));

    table[BLOCKHASH as usize] = Some(op("BLOCKHASH", 1, 1, gas::BLOCKHASH));
    table[COINBASE as usize] = Some(op("COINBASE", 0, 1, gas::BASE));
    table[TIMESTAMP as usize] = Some(op("TIMESTAMP", 0, 1, gas::BASE));
    table[NUMBER as usize] = Some(op("NUMBER", 0, 1, gas::BASE));
    table[DIFFICULTY as usize] = Some(op("DIFFICULTY", 0, 1, gas::BASE));
    table[GASLIMIT as usize] = Some(op("GASLIMIT", 0, 1, gas::BASE));

    table[POP as usize] = Some(op("POP", 1, 0, gas::BASE));
    table[MLOAD as usize] = Some(op("MLOAD", 1, 1, gas::VERY_LOW));
    table[MSTORE as usize] = Some(op("MSTORE", 2, 0, gas::VERY_LOW));
    table[MSTORE8 as usize] = Some(op("MSTORE8", 2, 0, gas::VERY_LOW));
    table[SLOAD as usize] = Some(op("SLOAD", 1, 1, schedule.sload));
    table[SSTORE as usize] = Some(write_op("SSTORE", 2, 0, 0));
    table[JUMP as usize] = Some(op("JUMP", 1, 0, gas::MID));
    table[JUMPI as usize] = Some(op("JUMPI", 2, 0, gas::HIGH));
    table[PC as usize] = Some(op("PC", 0, 1, gas::BASE));
    table[MSIZE as usize] = Some(op("MSIZE", 0, 1, gas::BASE));
    table[GAS as usize] = Some(op("GAS", 0, 1, gas::BASE));
    table[JUMPDEST as usize] = Some(op("JUMPDEST", 0, 0, gas::JUMPDEST));

    const PUSH_NAMES: [&str; 32] = [
        "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9",
        "PUSH10", "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17",
        "PUSH18", "PUSH19", "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25",
        "PUSH26", "PUSH27", "PUSH28", "PUSH29", "PUSH30", "PUSH31", "PUSH32",
    ];
    for (i, name) in PUSH_NAMES.iter().enumerate() {
        table[PUSH1 as usize + i] = Some(op(name, 0, 1, gas::VERY_LOW));
    }

    const DUP_NAMES: [&str; 16] = [
        "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10",
        "DUP11", "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
    ];
    for (i, name) in DUP_NAMES.iter().enumerate() {
        let n = i as u8 + 1;
        table[DUP1 as usize + i] = Some(op(name, n, n + 1, gas::VERY_LOW));
    }

    const SWAP_NAMES: [&str; 16] = [
        "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9",
        "SWAP10", "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
    ];
    for (i, name) in SWAP_NAMES.iter().enumerate() {
        let n = i as u8 + 1;
        table[SWAP1 as usize + i] = Some(op(name, n + 1, n + 1, gas::VERY_LOW));
    }

    const LOG_NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];
    for (i, name) in LOG_NAMES.iter().enumerate() {
        table[LOG0 as usize + i] = Some(write_op(name, i as u8 + 2, 0, gas::LOG));
    }

    table[CREATE as usize] = Some(write_op("CREATE", 3, 1, gas::CREATE));
    table[CALL as usize] = Some(op("CALL", 7, 1, schedule.call));
    table[CALLCODE as usize] = Some(op("CALLCODE", 7, 1, schedule.call));
    table[RETURN as usize] = Some(op("RETURN", 2, 0, 0));
    table[SELFDESTRUCT as usize] =
        Some(write_op("SELFDESTRUCT", 1, 0, schedule.selfdestruct));

    if spec >= SpecId::Homestead {
        table[DELEGATECALL as usize] = Some(op("DELEGATECALL", 6, 1, schedule.call));
    }

    if spec >= SpecId::Byzantium {
        table[RETURNDATASIZE as usize] = Some(op("RETURNDATASIZE", 0, 1, gas::BASE));
        table[RETURNDATACOPY as usize] = Some(op("RETURNDATACOPY", 3, 0, gas::VERY_LOW));
        table[STATICCALL as usize] = Some(op("STATICCALL", 6, 1, schedule.call));
        table[REVERT as usize] = Some(op("REVERT", 2, 0, 0));
    }

    table
}

/// Number of immediate operand bytes following the opcode (`PUSH1..PUSH32`).
pub fn immediate_size(opcode: u8) -> usize {
    if (PUSH1..=PUSH32).contains(&opcode) {
        (opcode - PUSH1) as usize + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_gated_opcodes() {
        let frontier = instruction_table(SpecId::Frontier);
        let homestead = instruction_table(SpecId::Homestead);
        let byzantium = instruction_table(SpecId::Byzantium);

        assert!(frontier[DELEGATECALL as usize].is_none());
        assert!(homestead[DELEGATECALL as usize].is_some());
        assert!(homestead[REVERT as usize].is_none());
        assert!(byzantium[REVERT as usize].is_some());
        assert!(byzantium[INVALID as usize].is_none());
    }

    #[test]
    fn repriced_base_costs() {
        let frontier = instruction_table(SpecId::Frontier);
        let byzantium = instruction_table(SpecId::Byzantium);
        assert_eq!(frontier[SLOAD as usize].unwrap().gas, 50);
        assert_eq!(byzantium[SLOAD as usize].unwrap().gas, 200);
        assert_eq!(frontier[CALL as usize].unwrap().gas, 40);
        assert_eq!(byzantium[CALL as usize].unwrap().gas, 700);
    }

    #[test]
    fn push_immediates() {
        assert_eq!(immediate_size(PUSH1), 1);
        assert_eq!(immediate_size(PUSH32), 32);
        assert_eq!(immediate_size(ADD), 0);
    }

    #[test]
    fn writer_flags() {
        let table = instruction_table(SpecId::Byzantium);
        for opcode in [SSTORE, LOG0, CREATE, SELFDESTRUCT] {
            assert!(table[opcode as usize].unwrap().writes);
        }
        assert!(!table[CALL as usize].unwrap().writes);
    }
}
