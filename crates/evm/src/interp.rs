//! The per-cycle interpreter loop and the call/create frame machinery.

use crate::env::{BlockEnv, CallParams, CallScheme};
use crate::gas::{self, gas_schedule, GasSchedule};
use crate::machine::{Memory, Stack, STACK_LIMIT};
use crate::opcode::{self, immediate_size, instruction_table, OpInfo};
use crate::substate::Substate;
use crate::{FrameOutcome, FrameStatus, Halt};
use basalt_kv::{KeyValueStoreGet, KeyValueStoreInsert};
use basalt_primitives::{
    keccak256, Account, Address, Bytes, ChainSpec, LogEntry, SpecId, B256, U256,
};
use basalt_rlp::{Encodable, Header};
use basalt_state::{State, StateError};

/// Maximum number of nested call frames.
pub const CALL_DEPTH_LIMIT: usize = 1024;

/// The address a contract creation deploys to:
/// `keccak(rlp([sender, sender_nonce]))[12..]`.
pub fn create_address(caller: &Address, nonce: u64) -> Address {
    let payload_length = caller.length() + nonce.length();
    let mut out = Vec::with_capacity(payload_length + 1);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    caller.encode(&mut out);
    nonce.encode(&mut out);
    Address::from_slice(&keccak256(out)[12..])
}

/// One EVM instance, bound to an account repository, a chain configuration
/// and the enclosing block. The interpreter itself is a pure function of
/// these; it performs no suspension of its own and recurses for nested
/// frames (bounded by [`CALL_DEPTH_LIMIT`], with deliberately small frames).
#[derive(Debug)]
pub struct Evm<'a, Db> {
    state: &'a mut State<Db>,
    block: &'a BlockEnv,
    spec: SpecId,
    origin: Address,
    gas_price: U256,
    table: &'static [Option<OpInfo>; 256],
    schedule: &'static GasSchedule,
    depth: usize,
}

/// A call frame's machine state.
#[derive(Debug)]
struct Frame {
    address: Address,
    caller: Address,
    value: U256,
    code: Bytes,
    input: Bytes,
    is_static: bool,
    stack: Stack,
    memory: Memory,
    pc: usize,
    gas: u64,
    return_data: Vec<u8>,
    jumpdests: Box<[bool]>,
}

/// Where the loop goes after one cycle.
enum Control {
    Continue,
    Stop,
    Return(Vec<u8>),
    Revert(Vec<u8>),
    SelfDestruct,
}

/// A cycle either halts the frame or surfaces a repository failure, which is
/// a hard error (corruption) and aborts outward.
enum StepError {
    Halt(Halt),
    State(StateError),
}

impl From<Halt> for StepError {
    fn from(halt: Halt) -> Self {
        StepError::Halt(halt)
    }
}

impl From<StateError> for StepError {
    fn from(error: StateError) -> Self {
        StepError::State(error)
    }
}

impl Frame {
    fn new(
        address: Address,
        caller: Address,
        value: U256,
        code: Bytes,
        input: Bytes,
        gas: u64,
        is_static: bool,
    ) -> Self {
        let jumpdests = analyze_jumpdests(&code);
        Self {
            address,
            caller,
            value,
            code,
            input,
            is_static,
            stack: Stack::default(),
            memory: Memory::default(),
            pc: 0,
            gas,
            return_data: Vec::new(),
            jumpdests,
        }
    }

    fn charge(&mut self, cost: u64) -> Result<(), Halt> {
        if self.gas < cost {
            return Err(Halt::OutOfGas);
        }
        self.gas -= cost;
        Ok(())
    }

    /// Charges memory expansion for the `[offset, offset + len)` range and
    /// grows memory, returning the range as native offsets. Zero-length
    /// accesses never expand.
    fn expand(&mut self, offset: U256, len: U256) -> Result<(usize, usize), Halt> {
        if len.is_zero() {
            return Ok((0, 0));
        }
        let offset = to_usize(offset)?;
        let len = to_usize(len)?;
        let end = offset.checked_add(len).ok_or(Halt::OutOfGas)?;
        let target_words = gas::words(end);
        let cost = gas::memory_expansion_gas(self.memory.active_words() as u64, target_words)
            .ok_or(Halt::OutOfGas)?;
        self.charge(cost)?;
        self.memory.grow(target_words as usize);
        Ok((offset, len))
    }
}

/// Marks every `JUMPDEST` that is real code, skipping push immediates.
fn analyze_jumpdests(code: &[u8]) -> Box<[bool]> {
    let mut valid = vec![false; code.len()].into_boxed_slice();
    let mut i = 0;
    while i < code.len() {
        let op = code[i];
        if op == opcode::JUMPDEST {
            valid[i] = true;
        }
        i += 1 + immediate_size(op);
    }
    valid
}

fn to_usize(value: U256) -> Result<usize, Halt> {
    usize::try_from(value).map_err(|_| Halt::OutOfGas)
}

fn bool_word(value: bool) -> U256 {
    U256::from(value as u8)
}

fn address_from_word(value: U256) -> Address {
    Address::from_word(B256::from(value))
}

fn word_from_address(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

fn is_negative(value: &U256) -> bool {
    value.bit(255)
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let negate = is_negative(&a) != is_negative(&b);
    let abs_a = if is_negative(&a) { a.wrapping_neg() } else { a };
    let abs_b = if is_negative(&b) { b.wrapping_neg() } else { b };
    let quotient = abs_a.checked_div(abs_b).unwrap_or_default();
    if negate {
        quotient.wrapping_neg()
    } else {
        quotient
    }
}

fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let abs_a = if is_negative(&a) { a.wrapping_neg() } else { a };
    let abs_b = if is_negative(&b) { b.wrapping_neg() } else { b };
    let remainder = abs_a.checked_rem(abs_b).unwrap_or_default();
    // the sign follows the dividend
    if is_negative(&a) {
        remainder.wrapping_neg()
    } else {
        remainder
    }
}

fn slt(a: &U256, b: &U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

fn sign_extend(index: U256, value: U256) -> U256 {
    if index >= U256::from(31) {
        return value;
    }
    let bit = 8 * to_usize(index).expect("index below 31") + 7;
    let mask = (U256::from(1) << (bit + 1)) - U256::from(1);
    if value.bit(bit) {
        value | !mask
    } else {
        value & mask
    }
}

fn byte_extract(index: U256, value: U256) -> U256 {
    if index >= U256::from(32) {
        return U256::ZERO;
    }
    let index = to_usize(index).expect("index below 32");
    U256::from(value.to_be_bytes::<32>()[index])
}

impl<'a, Db> Evm<'a, Db>
where
    Db: KeyValueStoreGet<B256, Bytes> + KeyValueStoreInsert<B256, Bytes> + Clone,
{
    /// Binds an EVM to a repository, configuration and block.
    pub fn new(
        state: &'a mut State<Db>,
        chain: &'a ChainSpec,
        block: &'a BlockEnv,
        origin: Address,
        gas_price: U256,
    ) -> Self {
        let spec = chain.spec_at(block.number);
        Self {
            state,
            block,
            spec,
            origin,
            gas_price,
            table: instruction_table(spec),
            schedule: gas_schedule(spec),
            depth: 0,
        }
    }

    /// The fork this EVM executes under.
    pub fn spec(&self) -> SpecId {
        self.spec
    }

    /// The bound account repository.
    pub fn state(&mut self) -> &mut State<Db> {
        &mut *self.state
    }

    /// Executes a message call frame: value transfer, precompile dispatch or
    /// code execution, against a fresh savepoint. Anything but success rolls
    /// the savepoint back.
    pub fn call(
        &mut self,
        params: CallParams,
        substate: &mut Substate,
    ) -> Result<FrameOutcome, StateError> {
        let snapshot = self.state.snapshot()?;
        self.depth += 1;
        let result = self.call_inner(params, substate);
        self.depth -= 1;
        let outcome = result?;
        if outcome.is_success() {
            self.state.commit(snapshot)?;
        } else {
            self.state.revert(snapshot)?;
        }
        Ok(outcome)
    }

    fn call_inner(
        &mut self,
        params: CallParams,
        substate: &mut Substate,
    ) -> Result<FrameOutcome, StateError> {
        match params.scheme {
            CallScheme::Call => {
                if self.spec < SpecId::SpuriousDragon {
                    self.state.create_if_absent(params.address)?;
                }
                self.state.mark_touched(params.address);
                self.state
                    .transfer(params.caller, params.address, params.value)?;
            }
            CallScheme::CallCode => {
                // value moves to the executing account itself
                self.state
                    .transfer(params.caller, params.address, params.value)?;
            }
            CallScheme::DelegateCall => {}
            CallScheme::StaticCall => {
                self.state.mark_touched(params.address);
            }
        }

        if let Some(precompile) = basalt_precompile::by_address(&params.code_address, self.spec) {
            return Ok(match precompile(&params.input, params.gas) {
                Ok(output) => {
                    FrameOutcome::success(params.gas - output.gas_used, output.bytes)
                }
                Err(error) => FrameOutcome::halted(Halt::Precompile(error)),
            });
        }

        let code = self.state.code(params.code_address)?;
        if code.is_empty() {
            return Ok(FrameOutcome::success(params.gas, Vec::new()));
        }

        let mut frame = Frame::new(
            params.address,
            params.caller,
            params.apparent_value,
            code,
            params.input,
            params.gas,
            params.is_static,
        );
        let mut child_substate = Substate::default();
        let outcome = self.run_frame(&mut frame, &mut child_substate)?;
        if outcome.is_success() {
            substate.merge(child_substate);
        }
        Ok(outcome)
    }

    /// Executes a contract creation frame at `address` (computed by the
    /// caller from the creator's nonce) and deposits the returned code.
    pub fn create(
        &mut self,
        caller: Address,
        address: Address,
        value: U256,
        init_code: Bytes,
        gas: u64,
        substate: &mut Substate,
    ) -> Result<FrameOutcome, StateError> {
        let snapshot = self.state.snapshot()?;
        self.depth += 1;
        let result = self.create_inner(caller, address, value, init_code, gas, substate);
        self.depth -= 1;
        let outcome = result?;
        if outcome.is_success() {
            self.state.commit(snapshot)?;
        } else {
            self.state.revert(snapshot)?;
        }
        Ok(outcome)
    }

    fn create_inner(
        &mut self,
        caller: Address,
        address: Address,
        value: U256,
        init_code: Bytes,
        gas: u64,
        substate: &mut Substate,
    ) -> Result<FrameOutcome, StateError> {
        if let Some(existing) = self.state.account(address)? {
            if existing.nonce != 0 || existing.has_code() {
                return Ok(FrameOutcome::halted(Halt::CreateCollision));
            }
        }

        // the new record keeps any balance credited before creation
        let balance = self.state.balance(address)?;
        let nonce = if self.spec >= SpecId::SpuriousDragon { 1 } else { 0 };
        self.state.put_account(
            address,
            Account {
                nonce,
                balance,
                ..Default::default()
            },
        );
        self.state.mark_touched(address);
        self.state.transfer(caller, address, value)?;

        let mut frame = Frame::new(
            address,
            caller,
            value,
            init_code,
            Bytes::new(),
            gas,
            false,
        );
        let mut child_substate = Substate::default();
        let outcome = self.run_frame(&mut frame, &mut child_substate)?;
        if !outcome.is_success() {
            return Ok(outcome);
        }

        let code = outcome.output;
        if self.spec >= SpecId::SpuriousDragon && code.len() > gas::MAX_CODE_SIZE {
            return Ok(FrameOutcome::halted(Halt::CodeSizeLimit));
        }
        let deposit_cost = gas::CODE_DEPOSIT * code.len() as u64;
        let mut gas_left = outcome.gas_left;
        if gas_left >= deposit_cost {
            gas_left -= deposit_cost;
            self.state.set_code(address, code.into())?;
        } else if self.spec >= SpecId::Homestead {
            // EIP-2: an unpayable deposit fails the whole creation
            return Ok(FrameOutcome::halted(Halt::OutOfGas));
        }

        substate.merge(child_substate);
        Ok(FrameOutcome::success(gas_left, Vec::new()))
    }

    fn run_frame(
        &mut self,
        frame: &mut Frame,
        substate: &mut Substate,
    ) -> Result<FrameOutcome, StateError> {
        loop {
            match self.step(frame, substate) {
                Ok(Control::Continue) => {}
                Ok(Control::Stop) | Ok(Control::SelfDestruct) => {
                    return Ok(FrameOutcome::success(frame.gas, Vec::new()));
                }
                Ok(Control::Return(output)) => {
                    return Ok(FrameOutcome::success(frame.gas, output));
                }
                Ok(Control::Revert(output)) => {
                    return Ok(FrameOutcome {
                        status: FrameStatus::Revert,
                        gas_left: frame.gas,
                        output,
                    });
                }
                Err(StepError::Halt(halt)) => {
                    dev_trace!(
                        "frame at {:?} halted at pc {}: {halt}",
                        frame.address,
                        frame.pc
                    );
                    return Ok(FrameOutcome::halted(halt));
                }
                Err(StepError::State(error)) => return Err(error),
            }
        }
    }

    fn step(&mut self, frame: &mut Frame, substate: &mut Substate) -> Result<Control, StepError> {
        // past the end of code means STOP
        let Some(&op) = frame.code.get(frame.pc) else {
            return Ok(Control::Stop);
        };
        let info = self.table[op as usize].ok_or(Halt::InvalidOpcode(op))?;

        if frame.stack.len() < info.inputs as usize {
            return Err(Halt::StackUnderflow.into());
        }
        if frame.stack.len() - info.inputs as usize + info.outputs as usize > STACK_LIMIT {
            return Err(Halt::StackOverflow.into());
        }
        if frame.is_static && info.writes {
            return Err(Halt::StaticWrite.into());
        }

        frame.charge(info.gas)?;
        frame.pc += 1;

        match op {
            opcode::STOP => return Ok(Control::Stop),

            opcode::ADD => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.wrapping_add(b));
            }
            opcode::MUL => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.wrapping_mul(b));
            }
            opcode::SUB => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.wrapping_sub(b));
            }
            opcode::DIV => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.checked_div(b).unwrap_or_default());
            }
            opcode::SDIV => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(sdiv(a, b));
            }
            opcode::MOD => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.checked_rem(b).unwrap_or_default());
            }
            opcode::SMOD => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(smod(a, b));
            }
            opcode::ADDMOD => {
                let (a, b, m) = (frame.stack.pop(), frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.add_mod(b, m));
            }
            opcode::MULMOD => {
                let (a, b, m) = (frame.stack.pop(), frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a.mul_mod(b, m));
            }
            opcode::EXP => {
                let (base, exponent) = (frame.stack.pop(), frame.stack.pop());
                frame.charge(gas::exp_gas(self.schedule, exponent))?;
                frame.stack.push(base.overflowing_pow(exponent).0);
            }
            opcode::SIGNEXTEND => {
                let (index, value) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(sign_extend(index, value));
            }

            opcode::LT => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(bool_word(a < b));
            }
            opcode::GT => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(bool_word(a > b));
            }
            opcode::SLT => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(bool_word(slt(&a, &b)));
            }
            opcode::SGT => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(bool_word(slt(&b, &a)));
            }
            opcode::EQ => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(bool_word(a == b));
            }
            opcode::ISZERO => {
                let a = frame.stack.pop();
                frame.stack.push(bool_word(a.is_zero()));
            }
            opcode::AND => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a & b);
            }
            opcode::OR => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a | b);
            }
            opcode::XOR => {
                let (a, b) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(a ^ b);
            }
            opcode::NOT => {
                let a = frame.stack.pop();
                frame.stack.push(!a);
            }
            opcode::BYTE => {
                let (index, value) = (frame.stack.pop(), frame.stack.pop());
                frame.stack.push(byte_extract(index, value));
            }

            opcode::SHA3 => {
                let (offset_word, len_word) = (frame.stack.pop(), frame.stack.pop());
                let (offset, len) = frame.expand(offset_word, len_word)?;
                frame.charge(gas::SHA3_WORD * gas::words(len))?;
                let hash = keccak256(frame.memory.read(offset, len));
                frame.stack.push(U256::from_be_bytes(hash.0));
            }

            opcode::ADDRESS => frame.stack.push(word_from_address(frame.address)),
            opcode::BALANCE => {
                let address = address_from_word(frame.stack.pop());
                frame.stack.push(self.state.balance(address)?);
            }
            opcode::ORIGIN => frame.stack.push(word_from_address(self.origin)),
            opcode::CALLER => frame.stack.push(word_from_address(frame.caller)),
            opcode::CALLVALUE => frame.stack.push(frame.value),
            opcode::CALLDATALOAD => {
                let offset = frame.stack.pop();
                let mut word = [0u8; 32];
                if let Ok(offset) = usize::try_from(offset) {
                    for (i, slot) in word.iter_mut().enumerate() {
                        *slot = offset
                            .checked_add(i)
                            .and_then(|position| frame.input.get(position))
                            .copied()
                            .unwrap_or(0);
                    }
                }
                frame.stack.push(U256::from_be_bytes(word));
            }
            opcode::CALLDATASIZE => frame.stack.push(U256::from(frame.input.len())),
            opcode::CALLDATACOPY | opcode::CODECOPY => {
                let dest_word = frame.stack.pop();
                let src_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (dest, len) = frame.expand(dest_word, len_word)?;
                frame.charge(gas::copy_gas(len))?;
                if len > 0 {
                    let source = if op == opcode::CALLDATACOPY {
                        frame.input.clone()
                    } else {
                        frame.code.clone()
                    };
                    let src = usize::try_from(src_word).unwrap_or(usize::MAX);
                    frame.memory.store_padded(dest, &source, src, len);
                }
            }
            opcode::CODESIZE => frame.stack.push(U256::from(frame.code.len())),
            opcode::GASPRICE => frame.stack.push(self.gas_price),
            opcode::EXTCODESIZE => {
                let address = address_from_word(frame.stack.pop());
                frame.stack.push(U256::from(self.state.code(address)?.len()));
            }
            opcode::EXTCODECOPY => {
                let address = address_from_word(frame.stack.pop());
                let dest_word = frame.stack.pop();
                let src_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (dest, len) = frame.expand(dest_word, len_word)?;
                frame.charge(gas::copy_gas(len))?;
                if len > 0 {
                    let code = self.state.code(address)?;
                    let src = usize::try_from(src_word).unwrap_or(usize::MAX);
                    frame.memory.store_padded(dest, &code, src, len);
                }
            }
            opcode::RETURNDATASIZE => frame.stack.push(U256::from(frame.return_data.len())),
            opcode::RETURNDATACOPY => {
                let dest_word = frame.stack.pop();
                let src_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (dest, len) = frame.expand(dest_word, len_word)?;
                frame.charge(gas::copy_gas(len))?;
                // EIP-211: reading past the buffer is exceptional
                let src = to_usize(src_word).map_err(|_| Halt::ReturnDataOutOfBounds)?;
                let end = src
                    .checked_add(len)
                    .ok_or(Halt::ReturnDataOutOfBounds)?;
                if end > frame.return_data.len() {
                    return Err(Halt::ReturnDataOutOfBounds.into());
                }
                if len > 0 {
                    let data = frame.return_data[src..end].to_vec();
                    frame.memory.store_slice(dest, &data);
                }
            }

            opcode::BLOCKHASH => {
                let number = frame.stack.pop();
                let hash = match u64::try_from(number) {
                    Ok(number)
                        if number < self.block.number
                            && self.block.number - number <= 256 =>
                    {
                        self.block
                            .block_hashes
                            .get(&number)
                            .copied()
                            .unwrap_or(B256::ZERO)
                    }
                    _ => B256::ZERO,
                };
                frame.stack.push(U256::from_be_bytes(hash.0));
            }
            opcode::COINBASE => frame.stack.push(word_from_address(self.block.beneficiary)),
            opcode::TIMESTAMP => frame.stack.push(U256::from(self.block.timestamp)),
            opcode::NUMBER => frame.stack.push(U256::from(self.block.number)),
            opcode::DIFFICULTY => frame.stack.push(self.block.difficulty),
            opcode::GASLIMIT => frame.stack.push(U256::from(self.block.gas_limit)),

            opcode::POP => {
                frame.stack.pop();
            }
            opcode::MLOAD => {
                let offset_word = frame.stack.pop();
                let (offset, _) = frame.expand(offset_word, U256::from(32))?;
                frame.stack.push(frame.memory.load_word(offset));
            }
            opcode::MSTORE => {
                let offset_word = frame.stack.pop();
                let value = frame.stack.pop();
                let (offset, _) = frame.expand(offset_word, U256::from(32))?;
                frame.memory.store_word(offset, value);
            }
            opcode::MSTORE8 => {
                let offset_word = frame.stack.pop();
                let value = frame.stack.pop();
                let (offset, _) = frame.expand(offset_word, U256::from(1))?;
                frame.memory.store_byte(offset, value.to_be_bytes::<32>()[31]);
            }
            opcode::SLOAD => {
                let key = frame.stack.pop();
                frame.stack.push(self.state.storage_get(frame.address, key)?);
            }
            opcode::SSTORE => {
                let key = frame.stack.pop();
                let value = frame.stack.pop();
                let current = self.state.storage_get(frame.address, key)?;
                let cost = if current.is_zero() && !value.is_zero() {
                    gas::SSTORE_SET
                } else {
                    gas::SSTORE_RESET
                };
                frame.charge(cost)?;
                if !current.is_zero() && value.is_zero() {
                    substate.refund += gas::SSTORE_CLEAR_REFUND;
                }
                self.state.storage_put(frame.address, key, value)?;
            }
            opcode::JUMP => {
                let dest = frame.stack.pop();
                frame.pc = self.jump_target(frame, dest)?;
            }
            opcode::JUMPI => {
                let dest = frame.stack.pop();
                let condition = frame.stack.pop();
                if !condition.is_zero() {
                    frame.pc = self.jump_target(frame, dest)?;
                }
            }
            opcode::PC => frame.stack.push(U256::from(frame.pc - 1)),
            opcode::MSIZE => frame.stack.push(U256::from(frame.memory.len())),
            opcode::GAS => frame.stack.push(U256::from(frame.gas)),
            opcode::JUMPDEST => {}

            op if (opcode::PUSH1..=opcode::PUSH32).contains(&op) => {
                let width = immediate_size(op);
                let available = width.min(frame.code.len().saturating_sub(frame.pc));
                // immediates past the end of code read as zero bytes
                let mut immediate = [0u8; 32];
                immediate[..available]
                    .copy_from_slice(&frame.code[frame.pc..frame.pc + available]);
                frame.stack.push(U256::from_be_slice(&immediate[..width]));
                frame.pc += width;
            }
            op if (opcode::DUP1..opcode::DUP1 + 16).contains(&op) => {
                frame.stack.dup((op - opcode::DUP1) as usize);
            }
            op if (opcode::SWAP1..opcode::SWAP1 + 16).contains(&op) => {
                frame.stack.swap((op - opcode::SWAP1) as usize);
            }

            op if (opcode::LOG0..=opcode::LOG0 + 4).contains(&op) => {
                let topic_count = (op - opcode::LOG0) as usize;
                let offset_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (offset, len) = frame.expand(offset_word, len_word)?;
                frame
                    .charge(gas::LOG_TOPIC * topic_count as u64 + gas::LOG_DATA * len as u64)?;
                let topics = (0..topic_count)
                    .map(|_| B256::from(frame.stack.pop()))
                    .collect();
                let data = frame.memory.read(offset, len);
                substate.logs.push(LogEntry {
                    address: frame.address,
                    topics,
                    data: data.into(),
                });
            }

            opcode::CREATE => return self.op_create(frame, substate),
            opcode::CALL | opcode::CALLCODE => return self.op_call(op, frame, substate),
            opcode::DELEGATECALL | opcode::STATICCALL => {
                return self.op_call(op, frame, substate)
            }
            opcode::RETURN => {
                let offset_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (offset, len) = frame.expand(offset_word, len_word)?;
                return Ok(Control::Return(frame.memory.read(offset, len)));
            }
            opcode::REVERT => {
                let offset_word = frame.stack.pop();
                let len_word = frame.stack.pop();
                let (offset, len) = frame.expand(offset_word, len_word)?;
                return Ok(Control::Revert(frame.memory.read(offset, len)));
            }
            opcode::SELFDESTRUCT => return self.op_selfdestruct(frame, substate),

            other => return Err(Halt::InvalidOpcode(other).into()),
        }

        Ok(Control::Continue)
    }

    fn jump_target(&self, frame: &Frame, dest: U256) -> Result<usize, Halt> {
        let dest = usize::try_from(dest).map_err(|_| Halt::InvalidJump)?;
        if frame.jumpdests.get(dest).copied().unwrap_or(false) {
            Ok(dest)
        } else {
            Err(Halt::InvalidJump)
        }
    }

    fn op_create(
        &mut self,
        frame: &mut Frame,
        substate: &mut Substate,
    ) -> Result<Control, StepError> {
        let value = frame.stack.pop();
        let offset_word = frame.stack.pop();
        let len_word = frame.stack.pop();
        let (offset, len) = frame.expand(offset_word, len_word)?;
        let init_code = frame.memory.read(offset, len);

        if self.depth >= CALL_DEPTH_LIMIT || self.state.balance(frame.address)? < value {
            frame.return_data.clear();
            frame.stack.push(U256::ZERO);
            return Ok(Control::Continue);
        }

        let forwarded = if self.spec >= SpecId::TangerineWhistle {
            gas::all_but_one_64th(frame.gas)
        } else {
            frame.gas
        };
        frame.charge(forwarded).expect("forwarded at most remaining");

        let creator_nonce = self.state.nonce(frame.address)?;
        let address = create_address(&frame.address, creator_nonce);
        self.state.increment_nonce(frame.address)?;

        let outcome = self.create(
            frame.address,
            address,
            value,
            init_code.into(),
            forwarded,
            substate,
        )?;
        frame.gas += outcome.gas_left;
        let outcome_is_success = outcome.is_success();
        frame.return_data = match outcome.status {
            FrameStatus::Revert => outcome.output,
            _ => Vec::new(),
        };
        frame.stack.push(if outcome_is_success {
            word_from_address(address)
        } else {
            U256::ZERO
        });
        Ok(Control::Continue)
    }

    fn op_call(
        &mut self,
        op: u8,
        frame: &mut Frame,
        substate: &mut Substate,
    ) -> Result<Control, StepError> {
        let gas_word = frame.stack.pop();
        let to = address_from_word(frame.stack.pop());
        let value = if op == opcode::CALL || op == opcode::CALLCODE {
            frame.stack.pop()
        } else {
            U256::ZERO
        };
        let in_offset_word = frame.stack.pop();
        let in_len_word = frame.stack.pop();
        let out_offset_word = frame.stack.pop();
        let out_len_word = frame.stack.pop();

        if op == opcode::CALL && frame.is_static && !value.is_zero() {
            return Err(Halt::StaticWrite.into());
        }

        let (in_offset, in_len) = frame.expand(in_offset_word, in_len_word)?;
        let (out_offset, out_len) = frame.expand(out_offset_word, out_len_word)?;

        let mut extra = 0u64;
        if !value.is_zero() {
            extra += gas::CALL_VALUE;
        }
        if op == opcode::CALL {
            let fresh_target = if self.spec >= SpecId::SpuriousDragon {
                !value.is_zero() && self.state.is_dead(to)?
            } else {
                !self.state.exists(to)?
            };
            if fresh_target {
                extra += gas::NEW_ACCOUNT;
            }
        }
        frame.charge(extra)?;

        let forwarded = if self.spec >= SpecId::TangerineWhistle {
            let cap = gas::all_but_one_64th(frame.gas);
            u64::try_from(gas_word).unwrap_or(u64::MAX).min(cap)
        } else {
            let requested = u64::try_from(gas_word).map_err(|_| Halt::OutOfGas)?;
            if requested > frame.gas {
                return Err(Halt::OutOfGas.into());
            }
            requested
        };
        frame.charge(forwarded).expect("forwarded at most remaining");
        let mut callee_gas = forwarded;
        if !value.is_zero() {
            callee_gas += gas::CALL_STIPEND;
        }

        // the frame keeps the forwarded gas when the call cannot even start
        let balance_short = match op {
            opcode::CALL | opcode::CALLCODE => self.state.balance(frame.address)? < value,
            _ => false,
        };
        if self.depth >= CALL_DEPTH_LIMIT || balance_short {
            frame.gas += forwarded;
            frame.return_data.clear();
            frame.stack.push(U256::ZERO);
            return Ok(Control::Continue);
        }

        let input = Bytes::from(frame.memory.read(in_offset, in_len));
        let params = match op {
            opcode::CALL => CallParams {
                scheme: CallScheme::Call,
                caller: frame.address,
                address: to,
                code_address: to,
                gas: callee_gas,
                value,
                apparent_value: value,
                input,
                is_static: frame.is_static,
            },
            opcode::CALLCODE => CallParams {
                scheme: CallScheme::CallCode,
                caller: frame.address,
                address: frame.address,
                code_address: to,
                gas: callee_gas,
                value,
                apparent_value: value,
                input,
                is_static: frame.is_static,
            },
            opcode::DELEGATECALL => CallParams {
                scheme: CallScheme::DelegateCall,
                caller: frame.caller,
                address: frame.address,
                code_address: to,
                gas: callee_gas,
                value: U256::ZERO,
                apparent_value: frame.value,
                input,
                is_static: frame.is_static,
            },
            _ => CallParams {
                scheme: CallScheme::StaticCall,
                caller: frame.address,
                address: to,
                code_address: to,
                gas: callee_gas,
                value: U256::ZERO,
                apparent_value: U256::ZERO,
                input,
                is_static: true,
            },
        };

        let outcome = self.call(params, substate)?;
        frame.gas += outcome.gas_left;
        let copy_len = outcome.output.len().min(out_len);
        if copy_len > 0 {
            frame.memory.store_slice(out_offset, &outcome.output[..copy_len]);
        }
        let outcome_is_success = outcome.is_success();
        frame.return_data = match outcome.status {
            FrameStatus::Halt(_) => Vec::new(),
            _ => outcome.output,
        };
        frame.stack.push(bool_word(outcome_is_success));
        Ok(Control::Continue)
    }

    fn op_selfdestruct(
        &mut self,
        frame: &mut Frame,
        substate: &mut Substate,
    ) -> Result<Control, StepError> {
        let beneficiary = address_from_word(frame.stack.pop());
        let balance = self.state.balance(frame.address)?;

        let extra = if self.spec >= SpecId::SpuriousDragon {
            if !balance.is_zero() && self.state.is_dead(beneficiary)? {
                self.schedule.selfdestruct_new_account
            } else {
                0
            }
        } else if self.spec >= SpecId::TangerineWhistle {
            if !self.state.exists(beneficiary)? {
                self.schedule.selfdestruct_new_account
            } else {
                0
            }
        } else {
            0
        };
        frame.charge(extra)?;

        if self.state.mark_for_destruction(frame.address) {
            substate.refund += gas::SELFDESTRUCT_REFUND;
        }
        if self.spec < SpecId::SpuriousDragon {
            self.state.create_if_absent(beneficiary)?;
        }
        self.state.mark_touched(beneficiary);
        self.state.add_balance(beneficiary, balance)?;
        // the destructed account's funds are gone even when it pays itself
        let mut account = self.state.account(frame.address)?.unwrap_or_default();
        account.balance = U256::ZERO;
        self.state.put_account(frame.address, account);

        Ok(Control::SelfDestruct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_kv::{HashMap as KvMap, Shared};
    use basalt_primitives::address;
    use hex_literal::hex;

    type Db = Shared<KvMap<B256, Bytes>>;

    fn chain() -> ChainSpec {
        ChainSpec::dev(1)
    }

    fn block() -> BlockEnv {
        BlockEnv {
            beneficiary: address!("00000000000000000000000000000000000000cb"),
            number: 1,
            timestamp: 100,
            difficulty: U256::from(131_072u64),
            gas_limit: 10_000_000,
            block_hashes: Default::default(),
        }
    }

    fn state() -> State<Db> {
        State::new(Shared::new(KvMap::default()))
    }

    const CALLER: Address = Address::repeat_byte(0xC1);
    const CONTRACT: Address = Address::repeat_byte(0xC2);

    /// Installs `code` at `CONTRACT` and calls it.
    fn run(code: &[u8], input: &[u8], gas: u64) -> (FrameOutcome, State<Db>, Substate) {
        run_with(code, input, gas, |_| {})
    }

    fn run_with(
        code: &[u8],
        input: &[u8],
        gas: u64,
        prepare: impl FnOnce(&mut State<Db>),
    ) -> (FrameOutcome, State<Db>, Substate) {
        let mut state = state();
        state.add_balance(CALLER, U256::from(1_000_000_000u64)).unwrap();
        state.set_code(CONTRACT, Bytes::copy_from_slice(code)).unwrap();
        prepare(&mut state);

        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let outcome = {
            let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));
            evm.call(
                CallParams {
                    scheme: CallScheme::Call,
                    caller: CALLER,
                    address: CONTRACT,
                    code_address: CONTRACT,
                    gas,
                    value: U256::ZERO,
                    apparent_value: U256::ZERO,
                    input: Bytes::copy_from_slice(input),
                    is_static: false,
                },
                &mut substate,
            )
            .unwrap()
        };
        (outcome, state, substate)
    }

    #[test]
    fn add_and_return() {
        // PUSH1 3, PUSH1 5, ADD, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
        let (outcome, _, _) = run(&hex!("600360050160005260206000f3"), &[], 27);
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 3);
        let mut expected = [0u8; 32];
        expected[31] = 8;
        assert_eq!(outcome.output, expected);
    }

    #[test]
    fn add_halts_without_enough_gas() {
        let (outcome, _, _) = run(&hex!("600360050160005260206000f3"), &[], 23);
        assert_eq!(outcome.status, FrameStatus::Halt(Halt::OutOfGas));
        assert_eq!(outcome.gas_left, 0);
        assert!(outcome.output.is_empty());
    }

    #[test]
    fn sstore_writes_storage() {
        // PUSH1 1, PUSH1 1, ADD, PUSH1 1, SSTORE
        let (outcome, mut state, _) = run(&hex!("6001600101600155"), &[], 30_000);
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 30_000 - 20_012);
        assert_eq!(
            state.storage_get(CONTRACT, U256::from(1)).unwrap(),
            U256::from(2)
        );
    }

    #[test]
    fn sstore_clear_accrues_refund() {
        // PUSH1 0, PUSH1 7, SSTORE clears a pre-existing slot
        let (outcome, mut state, substate) =
            run_with(&hex!("6000600755"), &[], 30_000, |state| {
                state
                    .storage_put(CONTRACT, U256::from(7), U256::from(9))
                    .unwrap();
            });
        assert!(outcome.is_success());
        assert_eq!(substate.refund, gas::SSTORE_CLEAR_REFUND);
        assert_eq!(state.storage_get(CONTRACT, U256::from(7)).unwrap(), U256::ZERO);
    }

    #[test]
    fn jumps_require_jumpdest() {
        // PUSH1 4, JUMP lands in the middle of nowhere
        let (outcome, _, _) = run(&hex!("60045600"), &[], 1_000);
        assert_eq!(outcome.status, FrameStatus::Halt(Halt::InvalidJump));

        // PUSH1 3, JUMP, JUMPDEST, STOP
        let (outcome, _, _) = run(&hex!("6003565b00"), &[], 1_000);
        assert!(outcome.is_success());

        // a JUMPDEST byte inside push data is not a destination
        // PUSH1 2, JUMP where byte 2 is the 0x5B inside PUSH2 0x5B00
        let (outcome, _, _) = run(&hex!("615b0060025600"), &[], 1_000);
        assert_eq!(outcome.status, FrameStatus::Halt(Halt::InvalidJump));
    }

    #[test]
    fn static_frames_reject_writes() {
        let mut state = state();
        state
            .set_code(CONTRACT, Bytes::from_static(&hex!("6001600155")))
            .unwrap();
        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));
        let outcome = evm
            .call(
                CallParams {
                    scheme: CallScheme::StaticCall,
                    caller: CALLER,
                    address: CONTRACT,
                    code_address: CONTRACT,
                    gas: 100_000,
                    value: U256::ZERO,
                    apparent_value: U256::ZERO,
                    input: Bytes::new(),
                    is_static: true,
                },
                &mut substate,
            )
            .unwrap();
        assert_eq!(outcome.status, FrameStatus::Halt(Halt::StaticWrite));
    }

    #[test]
    fn revert_returns_data_and_gas() {
        // PUSH1 0xAA, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, REVERT
        let (outcome, _, _) = run(&hex!("60aa60005260206000fd"), &[], 1_000);
        assert_eq!(outcome.status, FrameStatus::Revert);
        assert!(outcome.gas_left > 0);
        assert_eq!(outcome.output[31], 0xAA);
    }

    const OTHER: Address = Address::repeat_byte(0xC3);

    /// `PUSH1 0 ×4, PUSH20 target, PUSH2 0xFFFF, CALL` then return the
    /// status word.
    fn call_and_return_status(target: Address) -> Vec<u8> {
        let mut code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00];
        code.push(0x73);
        code.extend_from_slice(target.as_slice());
        code.extend_from_slice(&[0x61, 0xFF, 0xFF, 0xF1]);
        // MSTORE the flag, return the word
        code.extend_from_slice(&hex!("60005260206000f3"));
        code
    }

    #[test]
    fn failing_callee_reverts_only_its_own_writes() {
        // callee writes a slot, then hits the designated invalid opcode
        let callee = hex!("60016001 55fe");
        // caller writes its own slot first, then calls
        let mut caller_code = hex!("602a600055").to_vec();
        caller_code.extend_from_slice(&call_and_return_status(OTHER));

        let (outcome, mut state, _) = run_with(&caller_code, &[], 200_000, |state| {
            state
                .set_code(OTHER, Bytes::copy_from_slice(&callee))
                .unwrap();
        });
        assert!(outcome.is_success());
        // the call pushed 0
        assert_eq!(outcome.output, [0u8; 32]);
        // the caller's write survived, the callee's did not
        assert_eq!(
            state.storage_get(CONTRACT, U256::ZERO).unwrap(),
            U256::from(0x2A)
        );
        assert_eq!(state.storage_get(OTHER, U256::from(1)).unwrap(), U256::ZERO);
    }

    #[test]
    fn call_depth_limit_fails_softly() {
        let code = call_and_return_status(OTHER);
        let mut state = state();
        state.set_code(CONTRACT, code.into()).unwrap();
        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let params = CallParams {
            scheme: CallScheme::Call,
            caller: CALLER,
            address: CONTRACT,
            code_address: CONTRACT,
            gas: 200_000,
            value: U256::ZERO,
            apparent_value: U256::ZERO,
            input: Bytes::new(),
            is_static: false,
        };

        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));
        let outcome = evm.call(params.clone(), &mut substate).unwrap();
        let mut one = [0u8; 32];
        one[31] = 1;
        assert_eq!(outcome.output, one);

        // at the depth ceiling the inner call fails without an exceptional
        // halt and the frame itself still succeeds
        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));
        evm.depth = CALL_DEPTH_LIMIT;
        let outcome = evm.call(params, &mut substate).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.output, [0u8; 32]);
    }

    #[test]
    fn delegatecall_runs_in_caller_context() {
        // callee stores CALLER at slot 0
        let callee = hex!("33600055");
        // caller delegate-calls it
        let mut code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00];
        code.push(0x73);
        code.extend_from_slice(OTHER.as_slice());
        code.extend_from_slice(&[0x61, 0xFF, 0xFF, 0xF4, 0x00]);

        let (outcome, mut state, _) = run_with(&code, &[], 200_000, |state| {
            state
                .set_code(OTHER, Bytes::copy_from_slice(&callee))
                .unwrap();
        });
        assert!(outcome.is_success());
        // the write landed in the delegating contract, tagged with the
        // original caller
        assert_eq!(
            state.storage_get(CONTRACT, U256::ZERO).unwrap(),
            word_from_address(CALLER)
        );
        assert_eq!(state.storage_get(OTHER, U256::ZERO).unwrap(), U256::ZERO);
    }

    #[test]
    fn create_deploys_returned_code() {
        let mut state = state();
        state.add_balance(CALLER, U256::from(1_000)).unwrap();
        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));

        // PUSH1 0xFE, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, RETURN
        let init = Bytes::from_static(&hex!("60fe60005360016000f3"));
        let address = create_address(&CALLER, 0);
        let outcome = evm
            .create(CALLER, address, U256::from(7), init, 100_000, &mut substate)
            .unwrap();
        assert!(outcome.is_success());

        assert_eq!(state.code(address).unwrap().as_ref(), &[0xFE]);
        let account = state.account(address).unwrap().unwrap();
        assert_eq!(account.nonce, 1);
        assert_eq!(account.balance, U256::from(7));
        assert_eq!(state.balance(CALLER).unwrap(), U256::from(993));
    }

    #[test]
    fn create_failure_consumes_init_gas() {
        let mut state = state();
        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));

        let init = Bytes::from_static(&[opcode::INVALID]);
        let address = create_address(&CALLER, 0);
        let outcome = evm
            .create(CALLER, address, U256::ZERO, init, 50_000, &mut substate)
            .unwrap();
        assert_eq!(
            outcome.status,
            FrameStatus::Halt(Halt::InvalidOpcode(opcode::INVALID))
        );
        assert_eq!(outcome.gas_left, 0);
        assert!(state.account(address).unwrap().is_none());
    }

    #[test]
    fn create_address_vectors() {
        let sender = address!("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            create_address(&sender, 0),
            address!("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_eq!(
            create_address(&sender, 1),
            address!("343c43a37d37dff08ae8c4a11544c718abb4fcf8")
        );
    }

    #[test]
    fn precompiles_dispatch_through_calls() {
        let mut state = state();
        let chain = chain();
        let block = block();
        let mut substate = Substate::default();
        let mut evm = Evm::new(&mut state, &chain, &block, CALLER, U256::from(1));

        let identity = address!("0000000000000000000000000000000000000004");
        let outcome = evm
            .call(
                CallParams {
                    scheme: CallScheme::Call,
                    caller: CALLER,
                    address: identity,
                    code_address: identity,
                    gas: 100,
                    value: U256::ZERO,
                    apparent_value: U256::ZERO,
                    input: Bytes::from_static(&[1, 2, 3]),
                    is_static: false,
                },
                &mut substate,
            )
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.output, vec![1, 2, 3]);
        assert_eq!(outcome.gas_left, 100 - 18);
    }

    #[test]
    fn selfdestruct_moves_balance_and_refunds_once() {
        let beneficiary = Address::repeat_byte(0xBE);
        let mut code = vec![0x73];
        code.extend_from_slice(beneficiary.as_slice());
        code.push(opcode::SELFDESTRUCT);

        let (outcome, mut state, substate) = run_with(&code, &[], 100_000, |state| {
            state.add_balance(CONTRACT, U256::from(555)).unwrap();
        });
        assert!(outcome.is_success());
        assert_eq!(substate.refund, gas::SELFDESTRUCT_REFUND);
        assert_eq!(state.balance(beneficiary).unwrap(), U256::from(555));
        assert_eq!(state.balance(CONTRACT).unwrap(), U256::ZERO);
        assert!(state.destruction_marked(CONTRACT));
    }

    #[test]
    fn logs_are_recorded_in_order() {
        // store 0xAA in memory, then LOG1 twice with topics 7 and 8
        let (outcome, _, substate) = run(
            &hex!("60aa600052600760206000a1600860206000a100"),
            &[],
            100_000,
        );
        assert!(outcome.is_success());
        assert_eq!(substate.logs.len(), 2);
        assert_eq!(substate.logs[0].address, CONTRACT);
        assert_eq!(substate.logs[0].topics, vec![B256::from(U256::from(7))]);
        assert_eq!(substate.logs[1].topics, vec![B256::from(U256::from(8))]);
        assert_eq!(substate.logs[0].data[31], 0xAA);
    }
}
