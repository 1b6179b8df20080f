//! `sha256`, `ripemd160` and `identity` precompiles.

use crate::{PrecompileError, PrecompileOutput, PrecompileResult};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

fn linear_cost(len: usize, base: u64, word: u64) -> u64 {
    base + word * (len as u64).div_ceil(32)
}

/// `sha256` precompile function.
pub fn sha256_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 60, 12);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(PrecompileOutput::new(
        cost,
        Sha256::digest(input).to_vec(),
    ))
}

/// `ripemd160` precompile function. The 20-byte digest is left-padded to 32
/// bytes.
pub fn ripemd160_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 600, 120);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let mut out = vec![0u8; 32];
    out[12..].copy_from_slice(&Ripemd160::digest(input));
    Ok(PrecompileOutput::new(cost, out))
}

/// `identity` precompile function: echoes its input.
pub fn identity_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = linear_cost(input.len(), 15, 3);
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(PrecompileOutput::new(cost, input.to_vec()))
}
