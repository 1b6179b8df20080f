//! Precompiled contracts.
//!
//! The Byzantium set: `ecrecover`, `sha256`, `ripemd160` and `identity` live
//! at addresses 1–4 from Frontier; `modexp`, `bn128 add/mul` and the pairing
//! check at 5–8 activate with Byzantium. Each precompile is a pure function
//! of its input with a fixed-formula gas cost and no state access.

mod bn128;
mod hash;
mod modexp;
mod secp256k1;

pub use bn128::{bn128_add_run, bn128_mul_run, bn128_pairing_run};
pub use hash::{identity_run, ripemd160_run, sha256_run};
pub use modexp::modexp_run;
pub use secp256k1::ec_recover_run;

use basalt_primitives::{Address, SpecId};

/// Precompile failure. Any failure is an exceptional halt of the calling
/// frame: all forwarded gas is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrecompileError {
    /// The fixed-formula cost exceeds the forwarded gas.
    #[error("out of gas")]
    OutOfGas,
    /// A coordinate was not a member of the base field.
    #[error("field element out of range")]
    FieldElementOutOfRange,
    /// A point was not on the curve or outside the expected subgroup.
    #[error("point not on curve")]
    PointNotOnCurve,
    /// The pairing input length was not a multiple of 192.
    #[error("invalid pairing input length")]
    PairingInputLength,
    /// A modexp length field does not fit in memory.
    #[error("modexp length overflow")]
    ModexpLengthOverflow,
}

/// Successful precompile run: gas actually consumed and the output bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecompileOutput {
    /// Gas consumed by the run.
    pub gas_used: u64,
    /// Output bytes.
    pub bytes: Vec<u8>,
}

impl PrecompileOutput {
    /// Bundles gas and output.
    pub fn new(gas_used: u64, bytes: Vec<u8>) -> Self {
        Self { gas_used, bytes }
    }
}

/// Precompile result type.
pub type PrecompileResult = Result<PrecompileOutput, PrecompileError>;

/// A precompile entry point: input and forwarded gas in, output and consumed
/// gas out.
pub type Precompile = fn(&[u8], u64) -> PrecompileResult;

/// Looks up the precompile at `address` under the given fork, if any.
pub fn by_address(address: &Address, spec: SpecId) -> Option<Precompile> {
    if !address[..19].iter().all(|&byte| byte == 0) {
        return None;
    }
    match address[19] {
        1 => Some(ec_recover_run as Precompile),
        2 => Some(sha256_run as Precompile),
        3 => Some(ripemd160_run as Precompile),
        4 => Some(identity_run as Precompile),
        5 if spec >= SpecId::Byzantium => Some(modexp_run as Precompile),
        6 if spec >= SpecId::Byzantium => Some(bn128_add_run as Precompile),
        7 if spec >= SpecId::Byzantium => Some(bn128_mul_run as Precompile),
        8 if spec >= SpecId::Byzantium => Some(bn128_pairing_run as Precompile),
        _ => None,
    }
}

/// Right-pads `input` with zeros to a fixed width, truncating anything past
/// it.
pub(crate) fn right_pad<const N: usize>(input: &[u8]) -> [u8; N] {
    let mut padded = [0u8; N];
    let len = input.len().min(N);
    padded[..len].copy_from_slice(&input[..len]);
    padded
}

/// Reads `len` bytes starting at `offset`, treating everything past the end
/// of `input` as zero.
pub(crate) fn read_padded(input: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < input.len() {
        let available = (input.len() - offset).min(len);
        out[..available].copy_from_slice(&input[offset..offset + available]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::address;

    #[test]
    fn address_dispatch_per_fork() {
        let ecrecover = address!("0000000000000000000000000000000000000001");
        let modexp = address!("0000000000000000000000000000000000000005");
        let nobody = address!("0000000000000000000000000000000000000009");
        let contract = address!("1000000000000000000000000000000000000001");

        assert!(by_address(&ecrecover, SpecId::Frontier).is_some());
        assert!(by_address(&modexp, SpecId::Frontier).is_none());
        assert!(by_address(&modexp, SpecId::Byzantium).is_some());
        assert!(by_address(&nobody, SpecId::Byzantium).is_none());
        assert!(by_address(&contract, SpecId::Byzantium).is_none());
    }
}
