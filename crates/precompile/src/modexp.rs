//! `modexp` precompile (EIP-198).

use crate::{read_padded, right_pad, PrecompileError, PrecompileOutput, PrecompileResult};
use num_bigint::BigUint;

const QUAD_DIVISOR: u32 = 20;

/// Arbitrary-precision `base^exp mod modulus` with the EIP-198 gas formula.
pub fn modexp_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let lengths = right_pad::<96>(input);
    let base_len = BigUint::from_bytes_be(&lengths[0..32]);
    let exp_len = BigUint::from_bytes_be(&lengths[32..64]);
    let mod_len = BigUint::from_bytes_be(&lengths[64..96]);

    // the exponent head needed by the length adjustment, before any usize
    // conversion so absurd declared lengths still price correctly
    let exp_head = {
        let base_offset = 96usize.checked_add(usize::try_from(&base_len).unwrap_or(usize::MAX));
        match base_offset {
            Some(offset) => {
                let head_len = usize::try_from(&exp_len).unwrap_or(32).min(32);
                BigUint::from_bytes_be(&read_padded(input, offset, head_len))
            }
            None => BigUint::from(0u32),
        }
    };

    let adjusted_exp_len = adjusted_exponent_length(&exp_len, &exp_head);
    let max_len = base_len.clone().max(mod_len.clone());
    let gas = mult_complexity(&max_len) * adjusted_exp_len.max(BigUint::from(1u32))
        / BigUint::from(QUAD_DIVISOR);
    let gas = u64::try_from(&gas).unwrap_or(u64::MAX);
    if gas > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    // within the gas budget the lengths are small, but convert defensively
    let base_len =
        usize::try_from(&base_len).map_err(|_| PrecompileError::ModexpLengthOverflow)?;
    let exp_len = usize::try_from(&exp_len).map_err(|_| PrecompileError::ModexpLengthOverflow)?;
    let mod_len = usize::try_from(&mod_len).map_err(|_| PrecompileError::ModexpLengthOverflow)?;

    if mod_len == 0 {
        return Ok(PrecompileOutput::new(gas, Vec::new()));
    }

    let base = BigUint::from_bytes_be(&read_padded(input, 96, base_len));
    let exponent = BigUint::from_bytes_be(&read_padded(input, 96 + base_len, exp_len));
    let modulus = BigUint::from_bytes_be(&read_padded(
        input,
        96 + base_len + exp_len,
        mod_len,
    ));

    let result = if modulus == BigUint::from(0u32) {
        BigUint::from(0u32)
    } else {
        base.modpow(&exponent, &modulus)
    };

    // left-pad to the declared modulus width
    let bytes = result.to_bytes_be();
    let mut out = vec![0u8; mod_len];
    out[mod_len - bytes.len()..].copy_from_slice(&bytes);
    Ok(PrecompileOutput::new(gas, out))
}

fn adjusted_exponent_length(exp_len: &BigUint, exp_head: &BigUint) -> BigUint {
    let head_bits = exp_head.bits();
    let head_term = BigUint::from(head_bits.saturating_sub(1));
    if *exp_len <= BigUint::from(32u32) {
        head_term
    } else {
        (exp_len - BigUint::from(32u32)) * BigUint::from(8u32) + head_term
    }
}

fn mult_complexity(x: &BigUint) -> BigUint {
    if *x <= BigUint::from(64u32) {
        x * x
    } else if *x <= BigUint::from(1024u32) {
        x * x / BigUint::from(4u32) + BigUint::from(96u32) * x - BigUint::from(3072u32)
    } else {
        x * x / BigUint::from(16u32) + BigUint::from(480u32) * x - BigUint::from(199_680u32)
    }
}
