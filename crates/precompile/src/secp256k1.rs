//! `ecrecover` precompile.

use crate::{right_pad, PrecompileError, PrecompileOutput, PrecompileResult};
use basalt_primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

const ECRECOVER_BASE: u64 = 3_000;

/// `ecrecover` precompile function: recovers the signer address from a
/// 32-byte message hash, a 32-byte big-endian `v` of 27 or 28, and the
/// signature scalars. Unrecoverable inputs produce empty output, not an
/// error.
pub fn ec_recover_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if ECRECOVER_BASE > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    let input = right_pad::<128>(input);

    // `v` must be a 32-byte big-endian integer equal to 27 or 28.
    if !(input[32..63].iter().all(|&b| b == 0) && matches!(input[63], 27 | 28)) {
        return Ok(PrecompileOutput::new(ECRECOVER_BASE, Vec::new()));
    }

    let out = recover(&input).unwrap_or_default();
    Ok(PrecompileOutput::new(ECRECOVER_BASE, out))
}

fn recover(input: &[u8; 128]) -> Option<Vec<u8>> {
    let recovery_id = RecoveryId::from_byte(input[63] - 27)?;
    let signature = Signature::from_slice(&input[64..128]).ok()?;
    let key = VerifyingKey::recover_from_prehash(&input[..32], &signature, recovery_id).ok()?;

    let hash = keccak256(&key.to_encoded_point(false).as_bytes()[1..]);
    let mut out = vec![0u8; 32];
    out[12..].copy_from_slice(&hash[12..]);
    Some(out)
}
