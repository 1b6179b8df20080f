//! alt_bn128 precompiles (EIP-196/197): point addition, scalar
//! multiplication and the pairing check.

use crate::{right_pad, PrecompileError, PrecompileOutput, PrecompileResult};
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup};
use ark_ff::{BigInt, BigInteger, One, PrimeField, Zero};

const ADD_GAS: u64 = 500;
const MUL_GAS: u64 = 40_000;
const PAIRING_BASE_GAS: u64 = 100_000;
const PAIRING_PER_PAIR_GAS: u64 = 80_000;

/// `bn128 add`: sum of two curve points.
pub fn bn128_add_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if ADD_GAS > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let input = right_pad::<128>(input);
    let a = read_g1(&input[0..64])?;
    let b = read_g1(&input[64..128])?;
    let sum = (a + b).into_affine();
    Ok(PrecompileOutput::new(ADD_GAS, write_g1(&sum)))
}

/// `bn128 mul`: scalar multiplication of a curve point.
pub fn bn128_mul_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if MUL_GAS > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    let input = right_pad::<96>(input);
    let point = read_g1(&input[0..64])?;
    let scalar = Fr::from_be_bytes_mod_order(&input[64..96]);
    let product = (point * scalar).into_affine();
    Ok(PrecompileOutput::new(MUL_GAS, write_g1(&product)))
}

/// `bn128 pairing`: checks that the product of pairings over the input pairs
/// is the identity, returning a 32-byte boolean.
pub fn bn128_pairing_run(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if input.len() % 192 != 0 {
        return Err(PrecompileError::PairingInputLength);
    }
    let pairs = input.len() / 192;
    let cost = PAIRING_BASE_GAS + PAIRING_PER_PAIR_GAS * pairs as u64;
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }

    let mut g1_points = Vec::with_capacity(pairs);
    let mut g2_points = Vec::with_capacity(pairs);
    for pair in input.chunks_exact(192) {
        let g1 = read_g1(&pair[0..64])?;
        let g2 = read_g2(&pair[64..192])?;
        // pairs with the identity on either side contribute nothing
        if !g1.is_zero() && !g2.is_zero() {
            g1_points.push(g1);
            g2_points.push(g2);
        }
    }

    let success = Bn254::multi_pairing(g1_points, g2_points).0.is_one();
    let mut out = vec![0u8; 32];
    out[31] = success as u8;
    Ok(PrecompileOutput::new(cost, out))
}

fn read_fq(bytes: &[u8]) -> Result<Fq, PrecompileError> {
    debug_assert_eq!(bytes.len(), 32);
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let start = 8 * (3 - i);
        *limb = u64::from_be_bytes(bytes[start..start + 8].try_into().expect("8 bytes"));
    }
    Fq::from_bigint(BigInt::new(limbs)).ok_or(PrecompileError::FieldElementOutOfRange)
}

fn read_g1(bytes: &[u8]) -> Result<G1Affine, PrecompileError> {
    let x = read_fq(&bytes[0..32])?;
    let y = read_fq(&bytes[32..64])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    Ok(point)
}

/// G2 coordinates arrive as `(x_imaginary, x_real, y_imaginary, y_real)`.
fn read_g2(bytes: &[u8]) -> Result<G2Affine, PrecompileError> {
    let x_im = read_fq(&bytes[0..32])?;
    let x_re = read_fq(&bytes[32..64])?;
    let y_im = read_fq(&bytes[64..96])?;
    let y_re = read_fq(&bytes[96..128])?;
    let x = Fq2::new(x_re, x_im);
    let y = Fq2::new(y_re, y_im);
    if x.is_zero() && y.is_zero() {
        return Ok(G2Affine::identity());
    }
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    Ok(point)
}

fn write_g1(point: &G1Affine) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    if !point.infinity {
        write_fq(&point.x, &mut out[0..32]);
        write_fq(&point.y, &mut out[32..64]);
    }
    out
}

fn write_fq(value: &Fq, out: &mut [u8]) {
    let bytes = value.into_bigint().to_bytes_be();
    out[32 - bytes.len()..].copy_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The conventional generator (1, 2).
    fn generator_bytes() -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[31] = 1;
        bytes[63] = 2;
        bytes
    }

    #[test]
    fn add_identity_is_noop() {
        let mut input = [0u8; 128];
        input[..64].copy_from_slice(&generator_bytes());
        let out = bn128_add_run(&input, 1_000).unwrap();
        assert_eq!(out.bytes, generator_bytes());
        assert_eq!(out.gas_used, 500);
    }

    #[test]
    fn double_via_add_and_mul_agree() {
        let mut add_input = [0u8; 128];
        add_input[..64].copy_from_slice(&generator_bytes());
        add_input[64..].copy_from_slice(&generator_bytes());
        let doubled = bn128_add_run(&add_input, 1_000).unwrap().bytes;

        let mut mul_input = [0u8; 96];
        mul_input[..64].copy_from_slice(&generator_bytes());
        mul_input[95] = 2;
        let product = bn128_mul_run(&mul_input, 100_000).unwrap().bytes;

        assert_eq!(doubled, product);
        assert_ne!(doubled, generator_bytes().to_vec());
    }

    #[test]
    fn mul_by_one_is_identity_map() {
        let mut input = [0u8; 96];
        input[..64].copy_from_slice(&generator_bytes());
        input[95] = 1;
        let out = bn128_mul_run(&input, 100_000).unwrap();
        assert_eq!(out.bytes, generator_bytes());
    }

    #[test]
    fn rejects_point_off_curve() {
        let mut input = [0u8; 128];
        input[31] = 1;
        input[63] = 3;
        assert_eq!(
            bn128_add_run(&input, 1_000).unwrap_err(),
            PrecompileError::PointNotOnCurve
        );
    }

    #[test]
    fn rejects_coordinate_above_modulus() {
        let input = [0xFF; 64];
        assert_eq!(
            bn128_add_run(&input, 1_000).unwrap_err(),
            PrecompileError::FieldElementOutOfRange
        );
    }

    #[test]
    fn empty_pairing_input_is_true() {
        let out = bn128_pairing_run(&[], 200_000).unwrap();
        assert_eq!(out.gas_used, 100_000);
        assert_eq!(out.bytes[31], 1);
    }

    #[test]
    fn pairing_with_inverse_cancels() {
        // e(P, Q) * e(-P, Q) = 1
        let g2_generator = G2Affine::generator();
        let g1 = G1Affine::generator();
        let neg_g1 = -g1;

        let mut input = Vec::new();
        for point in [g1, neg_g1] {
            input.extend_from_slice(&write_g1(&point));
            let mut g2_bytes = [0u8; 128];
            write_fq_pair(&g2_generator.x, &mut g2_bytes[0..64]);
            write_fq_pair(&g2_generator.y, &mut g2_bytes[64..128]);
            input.extend_from_slice(&g2_bytes);
        }

        let out = bn128_pairing_run(&input, 400_000).unwrap();
        assert_eq!(out.gas_used, 260_000);
        assert_eq!(out.bytes[31], 1);
    }

    #[test]
    fn pairing_of_generators_alone_is_false() {
        let g2_generator = G2Affine::generator();
        let mut input = Vec::new();
        input.extend_from_slice(&write_g1(&G1Affine::generator()));
        let mut g2_bytes = [0u8; 128];
        write_fq_pair(&g2_generator.x, &mut g2_bytes[0..64]);
        write_fq_pair(&g2_generator.y, &mut g2_bytes[64..128]);
        input.extend_from_slice(&g2_bytes);

        let out = bn128_pairing_run(&input, 400_000).unwrap();
        assert_eq!(out.bytes[31], 0);
    }

    #[test]
    fn pairing_length_must_be_multiple_of_192() {
        assert_eq!(
            bn128_pairing_run(&[0u8; 191], 400_000).unwrap_err(),
            PrecompileError::PairingInputLength
        );
    }

    fn write_fq_pair(value: &Fq2, out: &mut [u8]) {
        // wire order is (imaginary, real)
        write_fq(&value.c1, &mut out[0..32]);
        write_fq(&value.c0, &mut out[32..64]);
    }
}
