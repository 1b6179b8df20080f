//! Transactions, their signing hashes and sender recovery.

use crate::{keccak256, Address, Bytes, B256, U256};
use basalt_rlp::{Decodable, Encodable, Error, Header, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Order of the secp256k1 group.
const SECP256K1N: U256 = U256::from_limbs([
    0xbfd25e8cd0364141,
    0xbaaedce6af48a03b,
    0xfffffffffffffffe,
    0xffffffffffffffff,
]);

/// Errors while checking or recovering a transaction signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// `v` is not 27/28 nor a valid EIP-155 value for the configured chain.
    #[error("invalid v value")]
    InvalidV,
    /// `r` is zero or not below the group order.
    #[error("r out of range")]
    InvalidR,
    /// `s` is zero, not below the group order, or in the upper half where the
    /// low-s rule applies.
    #[error("s out of range")]
    InvalidS,
    /// The transaction is replay-protected for a different chain.
    #[error("chain id mismatch")]
    ChainIdMismatch,
    /// Point recovery failed.
    #[error("unrecoverable signature")]
    Unrecoverable,
}

/// A transaction: `(nonce, gas_price, gas_limit, to, value, data, v, r, s)`.
///
/// `to = None` is contract creation and `data` carries the init code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Sender nonce at the time of signing.
    pub nonce: u64,
    /// Wei paid per unit of gas.
    pub gas_price: U256,
    /// Maximum gas this transaction may consume.
    pub gas_limit: u64,
    /// Recipient, or `None` for contract creation.
    pub to: Option<Address>,
    /// Wei transferred to the recipient or endowed to the new contract.
    pub value: U256,
    /// Call data, or init code when creating.
    pub data: Bytes,
    /// Signature recovery value, EIP-155 aware.
    pub v: u64,
    /// Signature r.
    pub r: U256,
    /// Signature s.
    pub s: U256,
}

fn encode_to(to: &Option<Address>, out: &mut Vec<u8>) {
    match to {
        Some(address) => address.encode(out),
        None => out.push(basalt_rlp::EMPTY_STRING_CODE),
    }
}

fn to_length(to: &Option<Address>) -> usize {
    match to {
        Some(address) => address.length(),
        None => 1,
    }
}

impl Transaction {
    /// True for contract-creating transactions.
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Keccak-256 of the RLP encoding, the transaction hash.
    pub fn hash(&self) -> B256 {
        keccak256(basalt_rlp::encode(self))
    }

    /// The chain id this signature is replay-protected for, if any.
    pub fn chain_id(&self) -> Option<u64> {
        if self.v >= 35 {
            Some((self.v - 35) / 2)
        } else {
            None
        }
    }

    /// The hash the sender signed: `keccak(rlp([nonce, gas_price, gas_limit,
    /// to, value, data]))`, with `[chain_id, 0, 0]` appended post-EIP-155.
    pub fn signing_hash(&self, chain_id: Option<u64>) -> B256 {
        let mut payload_length = self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + to_length(&self.to)
            + self.value.length()
            + self.data.length();
        if let Some(chain_id) = chain_id {
            payload_length += chain_id.length() + 2;
        }
        let mut out = Vec::with_capacity(payload_length + 3);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.nonce.encode(&mut out);
        self.gas_price.encode(&mut out);
        self.gas_limit.encode(&mut out);
        encode_to(&self.to, &mut out);
        self.value.encode(&mut out);
        self.data.encode(&mut out);
        if let Some(chain_id) = chain_id {
            chain_id.encode(&mut out);
            0u64.encode(&mut out);
            0u64.encode(&mut out);
        }
        keccak256(out)
    }

    /// Recovers the sender address.
    ///
    /// `chain_id` is the chain the transaction executes on; replay-protected
    /// signatures must match it. `require_low_s` enforces the Homestead
    /// upper-half-order rule.
    pub fn recover_sender(
        &self,
        chain_id: Option<u64>,
        require_low_s: bool,
    ) -> core::result::Result<Address, SignatureError> {
        if self.r.is_zero() || self.r >= SECP256K1N {
            return Err(SignatureError::InvalidR);
        }
        if self.s.is_zero() || self.s >= SECP256K1N {
            return Err(SignatureError::InvalidS);
        }
        if require_low_s && self.s > SECP256K1N >> 1 {
            return Err(SignatureError::InvalidS);
        }

        let (recovery_id, hash) = match self.v {
            27 | 28 => (self.v as u8 - 27, self.signing_hash(None)),
            v if v >= 35 => {
                let declared = (v - 35) / 2;
                match chain_id {
                    Some(chain_id) if chain_id == declared => (
                        (v - 35 - 2 * chain_id) as u8,
                        self.signing_hash(Some(chain_id)),
                    ),
                    Some(_) => return Err(SignatureError::ChainIdMismatch),
                    // replay protection not active yet
                    None => return Err(SignatureError::InvalidV),
                }
            }
            _ => return Err(SignatureError::InvalidV),
        };

        let signature =
            Signature::from_scalars(self.r.to_be_bytes::<32>(), self.s.to_be_bytes::<32>())
                .map_err(|_| SignatureError::Unrecoverable)?;
        let recovery_id =
            RecoveryId::from_byte(recovery_id).ok_or(SignatureError::InvalidV)?;
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
            .map_err(|_| SignatureError::Unrecoverable)?;
        Ok(public_key_to_address(&key))
    }

    /// Signs the transaction in place with `key`, producing a legacy `v` or an
    /// EIP-155 `v` depending on `chain_id`.
    pub fn sign(&mut self, key: &SigningKey, chain_id: Option<u64>) {
        let hash = self.signing_hash(chain_id);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_slice())
            .expect("prehash is 32 bytes");
        let bytes = signature.to_bytes();
        self.r = U256::from_be_slice(&bytes[..32]);
        self.s = U256::from_be_slice(&bytes[32..]);
        self.v = match chain_id {
            Some(chain_id) => recovery_id.to_byte() as u64 + 35 + 2 * chain_id,
            None => recovery_id.to_byte() as u64 + 27,
        };
    }

    fn payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + to_length(&self.to)
            + self.value.length()
            + self.data.length()
            + self.v.length()
            + self.r.length()
            + self.s.length()
    }
}

/// The address of a public key: the low 20 bytes of the keccak of its
/// uncompressed SEC1 encoding without the tag byte.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

impl Encodable for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(&self.to, out);
        self.value.encode(out);
        self.data.encode(out);
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Transaction {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let tx = Transaction {
            nonce: u64::decode(&mut payload)?,
            gas_price: U256::decode(&mut payload)?,
            gas_limit: u64::decode(&mut payload)?,
            to: {
                let bytes = Header::decode_bytes(&mut payload, false)?;
                match bytes.len() {
                    0 => None,
                    20 => Some(Address::from_slice(bytes)),
                    _ => return Err(Error::UnexpectedLength),
                }
            },
            value: U256::decode(&mut payload)?,
            data: Bytes::decode(&mut payload)?,
            v: u64::decode(&mut payload)?,
            r: U256::decode(&mut payload)?,
            s: U256::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use basalt_rlp::{decode_exact, encode};

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn transfer() -> Transaction {
        Transaction {
            nonce: 0,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Some(address!("00000000000000000000000000000000000000aa")),
            value: U256::from(1_000_000u64),
            data: Bytes::new(),
            v: 0,
            r: U256::ZERO,
            s: U256::ZERO,
        }
    }

    #[test]
    fn roundtrip() {
        let mut tx = transfer();
        tx.sign(&signing_key(), Some(1));
        let encoded = encode(&tx);
        assert_eq!(tx.length(), encoded.len());
        assert_eq!(decode_exact::<Transaction>(&encoded).unwrap(), tx);
    }

    #[test]
    fn recovers_signer_legacy_and_eip155() {
        let key = signing_key();
        let expected = public_key_to_address(key.verifying_key());

        let mut tx = transfer();
        tx.sign(&key, None);
        assert_eq!(tx.chain_id(), None);
        assert_eq!(tx.recover_sender(None, true).unwrap(), expected);

        let mut tx = transfer();
        tx.sign(&key, Some(1));
        assert_eq!(tx.chain_id(), Some(1));
        assert_eq!(tx.recover_sender(Some(1), true).unwrap(), expected);
    }

    #[test]
    fn rejects_wrong_chain_id() {
        let mut tx = transfer();
        tx.sign(&signing_key(), Some(3));
        assert_eq!(
            tx.recover_sender(Some(1), true).unwrap_err(),
            SignatureError::ChainIdMismatch
        );
    }

    #[test]
    fn rejects_zero_scalars() {
        let tx = transfer();
        assert_eq!(
            tx.recover_sender(None, false).unwrap_err(),
            SignatureError::InvalidR
        );
    }

    #[test]
    fn create_has_empty_to() {
        let mut tx = transfer();
        tx.to = None;
        assert!(tx.is_create());
        let encoded = encode(&tx);
        assert!(decode_exact::<Transaction>(&encoded).unwrap().is_create());
    }
}
