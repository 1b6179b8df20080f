//! The on-chain account record.

use crate::{B256, EMPTY_ROOT_HASH, KECCAK_EMPTY, U256};
use basalt_rlp::{Decodable, Encodable, Error, Header, Result};

/// An account in the world state: `(nonce, balance, storage_root, code_hash)`.
///
/// Stored in the state trie as `keccak(address) → rlp(account)`. Code bytes
/// live separately in the KV store under `code_hash`; storage lives in a
/// per-account trie rooted at `storage_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Number of transactions sent from this account, or for a contract, the
    /// number of contract creations it made.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Root of the per-account storage trie.
    pub storage_root: B256,
    /// Keccak-256 of the account's code.
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl Account {
    /// An account with the given balance and nothing else, as created by a
    /// first value transfer.
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    /// True if the account is empty in the EIP-161 sense: no code, zero nonce,
    /// zero balance.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == KECCAK_EMPTY
    }

    /// True if the account has code.
    pub fn has_code(&self) -> bool {
        self.code_hash != KECCAK_EMPTY
    }

    fn payload_length(&self) -> usize {
        self.nonce.length()
            + self.balance.length()
            + self.storage_root.length()
            + self.code_hash.length()
    }
}

impl Encodable for Account {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.nonce.encode(out);
        self.balance.encode(out);
        self.storage_root.encode(out);
        self.code_hash.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Account {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let account = Account {
            nonce: u64::decode(&mut payload)?,
            balance: U256::decode(&mut payload)?,
            storage_root: B256::decode(&mut payload)?,
            code_hash: B256::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_rlp::{decode_exact, encode};

    #[test]
    fn roundtrip() {
        let account = Account {
            nonce: 7,
            balance: U256::from(10).pow(U256::from(18)),
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        };
        let encoded = encode(&account);
        assert_eq!(account.length(), encoded.len());
        assert_eq!(decode_exact::<Account>(&encoded).unwrap(), account);
    }

    #[test]
    fn default_is_empty() {
        assert!(Account::default().is_empty());
        assert!(!Account::with_balance(U256::from(1)).is_empty());
    }
}
