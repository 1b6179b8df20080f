//! The block header.

use crate::{
    keccak256, Address, Bloom, Bytes, B256, B64, EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH, U256,
};
use basalt_rlp::{Decodable, Encodable, Error, Header, Result};

/// A block header, the fifteen Yellow Paper fields in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Keccak-256 of the parent block's header; formally Hp.
    pub parent_hash: B256,
    /// Keccak-256 of the RLP of this block's ommer list; formally Ho.
    pub ommers_hash: B256,
    /// The 160-bit address to which all fees collected from the successful
    /// mining of this block be transferred; formally Hc.
    pub beneficiary: Address,
    /// Root of the world state trie after this block executes.
    pub state_root: B256,
    /// Root of the trie keyed by transaction index.
    pub transactions_root: B256,
    /// Root of the trie keyed by receipt index.
    pub receipts_root: B256,
    /// OR of the blooms of every log in the block.
    pub logs_bloom: Bloom,
    /// Difficulty of this block.
    pub difficulty: U256,
    /// Number of ancestors; the genesis block has number zero.
    pub number: u64,
    /// Gas limit of the block.
    pub gas_limit: u64,
    /// Gas used by all transactions in the block.
    pub gas_used: u64,
    /// Unix timestamp at this block's inception.
    pub timestamp: u64,
    /// Arbitrary data, at most 32 bytes.
    pub extra_data: Bytes,
    /// Proof-of-work mix hash; formally Hm.
    pub mix_hash: B256,
    /// Proof-of-work nonce, 64 bits.
    pub nonce: B64,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            parent_hash: B256::ZERO,
            ommers_hash: EMPTY_OMMERS_HASH,
            beneficiary: Address::ZERO,
            state_root: EMPTY_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: B256::ZERO,
            nonce: B64::ZERO,
        }
    }
}

impl BlockHeader {
    /// Keccak-256 of the RLP encoding, the block hash.
    pub fn hash(&self) -> B256 {
        keccak256(basalt_rlp::encode(self))
    }

    fn payload_length(&self) -> usize {
        self.parent_hash.length()
            + self.ommers_hash.length()
            + self.beneficiary.length()
            + self.state_root.length()
            + self.transactions_root.length()
            + self.receipts_root.length()
            + self.logs_bloom.length()
            + self.difficulty.length()
            + self.number.length()
            + self.gas_limit.length()
            + self.gas_used.length()
            + self.timestamp.length()
            + self.extra_data.length()
            + self.mix_hash.length()
            + self.nonce.length()
    }
}

impl Encodable for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.parent_hash.encode(out);
        self.ommers_hash.encode(out);
        self.beneficiary.encode(out);
        self.state_root.encode(out);
        self.transactions_root.encode(out);
        self.receipts_root.encode(out);
        self.logs_bloom.encode(out);
        self.difficulty.encode(out);
        self.number.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        self.mix_hash.encode(out);
        self.nonce.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for BlockHeader {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let header = BlockHeader {
            parent_hash: B256::decode(&mut payload)?,
            ommers_hash: B256::decode(&mut payload)?,
            beneficiary: Address::decode(&mut payload)?,
            state_root: B256::decode(&mut payload)?,
            transactions_root: B256::decode(&mut payload)?,
            receipts_root: B256::decode(&mut payload)?,
            logs_bloom: Bloom::decode(&mut payload)?,
            difficulty: U256::decode(&mut payload)?,
            number: u64::decode(&mut payload)?,
            gas_limit: u64::decode(&mut payload)?,
            gas_used: u64::decode(&mut payload)?,
            timestamp: u64::decode(&mut payload)?,
            extra_data: Bytes::decode(&mut payload)?,
            mix_hash: B256::decode(&mut payload)?,
            nonce: B64::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_rlp::{decode_exact, encode};

    #[test]
    fn roundtrip() {
        let header = BlockHeader {
            parent_hash: B256::repeat_byte(0xAA),
            beneficiary: Address::repeat_byte(0x42),
            difficulty: U256::from(131_072u64),
            number: 1,
            gas_limit: 5000,
            gas_used: 21_000,
            timestamp: 1_438_269_988,
            extra_data: Bytes::from_static(b"basalt"),
            ..Default::default()
        };
        let encoded = encode(&header);
        assert_eq!(header.length(), encoded.len());
        assert_eq!(decode_exact::<BlockHeader>(&encoded).unwrap(), header);
    }

    #[test]
    fn hash_commits_to_every_field() {
        let header = BlockHeader::default();
        let mut other = header.clone();
        other.gas_used = 1;
        assert_ne!(header.hash(), other.hash());
    }
}
