//! Blocks: a header plus transactions and ommers.

use crate::{keccak256, BlockHeader, Transaction, B256};
use basalt_rlp::{
    encode_list, list_length, Decodable, Encodable, Error, Header, Result,
};

/// A block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// Transactions in execution order.
    pub transactions: Vec<Transaction>,
    /// Ommer headers included for partial reward.
    pub ommers: Vec<BlockHeader>,
}

impl Block {
    /// The block hash, i.e. the header hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// Keccak-256 of the RLP of the ommer list, the value `ommers_hash` must
    /// carry.
    pub fn ommers_hash(&self) -> B256 {
        let mut out = Vec::new();
        encode_list(&self.ommers, &mut out);
        keccak256(out)
    }

    fn payload_length(&self) -> usize {
        self.header.length() + list_length(&self.transactions) + list_length(&self.ommers)
    }
}

impl Encodable for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.header.encode(out);
        encode_list(&self.transactions, out);
        encode_list(&self.ommers, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Block {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let block = Block {
            header: BlockHeader::decode(&mut payload)?,
            transactions: basalt_rlp::decode_list(&mut payload)?,
            ommers: basalt_rlp::decode_list(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(block)
    }
}
