//! Log entries and the 2048-bit bloom filter over them.

use crate::{keccak256, Address, Bloom, Bytes, B256};
use basalt_rlp::{
    encode_list, list_length, Decodable, Encodable, Error, Header, Result,
};

/// A log emitted by a `LOG0..LOG4` opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Address of the emitting contract.
    pub address: Address,
    /// Up to four indexed topics.
    pub topics: Vec<B256>,
    /// Unindexed payload.
    pub data: Bytes,
}

impl LogEntry {
    /// Folds this log's address and topics into `bloom` (the Yellow Paper
    /// M3:2048 function).
    pub fn accrue_bloom(&self, bloom: &mut Bloom) {
        accrue(bloom, self.address.as_slice());
        for topic in &self.topics {
            accrue(bloom, topic.as_slice());
        }
    }

    fn payload_length(&self) -> usize {
        self.address.length() + list_length(&self.topics) + self.data.length()
    }
}

/// Sets the three bloom bits derived from `input`: the low 11 bits of each of
/// the first three byte pairs of its hash.
fn accrue(bloom: &mut Bloom, input: &[u8]) {
    let hash = keccak256(input);
    for i in [0usize, 2, 4] {
        let bit = (((hash[i] as usize) << 8) | hash[i + 1] as usize) & 0x7FF;
        bloom.0[255 - bit / 8] |= 1 << (bit % 8);
    }
}

/// The combined bloom of a sequence of logs.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a LogEntry>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        log.accrue_bloom(&mut bloom);
    }
    bloom
}

impl Encodable for LogEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.address.encode(out);
        encode_list(&self.topics, out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for LogEntry {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let log = LogEntry {
            address: Address::decode(&mut payload)?,
            topics: basalt_rlp::decode_list(&mut payload)?,
            data: Bytes::decode(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(log)
    }
}
