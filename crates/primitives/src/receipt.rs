//! Transaction receipts, in both historical shapes.

use crate::{Bloom, LogEntry, B256};
use basalt_rlp::{
    encode_list, list_length, Decodable, Encodable, Error, Header, Result,
};

/// The first receipt field: an intermediate state root before Byzantium, a
/// status byte afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Root of the world state after this transaction (pre-Byzantium).
    StateRoot(B256),
    /// Whether the top-level call succeeded (Byzantium and later).
    Status(bool),
}

/// A transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// State root or status, per fork.
    pub outcome: ReceiptOutcome,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Bloom of this transaction's logs.
    pub logs_bloom: Bloom,
    /// Logs emitted by this transaction, in execution order.
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    /// True if the transaction succeeded. Pre-Byzantium receipts don't record
    /// failure, so any state root reads as success.
    pub fn is_success(&self) -> bool {
        match self.outcome {
            ReceiptOutcome::StateRoot(_) => true,
            ReceiptOutcome::Status(success) => success,
        }
    }

    fn payload_length(&self) -> usize {
        let outcome_length = match self.outcome {
            ReceiptOutcome::StateRoot(root) => root.length(),
            ReceiptOutcome::Status(success) => success.length(),
        };
        outcome_length
            + self.cumulative_gas_used.length()
            + self.logs_bloom.length()
            + list_length(&self.logs)
    }
}

impl Encodable for Receipt {
    fn encode(&self, out: &mut Vec<u8>) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        match self.outcome {
            ReceiptOutcome::StateRoot(root) => root.encode(out),
            ReceiptOutcome::Status(success) => success.encode(out),
        }
        self.cumulative_gas_used.encode(out);
        self.logs_bloom.encode(out);
        encode_list(&self.logs, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + basalt_rlp::length_of_length(payload_length)
    }
}

impl Decodable for Receipt {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let mut payload = Header::decode_bytes(buf, true)?;
        let outcome = {
            let bytes = Header::decode_bytes(&mut payload, false)?;
            match bytes.len() {
                32 => ReceiptOutcome::StateRoot(B256::from_slice(bytes)),
                0 => ReceiptOutcome::Status(false),
                1 if bytes[0] == 1 => ReceiptOutcome::Status(true),
                _ => return Err(Error::Custom("invalid receipt outcome")),
            }
        };
        let receipt = Receipt {
            outcome,
            cumulative_gas_used: u64::decode(&mut payload)?,
            logs_bloom: Bloom::decode(&mut payload)?,
            logs: basalt_rlp::decode_list(&mut payload)?,
        };
        if !payload.is_empty() {
            return Err(Error::ListLengthMismatch);
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_rlp::{decode_exact, encode};

    #[test]
    fn roundtrips_both_shapes() {
        for outcome in [
            ReceiptOutcome::StateRoot(B256::repeat_byte(0x33)),
            ReceiptOutcome::Status(true),
            ReceiptOutcome::Status(false),
        ] {
            let receipt = Receipt {
                outcome,
                cumulative_gas_used: 21_000,
                logs_bloom: Bloom::ZERO,
                logs: vec![],
            };
            let encoded = encode(&receipt);
            assert_eq!(receipt.length(), encoded.len());
            assert_eq!(decode_exact::<Receipt>(&encoded).unwrap(), receipt);
        }
    }
}
