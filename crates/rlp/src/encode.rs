use crate::{Header, EMPTY_STRING_CODE};
use alloy_primitives::{Address, Bloom, Bytes, FixedBytes, U256};

/// A type serializable to RLP.
pub trait Encodable {
    /// Appends the encoding of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Number of bytes `encode` will append.
    fn length(&self) -> usize;
}

/// Encodes a value into a fresh buffer.
pub fn encode<T: Encodable + ?Sized>(value: &T) -> Vec<u8> {
    let rlp_length = value.length();
    let mut out = Vec::with_capacity(rlp_length);
    value.encode(&mut out);
    debug_assert_eq!(out.len(), rlp_length);
    out
}

/// Encodes a slice of items as an RLP list.
///
/// Byte strings (`Vec<u8>`, `Bytes`, …) encode as strings through their own
/// [`Encodable`] impls; this is the only way to produce a list.
pub fn encode_list<T: Encodable>(items: &[T], out: &mut Vec<u8>) {
    Header {
        list: true,
        payload_length: items.iter().map(Encodable::length).sum(),
    }
    .encode(out);
    for item in items {
        item.encode(out);
    }
}

/// Number of bytes [`encode_list`] will append.
pub fn list_length<T: Encodable>(items: &[T]) -> usize {
    let payload_length: usize = items.iter().map(Encodable::length).sum();
    Header {
        list: true,
        payload_length,
    }
    .length()
        + payload_length
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    match bytes {
        [b] if *b < EMPTY_STRING_CODE => out.push(*b),
        _ => {
            Header {
                list: false,
                payload_length: bytes.len(),
            }
            .encode(out);
            out.extend_from_slice(bytes);
        }
    }
}

fn bytes_length(bytes: &[u8]) -> usize {
    match bytes {
        [b] if *b < EMPTY_STRING_CODE => 1,
        _ => {
            Header {
                list: false,
                payload_length: bytes.len(),
            }
            .length()
                + bytes.len()
        }
    }
}

impl Encodable for [u8] {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self, out)
    }

    fn length(&self) -> usize {
        bytes_length(self)
    }
}

impl Encodable for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self, out)
    }

    fn length(&self) -> usize {
        bytes_length(self)
    }
}

impl Encodable for Bytes {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self, out)
    }

    fn length(&self) -> usize {
        bytes_length(self)
    }
}

impl<const N: usize> Encodable for FixedBytes<N> {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self.as_slice(), out)
    }

    fn length(&self) -> usize {
        bytes_length(self.as_slice())
    }
}

impl Encodable for Address {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self.as_slice(), out)
    }

    fn length(&self) -> usize {
        bytes_length(self.as_slice())
    }
}

impl Encodable for Bloom {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_bytes(self.as_slice(), out)
    }

    fn length(&self) -> usize {
        bytes_length(self.as_slice())
    }
}

macro_rules! uint_encodable {
    ($($t:ty),*) => {$(
        impl Encodable for $t {
            fn encode(&self, out: &mut Vec<u8>) {
                let be = self.to_be_bytes();
                encode_bytes(&be[(self.leading_zeros() / 8) as usize..], out)
            }

            fn length(&self) -> usize {
                let be = self.to_be_bytes();
                bytes_length(&be[(self.leading_zeros() / 8) as usize..])
            }
        }
    )*};
}

uint_encodable!(u8, u16, u32, u64, u128, usize);

impl Encodable for U256 {
    fn encode(&self, out: &mut Vec<u8>) {
        let be = self.to_be_bytes::<32>();
        encode_bytes(&be[(self.leading_zeros() / 8)..], out)
    }

    fn length(&self) -> usize {
        let be = self.to_be_bytes::<32>();
        bytes_length(&be[(self.leading_zeros() / 8)..])
    }
}

impl Encodable for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        (*self as u8).encode(out)
    }

    fn length(&self) -> usize {
        1
    }
}

impl<T: Encodable + ?Sized> Encodable for &T {
    fn encode(&self, out: &mut Vec<u8>) {
        (*self).encode(out)
    }

    fn length(&self) -> usize {
        (*self).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encodes_dog() {
        assert_eq!(encode(&b"dog"[..]), hex!("83646f67"));
    }

    #[test]
    fn encodes_string_list() {
        let list = vec![b"dog".to_vec(), b"god".to_vec(), b"cat".to_vec()];
        let mut out = Vec::new();
        encode_list(&list, &mut out);
        assert_eq!(out, hex!("cc83646f6783676f6483636174"));
        assert_eq!(list_length(&list), out.len());
    }

    #[test]
    fn encodes_integers() {
        assert_eq!(encode(&0u64), [EMPTY_STRING_CODE]);
        assert_eq!(encode(&15u64), [0x0F]);
        assert_eq!(encode(&1024u64), hex!("820400"));
        assert_eq!(encode(&U256::ZERO), [EMPTY_STRING_CODE]);
        assert_eq!(encode(&U256::from(0x0400)), hex!("820400"));
    }

    #[test]
    fn encodes_empty_values() {
        assert_eq!(encode(&b""[..]), [EMPTY_STRING_CODE]);
        let mut out = Vec::new();
        encode_list::<u64>(&[], &mut out);
        assert_eq!(out, [crate::EMPTY_LIST_CODE]);
    }

    #[test]
    fn encodes_long_string() {
        let payload = [b'a'; 56];
        let encoded = encode(&payload[..]);
        assert_eq!(encoded[0], 0xB8);
        assert_eq!(encoded[1], 56);
        assert_eq!(&encoded[2..], &payload);
    }

    #[test]
    fn length_matches_encode() {
        let n = u64::MAX;
        assert_eq!(n.length(), encode(&n).len());
        let long = vec![7u8; 100];
        assert_eq!(long.length(), encode(&long).len());
    }
}
