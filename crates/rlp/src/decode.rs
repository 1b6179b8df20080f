use crate::{Error, Header, Result};
use alloy_primitives::{Address, Bloom, Bytes, FixedBytes, U256};

/// A type deserializable from RLP.
pub trait Decodable: Sized {
    /// Decodes an item from the front of `buf`, advancing it.
    fn decode(buf: &mut &[u8]) -> Result<Self>;
}

/// Decodes a value that must occupy the entire buffer.
pub fn decode_exact<T: Decodable>(mut buf: &[u8]) -> Result<T> {
    let value = T::decode(&mut buf)?;
    if !buf.is_empty() {
        return Err(Error::TrailingBytes);
    }
    Ok(value)
}

/// Decodes a homogeneous RLP list.
pub fn decode_list<T: Decodable>(buf: &mut &[u8]) -> Result<Vec<T>> {
    let mut payload = Header::decode_bytes(buf, true)?;
    let mut items = Vec::new();
    while !payload.is_empty() {
        items.push(T::decode(&mut payload)?);
    }
    Ok(items)
}

fn decode_uint(buf: &mut &[u8], max_len: usize) -> Result<u128> {
    let bytes = Header::decode_bytes(buf, false)?;
    if bytes.len() > max_len {
        return Err(Error::Overflow);
    }
    if let Some(first) = bytes.first() {
        if *first == 0 {
            return Err(Error::LeadingZero);
        }
    }
    let mut value = 0u128;
    for &b in bytes {
        value = (value << 8) | b as u128;
    }
    Ok(value)
}

macro_rules! uint_decodable {
    ($($t:ty),*) => {$(
        impl Decodable for $t {
            fn decode(buf: &mut &[u8]) -> Result<Self> {
                Ok(decode_uint(buf, core::mem::size_of::<$t>())? as $t)
            }
        }
    )*};
}

uint_decodable!(u8, u16, u32, u64, u128, usize);

impl Decodable for U256 {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let bytes = Header::decode_bytes(buf, false)?;
        if bytes.len() > 32 {
            return Err(Error::Overflow);
        }
        if let Some(first) = bytes.first() {
            if *first == 0 {
                return Err(Error::LeadingZero);
            }
        }
        Ok(U256::from_be_slice(bytes))
    }
}

impl Decodable for bool {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::Custom("invalid bool")),
        }
    }
}

impl Decodable for Vec<u8> {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Header::decode_bytes(buf, false)?.to_vec())
    }
}

impl Decodable for Bytes {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Bytes::copy_from_slice(Header::decode_bytes(buf, false)?))
    }
}

impl<const N: usize> Decodable for FixedBytes<N> {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let bytes = Header::decode_bytes(buf, false)?;
        if bytes.len() != N {
            return Err(Error::UnexpectedLength);
        }
        Ok(FixedBytes::from_slice(bytes))
    }
}

impl Decodable for Address {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let bytes = Header::decode_bytes(buf, false)?;
        if bytes.len() != 20 {
            return Err(Error::UnexpectedLength);
        }
        Ok(Address::from_slice(bytes))
    }
}

impl Decodable for Bloom {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let bytes = Header::decode_bytes(buf, false)?;
        if bytes.len() != 256 {
            return Err(Error::UnexpectedLength);
        }
        Ok(Bloom::from_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode, encode_list};
    use hex_literal::hex;

    #[test]
    fn roundtrips_integers() {
        for n in [0u64, 1, 127, 128, 255, 256, 0xFFFF, u64::MAX] {
            assert_eq!(decode_exact::<u64>(&encode(&n)).unwrap(), n);
        }
        let big = U256::MAX;
        assert_eq!(decode_exact::<U256>(&encode(&big)).unwrap(), big);
    }

    #[test]
    fn roundtrips_byte_strings() {
        for s in [&b""[..], b"d", b"dog", &[0u8; 60]] {
            assert_eq!(decode_exact::<Vec<u8>>(&encode(&s)).unwrap(), s);
        }
    }

    #[test]
    fn roundtrips_lists() {
        let list = vec![b"dog".to_vec(), b"god".to_vec(), b"cat".to_vec()];
        let mut out = Vec::new();
        encode_list(&list, &mut out);
        let mut buf = out.as_slice();
        assert_eq!(decode_list::<Vec<u8>>(&mut buf).unwrap(), list);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_leading_zero_integer() {
        assert_eq!(
            decode_exact::<u64>(&hex!("820064")).unwrap_err(),
            Error::LeadingZero
        );
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(
            decode_exact::<u8>(&hex!("820400")).unwrap_err(),
            Error::Overflow
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_eq!(
            decode_exact::<u64>(&hex!("0101")).unwrap_err(),
            Error::TrailingBytes
        );
    }

    #[test]
    fn rejects_list_for_string() {
        assert_eq!(
            decode_exact::<Vec<u8>>(&hex!("c0")).unwrap_err(),
            Error::UnexpectedList
        );
    }
}
