//! Recursive Length Prefix serialization.
//!
//! The canonical byte encoding of the three RLP primitives: non-negative
//! integers (minimal big-endian, zero is the empty string), byte strings and
//! ordered lists. Everything hashable or storable in basalt goes through this
//! codec, so decoding is strict: non-minimal length prefixes, leading zeros in
//! integers and trailing input are rejected.

mod decode;
mod encode;
mod header;

pub use decode::{decode_exact, decode_list, Decodable};
pub use encode::{encode, encode_list, list_length, Encodable};
pub use header::{Header, PayloadView};

/// The single-byte encoding of the empty string, also the empty-value marker
/// inside trie nodes.
pub const EMPTY_STRING_CODE: u8 = 0x80;

/// The single-byte encoding of the empty list.
pub const EMPTY_LIST_CODE: u8 = 0xC0;

/// RLP error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input buffer ended before the encoding did.
    #[error("input too short")]
    InputTooShort,
    /// A single byte below 0x80 was wrapped in a string header.
    #[error("non-canonical single byte encoding")]
    NonCanonicalSingleByte,
    /// A long-form length that should have used the short form, or a length
    /// with leading zero bytes.
    #[error("non-canonical size prefix")]
    NonCanonicalSize,
    /// An integer payload with leading zero bytes.
    #[error("leading zero in integer")]
    LeadingZero,
    /// An integer payload too large for the target type.
    #[error("integer overflow")]
    Overflow,
    /// Expected a byte string, found a list.
    #[error("unexpected list")]
    UnexpectedList,
    /// Expected a list, found a byte string.
    #[error("unexpected string")]
    UnexpectedString,
    /// A fixed-size payload had the wrong length.
    #[error("unexpected length")]
    UnexpectedLength,
    /// A list payload was not fully consumed by its items.
    #[error("list payload length mismatch")]
    ListLengthMismatch,
    /// Trailing bytes after a complete item where none are allowed.
    #[error("trailing bytes")]
    TrailingBytes,
    /// Anything else.
    #[error("{0}")]
    Custom(&'static str),
}

/// RLP result type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Returns the number of bytes the length prefix of a payload of the given
/// size occupies (the header byte itself plus the big-endian length bytes for
/// the long form).
pub const fn length_of_length(payload_length: usize) -> usize {
    if payload_length < 56 {
        1
    } else {
        1 + (usize::BITS as usize / 8) - (payload_length.leading_zeros() as usize / 8)
    }
}
