pub mod decode;
pub mod encode;
pub mod item;

pub use decode::{Decoder, Kind};
pub use encode::{
    encode_big_int, encode_bytes, encode_signed, encode_string, encode_uint, Encoder,
};
pub use item::{decode_item, encode_item, Item};

use std::fmt;

/// Errors produced while encoding or decoding RLP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A size header used a non-canonical form: long form for a payload that
    /// fits the short form, a length with leading zero bytes, or a single
    /// value byte wrapped in a string header.
    #[error("rlp: non-canonical size information")]
    NonCanonicalSize,

    /// The input (or the enclosing list) ended before the current item.
    #[error("rlp: unexpected end of input")]
    UnexpectedEnd,

    /// The bytes decode to a value outside the recognized universe.
    #[error("rlp: invalid value: {0}")]
    InvalidValue(&'static str),

    /// The next item is not of the kind the caller asked for.
    #[error("rlp: expected {expected} but found {found}")]
    UnexpectedKind { expected: Kind, found: Kind },
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Byte => write!(f, "Byte"),
            Kind::Bytes => write!(f, "Bytes"),
            Kind::List => write!(f, "List"),
        }
    }
}
