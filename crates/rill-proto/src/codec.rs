//! Generic binary codec for wire values.
//!
//! [`Encode`] and [`Decode`] are exact inverses: any value produced by
//! `Encode` decodes back bit-for-bit (the round-trip law, checked by
//! property tests). Layouts are fixed per type:
//!
//! - integers: fixed-width Big Endian (`u16`..`u128`, `i16`..`i64`)
//! - `bool`: one byte, `0x00` or `0x01`
//! - `Vec<u8>` / `String`: u32 Big Endian length prefix + raw bytes
//! - `[u8; N]`: raw bytes, no prefix (the length is part of the type)
//! - composites: field by field, recursively
//!
//! `u8` and `i8` intentionally have no codec impl. Single-byte scalars
//! are reserved for tags and booleans with their own validation; trying
//! to encode one is a type error, not a runtime condition.

use std::io::{Read, Write};

use crate::errors::{CodecError, Result};
use crate::msg::MAX_MSG_SIZE;

/// A value with a fixed binary wire layout.
pub trait Encode {
    /// Writes the value's wire encoding to `w`.
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()>;

    /// Encodes the value into a fresh byte vector.
    ///
    /// Deliberately not named `to_vec`: that would shadow the slice
    /// method of the same name on `[u8; N]` and `Vec<u8>` wherever this
    /// trait is in scope.
    fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// The inverse of [`Encode`].
pub trait Decode: Sized {
    /// Reads one value's wire encoding from `r`.
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self>;
}

macro_rules! impl_int_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
                w.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                r.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        }
    )*};
}

impl_int_codec!(u16, u32, u64, u128, i16, i32, i64);

impl Encode for bool {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

impl Decode for bool {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf)?;
        match buf[0] {
            0x00 => Ok(false),
            0x01 => Ok(true),
            b => Err(CodecError::InvalidBool(b)),
        }
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(self)?;
        Ok(())
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; N];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl Encode for Vec<u8> {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        encode_len(w, self.len())?;
        w.write_all(self)?;
        Ok(())
    }
}

impl Decode for Vec<u8> {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let len = decode_len(r)?;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl Encode for String {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        encode_len(w, self.len())?;
        w.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Decode for String {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let bytes = Vec::<u8>::decode(r)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Wall-clock instant carried as nanoseconds since the Unix epoch.
///
/// Used by keepalive messages; encoded as a plain `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixNanos(pub i64);

impl Encode for UnixNanos {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.0.encode(w)
    }
}

impl Decode for UnixNanos {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(UnixNanos(i64::decode(r)?))
    }
}

/// Writes a u32 Big Endian length prefix, rejecting oversized lengths.
pub(crate) fn encode_len<W: Write + ?Sized>(w: &mut W, len: usize) -> Result<()> {
    if len > MAX_MSG_SIZE {
        return Err(CodecError::MsgTooLarge { size: len, max: MAX_MSG_SIZE });
    }
    #[allow(clippy::cast_possible_truncation)]
    (len as u32).encode(w)
}

/// Reads a u32 Big Endian length prefix, rejecting oversized lengths
/// before any allocation happens.
pub(crate) fn decode_len<R: Read + ?Sized>(r: &mut R) -> Result<usize> {
    let len = u32::decode(r)? as usize;
    if len > MAX_MSG_SIZE {
        return Err(CodecError::MsgTooLarge { size: len, max: MAX_MSG_SIZE });
    }
    Ok(len)
}

/// Encodes a sequence as a u32 element count followed by the elements.
pub fn encode_seq<W: Write + ?Sized, T: Encode>(w: &mut W, items: &[T]) -> Result<()> {
    encode_len(w, items.len())?;
    for item in items {
        item.encode(w)?;
    }
    Ok(())
}

/// The inverse of [`encode_seq`].
pub fn decode_seq<R: Read + ?Sized, T: Decode>(r: &mut R) -> Result<Vec<T>> {
    let len = decode_len(r)?;
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(T::decode(r)?);
    }
    Ok(items)
}
