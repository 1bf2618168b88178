//! Cryptographic identity interface.
//!
//! The transport authenticates peers by address but never touches key
//! material itself: addresses and signatures come from an interchangeable
//! settlement backend (an account-style chain backend in production, a
//! simulated wallet in tests). This module defines the capability the
//! transport consumes.

use std::fmt::Debug;
use std::hash::Hash;
use std::io::Read;

use rill_proto::{CodecError, Decode, Encode};

use crate::error::Result;

/// A peer's cryptographic identity and routing key.
///
/// An address is an immutable value with a fixed-width byte encoding.
/// `Ord` is the backend's three-way comparator and must be consistent
/// with `Eq`; both compare the encoded bytes in every known backend.
/// Decoding a short or malformed buffer fails with [`CodecError`],
/// never panics.
pub trait Address:
    Encode + Decode + Clone + Eq + Ord + Hash + Debug + Send + Sync + Unpin + 'static
{
    /// Width of the fixed-length byte encoding.
    const LEN: usize;

    /// The address's byte encoding, `Self::LEN` bytes long.
    fn to_bytes(&self) -> Vec<u8>;
}

/// Capability interface of a cryptographic backend.
///
/// The transport calls into this during and around the handshake; it
/// never signs or verifies anything itself. Signature verification is
/// part of the consumed interface for the layers above (signed channel
/// transactions); the minimal transport handshake is a plain address
/// exchange and does not invoke it.
pub trait Backend: Send + Sync + 'static {
    /// The backend's address type.
    type Address: Address;

    /// Decodes an address from its fixed-width byte encoding.
    fn decode_address<R: Read + ?Sized>(
        r: &mut R,
    ) -> std::result::Result<Self::Address, CodecError> {
        Self::Address::decode(r)
    }

    /// Verifies that `sig` is `signer`'s signature over `msg`.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature; an
    /// `Err` means the signature could not even be interpreted.
    fn verify_signature(msg: &[u8], sig: &[u8], signer: &Self::Address) -> Result<bool>;
}
