//! Simulated wallet backend.
//!
//! Addresses are plain 20-byte values and "signatures" are a keyless
//! checksum derived from the signer's address. This gives tests real
//! address semantics (fixed width, total order, codec) and verifiable
//! signatures with zero cryptography. Never use outside tests.

use std::fmt;
use std::io::{Read, Write};

use rill_core::{Address, Backend, Result};
use rill_proto::{Decode, Encode};

/// A 20-byte simulated address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimAddress(pub [u8; 20]);

impl SimAddress {
    /// The all-zero address.
    pub const ZERO: SimAddress = SimAddress([0; 20]);
}

impl fmt::Debug for SimAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Encode for SimAddress {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> rill_proto::Result<()> {
        self.0.encode(w)
    }
}

impl Decode for SimAddress {
    fn decode<R: Read + ?Sized>(r: &mut R) -> rill_proto::Result<Self> {
        Ok(SimAddress(<[u8; 20]>::decode(r)?))
    }
}

impl Address for SimAddress {
    const LEN: usize = 20;

    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// A simulated account that signs with its address checksum.
#[derive(Debug, Clone)]
pub struct SimAccount {
    address: SimAddress,
}

impl SimAccount {
    /// Creates an account for `address`.
    pub fn new(address: SimAddress) -> Self {
        SimAccount { address }
    }

    /// The account's address.
    pub fn address(&self) -> SimAddress {
        self.address
    }

    /// Produces the simulated signature of `msg`.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        checksum(&self.address, msg)
    }
}

/// The simulated backend tying [`SimAddress`] and its checksum scheme
/// together.
pub struct SimBackend;

impl Backend for SimBackend {
    type Address = SimAddress;

    fn verify_signature(msg: &[u8], sig: &[u8], signer: &SimAddress) -> Result<bool> {
        Ok(sig == checksum(signer, msg))
    }
}

// FNV-1a over address then message. Deterministic per (signer, msg),
// trivially forgeable, which is exactly right for a test wallet.
fn checksum(signer: &SimAddress, msg: &[u8]) -> Vec<u8> {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in signer.0.iter().chain(msg) {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h.to_be_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_for_signer_only() {
        let alice = SimAccount::new(SimAddress([1; 20]));
        let bob = SimAddress([2; 20]);

        let sig = alice.sign(b"state v3");
        assert!(SimBackend::verify_signature(b"state v3", &sig, &alice.address()).unwrap());
        assert!(!SimBackend::verify_signature(b"state v3", &sig, &bob).unwrap());
        assert!(!SimBackend::verify_signature(b"state v4", &sig, &alice.address()).unwrap());
    }

    #[test]
    fn address_codec_roundtrip() {
        let addr = SimAddress([7; 20]);
        let bytes = addr.to_bytes();
        // to_bytes is the raw fixed-width encoding, nothing wrapped.
        assert_eq!(bytes, vec![7u8; 20]);
        assert_eq!(bytes.len(), SimAddress::LEN);
        assert_eq!(SimAddress::decode(&mut &bytes[..]).unwrap(), addr);
    }

    #[test]
    fn addresses_order_by_bytes() {
        let lo = SimAddress([0; 20]);
        let hi = SimAddress([255; 20]);
        assert!(lo < hi);
        assert_eq!(lo, SimAddress::ZERO);
    }
}
