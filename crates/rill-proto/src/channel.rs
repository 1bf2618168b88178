//! Channel state data model.
//!
//! These types are produced and consumed by the channel state machine,
//! which lives above this crate; the wire layer only moves them. They are
//! defined here so the sync message can carry them with a fixed layout.
//!
//! Balances are fixed-width `u128`. The transport never does arithmetic
//! on them; 16 bytes is enough headroom for every asset denomination the
//! settlement backends use.

use std::io::{Read, Write};

use crate::codec::{decode_len, decode_seq, encode_len, encode_seq, Decode, Encode};
use crate::errors::{CodecError, Result};

/// Unique, immutable identifier of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub [u8; 32]);

impl Default for ChannelId {
    fn default() -> Self {
        ChannelId([0u8; 32])
    }
}

impl Encode for ChannelId {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.0.encode(w)
    }
}

impl Decode for ChannelId {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(ChannelId(<[u8; 32]>::decode(r)?))
    }
}

/// Lifecycle stage of a channel.
///
/// The variants are totally ordered by lifecycle progress; the sync
/// tie-break rule relies on this ordering (a later phase wins at equal
/// version). The derived `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Channel proposed, initial state being negotiated
    Init = 0,
    /// Initial state agreed, funding in progress
    Funding = 1,
    /// Funded and live, states being exchanged
    Acting = 2,
    /// Concluded on the settlement layer
    Settled = 3,
}

impl Encode for Phase {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[*self as u8])?;
        Ok(())
    }
}

impl Decode for Phase {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf)?;
        match buf[0] {
            0 => Ok(Phase::Init),
            1 => Ok(Phase::Funding),
            2 => Ok(Phase::Acting),
            3 => Ok(Phase::Settled),
            tag => Err(CodecError::InvalidPhase(tag)),
        }
    }
}

/// Opaque, backend-defined asset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Asset(pub Vec<u8>);

impl Encode for Asset {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.0.encode(w)
    }
}

impl Decode for Asset {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Asset(Vec::<u8>::decode(r)?))
    }
}

/// Balances locked for a sub-channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubAlloc {
    /// The sub-channel these balances are locked for
    pub id: ChannelId,
    /// One balance per asset
    pub bals: Vec<u128>,
}

impl Encode for SubAlloc {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.id.encode(w)?;
        encode_seq(w, &self.bals)
    }
}

impl Decode for SubAlloc {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(SubAlloc { id: ChannelId::decode(r)?, bals: decode_seq(r)? })
    }
}

/// Distribution of channel funds over assets and participants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Allocation {
    /// The assets held in the channel
    pub assets: Vec<Asset>,
    /// `balances[participant][asset]`, one balance vector per participant
    pub balances: Vec<Vec<u128>>,
    /// Funds locked for sub-channels
    pub locked: Vec<SubAlloc>,
}

impl Encode for Allocation {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        encode_seq(w, &self.assets)?;
        encode_len(w, self.balances.len())?;
        for part in &self.balances {
            encode_seq(w, part)?;
        }
        encode_seq(w, &self.locked)
    }
}

impl Decode for Allocation {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let assets = decode_seq(r)?;
        let parts = decode_len(r)?;
        let mut balances = Vec::with_capacity(parts.min(1024));
        for _ in 0..parts {
            balances.push(decode_seq(r)?);
        }
        let locked = decode_seq(r)?;
        Ok(Allocation { assets, balances, locked })
    }
}

/// One version of a channel's shared state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    /// Immutable channel ID
    pub id: ChannelId,
    /// Monotonically increasing version counter
    pub version: u64,
    /// Current fund distribution
    pub allocation: Allocation,
    /// Opaque application data
    pub data: Vec<u8>,
    /// Whether this state closes the channel
    pub is_final: bool,
}

impl Encode for State {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.id.encode(w)?;
        self.version.encode(w)?;
        self.allocation.encode(w)?;
        self.data.encode(w)?;
        self.is_final.encode(w)
    }
}

impl Decode for State {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(State {
            id: ChannelId::decode(r)?,
            version: u64::decode(r)?,
            allocation: Allocation::decode(r)?,
            data: Vec::<u8>::decode(r)?,
            is_final: bool::decode(r)?,
        })
    }
}

/// A channel state together with the signatures authorizing it.
///
/// Signatures are opaque backend-defined byte strings, in participant
/// order. A missing signature is an empty byte string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// The signed state
    pub state: State,
    /// One signature slot per participant
    pub sigs: Vec<Vec<u8>>,
}

impl Transaction {
    /// The channel this transaction belongs to.
    pub fn id(&self) -> ChannelId {
        self.state.id
    }

    /// The version of the signed state.
    pub fn version(&self) -> u64 {
        self.state.version
    }
}

impl Encode for Transaction {
    fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.state.encode(w)?;
        encode_seq(w, &self.sigs)
    }
}

impl Decode for Transaction {
    fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Transaction { state: State::decode(r)?, sigs: decode_seq(r)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_follows_lifecycle() {
        assert!(Phase::Init < Phase::Funding);
        assert!(Phase::Funding < Phase::Acting);
        assert!(Phase::Acting < Phase::Settled);
    }

    #[test]
    fn phase_rejects_unknown_tag() {
        let err = Phase::decode(&mut &[9u8][..]).unwrap_err();
        assert_eq!(err, CodecError::InvalidPhase(9));
    }

    #[test]
    fn state_roundtrip() {
        let state = State {
            id: ChannelId([7u8; 32]),
            version: 42,
            allocation: Allocation {
                assets: vec![Asset(vec![1, 2]), Asset(vec![3])],
                balances: vec![vec![10, 20], vec![30, 40]],
                locked: vec![SubAlloc { id: ChannelId([1u8; 32]), bals: vec![5, 5] }],
            },
            data: vec![0xCA, 0xFE],
            is_final: true,
        };
        let buf = state.encode_to_vec().unwrap();
        assert_eq!(State::decode(&mut &buf[..]).unwrap(), state);
    }

    #[test]
    fn hostile_participant_count_is_rejected() {
        // Empty asset sequence, then a participant count of u32::MAX.
        // Must be rejected before any per-participant allocation.
        let buf = [0u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = Allocation::decode(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CodecError::MsgTooLarge { .. }));
    }

    #[test]
    fn transaction_roundtrip() {
        let tx = Transaction {
            state: State { version: 7, ..State::default() },
            sigs: vec![vec![0xAB; 65], vec![]],
        };
        let buf = tx.encode_to_vec().unwrap();
        assert_eq!(Transaction::decode(&mut &buf[..]).unwrap(), tx);
    }
}
