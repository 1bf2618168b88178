//! Channel state synchronization messages.
//!
//! After a reconnect, each peer sends a [`ChannelSyncMsg`] carrying its
//! channel phase and current transaction. The receiving state machine
//! feeds the message to [`reconcile`] to decide whether to adopt the
//! remote view, keep its own, or report a protocol violation.
//!
//! The transport layer owns encoding, decoding, and the tie-break rule;
//! *acting* on the outcome (replacing pending state, raising disputes) is
//! the channel state machine's job.

use std::any::Any;
use std::io::{Read, Write};

use thiserror::Error;

use crate::channel::{ChannelId, Phase, Transaction};
use crate::codec::{Decode, Encode, UnixNanos};
use crate::errors::Result;
use crate::msg::{Msg, MsgType};

/// State synchronization message: the sender's phase and current
/// transaction for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSyncMsg {
    /// The sender's lifecycle phase
    pub phase: Phase,
    /// The sender's current transaction
    pub current_tx: Transaction,
}

impl ChannelSyncMsg {
    /// The channel this message synchronizes.
    pub fn id(&self) -> ChannelId {
        self.current_tx.id()
    }

    /// The version of the sender's current state.
    pub fn version(&self) -> u64 {
        self.current_tx.version()
    }
}

impl Msg for ChannelSyncMsg {
    fn msg_type(&self) -> MsgType {
        MsgType::CHANNEL_SYNC
    }

    fn encode_payload(&self, w: &mut dyn Write) -> Result<()> {
        self.phase.encode(w)?;
        self.current_tx.encode(w)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn decode_channel_sync(r: &mut dyn Read) -> Result<Box<dyn Msg>> {
    Ok(Box::new(ChannelSyncMsg { phase: Phase::decode(r)?, current_tx: Transaction::decode(r)? }))
}

/// Keepalive request carrying its creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMsg {
    /// When the sender created the ping
    pub created: UnixNanos,
}

impl Msg for PingMsg {
    fn msg_type(&self) -> MsgType {
        MsgType::PING
    }

    fn encode_payload(&self, w: &mut dyn Write) -> Result<()> {
        self.created.encode(w)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn decode_ping(r: &mut dyn Read) -> Result<Box<dyn Msg>> {
    Ok(Box::new(PingMsg { created: UnixNanos::decode(r)? }))
}

/// Keepalive response, echoing nothing; carries its own creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMsg {
    /// When the sender created the pong
    pub created: UnixNanos,
}

impl Msg for PongMsg {
    fn msg_type(&self) -> MsgType {
        MsgType::PONG
    }

    fn encode_payload(&self, w: &mut dyn Write) -> Result<()> {
        self.created.encode(w)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn decode_pong(r: &mut dyn Read) -> Result<Box<dyn Msg>> {
    Ok(Box::new(PongMsg { created: UnixNanos::decode(r)? }))
}

/// What to do with an incoming sync message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote view is newer; replace local pending state with it
    Adopt,
    /// The local view is at least as new; discard the message
    Ignore,
}

/// Protocol violations detected while reconciling state views.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Both sides claim the same version and phase but different content.
    ///
    /// This can only happen if a peer equivocated or local persistence is
    /// corrupt; it must be surfaced, never silently resolved.
    #[error("conflicting channel state at version {version}, phase {phase:?}")]
    Conflict {
        /// The contested version
        version: u64,
        /// The contested phase
        phase: Phase,
    },

    /// The message synchronizes a different channel than the local state.
    #[error("sync message for foreign channel")]
    WrongChannel,
}

/// Applies the sync tie-break rule to an incoming message.
///
/// Higher version wins; at equal version the later lifecycle phase wins;
/// at equal version *and* phase the content must be identical, otherwise
/// the peer equivocated and a [`SyncError::Conflict`] is reported.
pub fn reconcile(
    local_phase: Phase,
    local_tx: &Transaction,
    incoming: &ChannelSyncMsg,
) -> std::result::Result<SyncOutcome, SyncError> {
    if incoming.id() != local_tx.id() {
        return Err(SyncError::WrongChannel);
    }
    match incoming.version().cmp(&local_tx.version()) {
        std::cmp::Ordering::Greater => Ok(SyncOutcome::Adopt),
        std::cmp::Ordering::Less => Ok(SyncOutcome::Ignore),
        std::cmp::Ordering::Equal => match incoming.phase.cmp(&local_phase) {
            std::cmp::Ordering::Greater => Ok(SyncOutcome::Adopt),
            std::cmp::Ordering::Less => Ok(SyncOutcome::Ignore),
            std::cmp::Ordering::Equal => {
                if incoming.current_tx == *local_tx {
                    Ok(SyncOutcome::Ignore)
                } else {
                    Err(SyncError::Conflict {
                        version: local_tx.version(),
                        phase: local_phase,
                    })
                }
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::State;
    use crate::msg::{decode_msg, encode_msg, register_builtin};

    fn tx(version: u64, data: &[u8]) -> Transaction {
        Transaction {
            state: State { version, data: data.to_vec(), ..State::default() },
            sigs: vec![vec![1, 2, 3]],
        }
    }

    fn sync(phase: Phase, version: u64, data: &[u8]) -> ChannelSyncMsg {
        ChannelSyncMsg { phase, current_tx: tx(version, data) }
    }

    #[test]
    fn newer_version_is_adopted_regardless_of_phase() {
        let local = tx(5, b"local");
        for phase in [Phase::Init, Phase::Funding, Phase::Acting, Phase::Settled] {
            let incoming = sync(phase, 6, b"remote");
            assert_eq!(reconcile(Phase::Acting, &local, &incoming), Ok(SyncOutcome::Adopt));
        }
    }

    #[test]
    fn older_version_is_ignored() {
        let local = tx(5, b"local");
        let incoming = sync(Phase::Settled, 4, b"remote");
        assert_eq!(reconcile(Phase::Acting, &local, &incoming), Ok(SyncOutcome::Ignore));
    }

    #[test]
    fn equal_version_later_phase_wins() {
        let local = tx(5, b"same");
        let incoming = sync(Phase::Settled, 5, b"same");
        assert_eq!(reconcile(Phase::Acting, &local, &incoming), Ok(SyncOutcome::Adopt));

        let incoming = sync(Phase::Funding, 5, b"same");
        assert_eq!(reconcile(Phase::Acting, &local, &incoming), Ok(SyncOutcome::Ignore));
    }

    #[test]
    fn equal_version_and_phase_with_differing_content_is_a_conflict() {
        let local = tx(5, b"local");
        let incoming = sync(Phase::Acting, 5, b"remote");
        assert_eq!(
            reconcile(Phase::Acting, &local, &incoming),
            Err(SyncError::Conflict { version: 5, phase: Phase::Acting })
        );
    }

    #[test]
    fn identical_views_are_ignored() {
        let local = tx(5, b"same");
        let incoming = sync(Phase::Acting, 5, b"same");
        assert_eq!(reconcile(Phase::Acting, &local, &incoming), Ok(SyncOutcome::Ignore));
    }

    #[test]
    fn foreign_channel_is_rejected() {
        let local = tx(5, b"local");
        let mut incoming = sync(Phase::Acting, 6, b"remote");
        incoming.current_tx.state.id = ChannelId([9u8; 32]);
        assert_eq!(reconcile(Phase::Acting, &local, &incoming), Err(SyncError::WrongChannel));
    }

    #[test]
    fn channel_sync_frame_roundtrip() {
        register_builtin();
        let msg = sync(Phase::Acting, 9, b"payload");
        let mut buf = Vec::new();
        encode_msg(&mut buf, &msg).unwrap();
        let back = decode_msg(&mut &buf[..]).unwrap();
        assert_eq!(back.downcast_ref::<ChannelSyncMsg>(), Some(&msg));
    }

    #[test]
    fn ping_pong_frame_roundtrip() {
        register_builtin();
        let ping = PingMsg { created: UnixNanos(1_566_573_112) };
        let mut buf = Vec::new();
        encode_msg(&mut buf, &ping).unwrap();
        assert_eq!(decode_msg(&mut &buf[..]).unwrap().downcast_ref::<PingMsg>(), Some(&ping));

        let pong = PongMsg { created: UnixNanos(1_566_573_113) };
        let mut buf = Vec::new();
        encode_msg(&mut buf, &pong).unwrap();
        assert_eq!(decode_msg(&mut &buf[..]).unwrap().downcast_ref::<PongMsg>(), Some(&pong));
    }
}
