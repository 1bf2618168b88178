//! Typed wire messages and the message-type registry.
//!
//! Every message on the wire is a frame: `[tag: u8][len: u32 BE][payload]`.
//! The tag selects a decoder from a process-wide registry, so peers can
//! dispatch on messages they have never linked against, as long as a
//! decoder was registered at startup.
//!
//! # Registry lifecycle
//!
//! The registry is write-once-then-read-only: all registration happens at
//! process or library initialization, before any decoding. Registering
//! the same tag twice is a programming defect and **panics**; it is not a
//! recoverable runtime condition. Decoding a tag nobody registered is the
//! recoverable counterpart and returns [`CodecError::UnknownMsgType`].
//!
//! # Invariants
//!
//! - **Tag uniqueness**: every registered tag maps to exactly one decoder.
//! - **Frame consistency**: a decoder must consume the frame payload
//!   exactly; leftover bytes are rejected with
//!   [`CodecError::TrailingBytes`].
//! - **Size limit**: payloads are capped at [`MAX_MSG_SIZE`] on both the
//!   encode and decode paths, before any payload allocation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{LazyLock, Once, RwLock};

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::Decode;
use crate::errors::{CodecError, Result};

/// Maximum message payload size (16 MiB).
///
/// Prevents memory-exhaustion attacks via hostile length prefixes.
pub const MAX_MSG_SIZE: usize = 16 * 1024 * 1024;

/// Length of the frame prelude: one tag byte plus a u32 payload length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Small-integer tag identifying a message type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgType(pub u8);

impl MsgType {
    /// Keepalive request
    pub const PING: MsgType = MsgType(0);
    /// Keepalive response
    pub const PONG: MsgType = MsgType(1);
    /// Channel state synchronization after reconnect
    pub const CHANNEL_SYNC: MsgType = MsgType(2);
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A tagged, self-describing wire message.
///
/// Implementors provide their tag and payload encoding; framing and
/// dispatch are handled here. Received messages travel as `Box<dyn Msg>`
/// and are recovered with [`downcast_ref`](trait@Msg#method.downcast_ref).
pub trait Msg: Any + fmt::Debug + Send + Sync {
    /// The registered tag of this message type.
    fn msg_type(&self) -> MsgType;

    /// Writes the payload (everything after the frame prelude) to `w`.
    fn encode_payload(&self, w: &mut dyn Write) -> Result<()>;

    /// Upcast for downcasting received messages to their concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Msg {
    /// Downcasts a received message to a concrete message type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

/// A zero-argument decoder factory for one message type.
pub type DecodeFn = fn(&mut dyn Read) -> Result<Box<dyn Msg>>;

static DECODERS: LazyLock<RwLock<HashMap<u8, DecodeFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers the decoder for `tag`.
///
/// # Panics
///
/// Panics if `tag` already has a decoder. Registration is meant to run
/// once at startup; a duplicate tag is a coding defect that must abort
/// loudly rather than silently overwrite an existing decoder.
pub fn register_decoder(tag: MsgType, decoder: DecodeFn) {
    // The write guard must be released before panicking: a panic while
    // holding it would poison the table for the whole process. The
    // existing decoder is left untouched.
    {
        let mut table = DECODERS.write().expect("decoder table poisoned");
        if !table.contains_key(&tag.0) {
            table.insert(tag.0, decoder);
            return;
        }
    }
    panic!("wire decoder for message type {tag} registered twice");
}

/// Registers the decoders for this crate's built-in message types
/// (ping, pong, channel sync). Idempotent; callable from any number of
/// entry points.
pub fn register_builtin() {
    static BUILTIN: Once = Once::new();
    BUILTIN.call_once(|| {
        register_decoder(MsgType::PING, crate::sync::decode_ping);
        register_decoder(MsgType::PONG, crate::sync::decode_pong);
        register_decoder(MsgType::CHANNEL_SYNC, crate::sync::decode_channel_sync);
    });
}

/// Encodes `msg` into a complete frame (prelude + payload).
pub fn frame(msg: &dyn Msg) -> Result<Bytes> {
    let mut payload = Vec::new();
    msg.encode_payload(&mut payload)?;
    if payload.len() > MAX_MSG_SIZE {
        return Err(CodecError::MsgTooLarge { size: payload.len(), max: MAX_MSG_SIZE });
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(msg.msg_type().0);
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Writes `msg` as a complete frame to `w`.
pub fn encode_msg<W: Write + ?Sized>(w: &mut W, msg: &dyn Msg) -> Result<()> {
    w.write_all(&frame(msg)?)?;
    Ok(())
}

/// Reads one complete frame from `r` and dispatches it to the registered
/// decoder.
pub fn decode_msg<R: Read + ?Sized>(r: &mut R) -> Result<Box<dyn Msg>> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    let len = u32::decode(r)? as usize;
    if len > MAX_MSG_SIZE {
        return Err(CodecError::MsgTooLarge { size: len, max: MAX_MSG_SIZE });
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    decode_payload(MsgType(tag[0]), &payload)
}

/// Decodes an already-read frame payload by tag.
///
/// This is the dispatch point shared by the blocking [`decode_msg`] and
/// the async endpoint read path, which assembles the frame itself.
pub fn decode_payload(tag: MsgType, payload: &[u8]) -> Result<Box<dyn Msg>> {
    let decoder = DECODERS
        .read()
        .expect("decoder table poisoned")
        .get(&tag.0)
        .copied()
        .ok_or(CodecError::UnknownMsgType(tag.0))?;
    let mut r: &[u8] = payload;
    let msg = decoder(&mut r)?;
    if !r.is_empty() {
        return Err(CodecError::TrailingBytes(r.len()));
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encode;

    // Test-private tags live in 0xE0.. to stay clear of the built-ins
    // shared by every test in this process.
    const TEST_ECHO: MsgType = MsgType(0xE0);
    const TEST_DUP: MsgType = MsgType(0xE1);

    #[derive(Debug, PartialEq, Eq)]
    struct EchoMsg(u64);

    impl Msg for EchoMsg {
        fn msg_type(&self) -> MsgType {
            TEST_ECHO
        }

        fn encode_payload(&self, w: &mut dyn Write) -> Result<()> {
            self.0.encode(w)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn decode_echo(r: &mut dyn Read) -> Result<Box<dyn Msg>> {
        Ok(Box::new(EchoMsg(u64::decode(r)?)))
    }

    fn ensure_echo_registered() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| register_decoder(TEST_ECHO, decode_echo));
    }

    #[test]
    fn frame_roundtrip() {
        ensure_echo_registered();
        let msg = EchoMsg(0xDEAD_BEEF);
        let mut buf = Vec::new();
        encode_msg(&mut buf, &msg).unwrap();
        // Prelude: tag, then payload length 8.
        assert_eq!(&buf[..FRAME_HEADER_LEN], &[0xE0, 0x00, 0x00, 0x00, 0x08]);

        let back = decode_msg(&mut &buf[..]).unwrap();
        assert_eq!(back.msg_type(), TEST_ECHO);
        assert_eq!(back.downcast_ref::<EchoMsg>(), Some(&msg));
    }

    #[test]
    fn unknown_tag_is_recoverable_and_leaves_registry_usable() {
        ensure_echo_registered();
        let buf = [0xEFu8, 0, 0, 0, 0];
        let err = decode_msg(&mut &buf[..]).unwrap_err();
        assert_eq!(err, CodecError::UnknownMsgType(0xEF));

        // The failed lookup must not disturb registered decoders.
        let mut buf = Vec::new();
        encode_msg(&mut buf, &EchoMsg(7)).unwrap();
        assert!(decode_msg(&mut &buf[..]).is_ok());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_is_fatal() {
        register_decoder(TEST_DUP, decode_echo);
        register_decoder(TEST_DUP, decode_echo);
    }

    #[test]
    fn duplicate_registration_does_not_poison_the_table() {
        const TAG: MsgType = MsgType(0xE2);
        register_decoder(TAG, decode_echo);
        let second = std::panic::catch_unwind(|| register_decoder(TAG, decode_echo));
        assert!(second.is_err());

        // The table survives the panic: unknown tags stay a recoverable
        // error and registered decoders keep dispatching.
        let buf = [0xEFu8, 0, 0, 0, 0];
        let err = decode_msg(&mut &buf[..]).unwrap_err();
        assert_eq!(err, CodecError::UnknownMsgType(0xEF));

        let payload = 11u64.encode_to_vec().unwrap();
        let back = decode_payload(TAG, &payload).unwrap();
        assert_eq!(back.downcast_ref::<EchoMsg>(), Some(&EchoMsg(11)));
    }

    #[test]
    fn trailing_payload_bytes_are_rejected() {
        ensure_echo_registered();
        // Valid u64 payload plus one junk byte, with a matching length.
        let mut buf = vec![0xE0u8, 0, 0, 0, 9];
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 0xAA]);
        let err = decode_msg(&mut &buf[..]).unwrap_err();
        assert_eq!(err, CodecError::TrailingBytes(1));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let buf = [0xE0u8, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode_msg(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CodecError::MsgTooLarge { .. }));
    }

    #[test]
    fn register_builtin_is_idempotent() {
        register_builtin();
        register_builtin();
    }
}
