//! # Rill Protocol: Wire Format
//!
//! This crate implements the binary wire layer for the rill off-chain
//! channel protocol: a self-describing codec for primitive and composite
//! values, a message-type registry enabling decode-by-tag dispatch, and
//! the channel-sync message peers exchange to reconcile channel state
//! after a reconnect.
//!
//! ## Protocol Design
//!
//! Everything on the wire is raw binary in network byte order:
//!
//! - **Scalars**: fixed-width Big Endian integers, one-byte booleans
//! - **Byte strings and sequences**: u32 Big Endian length prefix
//! - **Messages**: `[tag: u8][len: u32][payload]` frames, dispatched
//!   through a process-wide tag registry
//!
//! ## Implementation Notes
//!
//! - **No reflection**: a value is encodable exactly when its type
//!   implements [`Encode`]. Feeding an unsupported type to the codec is a
//!   compile error, the static rendition of "encoding an unregistered
//!   type is a programming defect".
//!
//! - **Bounded decoding**: frame payloads are capped at 16 MiB before any
//!   allocation happens, so a malicious length prefix cannot exhaust
//!   memory.
//!
//! - **Explicit validation**: every decode path returns [`CodecError`] on
//!   malformed input. There are no panicking parse paths.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod codec;
pub mod errors;
pub mod msg;
pub mod sync;

pub use channel::{Allocation, Asset, ChannelId, Phase, State, SubAlloc, Transaction};
pub use codec::{Decode, Encode, UnixNanos};
pub use errors::{CodecError, Result};
pub use msg::{Msg, MsgType};
pub use sync::{reconcile, ChannelSyncMsg, PingMsg, PongMsg, SyncError, SyncOutcome};
