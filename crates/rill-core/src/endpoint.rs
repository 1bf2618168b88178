//! Authenticated peer endpoint.
//!
//! An [`Endpoint`] is one live logical connection to exactly one peer
//! address. It exists only after a successful handshake and owns its raw
//! connection exclusively; the registry guarantees at most one live
//! endpoint per peer address.
//!
//! # Close semantics
//!
//! An endpoint closes on explicit [`close`](Endpoint::close), on any I/O
//! error, or on registry shutdown. Close is synchronized: a `recv` or
//! `send` blocked on the wire is woken and reports
//! [`WireError::AlreadyClosed`], and so does the second close and any
//! use after close.

use rill_proto::msg::{self, Msg, MsgType, FRAME_HEADER_LEN, MAX_MSG_SIZE};
use rill_proto::CodecError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};

use crate::conn::RawConn;
use crate::error::{Result, WireError};
use crate::wallet::Address;

/// A live, authenticated logical connection to one peer.
///
/// `send` and `recv` may be called concurrently (each direction is
/// guarded by its own lock); concurrent senders serialize whole frames,
/// so messages never interleave on the wire.
pub struct Endpoint<A: Address> {
    peer: A,
    send_half: Mutex<WriteHalf<RawConn>>,
    recv_half: Mutex<ReadHalf<RawConn>>,
    closed: watch::Sender<bool>,
}

impl<A: Address> Endpoint<A> {
    pub(crate) fn new(peer: A, conn: RawConn) -> Self {
        let (recv_half, send_half) = tokio::io::split(conn);
        Endpoint {
            peer,
            send_half: Mutex::new(send_half),
            recv_half: Mutex::new(recv_half),
            closed: watch::channel(false).0,
        }
    }

    /// The authenticated address of the remote peer.
    pub fn peer(&self) -> &A {
        &self.peer
    }

    /// Whether this endpoint has been closed (explicitly or by an I/O
    /// error).
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Sends one message as a complete frame.
    ///
    /// An I/O failure closes the endpoint and is returned as
    /// [`WireError::Transport`]. A concurrent close wakes a blocked
    /// send, which then reports [`WireError::AlreadyClosed`].
    pub async fn send(&self, msg: &dyn Msg) -> Result<()> {
        let mut closed_rx = self.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(WireError::AlreadyClosed);
        }
        let frame = msg::frame(msg)?;
        let io = async {
            let mut w = self.send_half.lock().await;
            if let Err(err) = w.write_all(&frame).await {
                self.mark_closed();
                return Err(err.into());
            }
            if let Err(err) = w.flush().await {
                self.mark_closed();
                return Err(err.into());
            }
            Ok(())
        };
        tokio::pin!(io);
        tokio::select! {
            res = &mut io => res,
            _ = closed_signal(&mut closed_rx) => Err(WireError::AlreadyClosed),
        }
    }

    /// Receives the next message.
    ///
    /// I/O errors and malformed frames close the endpoint. An
    /// [unknown message tag](CodecError::UnknownMsgType) does *not*: the
    /// frame boundary keeps the stream aligned, so the unknown message is
    /// skipped and the error surfaced while the endpoint stays usable. A
    /// concurrent close wakes a blocked recv, which then reports
    /// [`WireError::AlreadyClosed`].
    pub async fn recv(&self) -> Result<Box<dyn Msg>> {
        let mut closed_rx = self.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(WireError::AlreadyClosed);
        }
        let io = async {
            let payload;
            let tag;
            {
                let mut r = self.recv_half.lock().await;
                let mut prelude = [0u8; FRAME_HEADER_LEN];
                if let Err(err) = r.read_exact(&mut prelude).await {
                    self.mark_closed();
                    return Err(err.into());
                }
                tag = MsgType(prelude[0]);
                let len =
                    u32::from_be_bytes([prelude[1], prelude[2], prelude[3], prelude[4]]) as usize;
                if len > MAX_MSG_SIZE {
                    self.mark_closed();
                    return Err(CodecError::MsgTooLarge { size: len, max: MAX_MSG_SIZE }.into());
                }
                let mut buf = vec![0u8; len];
                if let Err(err) = r.read_exact(&mut buf).await {
                    self.mark_closed();
                    return Err(err.into());
                }
                payload = buf;
            }
            match msg::decode_payload(tag, &payload) {
                Ok(m) => Ok(m),
                Err(err @ CodecError::UnknownMsgType(_)) => Err(err.into()),
                Err(err) => {
                    self.mark_closed();
                    Err(err.into())
                },
            }
        };
        tokio::pin!(io);
        tokio::select! {
            res = &mut io => res,
            _ = closed_signal(&mut closed_rx) => Err(WireError::AlreadyClosed),
        }
    }

    /// Closes the endpoint and shuts down the underlying connection.
    ///
    /// Wakes every `recv` and `send` blocked on the wire.
    /// Idempotent-detect: the first call succeeds, every later call
    /// reports [`WireError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Err(WireError::AlreadyClosed);
        }
        // Best effort; the peer may already be gone. A sender blocked on
        // this lock has been woken by the flag and releases it promptly.
        let _ = self.send_half.lock().await.shutdown().await;
        Ok(())
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
    }
}

impl<A: Address> std::fmt::Debug for Endpoint<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Completes once the closed flag is raised.
async fn closed_signal(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
