//! Raw connection, dialer, and listener abstractions.
//!
//! A raw connection is any duplex byte stream; TCP in production,
//! in-memory pipes or Turmoil's simulated TCP in tests. The transport
//! core is written entirely against these traits, so every registry and
//! handshake test runs unchanged over any of them.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::wallet::Address;

/// A raw duplex byte stream.
///
/// Blanket-implemented for everything that can read and write
/// asynchronously; connections travel as [`RawConn`] trait objects.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// A boxed raw connection, not yet authenticated.
pub type RawConn = Box<dyn Duplex>;

/// Capability to originate raw connections to peers.
///
/// The returned future is cancel-safe: dropping an in-flight dial (for
/// example under `tokio::time::timeout`) aborts it promptly and leaks
/// neither sockets nor tasks.
#[async_trait]
pub trait Dialer<A: Address>: Send + Sync + 'static {
    /// Opens a raw connection to the peer known to be reachable at
    /// `addr`. The connection is not authenticated until the handshake
    /// has run over it.
    async fn dial(&self, addr: &A) -> Result<RawConn>;
}

/// Capability to accept inbound raw connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Blocks until an inbound connection arrives or the listener is
    /// closed. After [`close`](Listener::close), every pending and
    /// future call returns [`WireError::AlreadyClosed`](crate::WireError::AlreadyClosed).
    async fn accept(&self) -> Result<RawConn>;

    /// Closes the listener, unblocking pending accepts. The second and
    /// every later call reports
    /// [`WireError::AlreadyClosed`](crate::WireError::AlreadyClosed).
    fn close(&self) -> Result<()>;
}

// Shared handles listen too, so a caller can hand the accept loop one
// handle and keep another for closing.
#[async_trait]
impl<L: Listener + ?Sized> Listener for std::sync::Arc<L> {
    async fn accept(&self) -> Result<RawConn> {
        (**self).accept().await
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
