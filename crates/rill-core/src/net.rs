//! TCP-backed dialer and listener.
//!
//! The production transport. Peer addresses are protocol identities, not
//! network locations, so [`TcpDialer`] carries an explicit address→host
//! table that callers populate out of band (configuration, discovery).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tracing::debug;

use crate::conn::{Dialer, Listener, RawConn};
use crate::error::{Result, WireError};
use crate::wallet::Address;

/// Dials peers over TCP, resolving peer addresses through a host table.
pub struct TcpDialer<A: Address> {
    hosts: Mutex<HashMap<A, String>>,
    closed: AtomicBool,
}

impl<A: Address> TcpDialer<A> {
    /// Creates a dialer with an empty host table.
    pub fn new() -> Self {
        TcpDialer { hosts: Mutex::new(HashMap::new()), closed: AtomicBool::new(false) }
    }

    /// Registers `host` (a `host:port` string) as the network location
    /// of `peer`, replacing any previous entry.
    pub fn register(&self, peer: A, host: impl Into<String>) {
        self.lock_hosts().insert(peer, host.into());
    }

    /// Closes the dialer. Later dials fail with
    /// [`WireError::AlreadyClosed`]; the second and every later close
    /// reports it too.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(WireError::AlreadyClosed);
        }
        Ok(())
    }

    fn lock_hosts(&self) -> std::sync::MutexGuard<'_, HashMap<A, String>> {
        self.hosts.lock().expect("host table poisoned")
    }
}

impl<A: Address> Default for TcpDialer<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Address> Dialer<A> for TcpDialer<A> {
    async fn dial(&self, addr: &A) -> Result<RawConn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WireError::AlreadyClosed);
        }
        let host = self
            .lock_hosts()
            .get(addr)
            .cloned()
            .ok_or_else(|| WireError::Dial(format!("no known host for peer {addr:?}")))?;
        let stream = TcpStream::connect(&host)
            .await
            .map_err(|err| WireError::Dial(format!("connecting to {host}: {err}")))?;
        debug!(%host, "tcp connection established");
        Ok(Box::new(stream))
    }
}

/// Accepts inbound TCP connections, with synchronized close.
///
/// `close` unblocks every pending [`accept`](Listener::accept), which
/// then reports [`WireError::AlreadyClosed`].
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    closed: watch::Sender<bool>,
}

impl TcpListener {
    /// Binds a listener to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        Ok(TcpListener { inner, closed: watch::channel(false).0 })
    }

    /// The local socket address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> Result<RawConn> {
        let mut closed_rx = self.closed.subscribe();
        loop {
            if *closed_rx.borrow_and_update() {
                return Err(WireError::AlreadyClosed);
            }
            tokio::select! {
                accepted = self.inner.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "tcp connection accepted");
                    return Ok(Box::new(stream));
                },
                changed = closed_rx.changed() => {
                    if changed.is_err() {
                        return Err(WireError::AlreadyClosed);
                    }
                },
            }
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Err(WireError::AlreadyClosed);
        }
        Ok(())
    }
}
