//! Turmoil-backed dialer and listener.
//!
//! Runs the transport over Turmoil's deterministic simulated TCP, so
//! whole multi-host scenarios (partitions, delays, reordering) replay
//! identically from a seed. Mirrors the production TCP transport: peer
//! addresses resolve to simulated hostnames through a host table.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rill_core::{Address, Dialer, Listener, RawConn, Result, WireError};
use tokio::sync::watch;

/// Dials peers over Turmoil's simulated TCP.
pub struct SimDialer<A: Address> {
    hosts: Mutex<HashMap<A, String>>,
}

impl<A: Address> SimDialer<A> {
    /// Creates a dialer with an empty host table.
    pub fn new() -> Self {
        SimDialer { hosts: Mutex::new(HashMap::new()) }
    }

    /// Registers the simulated `host` (a `hostname:port` string) of
    /// `peer`, replacing any previous entry.
    pub fn register(&self, peer: A, host: impl Into<String>) {
        self.hosts.lock().expect("host table poisoned").insert(peer, host.into());
    }
}

impl<A: Address> Default for SimDialer<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Address> Dialer<A> for SimDialer<A> {
    async fn dial(&self, addr: &A) -> Result<RawConn> {
        let host = self
            .hosts
            .lock()
            .expect("host table poisoned")
            .get(addr)
            .cloned()
            .ok_or_else(|| WireError::Dial(format!("no known host for peer {addr:?}")))?;
        let stream = turmoil::net::TcpStream::connect(host.as_str())
            .await
            .map_err(|err| WireError::Dial(format!("connecting to {host}: {err}")))?;
        Ok(Box::new(stream))
    }
}

/// Accepts simulated inbound TCP connections, with synchronized close.
pub struct SimListener {
    inner: turmoil::net::TcpListener,
    closed: watch::Sender<bool>,
}

impl SimListener {
    /// Binds a listener inside the current simulated host.
    pub async fn bind(addr: &str) -> Result<Self> {
        let inner = turmoil::net::TcpListener::bind(addr).await?;
        Ok(SimListener { inner, closed: watch::channel(false).0 })
    }
}

#[async_trait]
impl Listener for SimListener {
    async fn accept(&self) -> Result<RawConn> {
        let mut closed_rx = self.closed.subscribe();
        loop {
            if *closed_rx.borrow_and_update() {
                return Err(WireError::AlreadyClosed);
            }
            tokio::select! {
                accepted = self.inner.accept() => {
                    let (stream, _) = accepted?;
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
