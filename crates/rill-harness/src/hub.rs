//! In-process connection hub.
//!
//! A [`ConnHub`] wires dialers and listeners together over in-memory
//! duplex pipes, so registry and handshake tests run with no sockets at
//! all. Dialers count successful dials and listeners count accepted
//! connections, which is what lets tests assert "N concurrent gets, one
//! connection".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rill_core::{Address, Dialer, Listener, RawConn, Result, WireError};
use tokio::sync::{mpsc, watch};

// Generous pipe buffer so handshakes and test messages never block on
// backpressure.
const PIPE_CAPACITY: usize = 64 * 1024;

type ListenerMap<A> = Arc<Mutex<HashMap<A, mpsc::UnboundedSender<RawConn>>>>;

/// Hub connecting [`HubDialer`]s to [`HubListener`]s by address.
pub struct ConnHub<A: Address> {
    listeners: ListenerMap<A>,
}

impl<A: Address> ConnHub<A> {
    /// Creates an empty hub.
    pub fn new() -> Self {
        ConnHub { listeners: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Creates a dialer that reaches every listener on this hub.
    pub fn new_dialer(&self) -> HubDialer<A> {
        HubDialer {
            listeners: Arc::clone(&self.listeners),
            dialed: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a listener reachable at `addr`, replacing any previous
    /// listener registered there.
    pub fn new_listener(&self, addr: A) -> HubListener<A> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_listeners().insert(addr.clone(), tx);
        HubListener {
            addr,
            listeners: Arc::clone(&self.listeners),
            conns: tokio::sync::Mutex::new(rx),
            accepted: AtomicUsize::new(0),
            closed: watch::channel(false).0,
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, HashMap<A, mpsc::UnboundedSender<RawConn>>> {
        self.listeners.lock().expect("hub listener map poisoned")
    }
}

impl<A: Address> Default for ConnHub<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dialer handing out in-memory pipes to hub listeners.
///
/// Clones share the dial counter, so a test can keep a handle while the
/// registry owns another.
pub struct HubDialer<A: Address> {
    listeners: ListenerMap<A>,
    dialed: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl<A: Address> Clone for HubDialer<A> {
    fn clone(&self) -> Self {
        HubDialer {
            listeners: Arc::clone(&self.listeners),
            dialed: Arc::clone(&self.dialed),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<A: Address> HubDialer<A> {
    /// Number of successful dials made through this dialer (and its
    /// clones).
    pub fn num_dialed(&self) -> usize {
        self.dialed.load(Ordering::Acquire)
    }

    /// Closes the dialer; later dials and the second close report
    /// [`WireError::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(WireError::AlreadyClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl<A: Address> Dialer<A> for HubDialer<A> {
    async fn dial(&self, addr: &A) -> Result<RawConn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WireError::AlreadyClosed);
        }
        let tx = self
            .listeners
            .lock()
            .expect("hub listener map poisoned")
            .get(addr)
            .cloned()
            .ok_or_else(|| WireError::Dial(format!("no listener at {addr:?}")))?;
        let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
        tx.send(Box::new(theirs))
            .map_err(|_| WireError::Dial(format!("listener at {addr:?} is gone")))?;
        self.dialed.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(ours))
    }
}

/// Listener receiving the peer half of every pipe dialed to its address.
pub struct HubListener<A: Address> {
    addr: A,
    listeners: ListenerMap<A>,
    conns: tokio::sync::Mutex<mpsc::UnboundedReceiver<RawConn>>,
    accepted: AtomicUsize,
    closed: watch::Sender<bool>,
}

impl<A: Address> HubListener<A> {
    /// The hub address this listener is registered at.
    pub fn addr(&self) -> &A {
        &self.addr
    }

    /// Number of connections accepted so far.
    pub fn num_accepted(&self) -> usize {
        self.accepted.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<A: Address> Listener for HubListener<A> {
    async fn accept(&self) -> Result<RawConn> {
        let mut closed_rx = self.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(WireError::AlreadyClosed);
        }
        let mut conns = self.conns.lock().await;
        tokio::select! {
            conn = conns.recv() => match conn {
                Some(conn) => {
                    self.accepted.fetch_add(1, Ordering::AcqRel);
                    Ok(conn)
                },
                // Hub dropped or our registration was replaced.
                None => Err(WireError::AlreadyClosed),
            },
            _ = closed_rx.changed() => Err(WireError::AlreadyClosed),
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Err(WireError::AlreadyClosed);
        }
        self.listeners.lock().expect("hub listener map poisoned").remove(&self.addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::sim_wallet::SimAddress;

    use super::*;

    fn addr(tag: u8) -> SimAddress {
        SimAddress([tag; 20])
    }

    #[tokio::test]
    async fn dial_reaches_listener() {
        let hub = ConnHub::new();
        let listener = hub.new_listener(addr(1));
        let dialer = hub.new_dialer();

        let mut dialed = dialer.dial(&addr(1)).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();

        dialed.write_all(b"over the hub").await.unwrap();
        let mut buf = [0u8; 12];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"over the hub");

        assert_eq!(dialer.num_dialed(), 1);
        assert_eq!(listener.num_accepted(), 1);
    }

    #[tokio::test]
    async fn dial_unknown_address_fails() {
        let hub: ConnHub<SimAddress> = ConnHub::new();
        let dialer = hub.new_dialer();
        let Err(err) = dialer.dial(&addr(9)).await else {
            panic!("dialing an unknown address must fail");
        };
        assert!(matches!(err, WireError::Dial(_)));
    }

    #[tokio::test]
    async fn closed_listener_is_unreachable() {
        let hub = ConnHub::new();
        let listener = hub.new_listener(addr(2));
        let dialer = hub.new_dialer();

        listener.close().unwrap();
        assert_eq!(listener.close().unwrap_err(), WireError::AlreadyClosed);
        assert!(matches!(listener.accept().await, Err(WireError::AlreadyClosed)));
        assert!(matches!(dialer.dial(&addr(2)).await, Err(WireError::Dial(_))));
    }

    #[tokio::test]
    async fn close_unblocks_pending_accept() {
        let hub = ConnHub::new();
        let listener = std::sync::Arc::new(hub.new_listener(addr(3)));
        let pending = {
            let listener = std::sync::Arc::clone(&listener);
            tokio::spawn(async move { listener.accept().await })
        };
        tokio::task::yield_now().await;

        listener.close().unwrap();
        assert!(matches!(pending.await.unwrap(), Err(WireError::AlreadyClosed)));
    }
}
