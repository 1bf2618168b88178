//! Endpoint registry: one authenticated endpoint per peer address.
//!
//! The registry owns the set of live endpoints and enforces the central
//! transport invariant: **at most one live endpoint per peer address**,
//! no matter how many tasks request the peer concurrently and no matter
//! how dial and accept race.
//!
//! # Concurrency model
//!
//! The address→slot map is the only mutable shared state and sits behind
//! one `std::sync::Mutex` that is never held across an await point. A
//! slot is either *pending* (a dial or inbound handshake is in flight)
//! or *established*. Pending slots broadcast their eventual result over
//! a `tokio::sync::watch` channel:
//!
//! - every concurrent [`get`](EndpointRegistry::get) for the same
//!   address subscribes to the same channel, so exactly one dial is
//!   issued and all callers observe the same endpoint (or the same
//!   error);
//! - a caller that gives up (deadline, cancellation) simply drops its
//!   receiver; nothing is leaked and the shared dial keeps running for
//!   the remaining waiters.
//!
//! A registry-wide watch flag signals close to the accept loop and to
//! in-flight dial tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::conn::{Dialer, Listener, RawConn};
use crate::endpoint::Endpoint;
use crate::error::{Result, WireError};
use crate::handshake;
use crate::wallet::Address;

type Ep<A> = Arc<Endpoint<A>>;
type SlotResult<A> = std::result::Result<Ep<A>, WireError>;
type SlotSender<A> = Arc<watch::Sender<Option<SlotResult<A>>>>;

enum Slot<A: Address> {
    /// Handshake in flight; waiters subscribe to the sender.
    Pending(SlotSender<A>),
    /// Live authenticated endpoint.
    Established(Ep<A>),
}

struct Inner<A: Address, D: Dialer<A>> {
    own_addr: A,
    dialer: D,
    slots: Mutex<HashMap<A, Slot<A>>>,
    closed: watch::Sender<bool>,
    on_new_endpoint: Box<dyn Fn(&Ep<A>) + Send + Sync>,
}

/// Registry of authenticated peer endpoints, keyed by peer address.
///
/// Cheaply cloneable handle; all clones share the same state.
pub struct EndpointRegistry<A: Address, D: Dialer<A>> {
    inner: Arc<Inner<A, D>>,
}

impl<A: Address, D: Dialer<A>> Clone for EndpointRegistry<A, D> {
    fn clone(&self) -> Self {
        EndpointRegistry { inner: Arc::clone(&self.inner) }
    }
}

impl<A: Address, D: Dialer<A>> EndpointRegistry<A, D> {
    /// Creates a registry identifying itself as `own_addr` to peers.
    ///
    /// `on_new_endpoint` fires once for every endpoint installed, dialed
    /// or accepted. Built-in message decoders are registered here, so a
    /// process that only ever constructs registries needs no separate
    /// wire-format initialization.
    pub fn new(
        own_addr: A,
        dialer: D,
        on_new_endpoint: impl Fn(&Ep<A>) + Send + Sync + 'static,
    ) -> Self {
        rill_proto::msg::register_builtin();
        EndpointRegistry {
            inner: Arc::new(Inner {
                own_addr,
                dialer,
                slots: Mutex::new(HashMap::new()),
                closed: watch::channel(false).0,
                on_new_endpoint: Box::new(on_new_endpoint),
            }),
        }
    }

    /// The address this registry authenticates as.
    pub fn own_address(&self) -> &A {
        &self.inner.own_addr
    }

    /// Number of live established endpoints.
    pub fn num_endpoints(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Established(ep) if !ep.is_closed()))
            .count()
    }

    /// Returns the endpoint for `addr`, dialing and handshaking if none
    /// exists yet.
    ///
    /// Concurrent calls for the same address coalesce onto a single dial
    /// and all return the same endpoint instance. The future is
    /// cancel-safe: dropping it (e.g. under `tokio::time::timeout`)
    /// deregisters this caller without aborting the shared dial that
    /// other callers may still be waiting on.
    pub async fn get(&self, addr: &A) -> Result<Ep<A>> {
        let mut rx = {
            let mut slots = self.lock_slots();
            if *self.inner.closed.borrow() {
                return Err(WireError::AlreadyClosed);
            }
            match slots.get(addr) {
                Some(Slot::Established(ep)) if !ep.is_closed() => return Ok(Arc::clone(ep)),
                Some(Slot::Pending(tx)) => tx.subscribe(),
                // Absent, or established but dead: start a fresh dial.
                _ => {
                    let (tx, rx) = watch::channel(None);
                    let tx = Arc::new(tx);
                    slots.insert(addr.clone(), Slot::Pending(Arc::clone(&tx)));
                    self.spawn_dial(addr.clone(), tx);
                    rx
                },
            }
        };
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a result; only happens on teardown.
                return Err(WireError::AlreadyClosed);
            }
        }
    }

    /// Runs the accept loop on `listener` until the listener or the
    /// registry closes.
    ///
    /// Each inbound connection is handshaken on its own task; a failed
    /// inbound handshake is logged and never stops the loop. Returns
    /// `Ok(())` when the listener reports closed and
    /// [`WireError::AlreadyClosed`] when the registry shut down.
    pub async fn listen<L: Listener>(&self, listener: L) -> Result<()> {
        let mut closed_rx = self.inner.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(WireError::AlreadyClosed);
        }
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => self.spawn_setup(conn),
                    Err(err) if err.is_already_closed() => return Ok(()),
                    Err(err) => {
                        warn!(%err, "accept failed, stopping accept loop");
                        return Err(err);
                    },
                },
                _ = closed_signal(&mut closed_rx) => return Err(WireError::AlreadyClosed),
            }
        }
    }

    /// Closes the registry: every established endpoint is closed, every
    /// pending `get` fails with [`WireError::AlreadyClosed`], the accept
    /// loop and in-flight dial tasks terminate. The second and every
    /// later call reports [`WireError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        let drained: Vec<Slot<A>> = {
            let mut slots = self.lock_slots();
            if self.inner.closed.send_replace(true) {
                return Err(WireError::AlreadyClosed);
            }
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in drained {
            match slot {
                Slot::Established(ep) => {
                    let _ = ep.close().await;
                },
                Slot::Pending(tx) => {
                    tx.send_replace(Some(Err(WireError::AlreadyClosed)));
                },
            }
        }
        Ok(())
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<A, Slot<A>>> {
        // Poisoning would mean a panic while holding the lock, which
        // nothing on these short critical sections can do.
        self.inner.slots.lock().expect("slot map poisoned")
    }

    fn spawn_dial(&self, addr: A, tx: SlotSender<A>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut closed_rx = this.inner.closed.subscribe();
            // The dial itself runs on a separate task so that a
            // panicking dialer surfaces as a join error and resolves
            // the slot; waiters must never hang on a wedged slot.
            let mut attempt = tokio::spawn({
                let this = this.clone();
                let addr = addr.clone();
                async move { this.dial_and_exchange(&addr).await }
            });
            let result = tokio::select! {
                joined = &mut attempt => match joined {
                    Ok(result) => result,
                    Err(err) => Err(WireError::Dial(format!("dial task failed: {err}"))),
                },
                _ = closed_signal(&mut closed_rx) => {
                    attempt.abort();
                    Err(WireError::AlreadyClosed)
                },
            };
            this.install_dialed(&addr, result, &tx);
        });
    }

    async fn dial_and_exchange(&self, addr: &A) -> SlotResult<A> {
        let mut conn = self.inner.dialer.dial(addr).await?;
        let peer = handshake::exchange_addrs(&self.inner.own_addr, &mut conn).await?;
        if peer != *addr {
            return Err(WireError::Handshake(
                "peer claimed a different address than dialed".into(),
            ));
        }
        debug!(peer = ?addr, "outbound connection authenticated");
        Ok(Arc::new(Endpoint::new(peer, conn)))
    }

    /// Resolves the pending slot for a finished dial, honoring whatever
    /// an inbound connection may have installed in the meantime.
    fn install_dialed(&self, addr: &A, result: SlotResult<A>, tx: &SlotSender<A>) {
        let mut redundant: Option<Ep<A>> = None;
        let mut fresh: Option<Ep<A>> = None;
        let outcome = {
            let mut slots = self.lock_slots();
            if *self.inner.closed.borrow() {
                redundant = result.ok();
                Err(WireError::AlreadyClosed)
            } else {
                match slots.get(addr) {
                    // An accepted connection won the race; keep it and
                    // discard the dialed one.
                    Some(Slot::Established(existing)) if !existing.is_closed() => {
                        redundant = result.ok();
                        Ok(Arc::clone(existing))
                    },
                    _ => match result {
                        Ok(ep) => {
                            slots.insert(addr.clone(), Slot::Established(Arc::clone(&ep)));
                            fresh = Some(Arc::clone(&ep));
                            Ok(ep)
                        },
                        Err(err) => {
                            slots.remove(addr);
                            Err(err)
                        },
                    },
                }
            }
        };
        if let Some(ep) = fresh {
            (self.inner.on_new_endpoint)(&ep);
        }
        tx.send_replace(Some(outcome));
        if let Some(ep) = redundant {
            tokio::spawn(async move {
                let _ = ep.close().await;
            });
        }
    }

    fn spawn_setup(&self, mut conn: RawConn) {
        let this = self.clone();
        tokio::spawn(async move {
            match handshake::exchange_addrs(&this.inner.own_addr, &mut conn).await {
                Ok(peer) if peer == this.inner.own_addr => {
                    warn!("inbound connection claimed our own address, dropping");
                },
                Ok(peer) => {
                    debug!(?peer, "inbound connection authenticated");
                    this.install_accepted(Arc::new(Endpoint::new(peer, conn)));
                },
                Err(err) => warn!(%err, "inbound handshake failed"),
            }
        });
    }

    /// Installs an accepted endpoint, waking any `get` callers pending
    /// on the same address and replacing a previous endpoint if one
    /// exists.
    fn install_accepted(&self, ep: Ep<A>) {
        let peer = ep.peer().clone();
        let mut replaced: Option<Ep<A>> = None;
        let mut waiters: Option<SlotSender<A>> = None;
        let installed = {
            let mut slots = self.lock_slots();
            if *self.inner.closed.borrow() {
                replaced = Some(Arc::clone(&ep));
                false
            } else {
                match slots.insert(peer, Slot::Established(Arc::clone(&ep))) {
                    Some(Slot::Pending(tx)) => waiters = Some(tx),
                    Some(Slot::Established(old)) => replaced = Some(old),
                    None => {},
                }
                true
            }
        };
        if installed {
            (self.inner.on_new_endpoint)(&ep);
        }
        if let Some(tx) = waiters {
            tx.send_replace(Some(Ok(Arc::clone(&ep))));
        }
        if let Some(old) = replaced {
            tokio::spawn(async move {
                let _ = old.close().await;
            });
        }
    }
}

/// Completes once the closed flag is raised (or the registry dropped).
async fn closed_signal(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
