//! Test harness for the rill transport.
//!
//! Three interchangeable ways to run the transport without a real
//! network, all implementing the same `Dialer`/`Listener` traits the
//! production TCP transport implements:
//!
//! - [`hub`]: an in-process connection hub over in-memory pipes, with
//!   dial and accept counters for asserting on connection reuse;
//! - [`sim_net`]: Turmoil-backed TCP for deterministic multi-host
//!   simulations with fault injection;
//! - [`sim_wallet`]: a simulated address/signature backend with no real
//!   cryptography;
//! - [`random`]: generators for random protocol values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hub;
pub mod random;
pub mod sim_net;
pub mod sim_wallet;

pub use hub::{ConnHub, HubDialer, HubListener};
pub use sim_net::{SimDialer, SimListener};
pub use sim_wallet::{SimAccount, SimAddress, SimBackend};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber, once per process.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}
