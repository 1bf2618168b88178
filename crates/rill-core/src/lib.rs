//! Rill peer transport core.
//!
//! This crate owns the networking layer of the rill channel protocol:
//! authenticated peer endpoints, and the registry that guarantees at most
//! one live endpoint per peer address.
//!
//! # Architecture
//!
//! ```text
//!      ┌─────────────────────────────┐
//!      │ EndpointRegistry            │
//!      │ - one slot per peer address │
//!      │ - dial dedup & accept loop  │
//!      └─────────────────────────────┘
//!         ↓                       ↓
//! ┌────────────────┐   ┌───────────────────┐
//! │ Endpoint       │   │ handshake         │
//! │ framed Msg I/O │   │ address exchange  │
//! └────────────────┘   └───────────────────┘
//!         ↓                       ↓
//! ┌─────────────────────────────────────────┐
//! │ Dialer / Listener over raw byte streams │
//! │ (TCP in production, pipes/Turmoil in    │
//! │  tests, anything Duplex)                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Key principles
//!
//! - Identity is a [`wallet::Address`]: a fixed-width, totally ordered
//!   credential from a pluggable cryptographic backend. The transport
//!   consumes it, never creates it.
//! - A connection only becomes an [`Endpoint`](endpoint::Endpoint) after
//!   the identity-exchange handshake succeeds.
//! - All registry state lives behind one mutex that is never held across
//!   an await point; waiters are woken over watch channels, so an
//!   abandoned wait cleans up by being dropped.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod conn;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod net;
pub mod registry;
pub mod wallet;

pub use conn::{Dialer, Duplex, Listener, RawConn};
pub use endpoint::Endpoint;
pub use error::{Result, WireError};
pub use net::{TcpDialer, TcpListener};
pub use registry::EndpointRegistry;
pub use wallet::{Address, Backend};
