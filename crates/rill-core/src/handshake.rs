//! Identity-exchange handshake.
//!
//! Over a freshly established raw connection, both sides send their own
//! address and read the peer's. The exchange is the authentication
//! anchor of this layer: once both sides have decoded a well-formed
//! address, the connection is considered authenticated. Proof of key
//! possession is deferred to the signed channel transactions above the
//! transport; no nonce is signed here.
//!
//! Both sides write first and read second. Addresses are a few dozen
//! bytes, far below any transport buffer, so the concurrent exchange
//! cannot deadlock.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::conn::RawConn;
use crate::error::{Result, WireError};
use crate::wallet::Address;

/// Runs the address exchange over `conn`, returning the peer's claimed
/// address.
///
/// Any failure (I/O error, connection closed mid-exchange, or a
/// malformed peer address) maps to [`WireError::Handshake`]; the caller
/// must drop the connection and create no endpoint. Checking the claimed
/// address against an expected one (on the dial path) is the caller's
/// job, since inbound connections have no expectation to check.
pub async fn exchange_addrs<A: Address>(own: &A, conn: &mut RawConn) -> Result<A> {
    let own_bytes = own.to_bytes();
    debug_assert_eq!(own_bytes.len(), A::LEN);

    conn.write_all(&own_bytes).await.map_err(exchange_io)?;
    conn.flush().await.map_err(exchange_io)?;

    let mut peer_bytes = vec![0u8; A::LEN];
    conn.read_exact(&mut peer_bytes).await.map_err(exchange_io)?;

    A::decode(&mut &peer_bytes[..])
        .map_err(|err| WireError::Handshake(format!("decoding peer address: {err}")))
}

fn exchange_io(err: std::io::Error) -> WireError {
    WireError::Handshake(format!("address exchange: {err}"))
}

#[cfg(test)]
mod tests {
    use rill_proto::{Decode, Encode};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    struct TestAddr([u8; 4]);

    impl Encode for TestAddr {
        fn encode<W: std::io::Write + ?Sized>(&self, w: &mut W) -> rill_proto::Result<()> {
            self.0.encode(w)
        }
    }

    impl Decode for TestAddr {
        fn decode<R: std::io::Read + ?Sized>(r: &mut R) -> rill_proto::Result<Self> {
            Ok(TestAddr(<[u8; 4]>::decode(r)?))
        }
    }

    impl Address for TestAddr {
        const LEN: usize = 4;

        fn to_bytes(&self) -> Vec<u8> {
            self.0.to_vec()
        }
    }

    #[tokio::test]
    async fn both_sides_learn_each_other() {
        let (a, b) = tokio::io::duplex(1024);
        let mut conn_a: RawConn = Box::new(a);
        let mut conn_b: RawConn = Box::new(b);

        let alice = TestAddr([1, 1, 1, 1]);
        let bob = TestAddr([2, 2, 2, 2]);

        let (got_b, got_a) = tokio::join!(
            exchange_addrs(&alice, &mut conn_a),
            exchange_addrs(&bob, &mut conn_b),
        );
        assert_eq!(got_b.unwrap(), bob);
        assert_eq!(got_a.unwrap(), alice);
    }

    #[tokio::test]
    async fn dropped_connection_fails_the_handshake() {
        let (a, b) = tokio::io::duplex(1024);
        drop(b);
        let mut conn: RawConn = Box::new(a);

        let err = exchange_addrs(&TestAddr([1, 1, 1, 1]), &mut conn).await.unwrap_err();
        assert!(matches!(err, WireError::Handshake(_)));
    }
}
