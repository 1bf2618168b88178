//! Wire format stability tests.
//!
//! Golden-byte assertions over complete frames. If any of these fail,
//! the wire format changed and every deployed peer breaks: bump the
//! protocol, don't update the constants.

use rill_proto::codec::UnixNanos;
use rill_proto::sync::PingMsg;
use rill_proto::{msg, ChannelSyncMsg, Phase, State, Transaction};

fn frame_hex(m: &dyn msg::Msg) -> String {
    let mut buf = Vec::new();
    msg::encode_msg(&mut buf, m).expect("encoding should succeed");
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn golden_channel_sync_frame() {
    let sync = ChannelSyncMsg {
        phase: Phase::Acting,
        current_tx: Transaction {
            state: State { version: 1, ..State::default() },
            sigs: vec![],
        },
    };

    // tag 0x02, payload length 62:
    //   phase (1) + id (32) + version (8) + empty allocation (12)
    //   + empty data (4) + is_final (1) + empty sigs (4)
    let expected = concat!(
        "02",                                                               // tag
        "0000003e",                                                         // payload length
        "02",                                                               // phase = Acting
        "0000000000000000000000000000000000000000000000000000000000000000", // channel id
        "0000000000000001",                                                 // version
        "00000000",                                                         // assets
        "00000000",                                                         // balances
        "00000000",                                                         // locked
        "00000000",                                                         // data
        "00",                                                               // is_final
        "00000000",                                                         // sigs
    );
    assert_eq!(frame_hex(&sync), expected);
}

#[test]
fn golden_ping_frame() {
    let ping = PingMsg { created: UnixNanos(0x0102_0304_0506_0708) };
    assert_eq!(frame_hex(&ping), concat!("00", "00000008", "0102030405060708"));
}
