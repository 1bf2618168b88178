//! Property-based tests for the wire codec.
//!
//! Verifies the round-trip law for arbitrary composite values: anything
//! `Encode` produces, `Decode` reconstructs bit-for-bit, with no bytes
//! left over.

use proptest::collection::vec;
use proptest::prelude::*;
use rill_proto::{
    msg, Allocation, Asset, ChannelId, ChannelSyncMsg, Decode, Encode, Phase, State, SubAlloc,
    Transaction,
};

fn channel_id_strategy() -> impl Strategy<Value = ChannelId> {
    any::<[u8; 32]>().prop_map(ChannelId)
}

fn phase_strategy() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Init),
        Just(Phase::Funding),
        Just(Phase::Acting),
        Just(Phase::Settled),
    ]
}

fn allocation_strategy() -> impl Strategy<Value = Allocation> {
    (
        vec(vec(any::<u8>(), 0..8).prop_map(Asset), 0..4),
        vec(vec(any::<u128>(), 0..4), 0..4),
        vec(
            (channel_id_strategy(), vec(any::<u128>(), 0..4))
                .prop_map(|(id, bals)| SubAlloc { id, bals }),
            0..3,
        ),
    )
        .prop_map(|(assets, balances, locked)| Allocation { assets, balances, locked })
}

fn state_strategy() -> impl Strategy<Value = State> {
    (channel_id_strategy(), any::<u64>(), allocation_strategy(), vec(any::<u8>(), 0..32), any::<bool>())
        .prop_map(|(id, version, allocation, data, is_final)| State {
            id,
            version,
            allocation,
            data,
            is_final,
        })
}

fn transaction_strategy() -> impl Strategy<Value = Transaction> {
    (state_strategy(), vec(vec(any::<u8>(), 0..70), 0..4))
        .prop_map(|(state, sigs)| Transaction { state, sigs })
}

fn roundtrip<T: Encode + Decode + PartialEq + std::fmt::Debug>(v: &T) {
    let buf = v.encode_to_vec().expect("encode");
    let mut r = &buf[..];
    let back = T::decode(&mut r).expect("decode");
    assert_eq!(&back, v);
    assert!(r.is_empty(), "{} trailing bytes", r.len());
}

#[test]
fn prop_state_roundtrip() {
    proptest!(|(state in state_strategy())| {
        roundtrip(&state);
    });
}

#[test]
fn prop_transaction_roundtrip() {
    proptest!(|(tx in transaction_strategy())| {
        roundtrip(&tx);
    });
}

#[test]
fn prop_channel_sync_frame_roundtrip() {
    msg::register_builtin();
    proptest!(|(phase in phase_strategy(), tx in transaction_strategy())| {
        let sync = ChannelSyncMsg { phase, current_tx: tx };
        let mut buf = Vec::new();
        msg::encode_msg(&mut buf, &sync).unwrap();
        let back = msg::decode_msg(&mut &buf[..]).unwrap();
        prop_assert_eq!(back.downcast_ref::<ChannelSyncMsg>(), Some(&sync));
    });
}
